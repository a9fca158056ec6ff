use photo_sync::load_config::{load_config, Credentials};
use photo_sync_core::config::{DuplicateGuard, Mode, TagSource};
use photo_sync_core::SyncError;
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

fn clear_env() {
    for var in ["INSTAGRAM_TOKEN", "INSTAGRAM_TOKEN_EXPIRY", "GITHUB_TOKEN", "RACK_ENV"] {
        env::remove_var(var);
    }
}

#[test]
fn no_path_gives_defaults() {
    let config = load_config(None::<PathBuf>).expect("defaults");
    assert_eq!(config.recency_window_secs, 7200);
    assert_eq!(config.branch, "master");
    assert_eq!(config.tag_source, TagSource::Caption);
    assert_eq!(config.duplicate_guard, DuplicateGuard::Search);
    assert_eq!(config.routing.rules[0].tag, "run");
}

#[test]
fn partial_yaml_keeps_remaining_defaults() {
    let file = config_file(
        r#"
recency_window_secs: 3600
tag_source: field
duplicate_guard: strict
secrets_repository: lildude/colinseymour.co.uk
routing:
  rules:
    - tag: garden
      repository: example/garden
  default_repository: example/blog
"#,
    );
    let config = load_config(Some(file.path())).expect("config should load");

    assert_eq!(config.recency_window_secs, 3600);
    assert_eq!(config.tag_source, TagSource::Field);
    assert_eq!(config.duplicate_guard, DuplicateGuard::Strict);
    assert_eq!(
        config.secrets_repository.as_deref(),
        Some("lildude/colinseymour.co.uk")
    );
    assert_eq!(config.routing.rules.len(), 1);
    assert_eq!(config.routing.default_repository, "example/blog");
    assert_eq!(config.routing.dev_repository, "lildude/lildude.github.io");
    assert_eq!(config.title_words, 8);
    assert_eq!(config.renewal_margin_secs, 604_800);
}

#[test]
fn empty_file_is_valid() {
    let file = config_file("");
    let config = load_config(Some(file.path())).expect("empty config");
    assert_eq!(config.posts_dir, "_posts");
}

#[test]
fn malformed_yaml_is_rejected() {
    let file = config_file("tag_source: [not, an, enum]\n");
    let err = load_config(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}

#[test]
fn zero_attempts_is_rejected() {
    let file = config_file("max_publish_attempts: 0\n");
    assert!(load_config(Some(file.path())).is_err());
}

#[test]
fn out_of_range_window_is_rejected() {
    let file = config_file("recency_window_secs: 9223372036854775807\n");
    let err = load_config(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("recency_window_secs"));

    let file = config_file("renewal_margin_secs: -5\n");
    assert!(load_config(Some(file.path())).is_err());
}

#[test]
fn missing_file_is_reported() {
    let err = load_config(Some("/nonexistent/photo-sync.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
#[serial]
fn credentials_from_env() {
    clear_env();
    env::set_var("INSTAGRAM_TOKEN", "IGQVJtoken");
    env::set_var("GITHUB_TOKEN", "ghp_token");
    env::set_var("INSTAGRAM_TOKEN_EXPIRY", "1700000000");
    env::set_var("RACK_ENV", "development");

    let creds = Credentials::from_env().expect("credentials");
    assert_eq!(creds.source_token.expose(), "IGQVJtoken");
    assert_eq!(creds.destination_token.expose(), "ghp_token");
    assert_eq!(creds.source_token_expiry.as_deref(), Some("1700000000"));
    assert_eq!(creds.mode, Mode::Development);
    assert!(!format!("{creds:?}").contains("IGQVJtoken"));
    clear_env();
}

#[test]
#[serial]
fn missing_token_is_a_config_error() {
    clear_env();
    env::set_var("INSTAGRAM_TOKEN", "IGQVJtoken");

    let err = Credentials::from_env().unwrap_err();
    assert!(matches!(err, SyncError::Config(ref m) if m.contains("GITHUB_TOKEN")));
    assert!(err.is_fatal());
    clear_env();
}

#[test]
#[serial]
fn unknown_mode_means_production() {
    clear_env();
    env::set_var("INSTAGRAM_TOKEN", "a");
    env::set_var("GITHUB_TOKEN", "b");
    env::set_var("RACK_ENV", "staging");
    assert_eq!(Credentials::from_env().unwrap().mode, Mode::Production);
    clear_env();
}
