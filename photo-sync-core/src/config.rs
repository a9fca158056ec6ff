use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SyncError;
use crate::route::RoutingConfig;

/// Upper bound for every `*_secs` window: one hundred years.
pub const MAX_WINDOW_SECS: i64 = 100 * 366 * 24 * 60 * 60;

/// Where routing/front-matter tags come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    /// Hashtags embedded in the caption.
    #[default]
    Caption,
    /// The explicit tag list delivered with the item.
    Field,
    /// Caption hashtags followed by explicit tags.
    Both,
}

/// How hard the pipeline tries to avoid publishing the same item twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateGuard {
    /// Code search only. Overlapping runs can race.
    #[default]
    Search,
    /// Code search, plus a path check against the exact base commit of every
    /// commit attempt.
    Strict,
}

/// Deployment mode, from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Production,
    Development,
    Test,
}

impl Mode {
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("development") => Mode::Development,
            Some("test") => Mode::Test,
            _ => Mode::Production,
        }
    }

    pub fn is_development(self) -> bool {
        matches!(self, Mode::Development | Mode::Test)
    }
}

/// Tunables for a run. Every field has a default so an empty YAML document is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub recency_window_secs: i64,
    pub title_words: usize,
    pub source_label: String,
    pub source_tag: String,
    pub posts_dir: String,
    pub image_dir: String,
    pub post_ext: String,
    pub branch: String,
    pub commit_message: String,
    pub max_publish_attempts: u32,
    pub tag_source: TagSource,
    pub duplicate_guard: DuplicateGuard,
    pub renewal_window_secs: i64,
    pub renewal_margin_secs: i64,
    /// Repository whose secret store holds the source token. Defaults to the
    /// destination of the item that triggered rotation.
    pub secrets_repository: Option<String>,
    pub token_secret_name: String,
    pub expiry_secret_name: String,
    pub routing: RoutingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            recency_window_secs: 2 * 60 * 60,
            title_words: 8,
            source_label: "Instagram".to_string(),
            source_tag: "instagram".to_string(),
            posts_dir: "_posts".to_string(),
            image_dir: "img".to_string(),
            post_ext: "md".to_string(),
            branch: "master".to_string(),
            commit_message: "New Instagram photo".to_string(),
            max_publish_attempts: 3,
            tag_source: TagSource::Caption,
            duplicate_guard: DuplicateGuard::Search,
            renewal_window_secs: 0,
            renewal_margin_secs: 7 * 24 * 60 * 60,
            secrets_repository: None,
            token_secret_name: "INSTAGRAM_TOKEN".to_string(),
            expiry_secret_name: "INSTAGRAM_TOKEN_EXPIRY".to_string(),
            routing: RoutingConfig::default(),
        }
    }
}

fn window(secs: i64) -> Duration {
    Duration::try_seconds(secs.clamp(0, MAX_WINDOW_SECS)).unwrap_or_else(Duration::zero)
}

impl SyncConfig {
    /// Reject values that cannot drive a run. Windows outside
    /// `0..=MAX_WINDOW_SECS` would otherwise be clamped silently.
    pub fn validate(&self) -> Result<(), SyncError> {
        for (name, secs) in [
            ("recency_window_secs", self.recency_window_secs),
            ("renewal_window_secs", self.renewal_window_secs),
            ("renewal_margin_secs", self.renewal_margin_secs),
        ] {
            if !(0..=MAX_WINDOW_SECS).contains(&secs) {
                return Err(SyncError::Config(format!(
                    "{name} must be between 0 and {MAX_WINDOW_SECS}, got {secs}"
                )));
            }
        }
        if self.max_publish_attempts == 0 {
            return Err(SyncError::Config(
                "max_publish_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn recency_window(&self) -> Duration {
        window(self.recency_window_secs)
    }

    pub fn renewal_window(&self) -> Duration {
        window(self.renewal_window_secs)
    }

    pub fn renewal_margin(&self) -> Duration {
        window(self.renewal_margin_secs)
    }

    pub fn trace_loaded(&self) {
        info!(
            recency_window_secs = self.recency_window_secs,
            branch = %self.branch,
            tag_source = ?self.tag_source,
            duplicate_guard = ?self.duplicate_guard,
            rules = self.routing.rules.len(),
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}
