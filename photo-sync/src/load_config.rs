/// `load_config` module: builds the run's configuration from an optional YAML
/// file and the process environment.
///
/// The YAML file holds only tunables (windows, paths, routing). Credentials
/// never live in it; they are read from the environment by
/// [`Credentials::from_env`], after an optional `.env` has been loaded by `main`.
///
/// # Errors
/// - Unreadable or malformed YAML surfaces as `anyhow::Error` with the path.
/// - Out-of-range windows or attempt counts fail [`SyncConfig::validate`].
/// - Missing credentials are a [`SyncError::Config`], raised before any
///   network call.
use anyhow::Result;
use photo_sync_core::config::{Mode, SyncConfig};
use photo_sync_core::secret::Secret;
use photo_sync_core::SyncError;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const SOURCE_TOKEN_VAR: &str = "INSTAGRAM_TOKEN";
pub const SOURCE_EXPIRY_VAR: &str = "INSTAGRAM_TOKEN_EXPIRY";
pub const DESTINATION_TOKEN_VAR: &str = "GITHUB_TOKEN";
pub const MODE_VAR: &str = "RACK_ENV";

/// Loads the YAML config at `path`, or the defaults when no path is given.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<SyncConfig> {
    let Some(path) = path else {
        info!("No config file given, using defaults");
        return Ok(SyncConfig::default());
    };
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty document deserializes to unit, not to an empty map.
    if config_content.trim().is_empty() {
        return Ok(SyncConfig::default());
    }

    let config: SyncConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Err(e) = config.validate() {
        error!(error = %e, config_path = ?path_ref, "Config values out of range");
        return Err(e.into());
    }
    Ok(config)
}

/// Credentials and mode taken from the environment.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub source_token: Secret,
    pub destination_token: Secret,
    /// Raw unix-seconds expiry of `source_token`, if known.
    pub source_token_expiry: Option<String>,
    pub mode: Mode,
}

impl Credentials {
    pub fn from_env() -> Result<Self, SyncError> {
        let source_token = required(SOURCE_TOKEN_VAR)?;
        let destination_token = required(DESTINATION_TOKEN_VAR)?;
        let mode = Mode::from_env_value(env::var(MODE_VAR).ok().as_deref());
        info!(mode = ?mode, "Credentials loaded from environment");
        Ok(Credentials {
            source_token,
            destination_token,
            source_token_expiry: env::var(SOURCE_EXPIRY_VAR).ok(),
            mode,
        })
    }
}

fn required(name: &str) -> Result<Secret, SyncError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(Secret::new(value.trim())),
        _ => {
            error!(var = name, "Required environment variable missing");
            Err(SyncError::Config(format!("{name} is not set")))
        }
    }
}
