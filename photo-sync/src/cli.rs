/// # photo-sync CLI Interface (Module)
///
/// Command parsing and orchestration for the `photo-sync` binary. Every piece
/// of business logic lives in `photo-sync-core`; this module wires the real
/// clients together and turns run reports into terse stdout lines.
///
/// - `sync`: the scheduled run. One line per handled item.
/// - `rotate`: check the source token and rotate it against a given secrets
///   repository, without publishing anything.
///
/// Logs go to stderr; stdout only carries the status lines.
use crate::load_config::{load_config, Credentials};
use crate::upload::GitHubClient;
use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use photo_sync_core::config::SyncConfig;
use photo_sync_core::download::InstagramClient;
use photo_sync_core::rotate::{
    CredentialRotator, RotationOutcome, SecretNames, SecretWrite, TokenState,
};
use photo_sync_core::route::Router;
use photo_sync_core::synchronise::{
    synchronise, Collaborators, ItemReport, ItemStatus, RunEnd, SynchroniseReport,
};
use photo_sync_core::SyncError;
use std::path::PathBuf;

/// Publish new photo-sharing posts to static-site repositories.
#[derive(Parser)]
#[clap(
    name = "photo-sync",
    version,
    about = "Publish new Instagram posts as static-site posts, one atomic commit per photo"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish every post inside the recency window
    Sync {
        /// Path to an optional YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// Renew the source token if due and store it in a repository's secrets
    Rotate {
        /// Repository holding the secrets, as owner/name
        #[clap(long)]
        repo: String,
        /// Path to an optional YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

/// `<short_code> => <repo> => <status>`
pub fn item_line(item: &ItemReport) -> String {
    let status = match &item.status {
        ItemStatus::Published { .. } => "Published".to_string(),
        ItemStatus::Skipped | ItemStatus::AlreadyPresent => "Skipped".to_string(),
        ItemStatus::Error { message } => format!("Error: {message}"),
    };
    format!("{} => {} => {}", item.short_code, item.repo, status)
}

/// Closing line for a run, if the way it ended is worth telling.
pub fn end_line(end: &RunEnd) -> Option<String> {
    match end {
        RunEnd::Completed => None,
        RunEnd::NoMedia | RunEnd::NothingNew { .. } => Some("Nothing new".to_string()),
        RunEnd::SourceUnreachable { .. } => Some("Instagram not reachable right now".to_string()),
        RunEnd::FetchFailed { short_code, message } => {
            Some(format!("Could not download media for {short_code}: {message}"))
        }
    }
}

/// Lines describing a rotation attempt.
pub fn rotation_lines(outcome: &RotationOutcome) -> Vec<String> {
    match outcome {
        RotationOutcome::StillValid { expiry } => {
            vec![format!("Token valid until {}", expiry.to_rfc3339())]
        }
        RotationOutcome::Rotated { writes, .. } => writes
            .iter()
            .map(|w| match &w.result {
                SecretWrite::Stored => format!("Updated GitHub secret {}", w.name),
                SecretWrite::StaleKey { key_id } => format!(
                    "Problem updating GitHub secret {}: public key {key_id} is stale",
                    w.name
                ),
                SecretWrite::Rejected { message, .. } => {
                    format!("Problem updating GitHub secret {}: {message}", w.name)
                }
            })
            .collect(),
    }
}

fn print_report(report: &SynchroniseReport) {
    for item in &report.items {
        println!("{}", item_line(item));
    }
    match &report.rotation {
        Some(Ok(outcome)) => rotation_lines(outcome).iter().for_each(|l| println!("{l}")),
        Some(Err(message)) => println!("{message}"),
        None => {}
    }
    if let Some(line) = end_line(&report.end) {
        println!("{line}");
    }
}

fn rotator(config: &SyncConfig, credentials: &Credentials) -> CredentialRotator {
    CredentialRotator::new(
        TokenState::from_unix(
            credentials.source_token.clone(),
            credentials.source_token_expiry.as_deref(),
        ),
        SecretNames {
            token: config.token_secret_name.clone(),
            expiry: config.expiry_secret_name.clone(),
        },
        config.renewal_window(),
        config.renewal_margin(),
    )
}

/// Async entrypoint shared by `main` and the integration tests.
///
/// Returns an error only for outcomes that must end the process with a
/// non-zero code: bad configuration and unrecoverable source errors.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config } => {
            let config = load_config(config)?;
            let credentials = Credentials::from_env()?;
            config.trace_loaded();
            tracing::info!(command = "sync", mode = ?credentials.mode, "Starting synchronisation");

            let router = Router::new(config.routing.clone(), credentials.mode);
            let source = InstagramClient::new(credentials.source_token.clone());
            let destination = GitHubClient::new(&credentials.destination_token)?;
            let clients = Collaborators {
                source: &source,
                search: &destination,
                git: &destination,
                secrets: &destination,
            };
            let mut rotator = rotator(&config, &credentials);

            match synchronise(&config, &router, &clients, &mut rotator, Utc::now()).await {
                Ok(report) => {
                    tracing::info!(
                        command = "sync",
                        published = report.published(),
                        end = ?report.end,
                        "Synchronisation complete"
                    );
                    print_report(&report);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(e.into())
                }
            }
        }
        Commands::Rotate { repo, config } => {
            let config = load_config(config)?;
            let credentials = Credentials::from_env()?;
            tracing::info!(command = "rotate", repo = %repo, "Checking source token");

            let source = InstagramClient::new(credentials.source_token.clone());
            let destination = GitHubClient::new(&credentials.destination_token)?;
            let mut rotator = rotator(&config, &credentials);

            let outcome = rotator
                .rotate(&source, &destination, &repo, Utc::now())
                .await
                .map_err(SyncError::from)?;
            for line in rotation_lines(&outcome) {
                println!("{line}");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use photo_sync_core::rotate::SecretWriteReport;

    fn item(status: ItemStatus) -> ItemReport {
        ItemReport {
            short_code: "BYeY7yClLbk".into(),
            repo: "lildude/gonefora.run".into(),
            status,
        }
    }

    #[test]
    fn item_lines() {
        assert_eq!(
            item_line(&item(ItemStatus::Published {
                commit_sha: "abc".into()
            })),
            "BYeY7yClLbk => lildude/gonefora.run => Published"
        );
        assert_eq!(
            item_line(&item(ItemStatus::AlreadyPresent)),
            "BYeY7yClLbk => lildude/gonefora.run => Skipped"
        );
        assert_eq!(
            item_line(&item(ItemStatus::Error {
                message: "boom".into()
            })),
            "BYeY7yClLbk => lildude/gonefora.run => Error: boom"
        );
    }

    #[test]
    fn end_lines() {
        assert_eq!(end_line(&RunEnd::Completed), None);
        assert_eq!(
            end_line(&RunEnd::NothingNew {
                short_code: "X".into()
            })
            .as_deref(),
            Some("Nothing new")
        );
        assert_eq!(
            end_line(&RunEnd::SourceUnreachable {
                reason: "dns".into()
            })
            .as_deref(),
            Some("Instagram not reachable right now")
        );
    }

    #[test]
    fn rotation_report_lines() {
        let outcome = RotationOutcome::Rotated {
            new_expiry: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            writes: vec![
                SecretWriteReport {
                    name: "INSTAGRAM_TOKEN".into(),
                    result: SecretWrite::Stored,
                },
                SecretWriteReport {
                    name: "INSTAGRAM_TOKEN_EXPIRY".into(),
                    result: SecretWrite::StaleKey { key_id: "42".into() },
                },
            ],
        };
        assert_eq!(
            rotation_lines(&outcome),
            vec![
                "Updated GitHub secret INSTAGRAM_TOKEN".to_string(),
                "Problem updating GitHub secret INSTAGRAM_TOKEN_EXPIRY: public key 42 is stale"
                    .to_string(),
            ]
        );
    }
}
