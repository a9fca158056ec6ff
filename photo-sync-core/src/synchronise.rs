//! High-level pipeline: discover → route → dedupe → render + fetch → commit → rotate.
//!
//! This module orchestrates one scheduled run. Items are handled one at a
//! time, newest first:
//!   - the first item outside the recency window ends the run;
//!   - the [`Router`] picks exactly one destination repository;
//!   - the duplicate check skips items already published there;
//!   - the post is rendered and the media downloaded;
//!   - both files land in the destination in a single commit via [`commit::publish`];
//!   - after the first publish of the run the source token is checked and rotated if due.
//!
//! # Error Handling
//! - Source error payloads abort the run with [`SyncError::Fetch`] (fatal).
//! - An unreachable source or a failed media download ends the run early with
//!   nothing written; the next scheduled run picks the item up again.
//! - Destination failures, including exhausted concurrent-modification retries,
//!   mark the item as errored and the run moves on.
//! - Rotation failures are recorded in the report and never stop publishing.
//! - Invariant violations are returned immediately.
//!
//! All collaborators are passed in via [`Collaborators`]; nothing here holds
//! global client state.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::commit::{self, CommitPlan, FileEntry, PublishResult};
use crate::config::{DuplicateGuard, SyncConfig};
use crate::contract::{CodeSearch, GitData, MediaItem, MediaSource, SecretStore};
use crate::duplicate::repo_has_post;
use crate::error::SyncError;
use crate::media::{discover, fetch_encoded, is_recent, DiscoveryOutcome};
use crate::normalize::{item_tags, title};
use crate::render::{image_path, post_path, render_post, RenderContext, RenderedPost};
use crate::rotate::{CredentialRotator, RotationOutcome};
use crate::route::Router;

/// Borrowed handles to every external collaborator of a run.
pub struct Collaborators<'a, S: ?Sized, C: ?Sized, G: ?Sized, K: ?Sized> {
    pub source: &'a S,
    pub search: &'a C,
    pub git: &'a G,
    pub secrets: &'a K,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Published { commit_sha: String },
    /// Code search found an existing post.
    Skipped,
    /// The strict guard found the post path at the base commit.
    AlreadyPresent,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub short_code: String,
    pub repo: String,
    pub status: ItemStatus,
}

/// Why the run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEnd {
    /// Every discovered item was handled.
    Completed,
    /// The source had no media at all.
    NoMedia,
    /// Reached an item older than the recency window.
    NothingNew { short_code: String },
    SourceUnreachable { reason: String },
    /// Media download failed; nothing was written for this item.
    FetchFailed { short_code: String, message: String },
}

#[derive(Debug)]
pub struct SynchroniseReport {
    pub items: Vec<ItemReport>,
    pub end: RunEnd,
    /// Present when rotation was attempted during the run.
    pub rotation: Option<Result<RotationOutcome, String>>,
}

impl SynchroniseReport {
    pub fn published(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status, ItemStatus::Published { .. }))
            .count()
    }
}

/// Render the post for `item` destined for `repo`.
pub fn build_post(config: &SyncConfig, router: &Router, item: &MediaItem, tags: &[String], repo: &str) -> RenderedPost {
    let reserved: Vec<String> = router.reserved_tags().map(str::to_string).collect();
    let title = title(
        item.caption.as_deref(),
        &item.short_code,
        &config.source_label,
        config.title_words,
    );
    let content = render_post(&RenderContext {
        title: &title,
        published: item.timestamp,
        short_code: &item.short_code,
        destination: repo,
        tags,
        reserved_tags: &reserved,
        caption: item.caption.as_deref().unwrap_or_default(),
        permalink: &item.permalink,
        source_label: &config.source_label,
        source_tag: &config.source_tag,
        image_dir: &config.image_dir,
    });
    RenderedPost {
        path: post_path(&config.posts_dir, &item.timestamp, &item.short_code, &config.post_ext),
        content,
    }
}

/// Build the two-file commit for an item.
pub fn build_plan(config: &SyncConfig, repo: &str, post: &RenderedPost, short_code: &str, image_base64: String) -> CommitPlan {
    CommitPlan {
        repo: repo.to_string(),
        branch: config.branch.clone(),
        message: config.commit_message.clone(),
        files: vec![
            FileEntry::new(post.path.clone(), STANDARD.encode(post.content.as_bytes())),
            FileEntry::new(image_path(&config.image_dir, short_code), image_base64),
        ],
        guard_path: match config.duplicate_guard {
            DuplicateGuard::Strict => Some(post.path.clone()),
            DuplicateGuard::Search => None,
        },
    }
}

pub async fn synchronise<S, C, G, K>(
    config: &SyncConfig,
    router: &Router,
    clients: &Collaborators<'_, S, C, G, K>,
    rotator: &mut CredentialRotator,
    now: DateTime<Utc>,
) -> Result<SynchroniseReport, SyncError>
where
    S: MediaSource + ?Sized,
    C: CodeSearch + ?Sized,
    G: GitData + ?Sized,
    K: SecretStore + ?Sized,
{
    info!("[SYNC] Starting run");

    let items = match discover(clients.source).await? {
        DiscoveryOutcome::Items(items) => items,
        DiscoveryOutcome::Empty => {
            return Ok(SynchroniseReport {
                items: vec![],
                end: RunEnd::NoMedia,
                rotation: None,
            })
        }
        DiscoveryOutcome::Unreachable(reason) => {
            return Ok(SynchroniseReport {
                items: vec![],
                end: RunEnd::SourceUnreachable { reason },
                rotation: None,
            })
        }
    };

    let mut reports = Vec::new();
    let mut rotation = None;
    let mut end = RunEnd::Completed;

    for item in &items {
        if !is_recent(&item.timestamp, now, config.recency_window()) {
            info!(short_code = %item.short_code, published = %item.timestamp, "[SYNC] Nothing new");
            end = RunEnd::NothingNew {
                short_code: item.short_code.clone(),
            };
            break;
        }

        let tags = item_tags(item, config.tag_source);
        let repo = router.destination(tags.as_slice()).to_string();
        info!(short_code = %item.short_code, repo = %repo, "[SYNC] Processing item");
        let report = |status| ItemReport {
            short_code: item.short_code.clone(),
            repo: repo.clone(),
            status,
        };

        match repo_has_post(clients.search, &repo, &config.posts_dir, &item.short_code).await {
            Ok(true) => {
                info!(short_code = %item.short_code, "[SYNC] Skipped, already published");
                reports.push(report(ItemStatus::Skipped));
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                error!(short_code = %item.short_code, error = %e, "[SYNC][ERROR] Duplicate check failed");
                reports.push(report(ItemStatus::Error {
                    message: e.to_string(),
                }));
                continue;
            }
        }

        let post = build_post(config, router, item, &tags, &repo);

        let image = match fetch_encoded(clients.source, &item.media_url).await {
            Ok(image) => image,
            Err(e) => {
                let message = e.to_string();
                reports.push(report(ItemStatus::Error {
                    message: message.clone(),
                }));
                end = RunEnd::FetchFailed {
                    short_code: item.short_code.clone(),
                    message,
                };
                break;
            }
        };

        let plan = build_plan(config, &repo, &post, &item.short_code, image);
        match commit::publish(clients.git, &plan, config.max_publish_attempts).await {
            Ok(PublishResult::Committed {
                commit_sha,
                attempts,
                ..
            }) => {
                info!(short_code = %item.short_code, commit = %commit_sha, attempts, "[SYNC] Published");
                reports.push(report(ItemStatus::Published { commit_sha }));

                if rotation.is_none() {
                    let secrets_repo = config.secrets_repository.as_deref().unwrap_or(&repo);
                    let outcome = rotator
                        .rotate(clients.source, clients.secrets, secrets_repo, now)
                        .await
                        .map_err(|e| {
                            warn!(error = %e, "[SYNC] Token rotation failed");
                            e.to_string()
                        });
                    rotation = Some(outcome);
                }
            }
            Ok(PublishResult::AlreadyPresent { path }) => {
                info!(short_code = %item.short_code, path = %path, "[SYNC] Skipped, post present at base commit");
                reports.push(report(ItemStatus::AlreadyPresent));
            }
            Err(e @ SyncError::Invariant(_)) => return Err(e),
            Err(e) => {
                error!(short_code = %item.short_code, error = %e, "[SYNC][ERROR] Publish failed");
                reports.push(report(ItemStatus::Error {
                    message: e.to_string(),
                }));
            }
        }
    }

    info!(items = reports.len(), end = ?end, "[SYNC] Run finished");
    Ok(SynchroniseReport {
        items: reports,
        end,
        rotation,
    })
}
