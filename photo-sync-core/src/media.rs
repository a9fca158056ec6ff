//! Media discovery, the recency gate and media download.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::{error, info, warn};

use crate::contract::{MediaItem, MediaSource};
use crate::error::{ApiError, SyncError};

/// What discovery produced. Callers must handle all three cases.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryOutcome {
    Items(Vec<MediaItem>),
    Empty,
    /// The source could not be reached. Nothing was touched; try again next run.
    Unreachable(String),
}

/// List media on the source.
///
/// An error payload from the source (bad token, quota, ...) is not retryable
/// by waiting and surfaces as [`SyncError::Fetch`].
pub async fn discover<S>(source: &S) -> Result<DiscoveryOutcome, SyncError>
where
    S: MediaSource + ?Sized,
{
    match source.list_media().await {
        Ok(items) if items.is_empty() => {
            info!("[SYNC] Source returned no media");
            Ok(DiscoveryOutcome::Empty)
        }
        Ok(items) => {
            info!(count = items.len(), "[SYNC] Discovered media");
            Ok(DiscoveryOutcome::Items(items))
        }
        Err(ApiError::Unreachable(reason)) => {
            warn!(reason = %reason, "[SYNC] Source not reachable right now");
            Ok(DiscoveryOutcome::Unreachable(reason))
        }
        Err(e) => {
            error!(error = ?e, "[SYNC][ERROR] Source returned an error");
            Err(SyncError::Fetch(e))
        }
    }
}

/// Whether an item published at `published` is inside the recency window.
///
/// An item exactly `window` old is still recent; anything older is not.
pub fn is_recent(published: &DateTime<FixedOffset>, now: DateTime<Utc>, window: Duration) -> bool {
    published.with_timezone(&Utc) >= now - window
}

/// Download the media behind `url` and base64-encode it for blob creation.
pub async fn fetch_encoded<S>(source: &S, url: &str) -> Result<String, SyncError>
where
    S: MediaSource + ?Sized,
{
    match source.fetch_media(url).await {
        Ok(bytes) => {
            info!(size = bytes.len(), "[SYNC] Downloaded media");
            Ok(STANDARD.encode(bytes))
        }
        Err(e) => {
            error!(error = ?e, url = %url, "[SYNC][ERROR] Media download failed");
            Err(SyncError::Fetch(e))
        }
    }
}
