//! # contract: collaborator seams for the publish pipeline
//!
//! The pipeline talks to two external platforms:
//!
//! - a **source** photo-sharing platform ([`MediaSource`]): media discovery, raw
//!   media download and access-token refresh;
//! - a **destination** source-control platform, split by capability:
//!   [`CodeSearch`] for the duplicate check, [`GitData`] for the low-level
//!   object primitives the atomic commit writer sequences, and
//!   [`SecretStore`] for the rotated credentials.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`, so tests can script exact call
//!   sequences and prove that no unexpected call was made.
//! - Mocks are exported under the `test-export-mocks` feature (on by default)
//!   for integration tests.
//!
//! All methods are async and return [`ApiError`] on failure. Implementors map
//! transport problems to [`ApiError::Unreachable`], non-success statuses to
//! [`ApiError::Status`] and rejected fast-forwards to [`ApiError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

#[allow(unused_imports)]
use mockall::{automock, predicate::*};

use crate::error::ApiError;
use crate::secret::{EncryptedSecret, Secret};

/// One media item discovered on the source platform.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    /// Stable identifier, derived from the permalink's last path segment.
    pub short_code: String,
    pub caption: Option<String>,
    pub media_url: String,
    pub timestamp: DateTime<FixedOffset>,
    pub permalink: String,
    /// Tags supplied explicitly by the source, if any.
    pub tags: Vec<String>,
}

/// Result of exchanging an expiring token for a renewed one.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: Secret,
    /// Remaining lifetime of the new token, in seconds.
    pub expires_in: i64,
}

/// One path of a new tree, pointing at an already created blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    pub sha: String,
}

/// The destination's public encryption key for its secret store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationKey {
    /// Base64 encoded 32-byte X25519 public key.
    pub key: String,
    pub key_id: String,
}

/// Source platform: media discovery, download and token refresh.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// List the most recent media, newest first.
    async fn list_media(&self) -> Result<Vec<MediaItem>, ApiError>;

    /// Download the raw bytes behind a media URL.
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, ApiError>;

    /// Exchange `token` for a renewed token.
    async fn refresh_token(&self, token: &Secret) -> Result<RefreshedToken, ApiError>;
}

/// Destination platform: code search.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CodeSearch: Send + Sync {
    /// Number of results for a code search query.
    async fn search_code_count(&self, query: &str) -> Result<u64, ApiError>;
}

/// Destination platform: git data primitives.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GitData: Send + Sync {
    /// Commit sha the branch currently points at.
    async fn get_branch_head(&self, repo: &str, branch: &str) -> Result<String, ApiError>;

    /// Root tree sha of a commit.
    async fn get_commit_tree(&self, repo: &str, commit_sha: &str) -> Result<String, ApiError>;

    /// Whether `path` exists in the tree of `commit_sha`.
    async fn path_exists(&self, repo: &str, commit_sha: &str, path: &str)
        -> Result<bool, ApiError>;

    /// Create a blob from base64 content and return its sha.
    async fn create_blob(&self, repo: &str, content_base64: &str) -> Result<String, ApiError>;

    /// Create a tree layered over `base_tree` and return its sha.
    async fn create_tree(
        &self,
        repo: &str,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String, ApiError>;

    /// Create a commit with a single parent and return its sha.
    async fn create_commit(
        &self,
        repo: &str,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String, ApiError>;

    /// Move the branch to `commit_sha`. Must not force: a non fast-forward
    /// update is rejected with [`ApiError::Conflict`].
    async fn update_branch(&self, repo: &str, branch: &str, commit_sha: &str)
        -> Result<(), ApiError>;
}

/// Destination platform: encrypted secret store.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Current public key used to seal secrets for `repo`.
    async fn public_key(&self, repo: &str) -> Result<DestinationKey, ApiError>;

    /// Create or overwrite one secret. Succeeds only on 201/204.
    async fn put_secret(&self, repo: &str, secret: &EncryptedSecret) -> Result<(), ApiError>;
}
