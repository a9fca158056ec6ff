//! Error types for photo-sync-core.
//!
//! [`ApiError`] describes a single failed collaborator call (source platform or
//! destination platform). [`SyncError`] is the run-level taxonomy the CLI maps to
//! exit behaviour. [`RotationError`] covers the credential rotation protocol and
//! never aborts the publish loop.

use thiserror::Error;

/// A failed call against one of the external platforms.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The endpoint could not be reached at all (DNS, TLS, connect, timeout).
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// The endpoint answered with a non-success status.
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// The platform refused the write because the target moved underneath us
    /// (e.g. a non fast-forward ref update).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The response body did not have the expected shape.
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether redriving the same call later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Unreachable(_) | ApiError::Conflict(_))
    }
}

/// Run-level errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or malformed credentials/configuration. Raised before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// The source platform failed (error payload, unreachable media, non-2xx image).
    #[error("fetch failure: {0}")]
    Fetch(#[source] ApiError),

    /// The destination branch moved while a commit was being assembled.
    #[error("branch {branch} of {repo} moved during publish")]
    ConcurrentModification { repo: String, branch: String },

    /// Any other destination platform failure.
    #[error("destination error for {repo}: {source}")]
    Destination {
        repo: String,
        #[source]
        source: ApiError,
    },

    /// Credential rotation failed as a whole.
    #[error("rotation error: {0}")]
    Rotation(#[from] RotationError),

    /// A programming error: an internal precondition did not hold.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl SyncError {
    /// Whether the CLI should exit with a non-zero code for this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_) | SyncError::Fetch(_) | SyncError::Invariant(_)
        )
    }
}

/// Failures of the credential rotation protocol as a whole.
///
/// Per-secret write failures are not errors at this level; they are reported
/// inside [`crate::rotate::RotationOutcome::Rotated`].
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("problem refreshing token: {0}")]
    Refresh(String),

    #[error("could not fetch public key for {repo}: {source}")]
    PublicKey {
        repo: String,
        #[source]
        source: ApiError,
    },

    #[error("public key {key_id} is not a valid 32-byte sealing key")]
    InvalidKey { key_id: String },

    #[error("sealing {name} failed")]
    Encrypt { name: String },
}

pub(crate) fn destination_err(repo: &str, source: ApiError) -> SyncError {
    SyncError::Destination {
        repo: repo.to_string(),
        source,
    }
}
