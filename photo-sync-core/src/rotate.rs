//! # rotate: source token renewal and sealed secret write-back
//!
//! The source platform issues tokens that live for a limited time and can be
//! exchanged for a fresh one before they expire. [`CredentialRotator`] owns the
//! current [`TokenState`] and drives:
//!
//! `VALID -> (inside renewal window) -> REFRESHING -> ROTATED -> VALID`
//!
//! - **Guard**: nothing happens, and no call is made, while
//!   `now < expiry - renewal_window`.
//! - **Refresh**: exchange the token. An error aborts rotation; the old token
//!   stays authoritative.
//! - **Seal**: fetch the destination's current public key and seal the new
//!   token and the new expiry with it. Keys are never cached across rotations.
//! - **Store**: write both sealed values. Each write is independent; a failed
//!   write is reported and the other still runs.
//!
//! The in-memory state only advances once both secrets are stored.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{error, info, warn};

use crate::contract::{MediaSource, SecretStore};
use crate::error::{ApiError, RotationError};
use crate::secret::{Secret, SealingKey};

/// Current source token and when it must be renewed by.
#[derive(Debug, Clone)]
pub struct TokenState {
    pub token: Secret,
    pub expiry: DateTime<Utc>,
}

impl TokenState {
    /// Build from the environment's unix-seconds expiry. Missing or garbage
    /// values mean "already expired".
    pub fn from_unix(token: Secret, expiry_unix: Option<&str>) -> Self {
        let expiry = expiry_unix
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        TokenState { token, expiry }
    }

    /// Whether the token is due: `now >= expiry - renewal_window`.
    pub fn needs_renewal(&self, now: DateTime<Utc>, renewal_window: Duration) -> bool {
        match self.expiry.checked_sub_signed(renewal_window) {
            Some(due) => now >= due,
            None => true,
        }
    }
}

/// Result of storing one sealed secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretWrite {
    Stored,
    /// The platform no longer accepts the key id we sealed with.
    StaleKey { key_id: String },
    Rejected { status: Option<u16>, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretWriteReport {
    pub name: String,
    pub result: SecretWrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    StillValid { expiry: DateTime<Utc> },
    Rotated {
        new_expiry: DateTime<Utc>,
        writes: Vec<SecretWriteReport>,
    },
}

impl RotationOutcome {
    pub fn fully_stored(&self) -> bool {
        match self {
            RotationOutcome::StillValid { .. } => true,
            RotationOutcome::Rotated { writes, .. } => {
                writes.iter().all(|w| w.result == SecretWrite::Stored)
            }
        }
    }
}

/// Names of the two secrets in the destination store.
#[derive(Debug, Clone)]
pub struct SecretNames {
    pub token: String,
    pub expiry: String,
}

#[derive(Debug, Clone)]
pub struct CredentialRotator {
    state: TokenState,
    names: SecretNames,
    renewal_window: Duration,
    safety_margin: Duration,
}

impl CredentialRotator {
    pub fn new(state: TokenState, names: SecretNames, renewal_window: Duration, safety_margin: Duration) -> Self {
        CredentialRotator {
            state,
            names,
            renewal_window,
            safety_margin,
        }
    }

    pub fn state(&self) -> &TokenState {
        &self.state
    }

    /// Check the token and rotate it if due, storing the sealed result in the
    /// secret store of `repo`.
    pub async fn rotate<S, K>(
        &mut self,
        source: &S,
        store: &K,
        repo: &str,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome, RotationError>
    where
        S: MediaSource + ?Sized,
        K: SecretStore + ?Sized,
    {
        if !self.state.needs_renewal(now, self.renewal_window) {
            info!(expiry = %self.state.expiry, "[ROTATE] Token still valid");
            return Ok(RotationOutcome::StillValid {
                expiry: self.state.expiry,
            });
        }

        info!(expiry = %self.state.expiry, repo = %repo, "[ROTATE] Token due for renewal, refreshing");
        let refreshed = source.refresh_token(&self.state.token).await.map_err(|e| {
            let message = match e {
                ApiError::Status { message, .. } => message,
                other => other.to_string(),
            };
            error!(message = %message, "[ROTATE][ERROR] Problem refreshing token");
            RotationError::Refresh(message)
        })?;
        if refreshed.access_token.is_empty() {
            return Err(RotationError::Refresh("refresh returned an empty token".into()));
        }

        let new_expiry = Duration::try_seconds(refreshed.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .and_then(|expiry| expiry.checked_sub_signed(self.safety_margin))
            .ok_or_else(|| {
                error!(expires_in = refreshed.expires_in, "[ROTATE][ERROR] Refresh returned an unusable lifetime");
                RotationError::Refresh(format!("invalid expires_in {}", refreshed.expires_in))
            })?;
        let expiry_value = Secret::new(new_expiry.timestamp().to_string());

        let key = store.public_key(repo).await.map_err(|source| {
            error!(repo = %repo, error = ?source, "[ROTATE][ERROR] Could not fetch public key");
            RotationError::PublicKey {
                repo: repo.to_string(),
                source,
            }
        })?;
        let sealing = SealingKey::from_destination(&key)?;

        let sealed = [
            sealing.seal(&self.names.token, &refreshed.access_token)?,
            sealing.seal(&self.names.expiry, &expiry_value)?,
        ];

        let mut writes = Vec::with_capacity(sealed.len());
        for secret in &sealed {
            let result = match store.put_secret(repo, secret).await {
                Ok(()) => {
                    info!(secret = %secret.name, repo = %repo, "[ROTATE] Updated secret");
                    SecretWrite::Stored
                }
                Err(ApiError::Status { status: 422, .. }) | Err(ApiError::Conflict(_)) => {
                    error!(
                        secret = %secret.name,
                        key_id = %secret.key_id,
                        "[ROTATE][ERROR] Secret store rejected the key id; public key is stale"
                    );
                    SecretWrite::StaleKey {
                        key_id: secret.key_id.clone(),
                    }
                }
                Err(e) => {
                    error!(secret = %secret.name, error = ?e, "[ROTATE][ERROR] Problem updating secret");
                    let status = match &e {
                        ApiError::Status { status, .. } => Some(*status),
                        _ => None,
                    };
                    SecretWrite::Rejected {
                        status,
                        message: e.to_string(),
                    }
                }
            };
            writes.push(SecretWriteReport {
                name: secret.name.clone(),
                result,
            });
        }

        let outcome = RotationOutcome::Rotated { new_expiry, writes };
        if outcome.fully_stored() {
            self.state = TokenState {
                token: refreshed.access_token,
                expiry: new_expiry,
            };
            info!(expiry = %new_expiry, "[ROTATE] Token rotated");
        } else {
            warn!("[ROTATE] Not every secret was stored; keeping the current token");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_parsing() {
        let state = TokenState::from_unix(Secret::new("t"), Some("1700000000"));
        assert_eq!(state.expiry.timestamp(), 1_700_000_000);
        assert_eq!(
            TokenState::from_unix(Secret::new("t"), None).expiry,
            DateTime::<Utc>::UNIX_EPOCH
        );
        assert_eq!(
            TokenState::from_unix(Secret::new("t"), Some("soon")).expiry,
            DateTime::<Utc>::UNIX_EPOCH
        );
    }

    #[test]
    fn renewal_guard() {
        let state = TokenState::from_unix(Secret::new("t"), Some("1000"));
        let at = |s| Utc.timestamp_opt(s, 0).unwrap();
        assert!(!state.needs_renewal(at(999), Duration::zero()));
        assert!(state.needs_renewal(at(1000), Duration::zero()));
        assert!(state.needs_renewal(at(1001), Duration::zero()));
        assert!(state.needs_renewal(at(950), Duration::seconds(50)));
        assert!(!state.needs_renewal(at(949), Duration::seconds(50)));
    }

    #[test]
    fn renewal_guard_at_the_edge_of_time() {
        let state = TokenState {
            token: Secret::new("t"),
            expiry: DateTime::<Utc>::MIN_UTC,
        };
        assert!(state.needs_renewal(Utc.timestamp_opt(0, 0).unwrap(), Duration::days(1)));
    }
}
