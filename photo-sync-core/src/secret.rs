//! Secret values and anonymous sealed-box encryption.
//!
//! A [`Secret`] is a plaintext credential held in process memory only. It never
//! prints its value and its buffer is wiped on drop. The only form of a secret
//! that may leave the process is an [`EncryptedSecret`], produced by sealing
//! with the destination platform's public key.
//!
//! Sealing is libsodium's `crypto_box_seal`: an ephemeral X25519 keypair is
//! generated per message, so the recipient learns nothing about the sender and
//! only the holder of the matching private key can open the box.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use crypto_box::aead::OsRng;
use zeroize::Zeroizing;

use crate::contract::DestinationKey;
use crate::error::RotationError;

/// A plaintext credential. Redacted in `Debug` and `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(Zeroizing::new(value.into()))
    }

    /// Borrow the plaintext. Callers must not log the result.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// A secret sealed for a specific destination key, ready for the secret store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub name: String,
    /// Base64 of the sealed box.
    pub encrypted_value: String,
    /// Identifier of the public key used to seal `encrypted_value`.
    pub key_id: String,
}

/// A decoded destination public key, bound to the key id it was fetched with.
pub struct SealingKey {
    key: crypto_box::PublicKey,
    key_id: String,
}

impl SealingKey {
    /// Decode the base64 public key handed out by the destination platform.
    pub fn from_destination(key: &DestinationKey) -> Result<Self, RotationError> {
        let invalid = || RotationError::InvalidKey {
            key_id: key.key_id.clone(),
        };
        let raw = STANDARD.decode(key.key.trim()).map_err(|_| invalid())?;
        let bytes: [u8; crypto_box::KEY_SIZE] = raw.as_slice().try_into().map_err(|_| invalid())?;
        Ok(SealingKey {
            key: crypto_box::PublicKey::from(bytes),
            key_id: key.key_id.clone(),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Seal `value` under this key and label it `name`.
    pub fn seal(&self, name: &str, value: &Secret) -> Result<EncryptedSecret, RotationError> {
        let sealed = self
            .key
            .seal(&mut OsRng, value.expose().as_bytes())
            .map_err(|_| RotationError::Encrypt {
                name: name.to_string(),
            })?;
        Ok(EncryptedSecret {
            name: name.to_string(),
            encrypted_value: STANDARD.encode(sealed),
            key_id: self.key_id.clone(),
        })
    }
}
