//! Credential vault: AES-256-GCM sealing with a process-wide derived key.
//!
//! Sealed payloads use the textual envelope `<base64 nonce>:<base64 ciphertext>`.
//! The key is derived once from the configured base secret and a fixed salt;
//! every `seal` call draws a fresh 96-bit nonce from the OS RNG.

use std::fmt;

use aes_gcm::{
    aead::{rand_core::RngCore as _, Aead, KeyInit, OsRng, Payload},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const VAULT_KEY_SALT: &[u8] = b"spirit-credential-vault-salt-v1";
const VAULT_AES_GCM_AAD: &[u8] = b"spirit-credential-vault-v1";
const VAULT_AES_GCM_NONCE_BYTES: usize = 12;
const VAULT_ENVELOPE_SEPARATOR: char = ':';
const VAULT_MIN_BASE_SECRET_CHARS: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Failures raised while deriving key material or sealing/opening payloads.
pub enum CryptoError {
    #[error("vault base secret must be at least 8 characters")]
    WeakBaseSecret,
    #[error("secret to seal must not be empty")]
    EmptyPlaintext,
    #[error("sealed payload is missing the nonce/ciphertext separator")]
    MissingSeparator,
    #[error("sealed payload encoding is invalid")]
    InvalidEncoding,
    #[error("sealed payload nonce has invalid length {0}")]
    InvalidNonce(usize),
    #[error("sealed payload is truncated")]
    Truncated,
    #[error("sealed payload integrity check failed")]
    IntegrityCheckFailed,
    #[error("sealed payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("credential payload encryption failed")]
    EncryptionFailed,
}

/// Ciphertext envelope for one tenant secret. Safe to clone, log-safe to hold.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret(String);

impl SealedSecret {
    pub fn from_envelope(envelope: impl Into<String>) -> Self {
        Self(envelope.into())
    }

    pub fn as_envelope(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SealedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SealedSecret([SEALED])")
    }
}

/// Plaintext secret held only for the duration of one use site.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptedSecret(String);

impl DecryptedSecret {
    /// Returns plaintext secret bytes for explicit use sites.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DecryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for DecryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Stateless sealer holding only the derived key. Immutable after construction.
pub struct CredentialVault {
    key_material: [u8; 32],
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault")
            .field("key_material", &"[REDACTED]")
            .finish()
    }
}

impl CredentialVault {
    /// Derives the vault key from `base_secret` and the fixed salt.
    pub fn new(base_secret: &str) -> Result<Self, CryptoError> {
        let base_secret = base_secret.trim();
        if base_secret.chars().count() < VAULT_MIN_BASE_SECRET_CHARS {
            return Err(CryptoError::WeakBaseSecret);
        }
        Ok(Self {
            key_material: derive_vault_key_material(base_secret),
        })
    }

    /// Seals a tenant secret. Blank secrets are rejected with `EmptyPlaintext`; activation
    /// never forwards one because a blank credential fails validation first.
    pub fn seal(&self, plaintext: &str) -> Result<SealedSecret, CryptoError> {
        if plaintext.trim().is_empty() {
            return Err(CryptoError::EmptyPlaintext);
        }
        let cipher = self.cipher()?;
        let mut nonce = [0u8; VAULT_AES_GCM_NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(
                (&nonce).into(),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: VAULT_AES_GCM_AAD,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(SealedSecret(format!(
            "{}{VAULT_ENVELOPE_SEPARATOR}{}",
            BASE64_STANDARD.encode(nonce),
            BASE64_STANDARD.encode(ciphertext)
        )))
    }

    pub fn open(&self, sealed: &SealedSecret) -> Result<DecryptedSecret, CryptoError> {
        let (encoded_nonce, encoded_ciphertext) = sealed
            .as_envelope()
            .split_once(VAULT_ENVELOPE_SEPARATOR)
            .ok_or(CryptoError::MissingSeparator)?;
        let nonce = BASE64_STANDARD
            .decode(encoded_nonce.trim())
            .map_err(|_| CryptoError::InvalidEncoding)?;
        if nonce.len() != VAULT_AES_GCM_NONCE_BYTES {
            return Err(CryptoError::InvalidNonce(nonce.len()));
        }
        let ciphertext = BASE64_STANDARD
            .decode(encoded_ciphertext.trim())
            .map_err(|_| CryptoError::InvalidEncoding)?;
        if ciphertext.is_empty() {
            return Err(CryptoError::Truncated);
        }

        let cipher = self.cipher()?;
        let plaintext = cipher
            .decrypt(
                nonce.as_slice().into(),
                Payload {
                    msg: &ciphertext,
                    aad: VAULT_AES_GCM_AAD,
                },
            )
            .map_err(|_| CryptoError::IntegrityCheckFailed)?;
        let secret = String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)?;
        Ok(DecryptedSecret(secret))
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&self.key_material).map_err(|_| CryptoError::EncryptionFailed)
    }
}

fn derive_vault_key_material(base_secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(VAULT_KEY_SALT);
    hasher.update(base_secret.as_bytes());
    let digest = hasher.finalize();
    let mut material = [0u8; 32];
    material.copy_from_slice(&digest);
    material
}
