//! In-memory credential sealing for tenant secrets.
//!
//! Tenant AI-service credentials are sealed at activation time and only opened
//! transiently when a reply is generated. See [`CredentialVault`].

mod credential_vault;

pub use credential_vault::{CredentialVault, CryptoError, DecryptedSecret, SealedSecret};
