//! Key management seam
//!
//! The session core never holds long-lived key material itself. It asks a
//! [`Kms`] to encrypt values at rest (the trust-on-first-use token) and to
//! derive per-session key material (the session signing key).
//!
//! # Architecture
//!
//! - `Kms`: the trait the repository consumes, scoped by scope id
//! - `LocalKms`: AES-256-GCM under a single master key, for tests and the CLI
//! - `MasterKey`: 32-byte root key, zeroized on drop

mod local;

pub use local::{LocalKms, MasterKey};

use async_trait::async_trait;
use thiserror::Error;
use zeroize::Zeroizing;

/// Size of derived key material in bytes
pub const DERIVED_KEY_SIZE: usize = 32;

/// Errors that can occur during kms operations
#[derive(Debug, Error)]
pub enum KmsError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid key format: {0}")]
    InvalidFormat(String),

    #[error("Missing scope id")]
    MissingScope,

    #[error("Derived key does not match the stored public key for {0}")]
    KeyMismatch(String),
}

/// Encryption and key derivation provider, scoped by scope id
#[async_trait]
pub trait Kms: Send + Sync {
    /// Identifier of the key version used for new encryptions
    fn key_id(&self) -> &str;

    /// Encrypt `plaintext` bound to `scope_id`
    async fn encrypt(&self, scope_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KmsError>;

    /// Decrypt a value produced by [`Kms::encrypt`] under the same scope
    async fn decrypt(&self, scope_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>, KmsError>;

    /// Deterministically derive key material for `purpose` within `scope_id`
    async fn derive_key(
        &self,
        scope_id: &str,
        purpose: &[u8],
    ) -> Result<Zeroizing<[u8; DERIVED_KEY_SIZE]>, KmsError>;
}
