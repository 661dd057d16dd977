//! Local AES-256-GCM kms backed by a single master key

use super::{DERIVED_KEY_SIZE, Kms, KmsError};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of AES-256 key in bytes
const AES_KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes
const NONCE_SIZE: usize = 12;

/// Domain separation tag for derived keys
const DERIVE_CONTEXT: &[u8] = b"warden/kms/derive/v1";

/// A master encryption key that is securely zeroed on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; AES_KEY_SIZE],
}

impl MasterKey {
    /// Generate a new random master key
    pub fn generate() -> Self {
        let mut bytes = [0u8; AES_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a master key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KmsError> {
        if bytes.len() != AES_KEY_SIZE {
            return Err(KmsError::InvalidKeyLength {
                expected: AES_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key_bytes = [0u8; AES_KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Create a master key from base64-encoded string
    pub fn from_base64(b64: &str) -> Result<Self, KmsError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(b64.trim())
                .map_err(|e| KmsError::InvalidFormat(e.to_string()))?,
        );
        Self::from_bytes(&bytes)
    }

    /// Export key as base64 string
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// Short fingerprint identifying this key without revealing it
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.bytes);
        hex::encode(&digest[..8])
    }

    fn as_bytes(&self) -> &[u8; AES_KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Kms holding one master key in process memory
///
/// Ciphertexts are `nonce || aes-gcm(plaintext)` with the scope id as
/// associated data, so a value encrypted for one scope does not decrypt
/// under another.
#[derive(Debug, Clone)]
pub struct LocalKms {
    key_id: String,
    master_key: MasterKey,
}

impl LocalKms {
    /// Create a kms around an existing master key
    pub fn new(master_key: MasterKey) -> Self {
        let key_id = format!("kms_{}", master_key.fingerprint());
        Self { key_id, master_key }
    }

    /// Create a kms with a fresh random master key (useful for testing)
    pub fn generate() -> Self {
        Self::new(MasterKey::generate())
    }

    /// Create a kms from a base64-encoded master key
    pub fn from_base64(b64: &str) -> Result<Self, KmsError> {
        Ok(Self::new(MasterKey::from_base64(b64)?))
    }

    fn cipher(&self) -> Result<Aes256Gcm, KmsError> {
        Aes256Gcm::new_from_slice(self.master_key.as_bytes())
            .map_err(|e| KmsError::EncryptionFailed(e.to_string()))
    }
}

#[async_trait]
impl Kms for LocalKms {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn encrypt(&self, scope_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        if scope_id.is_empty() {
            return Err(KmsError::MissingScope);
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: scope_id.as_bytes(),
                },
            )
            .map_err(|e| KmsError::EncryptionFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    async fn decrypt(&self, scope_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>, KmsError> {
        if scope_id.is_empty() {
            return Err(KmsError::MissingScope);
        }
        if ciphertext.len() < NONCE_SIZE {
            return Err(KmsError::DecryptionFailed(format!(
                "ciphertext shorter than nonce: {} bytes",
                ciphertext.len()
            )));
        }

        let (nonce_bytes, body) = ciphertext.split_at(NONCE_SIZE);
        let cipher = self
            .cipher()
            .map_err(|e| KmsError::DecryptionFailed(e.to_string()))?;

        cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: body,
                    aad: scope_id.as_bytes(),
                },
            )
            .map_err(|_| {
                KmsError::DecryptionFailed(
                    "Decryption failed (invalid key, wrong scope, or corrupted data)".to_string(),
                )
            })
    }

    async fn derive_key(
        &self,
        scope_id: &str,
        purpose: &[u8],
    ) -> Result<Zeroizing<[u8; DERIVED_KEY_SIZE]>, KmsError> {
        if scope_id.is_empty() {
            return Err(KmsError::MissingScope);
        }

        // Length-prefix each field so ("ab", "c") and ("a", "bc") differ.
        let mut hasher = Sha256::new();
        hasher.update(DERIVE_CONTEXT);
        hasher.update(self.master_key.as_bytes());
        hasher.update((scope_id.len() as u64).to_be_bytes());
        hasher.update(scope_id.as_bytes());
        hasher.update((purpose.len() as u64).to_be_bytes());
        hasher.update(purpose);

        let mut out = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
        out.copy_from_slice(&hasher.finalize());
        Ok(out)
    }
}
