//! Key material handling with automatic zeroization

use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

use super::cipher;

/// A 256-bit symmetric key (vault key or shared-folder key) -
/// automatically zeroed when dropped
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; 32],
}

impl SymmetricKey {
    /// Create a new key from raw bytes
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Get the key bytes (use carefully - avoid copying)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Create from a slice (must be exactly 32 bytes)
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 32 {
            return None;
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(slice);
        Some(Self { key })
    }
}

impl Clone for SymmetricKey {
    fn clone(&self) -> Self {
        Self { key: self.key }
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Hex serde adapter for [`SymmetricKey`] fields inside the opaque
/// session form.
pub mod serde_key {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::SymmetricKey;

    pub fn serialize<S: Serializer>(key: &SymmetricKey, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(key.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<SymmetricKey, D::Error> {
        let s = String::deserialize(de)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        SymmetricKey::from_slice(&bytes)
            .ok_or_else(|| serde::de::Error::custom("key must be 32 bytes"))
    }
}

/// Decrypt the server-supplied encrypted private key blob and parse the
/// recovered bytes as an RSA private key.
///
/// The blob is hex-encoded AES-256-CBC ciphertext keyed by the vault key
/// with the first 16 key bytes as IV; the plaintext is ASCII hex of a
/// PKCS#8 DER document.
pub fn decrypt_private_key(encrypted_hex: &str, vault_key: &SymmetricKey) -> Result<RsaPrivateKey> {
    let ciphertext = hex::decode(encrypted_hex)
        .map_err(|e| VaultError::Crypto(format!("private key hex: {e}")))?;

    let iv = &vault_key.as_bytes()[..16];
    let plaintext = cipher::cbc_decrypt(vault_key, iv, &ciphertext)?;

    let der = hex::decode(plaintext.trim_ascii())
        .map_err(|e| VaultError::Crypto(format!("private key inner hex: {e}")))?;

    RsaPrivateKey::from_pkcs8_der(&der)
        .map_err(|e| VaultError::Crypto(format!("private key parse: {e}")))
}

/// Unwrap a shared folder's symmetric key.
///
/// The wrapped key is hex-encoded RSA-OAEP(SHA-1) ciphertext; the
/// recovered plaintext is the hex encoding of the 32-byte folder key.
pub fn unwrap_folder_key(wrapped_hex: &str, private_key: &RsaPrivateKey) -> Result<SymmetricKey> {
    let wrapped = hex::decode(wrapped_hex)
        .map_err(|e| VaultError::Crypto(format!("folder key hex: {e}")))?;

    let padding = Oaep::new::<sha1::Sha1>();
    let plaintext = private_key
        .decrypt(padding, &wrapped)
        .map_err(|e| VaultError::Crypto(format!("folder key unwrap: {e}")))?;

    let key_bytes = hex::decode(&plaintext)
        .map_err(|e| VaultError::Crypto(format!("folder key inner hex: {e}")))?;

    SymmetricKey::from_slice(&key_bytes)
        .ok_or_else(|| VaultError::Crypto("folder key must be 32 bytes".to_string()))
}
