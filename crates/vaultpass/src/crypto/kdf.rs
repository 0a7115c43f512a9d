//! Password-based vault-key derivation
//!
//! The iteration count is negotiated with the server per user. Count 1 is
//! a legacy fast path (single hash round); anything higher is standard
//! PBKDF2-HMAC-SHA256 salted with the username.

use sha2::{Digest, Sha256};

use crate::error::{Result, VaultError};

use super::SymmetricKey;

/// Derive the 256-bit vault key from the user's credentials.
///
/// Deterministic: the same inputs always yield the same key.
pub fn derive_vault_key(username: &str, password: &str, iterations: u32) -> Result<SymmetricKey> {
    if iterations == 0 {
        return Err(VaultError::Crypto(
            "iteration count must be at least 1".to_string(),
        ));
    }

    let mut key = [0u8; 32];
    if iterations == 1 {
        let mut hasher = Sha256::new();
        hasher.update(username.as_bytes());
        hasher.update(password.as_bytes());
        key.copy_from_slice(&hasher.finalize());
    } else {
        pbkdf2::pbkdf2_hmac::<Sha256>(
            password.as_bytes(),
            username.as_bytes(),
            iterations,
            &mut key,
        );
    }
    Ok(SymmetricKey::new(key))
}

/// Derive the second-stage login hash sent to the server, proving
/// password knowledge without transmitting the password itself.
///
/// Returned as lowercase hex, which is how the login form carries it.
pub fn derive_login_hash(vault_key: &SymmetricKey, password: &str, iterations: u32) -> String {
    if iterations == 1 {
        let mut hasher = Sha256::new();
        hasher.update(hex::encode(vault_key.as_bytes()).as_bytes());
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    } else {
        let mut hash = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(vault_key.as_bytes(), password.as_bytes(), 1, &mut hash);
        hex::encode(hash)
    }
}
