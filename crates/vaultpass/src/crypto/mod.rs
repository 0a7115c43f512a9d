//! Cryptographic engine for the vault protocol
//!
//! This module provides:
//! - password-based vault-key derivation (PBKDF2-HMAC-SHA256, with a
//!   single-round legacy path for iteration count 1)
//! - AES-256-CBC field encryption in the protocol's two self-describing
//!   encodings
//! - RSA unwrap of shared-folder keys and decryption of the user's
//!   private key

mod cipher;
mod kdf;
mod keys;

pub use cipher::{decrypt_field, decrypt_field_b64, encrypt_field, encrypt_field_b64};
pub use kdf::{derive_login_hash, derive_vault_key};
pub use keys::{decrypt_private_key, serde_key, unwrap_folder_key, SymmetricKey};
