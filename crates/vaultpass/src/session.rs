//! Authenticated session state
//!
//! A [`Session`] is a pure value: identifiers plus cryptographic material.
//! It serializes to an opaque string and reconstructs from it with no
//! network access and no password - the vault key derived at login is
//! what gets persisted, never the password itself.

use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};

use crate::account::SharedFolder;
use crate::crypto::SymmetricKey;
use crate::error::{Result, VaultError};

/// Client-observable lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    LoggedOut,
    Expired,
}

/// Authenticated identity plus cryptographic material.
pub struct Session {
    /// Server session identifier (carried as the session cookie)
    pub(crate) id: String,
    /// CSRF-style token sent with every mutation
    pub(crate) token: String,
    pub(crate) username: String,
    pub(crate) iterations: u32,
    /// The user's symmetric vault key
    pub(crate) vault_key: SymmetricKey,
    /// The user's private key, used to unwrap shared-folder keys
    pub(crate) private_key: Option<RsaPrivateKey>,
    /// Resolved shared-folder keys. Writes are serialized through this
    /// lock; the blob decoder is the only writer.
    folders: Mutex<Vec<SharedFolder>>,
}

/// Serde shape of the opaque session form.
#[derive(Serialize, Deserialize)]
struct SessionData {
    id: String,
    token: String,
    username: String,
    iterations: u32,
    vault_key: String,
    private_key: Option<String>,
    folders: Vec<SharedFolder>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        token: String,
        username: String,
        iterations: u32,
        vault_key: SymmetricKey,
        private_key: Option<RsaPrivateKey>,
    ) -> Self {
        Self {
            id,
            token,
            username,
            iterations,
            vault_key,
            private_key,
            folders: Mutex::new(Vec::new()),
        }
    }

    /// Serialize to an opaque form for later [`Session::from_opaque`].
    ///
    /// Round-trips all state needed for blob decodes and mutations,
    /// including already-resolved folder keys. Treat the result as
    /// secret - it contains live key material.
    pub fn to_opaque(&self) -> Result<String> {
        let private_key = match &self.private_key {
            Some(key) => Some(hex::encode(
                key.to_pkcs8_der()
                    .map_err(|e| VaultError::Crypto(format!("private key encode: {e}")))?
                    .as_bytes(),
            )),
            None => None,
        };
        let data = SessionData {
            id: self.id.clone(),
            token: self.token.clone(),
            username: self.username.clone(),
            iterations: self.iterations,
            vault_key: hex::encode(self.vault_key.as_bytes()),
            private_key,
            folders: self.folders(),
        };
        let json = serde_json::to_vec(&data)
            .map_err(|e| VaultError::Crypto(format!("session encode: {e}")))?;
        Ok(STANDARD.encode(json))
    }

    /// Reconstruct a session from its opaque form. Works fully offline.
    pub fn from_opaque(opaque: &str) -> Result<Self> {
        let json = STANDARD
            .decode(opaque)
            .map_err(|e| VaultError::Crypto(format!("session base64: {e}")))?;
        let data: SessionData = serde_json::from_slice(&json)
            .map_err(|e| VaultError::Crypto(format!("session decode: {e}")))?;

        let vault_key_bytes = hex::decode(&data.vault_key)
            .map_err(|e| VaultError::Crypto(format!("vault key hex: {e}")))?;
        let vault_key = SymmetricKey::from_slice(&vault_key_bytes)
            .ok_or_else(|| VaultError::Crypto("vault key must be 32 bytes".to_string()))?;

        let private_key = match data.private_key {
            Some(hex_der) => {
                let der = hex::decode(&hex_der)
                    .map_err(|e| VaultError::Crypto(format!("private key hex: {e}")))?;
                Some(
                    RsaPrivateKey::from_pkcs8_der(&der)
                        .map_err(|e| VaultError::Crypto(format!("private key parse: {e}")))?,
                )
            }
            None => None,
        };

        Ok(Self {
            id: data.id,
            token: data.token,
            username: data.username,
            iterations: data.iterations,
            vault_key,
            private_key,
            folders: Mutex::new(data.folders),
        })
    }

    /// The resolved shared folders known to this session.
    pub fn folders(&self) -> Vec<SharedFolder> {
        self.folders.lock().expect("folder cache lock").clone()
    }

    pub(crate) fn folder_by_id(&self, id: &str) -> Option<SharedFolder> {
        self.folders
            .lock()
            .expect("folder cache lock")
            .iter()
            .find(|f| f.id == id)
            .cloned()
    }

    pub(crate) fn folder_by_name(&self, name: &str) -> Option<SharedFolder> {
        self.folders
            .lock()
            .expect("folder cache lock")
            .iter()
            .find(|f| f.name == name)
            .cloned()
    }

    /// Cache a newly resolved folder key so later decodes reuse it.
    pub(crate) fn cache_folder(&self, folder: SharedFolder) {
        let mut folders = self.folders.lock().expect("folder cache lock");
        if folders.iter().any(|f| f.id == folder.id) {
            return;
        }
        folders.push(folder);
    }

    /// The session cookie sent with every authenticated request.
    pub(crate) fn cookie(&self) -> (String, String) {
        let escaped: String = url::form_urlencoded::byte_serialize(self.id.as_bytes()).collect();
        ("PHPSESSID".to_string(), escaped)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &"[REDACTED]")
            .field("username", &self.username)
            .field("iterations", &self.iterations)
            .field("vault_key", &"[REDACTED]")
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}
