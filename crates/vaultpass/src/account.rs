//! Account and shared-folder value types

use serde::{Deserialize, Serialize};

use crate::crypto::SymmetricKey;

/// A single password-manager record.
///
/// All fields are plaintext in memory; the server only ever sees them
/// encrypted. `id` is assigned by the server and is empty until the first
/// successful [`Client::add`](crate::Client::add).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Server-assigned identifier (empty before the first add)
    pub id: String,
    /// Display name
    pub name: String,
    pub username: String,
    pub password: String,
    pub url: String,
    /// Folder/group path within the vault
    pub group: String,
    /// Name of the shared folder owning this record; empty for the
    /// private vault
    pub share: String,
    pub notes: String,
    /// Server-side modification time, decimal seconds since epoch, UTC
    pub last_modified_gmt: String,
    /// Last access time; not timezone-normalized (may differ from UTC by
    /// up to the local offset)
    pub last_touch: String,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("url", &self.url)
            .field("group", &self.group)
            .field("share", &self.share)
            .field("notes", &"[REDACTED]")
            .field("last_modified_gmt", &self.last_modified_gmt)
            .field("last_touch", &self.last_touch)
            .finish()
    }
}

/// A shared vault partition discovered while decoding the blob.
///
/// The symmetric key is obtained by unwrapping the server-supplied wrapped
/// key with the user's private key; once resolved it is cached on the
/// [`Session`](crate::Session) so later decodes reuse it.
#[derive(Clone, Serialize, Deserialize)]
pub struct SharedFolder {
    pub id: String,
    pub name: String,
    /// Whether this session may only read the folder
    pub read_only: bool,
    /// The folder's symmetric key
    #[serde(with = "crate::crypto::serde_key")]
    pub(crate) key: SymmetricKey,
}

impl std::fmt::Debug for SharedFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFolder")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("read_only", &self.read_only)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
