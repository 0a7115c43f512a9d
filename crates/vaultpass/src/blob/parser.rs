//! Two-pass blob decoding into accounts and shared folders

use tracing::debug;

use crate::account::{Account, SharedFolder};
use crate::crypto::{decrypt_field, unwrap_folder_key};
use crate::error::{Result, VaultError};
use crate::session::Session;

use super::{read_items, ChunkReader, TAG_ACCOUNT, TAG_SHARE};

// Positional item layout of an ACCT payload. Only the named positions are
// surfaced; the rest are carried by the format but not by this client.
const ACCT_ID: usize = 0;
const ACCT_NAME: usize = 1;
const ACCT_GROUP: usize = 2;
const ACCT_URL: usize = 3;
const ACCT_NOTES: usize = 4;
const ACCT_USERNAME: usize = 7;
const ACCT_PASSWORD: usize = 8;
const ACCT_LAST_TOUCH: usize = 12;
const ACCT_LAST_MODIFIED_GMT: usize = 31;
const ACCT_MIN_ITEMS: usize = 32;

// Positional item layout of a SHAR payload.
const SHARE_ID: usize = 0;
const SHARE_WRAPPED_KEY: usize = 1;
const SHARE_NAME: usize = 2;
const SHARE_READ_ONLY: usize = 5;
const SHARE_MIN_ITEMS: usize = 6;

/// Decode a raw blob into the account list, in encounter order.
///
/// Folder-definition chunks are fully processed in a first pass so every
/// folder key is resolved (or cached from an earlier decode) before any
/// dependent account chunk is decrypted. Any crypto or format failure
/// aborts the whole decode; a partially decrypted vault is never
/// returned.
pub(crate) fn parse_accounts(blob: &[u8], session: &Session) -> Result<Vec<Account>> {
    // Pass 1: resolve every shared folder and its key.
    let mut folders: Vec<SharedFolder> = Vec::new();
    let mut reader = ChunkReader::new(blob);
    while let Some(chunk) = reader.next_chunk()? {
        if chunk.tag == TAG_SHARE {
            folders.push(parse_share(chunk.payload, session)?);
        }
    }

    // Pass 2: decode accounts, threading the current folder context.
    // An account chunk inherits the most recently seen folder definition,
    // or the private vault if none has been seen yet.
    let mut accounts = Vec::new();
    let mut current_folder: Option<&SharedFolder> = None;
    let mut next_folder = 0;
    let mut reader = ChunkReader::new(blob);
    while let Some(chunk) = reader.next_chunk()? {
        match chunk.tag {
            TAG_SHARE => {
                current_folder = Some(&folders[next_folder]);
                next_folder += 1;
            }
            TAG_ACCOUNT => {
                accounts.push(parse_account(chunk.payload, session, current_folder)?);
            }
            _ => {} // unknown tags are skipped for forward compatibility
        }
    }

    debug!(
        accounts = accounts.len(),
        folders = folders.len(),
        "decoded vault blob"
    );
    Ok(accounts)
}

fn parse_share(payload: &[u8], session: &Session) -> Result<SharedFolder> {
    let items = read_items(payload)?;
    if items.len() < SHARE_MIN_ITEMS {
        return Err(VaultError::Format(format!(
            "folder definition has {} items, expected at least {SHARE_MIN_ITEMS}",
            items.len()
        )));
    }

    let id = String::from_utf8_lossy(items[SHARE_ID]).into_owned();

    // Reuse a key unwrapped during an earlier decode of this session.
    if let Some(cached) = session.folder_by_id(&id) {
        return Ok(cached);
    }

    let private_key = session.private_key.as_ref().ok_or_else(|| {
        VaultError::Crypto("session has no private key to unwrap folder keys".to_string())
    })?;
    let wrapped_hex = std::str::from_utf8(items[SHARE_WRAPPED_KEY])
        .map_err(|e| VaultError::Crypto(format!("wrapped folder key: {e}")))?;
    let key = unwrap_folder_key(wrapped_hex, private_key)?;

    let name = String::from_utf8_lossy(&decrypt_field(items[SHARE_NAME], &key)?).into_owned();
    let read_only = items[SHARE_READ_ONLY] == b"1";

    let folder = SharedFolder {
        id,
        name,
        read_only,
        key,
    };
    session.cache_folder(folder.clone());
    Ok(folder)
}

fn parse_account(
    payload: &[u8],
    session: &Session,
    folder: Option<&SharedFolder>,
) -> Result<Account> {
    let items = read_items(payload)?;
    if items.len() < ACCT_MIN_ITEMS {
        return Err(VaultError::Format(format!(
            "account definition has {} items, expected at least {ACCT_MIN_ITEMS}",
            items.len()
        )));
    }

    // Records in a shared folder use that folder's key, never the
    // user's private vault key.
    let key = folder.map_or(&session.vault_key, |f| &f.key);

    let text = |i: usize| String::from_utf8_lossy(items[i]).into_owned();
    let field = |i: usize| -> Result<String> {
        Ok(String::from_utf8_lossy(&decrypt_field(items[i], key)?).into_owned())
    };

    let url_bytes = hex::decode(items[ACCT_URL])
        .map_err(|e| VaultError::Format(format!("account URL hex: {e}")))?;

    Ok(Account {
        id: text(ACCT_ID),
        name: field(ACCT_NAME)?,
        group: field(ACCT_GROUP)?,
        url: String::from_utf8_lossy(&url_bytes).into_owned(),
        notes: field(ACCT_NOTES)?,
        username: field(ACCT_USERNAME)?,
        password: field(ACCT_PASSWORD)?,
        share: folder.map(|f| f.name.clone()).unwrap_or_default(),
        last_touch: text(ACCT_LAST_TOUCH),
        last_modified_gmt: text(ACCT_LAST_MODIFIED_GMT),
    })
}
