//! High-level vault client
//!
//! Owns an authenticated [`Session`] and an injected [`Transport`], and
//! exposes the account operations: list, add, update, delete. Mutations
//! against IDs the vault does not contain are rejected locally, before
//! any request is built.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::account::{Account, SharedFolder};
use crate::auth::{self, LoginOptions};
use crate::blob;
use crate::crypto::encrypt_field_b64;
use crate::error::{Result, VaultError};
use crate::protocol::{endpoints, xml_attr};
use crate::session::{Session, SessionState};
use crate::transport::{Request, Response, Transport};

/// An authenticated vault client.
///
/// Cheap to share behind an `Arc`; all interior state is synchronized.
pub struct Client {
    transport: Arc<dyn Transport>,
    session: Session,
    state: Mutex<SessionState>,
    /// Last decoded account list, used for local existence checks and
    /// kept in step with successful mutations.
    accounts: Mutex<Option<Vec<Account>>>,
}

impl Client {
    /// Authenticate with username and password.
    pub async fn login(
        transport: Arc<dyn Transport>,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        Self::login_with_options(transport, username, password, LoginOptions::default()).await
    }

    /// Authenticate with extra handshake options (e.g. a one-time
    /// passcode).
    pub async fn login_with_options(
        transport: Arc<dyn Transport>,
        username: &str,
        password: &str,
        options: LoginOptions,
    ) -> Result<Self> {
        let username = username.trim().to_lowercase();
        let session = auth::login(transport.as_ref(), &username, password, &options).await?;
        Ok(Self::with_session(transport, session))
    }

    /// Rebuild a client from an exported session. Fully offline: no
    /// request is sent and no password is needed.
    pub fn from_session(transport: Arc<dyn Transport>, opaque: &str) -> Result<Self> {
        let session = Session::from_opaque(opaque)?;
        Ok(Self::with_session(transport, session))
    }

    fn with_session(transport: Arc<dyn Transport>, session: Session) -> Self {
        Self {
            transport,
            session,
            state: Mutex::new(SessionState::Authenticated),
            accounts: Mutex::new(None),
        }
    }

    /// Export the session in the opaque form accepted by
    /// [`Client::from_session`]. Treat the result as secret.
    pub fn export_session(&self) -> Result<String> {
        self.session.to_opaque()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("state lock")
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().expect("state lock") = state;
    }

    /// The shared folders resolved so far (populated by account fetches).
    pub fn shared_folders(&self) -> Vec<SharedFolder> {
        self.session.folders()
    }

    /// Fetch and decrypt the full account list.
    pub async fn accounts(&self) -> Result<Vec<Account>> {
        let blob = self.fetch_encrypted_accounts().await?;
        self.parse_encrypted_accounts(&blob)
    }

    /// Fetch the raw encrypted vault blob without decrypting it.
    ///
    /// The blob can be stored and decoded later (and offline) with
    /// [`Client::parse_encrypted_accounts`].
    pub async fn fetch_encrypted_accounts(&self) -> Result<Vec<u8>> {
        let mut request = Request::get(endpoints::ACCOUNTS);
        request
            .query
            .push(("requestsrc".to_string(), "cli".to_string()));
        request.cookies.push(self.session.cookie());

        let response = self.transport.send(request).await?;
        if response.status != 200 {
            return Err(VaultError::Protocol(format!(
                "account fetch failed with status {}",
                response.status
            )));
        }
        // An expired session gets an XML error document instead of a blob.
        if response.body.starts_with(b"<response>") {
            self.set_state(SessionState::Expired);
            return Err(VaultError::Protocol(format!(
                "account fetch rejected: {}",
                response.body_text().trim()
            )));
        }
        Ok(response.body)
    }

    /// Decode a previously fetched blob. Works offline; refreshes the
    /// local account cache as a side effect.
    pub fn parse_encrypted_accounts(&self, blob: &[u8]) -> Result<Vec<Account>> {
        let accounts = blob::parse_accounts(blob, &self.session)?;
        *self.accounts.lock().expect("account cache lock") = Some(accounts.clone());
        Ok(accounts)
    }

    /// Create a new account and return it with its server-assigned ID.
    pub async fn add(&self, account: &Account) -> Result<Account> {
        let folder = self.writable_folder(account).await?;
        let form = self.upsert_form(account, "0", folder.as_ref())?;
        let body = self.send_site(form).await?;

        if xml_attr(&body, "msg").as_deref() != Some("accountadded") {
            return Err(VaultError::Protocol(format!("add rejected: {}", body.trim())));
        }
        let id = xml_attr(&body, "aid")
            .ok_or_else(|| VaultError::Protocol("add response missing account ID".to_string()))?;

        let mut added = account.clone();
        added.id = id;
        if let Some(cached) = self.accounts.lock().expect("account cache lock").as_mut() {
            cached.push(added.clone());
        }
        info!(id = %added.id, "account added");
        Ok(added)
    }

    /// Overwrite an existing account's fields.
    pub async fn update(&self, account: &Account) -> Result<()> {
        self.require_known(&account.id).await?;
        let folder = self.writable_folder(account).await?;
        let form = self.upsert_form(account, &account.id, folder.as_ref())?;
        let body = self.send_site(form).await?;

        if xml_attr(&body, "msg").as_deref() != Some("accountupdated") {
            return Err(VaultError::Protocol(format!(
                "update rejected: {}",
                body.trim()
            )));
        }
        if let Some(cached) = self.accounts.lock().expect("account cache lock").as_mut() {
            if let Some(entry) = cached.iter_mut().find(|a| a.id == account.id) {
                *entry = account.clone();
            }
        }
        info!(id = %account.id, "account updated");
        Ok(())
    }

    /// Delete an account by its ID.
    pub async fn delete(&self, account: &Account) -> Result<()> {
        self.require_known(&account.id).await?;
        let folder = self.writable_folder(account).await?;

        let mut form = vec![
            ("extjs".to_string(), "1".to_string()),
            ("delete".to_string(), "1".to_string()),
            ("aid".to_string(), account.id.clone()),
            ("token".to_string(), self.session.token.clone()),
        ];
        if let Some(folder) = &folder {
            form.push(("sharedfolderid".to_string(), folder.id.clone()));
        }
        let body = self.send_site(form).await?;

        if xml_attr(&body, "msg").as_deref() != Some("accountdeleted") {
            return Err(VaultError::Protocol(format!(
                "delete rejected: {}",
                body.trim()
            )));
        }
        if let Some(cached) = self.accounts.lock().expect("account cache lock").as_mut() {
            cached.retain(|a| a.id != account.id);
        }
        info!(id = %account.id, "account deleted");
        Ok(())
    }

    /// Invalidate the session server-side.
    pub async fn logout(&self) -> Result<()> {
        auth::logout(self.transport.as_ref(), &self.session).await?;
        self.set_state(SessionState::LoggedOut);
        Ok(())
    }

    /// Probe whether the session is still live server-side.
    pub async fn check(&self) -> Result<bool> {
        let live = auth::check(self.transport.as_ref(), &self.session).await?;
        if !live {
            self.set_state(SessionState::Expired);
        }
        Ok(live)
    }

    /// Reject mutations against IDs the vault does not contain, without
    /// building a request. Fetches the account list once if no decode has
    /// populated the cache yet.
    async fn require_known(&self, id: &str) -> Result<()> {
        let cached = self.accounts.lock().expect("account cache lock").clone();
        let list = match cached {
            Some(list) => list,
            None => self.accounts().await?,
        };
        if list.iter().any(|a| a.id == id) {
            Ok(())
        } else {
            Err(VaultError::AccountNotFound { id: id.to_string() })
        }
    }

    /// Resolve the target shared folder for a mutation, enforcing the
    /// read-only flag. `None` means the private vault.
    async fn writable_folder(&self, account: &Account) -> Result<Option<SharedFolder>> {
        if account.share.is_empty() {
            return Ok(None);
        }
        let folder = match self.session.folder_by_name(&account.share) {
            Some(folder) => folder,
            None => {
                // Folder keys are resolved during blob decodes; fetch
                // once before giving up.
                self.accounts().await?;
                self.session.folder_by_name(&account.share).ok_or_else(|| {
                    VaultError::Protocol(format!("unknown shared folder: {}", account.share))
                })?
            }
        };
        if folder.read_only {
            return Err(VaultError::ReadOnlyShare {
                folder: folder.name,
            });
        }
        Ok(Some(folder))
    }

    /// Build the add/update form. Field values are encrypted with the
    /// folder key (or the vault key for private records); the URL goes
    /// hex-encoded in the clear.
    fn upsert_form(
        &self,
        account: &Account,
        aid: &str,
        folder: Option<&SharedFolder>,
    ) -> Result<Vec<(String, String)>> {
        let key = folder.map_or(&self.session.vault_key, |f| &f.key);

        let mut form = vec![
            ("extjs".to_string(), "1".to_string()),
            ("token".to_string(), self.session.token.clone()),
            ("method".to_string(), "cli".to_string()),
            ("aid".to_string(), aid.to_string()),
            ("name".to_string(), encrypt_field_b64(&account.name, key)?),
            (
                "grouping".to_string(),
                encrypt_field_b64(&account.group, key)?,
            ),
            ("url".to_string(), hex::encode(&account.url)),
            (
                "username".to_string(),
                encrypt_field_b64(&account.username, key)?,
            ),
            (
                "password".to_string(),
                encrypt_field_b64(&account.password, key)?,
            ),
            (
                "extra".to_string(),
                encrypt_field_b64(&account.notes, key)?,
            ),
            ("pwprotect".to_string(), "off".to_string()),
        ];
        if let Some(folder) = folder {
            form.push(("sharedfolderid".to_string(), folder.id.clone()));
        }
        Ok(form)
    }

    async fn send_site(&self, form: Vec<(String, String)>) -> Result<String> {
        let mut request = Request::post(endpoints::SITE);
        request.form = form;
        request.cookies.push(self.session.cookie());

        debug!(path = endpoints::SITE, "sending mutation");
        let response: Response = self.transport.send(request).await?;
        if response.status != 200 {
            return Err(VaultError::Protocol(format!(
                "mutation failed with status {}",
                response.status
            )));
        }
        Ok(response.body_text().into_owned())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.session)
            .field("state", &self.state())
            .finish()
    }
}
