//! In-process fake of the vault service.
//!
//! Implements [`Transport`] directly, so clients exercise the full
//! protocol path (forms, cookies, blob framing) without a network. The
//! vault state is shared behind an `Arc<Mutex<..>>` so multiple
//! per-user servers can act on the same vault, and field values are
//! stored exactly as received on the wire - the fake never sees a
//! plaintext password.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use aes::Aes256;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use rsa::pkcs8::EncodePrivateKey;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};

use vaultpass::crypto::{derive_login_hash, derive_vault_key};
use vaultpass::{
    encrypt_field, Request, Response, SymmetricKey, Transport, TransportError,
};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// One stored record; encrypted fields are kept in their wire form.
pub struct ServerAccount {
    pub id: String,
    pub share_id: Option<String>,
    pub name: String,
    pub grouping: String,
    /// Hex-encoded, as sent by clients
    pub url: String,
    pub username: String,
    pub password: String,
    pub extra: String,
    pub last_touch: u64,
    pub last_modified_gmt: u64,
}

pub struct ServerShare {
    pub id: String,
    pub name: String,
    pub key: [u8; 32],
    pub read_only: bool,
}

#[derive(Default)]
pub struct VaultState {
    pub accounts: Vec<ServerAccount>,
    pub shares: Vec<ServerShare>,
    pub next_id: u64,
}

/// A per-user front end over a shared [`VaultState`].
pub struct FakeServer {
    state: Arc<Mutex<VaultState>>,
    username: String,
    password: String,
    iterations: u32,
    private_key: RsaPrivateKey,
    session_id: String,
    token: String,
    expired: Mutex<bool>,
    requests: Mutex<Vec<String>>,
}

impl FakeServer {
    pub fn new(
        state: Arc<Mutex<VaultState>>,
        username: &str,
        password: &str,
        iterations: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            state,
            username: username.to_string(),
            password: password.to_string(),
            iterations,
            private_key: test_rsa_key().clone(),
            // Specials in the session id exercise cookie escaping.
            session_id: format!("sess id,{username}/1"),
            token: format!("token-{username}"),
            expired: Mutex::new(false),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Invalidate the session server-side, as an idle timeout would.
    pub fn expire(&self) {
        *self.expired.lock().unwrap() = true;
    }

    /// Paths of every request handled so far, in order.
    pub fn request_paths(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn vault_key(&self) -> SymmetricKey {
        derive_vault_key(&self.username, &self.password, self.iterations).unwrap()
    }

    fn authorized(&self, request: &Request) -> bool {
        if *self.expired.lock().unwrap() {
            return false;
        }
        let escaped: String =
            url::form_urlencoded::byte_serialize(self.session_id.as_bytes()).collect();
        request
            .cookies
            .iter()
            .any(|(name, value)| name == "PHPSESSID" && *value == escaped)
    }

    fn handle_login(&self, request: &Request) -> Response {
        let vault_key = self.vault_key();
        let expected_hash = derive_login_hash(&vault_key, &self.password, self.iterations);
        let iterations_ok =
            request.form_value("iterations") == Some(self.iterations.to_string().as_str());

        if request.form_value("username") != Some(self.username.as_str())
            || request.form_value("hash") != Some(expected_hash.as_str())
            || !iterations_ok
        {
            return Response::ok(
                r#"<response><error message="Invalid password!" cause="password_invalid"/></response>"#,
            );
        }

        let der = self.private_key.to_pkcs8_der().unwrap();
        let plaintext = hex::encode(der.as_bytes());
        let encrypted = cbc_encrypt(
            vault_key.as_bytes(),
            &vault_key.as_bytes()[..16],
            plaintext.as_bytes(),
        );
        Response::ok(format!(
            r#"<response><ok sessionid="{}" token="{}" privatekeyenc="{}"/></response>"#,
            self.session_id,
            self.token,
            hex::encode(encrypted)
        ))
    }

    fn build_blob(&self) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let mut blob = chunk(b"LPAV", b"198");
        for account in state.accounts.iter().filter(|a| a.share_id.is_none()) {
            blob.extend(chunk(b"ACCT", &acct_payload(account)));
        }
        for share in &state.shares {
            blob.extend(chunk(b"SHAR", &self.shar_payload(share)));
            for account in state
                .accounts
                .iter()
                .filter(|a| a.share_id.as_deref() == Some(share.id.as_str()))
            {
                blob.extend(chunk(b"ACCT", &acct_payload(account)));
            }
        }
        blob.extend(chunk(b"ENDM", b"OK"));
        blob
    }

    fn shar_payload(&self, share: &ServerShare) -> Vec<u8> {
        let public_key = RsaPublicKey::from(&self.private_key);
        let wrapped = public_key
            .encrypt(
                &mut rand::thread_rng(),
                Oaep::new::<sha1::Sha1>(),
                hex::encode(share.key).as_bytes(),
            )
            .unwrap();
        let name_enc =
            encrypt_field(share.name.as_bytes(), &SymmetricKey::new(share.key)).unwrap();
        items(&[
            share.id.as_bytes(),
            hex::encode(wrapped).as_bytes(),
            &name_enc,
            b"",
            b"",
            if share.read_only { b"1" } else { b"0" },
        ])
    }

    fn handle_site(&self, request: &Request) -> Response {
        if request.form_value("token") != Some(self.token.as_str()) {
            return Response::ok(session_error());
        }

        let field = |name: &str| request.form_value(name).unwrap_or_default().to_string();
        let mut state = self.state.lock().unwrap();

        if request.form_value("delete") == Some("1") {
            let aid = field("aid");
            let before = state.accounts.len();
            state.accounts.retain(|a| a.id != aid);
            if state.accounts.len() == before {
                return Response::ok(
                    r#"<xmlresponse><result msg="No such account."></result></xmlresponse>"#,
                );
            }
            return Response::ok(format!(
                r#"<xmlresponse><result aid="{aid}" msg="accountdeleted"></result></xmlresponse>"#,
            ));
        }

        let share_id = request.form_value("sharedfolderid").map(str::to_string);
        if let Some(id) = &share_id {
            match state.shares.iter().find(|s| s.id == *id) {
                Some(share) if share.read_only => {
                    return Response::ok(
                        r#"<xmlresponse><result msg="youdonthavepermission"></result></xmlresponse>"#,
                    );
                }
                Some(_) => {}
                None => {
                    return Response::ok(
                        r#"<xmlresponse><result msg="No such shared folder."></result></xmlresponse>"#,
                    );
                }
            }
        }

        let now = epoch_secs();
        let aid = field("aid");
        if aid == "0" {
            state.next_id += 1;
            let id = state.next_id.to_string();
            state.accounts.push(ServerAccount {
                id: id.clone(),
                share_id,
                name: field("name"),
                grouping: field("grouping"),
                url: field("url"),
                username: field("username"),
                password: field("password"),
                extra: field("extra"),
                last_touch: now,
                last_modified_gmt: now,
            });
            Response::ok(format!(
                r#"<xmlresponse><result aid="{id}" msg="accountadded"></result></xmlresponse>"#,
            ))
        } else if let Some(entry) = state.accounts.iter_mut().find(|a| a.id == aid) {
            entry.share_id = share_id;
            entry.name = field("name");
            entry.grouping = field("grouping");
            entry.url = field("url");
            entry.username = field("username");
            entry.password = field("password");
            entry.extra = field("extra");
            entry.last_modified_gmt = now;
            Response::ok(format!(
                r#"<xmlresponse><result aid="{aid}" msg="accountupdated"></result></xmlresponse>"#,
            ))
        } else {
            Response::ok(r#"<xmlresponse><result msg="No such account."></result></xmlresponse>"#)
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        self.requests.lock().unwrap().push(request.path.clone());
        match request.path.as_str() {
            "/iterations.php" => Ok(Response::ok(self.iterations.to_string())),
            "/login.php" => Ok(self.handle_login(&request)),
            "/login_check.php" => {
                if self.authorized(&request) {
                    Ok(Response::ok(r#"<response> <ok accts_version="1"/> </response>"#))
                } else {
                    Ok(Response::ok(session_error()))
                }
            }
            "/getaccts.php" => {
                if self.authorized(&request) {
                    Ok(Response::ok(self.build_blob()))
                } else {
                    Ok(Response::ok(session_error()))
                }
            }
            "/show_website.php" => {
                if self.authorized(&request) {
                    Ok(self.handle_site(&request))
                } else {
                    Ok(Response::ok(session_error()))
                }
            }
            "/logout.php" => Ok(Response::ok("<response><ok/></response>")),
            other => Err(TransportError(format!("unexpected path {other}"))),
        }
    }
}

fn session_error() -> &'static str {
    r#"<response><error message="Session expired." cause="sessionexpired"/></response>"#
}

fn test_rsa_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn cbc_encrypt(key: &[u8; 32], iv: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let pad = 16 - plaintext.len() % 16;
    let mut buf = vec![0u8; plaintext.len() + pad];
    buf[..plaintext.len()].copy_from_slice(plaintext);
    Aes256CbcEnc::new_from_slices(key, iv)
        .unwrap()
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
        .unwrap()
        .to_vec()
}

fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(tag);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn items(values: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        out.extend_from_slice(&(value.len() as u32).to_be_bytes());
        out.extend_from_slice(value);
    }
    out
}

fn acct_payload(account: &ServerAccount) -> Vec<u8> {
    let mut fields: Vec<Vec<u8>> = vec![Vec::new(); 35];
    fields[0] = account.id.clone().into_bytes();
    fields[1] = wire_to_binary(&account.name);
    fields[2] = wire_to_binary(&account.grouping);
    fields[3] = account.url.clone().into_bytes();
    fields[4] = wire_to_binary(&account.extra);
    fields[7] = wire_to_binary(&account.username);
    fields[8] = wire_to_binary(&account.password);
    fields[12] = account.last_touch.to_string().into_bytes();
    fields[31] = account.last_modified_gmt.to_string().into_bytes();
    let refs: Vec<&[u8]> = fields.iter().map(|f| f.as_slice()).collect();
    items(&refs)
}

/// Convert a field from the form wire encoding (`!b64(iv)|b64(ct)` or
/// plain base64) to the binary blob encoding (`'!' || iv || ct` or bare
/// ciphertext).
fn wire_to_binary(field: &str) -> Vec<u8> {
    if field.is_empty() {
        return Vec::new();
    }
    if let Some(rest) = field.strip_prefix('!') {
        let (iv, ciphertext) = rest.split_once('|').unwrap();
        let mut out = vec![b'!'];
        out.extend(STANDARD.decode(iv).unwrap());
        out.extend(STANDARD.decode(ciphertext).unwrap());
        out
    } else {
        STANDARD.decode(field).unwrap()
    }
}
