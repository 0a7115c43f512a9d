//! # vaultpass
//!
//! Client library for the VaultPass hosted password vault.
//!
//! ## Features
//!
//! - Login handshake with iteration-count negotiation; the password
//!   never leaves the process, only a derived login hash does
//! - PBKDF2 vault-key derivation and AES-256-CBC field encryption
//! - Decoding of the server's binary vault blob into structured
//!   accounts, including RSA-wrapped shared-folder keys
//! - Account create, update, and delete, with read-only shared folders
//!   and unknown IDs rejected locally
//! - Session export/restore for fully offline blob decodes, plus a
//!   recording transport for building requests to replay later
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vaultpass::{Client, HttpTransport};
//!
//! # async fn example() -> vaultpass::Result<()> {
//! let transport = Arc::new(HttpTransport::new("https://vault.example.com")?);
//! let client = Client::login(transport, "user@example.com", "password").await?;
//! for account in client.accounts().await? {
//!     println!("{} ({})", account.name, account.url);
//! }
//! client.logout().await?;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod auth;
pub mod crypto;
pub mod error;
pub mod session;
pub mod transport;

mod blob;
mod client;
mod protocol;

pub use account::{Account, SharedFolder};
pub use auth::LoginOptions;
pub use client::Client;
pub use crypto::{
    decrypt_field, decrypt_field_b64, encrypt_field, encrypt_field_b64, SymmetricKey,
};
pub use error::{Result, TransportError, VaultError};
pub use session::{Session, SessionState};
pub use transport::{
    HttpTransport, Method, RecordingTransport, Request, Response, Transport,
};
