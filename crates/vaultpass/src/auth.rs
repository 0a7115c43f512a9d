//! Login handshake and session lifecycle requests

use tracing::{debug, info, warn};

use crate::crypto::{decrypt_private_key, derive_login_hash, derive_vault_key};
use crate::error::{Result, VaultError};
use crate::protocol::{endpoints, xml_attr};
use crate::session::Session;
use crate::transport::{Request, Transport};

/// Iteration count assumed when the server does not report one.
pub(crate) const DEFAULT_ITERATIONS: u32 = 100_100;

/// Optional knobs for the login handshake.
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    /// One-time passcode, sent with the first login attempt so accounts
    /// with a second factor authenticate in a single round trip.
    pub otp: Option<String>,
}

enum LoginOutcome {
    Session(Box<Session>),
    /// The server rejected our iteration count and told us the real one.
    Renegotiate(u32),
}

/// Full login: negotiate the iteration count, derive the vault key and
/// login hash, authenticate, and decrypt the private key if one is
/// provisioned. The password itself never goes on the wire.
pub(crate) async fn login(
    transport: &dyn Transport,
    username: &str,
    password: &str,
    options: &LoginOptions,
) -> Result<Session> {
    let mut iterations = request_iterations(transport, username).await?;
    debug!(username, iterations, "starting login handshake");

    // The advertised count can be stale; the server then rejects the
    // hash and reports the correct count, which we honor exactly once.
    for _ in 0..2 {
        match attempt_login(transport, username, password, iterations, options).await? {
            LoginOutcome::Session(session) => {
                info!(username, "login succeeded");
                return Ok(*session);
            }
            LoginOutcome::Renegotiate(server_count) => {
                warn!(
                    advertised = iterations,
                    server_count, "server renegotiated iteration count"
                );
                iterations = server_count;
            }
        }
    }
    Err(VaultError::Protocol(
        "iteration count renegotiation did not converge".to_string(),
    ))
}

/// Ask the server for the account's KDF iteration count.
async fn request_iterations(transport: &dyn Transport, username: &str) -> Result<u32> {
    let mut request = Request::post(endpoints::ITERATIONS);
    request
        .form
        .push(("email".to_string(), username.to_string()));

    let response = transport.send(request).await?;
    if response.status != 200 {
        return Err(VaultError::Protocol(format!(
            "iteration lookup failed with status {}",
            response.status
        )));
    }

    let body = response.body_text();
    let body = body.trim();
    if body.is_empty() {
        return Ok(DEFAULT_ITERATIONS);
    }
    body.parse().map_err(|_| {
        VaultError::Protocol(format!("unparseable iteration count: {body:?}"))
    })
}

async fn attempt_login(
    transport: &dyn Transport,
    username: &str,
    password: &str,
    iterations: u32,
    options: &LoginOptions,
) -> Result<LoginOutcome> {
    let vault_key = derive_vault_key(username, password, iterations)?;
    let hash = derive_login_hash(&vault_key, password, iterations);

    let mut request = Request::post(endpoints::LOGIN);
    request.form = vec![
        ("method".to_string(), "cli".to_string()),
        ("xml".to_string(), "2".to_string()),
        ("username".to_string(), username.to_string()),
        ("hash".to_string(), hash),
        ("iterations".to_string(), iterations.to_string()),
        ("includeprivatekeyenc".to_string(), "1".to_string()),
        ("outofbandsupported".to_string(), "1".to_string()),
    ];
    if let Some(otp) = &options.otp {
        request.form.push(("otp".to_string(), otp.clone()));
    }

    let response = transport.send(request).await?;
    if response.status != 200 {
        return Err(VaultError::Protocol(format!(
            "login failed with status {}",
            response.status
        )));
    }
    let body = response.body_text();

    if let Some(session_id) = xml_attr(&body, "sessionid") {
        let token = xml_attr(&body, "token").ok_or_else(|| {
            VaultError::Protocol("login response missing token".to_string())
        })?;
        let private_key = match xml_attr(&body, "privatekeyenc").as_deref() {
            Some("") | None => None,
            Some(encrypted) => Some(decrypt_private_key(encrypted, &vault_key)?),
        };
        return Ok(LoginOutcome::Session(Box::new(Session::new(
            session_id,
            token,
            username.to_string(),
            iterations,
            vault_key,
            private_key,
        ))));
    }

    let cause = xml_attr(&body, "cause").unwrap_or_default();
    let message = match xml_attr(&body, "message") {
        Some(message) if !message.is_empty() => message,
        _ => cause.clone(),
    };
    match cause.as_str() {
        "unknownemail" | "unknownpassword" | "password_invalid" => {
            Err(VaultError::Authentication(message))
        }
        "outofbandrequired" | "googleauthrequired" | "otprequired" | "otpfailed"
        | "multifactorresponsefailed" => Err(VaultError::ChallengeRequired(message)),
        "iterationcount" => {
            let server_count = xml_attr(&body, "iterations")
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| {
                    VaultError::Protocol(
                        "iteration renegotiation without a usable count".to_string(),
                    )
                })?;
            Ok(LoginOutcome::Renegotiate(server_count))
        }
        _ => Err(VaultError::Protocol(format!(
            "login rejected: {}",
            if message.is_empty() {
                body.trim().to_string()
            } else {
                message
            }
        ))),
    }
}

/// Invalidate the session server-side. A non-success response is
/// treated as already logged out rather than an error.
pub(crate) async fn logout(transport: &dyn Transport, session: &Session) -> Result<()> {
    let mut request = Request::post(endpoints::LOGOUT);
    request.form = vec![
        ("method".to_string(), "cli".to_string()),
        ("noredirect".to_string(), "1".to_string()),
        ("token".to_string(), session.token.clone()),
    ];
    request.cookies.push(session.cookie());

    let response = transport.send(request).await?;
    if response.status != 200 {
        warn!(
            status = response.status,
            "logout returned non-success, treating session as gone"
        );
    } else {
        info!("logged out");
    }
    Ok(())
}

/// Probe whether the session is still live server-side.
pub(crate) async fn check(transport: &dyn Transport, session: &Session) -> Result<bool> {
    let mut request = Request::get(endpoints::LOGIN_CHECK);
    request.cookies.push(session.cookie());

    let response = transport.send(request).await?;
    if response.status != 200 {
        return Ok(false);
    }
    Ok(xml_attr(&response.body_text(), "accts_version").is_some())
}
