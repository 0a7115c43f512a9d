//! Transport capability and its two implementations
//!
//! The client depends on a single-method capability: send one request,
//! get one response. A request is fully self-contained (method, path,
//! query, form, cookies), so a recorded request stays valid and
//! replayable after the client that built it is gone. The capability is
//! invoked at most once per logical request and never retries
//! internally; cancellation is dropping the returned future.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A protocol request, resolved at build time.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Endpoint path, e.g. `/login.php`
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Form body (POST only)
    pub form: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
}

impl Request {
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::Get,
            path: path.to_string(),
            query: Vec::new(),
            form: Vec::new(),
            cookies: Vec::new(),
        }
    }

    pub fn post(path: &str) -> Self {
        Self {
            method: Method::Post,
            path: path.to_string(),
            query: Vec::new(),
            form: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// Look up a form field (used by tests and request inspection).
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A protocol response: status plus raw body bytes.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// The injected "send one request, get one response" capability.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

/// Live HTTP transport backed by reqwest.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Connect to the given service base URL with default timeouts.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("vaultpass/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Use a caller-configured reqwest client (custom timeouts, proxies).
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.cookies.is_empty() {
            let cookie = request
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }
        if request.method == Method::Post {
            builder = builder.form(&request.form);
        }

        debug!(path = %request.path, "sending request");
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(Response { status, body })
    }
}

/// Offline transport that records requests instead of sending them.
///
/// Each send pops the next canned response from the queue; the recorded
/// requests can be inspected (and replayed later through a live
/// transport, since they are self-contained).
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<Request>>,
    responses: Mutex<VecDeque<Response>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned response for a future send.
    pub fn push_response(&self, response: Response) {
        self.responses
            .lock()
            .expect("response queue lock")
            .push_back(response);
    }

    /// The requests recorded so far, in send order.
    pub fn recorded(&self) -> Vec<Request> {
        self.requests.lock().expect("request log lock").clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        debug!(path = %request.path, "recording request");
        self.requests
            .lock()
            .expect("request log lock")
            .push(request);
        self.responses
            .lock()
            .expect("response queue lock")
            .pop_front()
            .ok_or_else(|| TransportError("no canned response queued".to_string()))
    }
}
