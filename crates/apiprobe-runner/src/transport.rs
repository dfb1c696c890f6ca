//! One blocking HTTP call per `send`, behind a trait so the retry loop and
//! the worker pool can be driven without a live server.

use std::collections::HashMap;
use std::time::Duration;

use apiprobe_core::{AuthConfig, Credential};

/// Substrings of transport error messages that indicate a transient failure.
const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "connection closed",
    "connection aborted",
    "broken pipe",
    "unexpected eof",
    "eof while",
    "tls",
    "ssl",
    "certificate",
    "handshake",
    "dns error",
    "failed to lookup address",
    "no such host",
    "network is unreachable",
    "host is unreachable",
    "temporarily unavailable",
];

/// Request as the executor sees it: the endpoint already carries the query string.
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub method: &'a str,
    pub url: &'a str,
    /// JSON payload, sent with `Content-Type: application/json`
    pub body: Option<&'a [u8]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    /// The request could not be built; never sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Timeouts and connect failures always; anything else only when its
    /// message looks like a connectivity, TLS, or EOF problem.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) => true,
            Self::InvalidRequest(_) => false,
            Self::Other(message) => {
                let message = message.to_ascii_lowercase();
                TRANSIENT_PATTERNS.iter().any(|p| message.contains(p))
            }
        }
    }
}

/// Something that can perform a single HTTP exchange.
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Returns a classified error when no HTTP response was received.
    fn send(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError>;
}

/// Production transport: blocking reqwest client with a fixed per-call
/// timeout, run-wide credentials, and static headers.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    auth: AuthConfig,
    headers: HashMap<String, String>,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        timeout: Duration,
        auth: AuthConfig,
        headers: HashMap<String, String>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(error_chain(&e)))?;
        Ok(Self {
            client,
            auth,
            headers,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::InvalidRequest(format!("method '{}'", request.method)))?;

        let mut req = self.client.request(method, request.url);
        for (k, v) in &self.headers {
            // Skip header values that are invalid in HTTP instead of failing the call
            if reqwest::header::HeaderValue::from_str(v).is_ok() {
                req = req.header(k, v);
            }
        }
        match self.auth.credential() {
            Some(Credential::Header { name, value }) => req = req.header(name, value),
            Some(Credential::Query { name, value }) => req = req.query(&[(name, value)]),
            Some(Credential::Basic { username, password }) => {
                req = req.basic_auth(username, Some(password));
            }
            None => {}
        }
        if let Some(body) = request.body {
            req = req
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.to_vec());
        }

        let resp = req.send().map_err(classify)?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().map_err(classify)?.to_vec();

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    let message = error_chain(&e);
    if e.is_timeout() {
        TransportError::Timeout(message)
    } else if e.is_connect() {
        TransportError::Connect(message)
    } else if e.is_builder() {
        TransportError::InvalidRequest(message)
    } else {
        TransportError::Other(message)
    }
}

/// reqwest's top-level message hides the useful part ("Connection refused",
/// "unexpected EOF") in its source chain.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
pub(crate) mod scripted {
    //! Deterministic transports for executor and runner tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;

    /// Replays a fixed sequence of outcomes, then repeats the last one.
    pub(crate) struct Scripted {
        replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        last: Mutex<Option<Result<HttpResponse, TransportError>>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) call_times: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        pub(crate) fn new(replies: Vec<Result<HttpResponse, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
                call_times: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn statuses(statuses: &[u16]) -> Self {
            Self::new(
                statuses
                    .iter()
                    .map(|&s| Ok(HttpResponse::new(s, Some("application/json"), "{}")))
                    .collect(),
            )
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for Scripted {
        fn send(&self, _request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.call_times.lock().unwrap().push(Instant::now());
            let next = self.replies.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(reply) = next {
                *last = Some(reply);
            }
            last.clone()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
        }
    }
}
