//! HTTP transport used by the checker and downloader.
//!
//! A small trait keeps both components independent of the HTTP client so
//! tests can script failures without a network.

use std::io::Read;
use std::time::Duration;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("airdocs-updater/", env!("CARGO_PKG_VERSION"));

/// Failure talking to the update server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),
    /// Connect failure, DNS failure, or timeout.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<TransportError> for crate::error::UpdateError {
    fn from(e: TransportError) -> Self {
        Self::Network(e.to_string())
    }
}

/// Response body plus the advertised length.
pub struct TransportResponse {
    /// Value of `Content-Length`, if the server sent one.
    pub content_length: Option<u64>,
    /// Streaming body.
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Blocking HTTP GET.
pub trait Transport: Send + Sync {
    /// Issue a GET request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Status`] for non-2xx responses and
    /// [`TransportError::Transport`] for connectivity failures.
    fn get(&self, url: &str) -> Result<TransportResponse, TransportError>;

    /// GET and read the whole body as a string.
    ///
    /// # Errors
    ///
    /// Same as [`Transport::get`], plus body read failures.
    fn get_string(&self, url: &str) -> Result<String, TransportError> {
        let mut resp = self.get(url)?;
        let mut body = String::new();
        resp.body
            .read_to_string(&mut body)
            .map_err(|e| TransportError::Transport(format!("body read failed: {e}")))?;
        Ok(body)
    }
}

/// [`Transport`] backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Build a transport with the given connect and read timeouts.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout_read(read_timeout)
            .user_agent(USER_AGENT)
            .build();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        let resp = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => TransportError::Status(code),
            ureq::Error::Transport(t) => TransportError::Transport(t.to_string()),
        })?;

        let content_length = resp
            .header("content-length")
            .and_then(|v| v.parse::<u64>().ok());

        Ok(TransportResponse {
            content_length,
            body: Box::new(resp.into_reader()),
        })
    }
}
