//! Domain-specific error types for the roadwarn client core.
//!
//! All fallible operations return `Result<T, DetectError>`.
//! Expected conditions (link not ready, camera not ready) are modelled
//! as outcomes, not errors; see [`crate::network::SendOutcome`] and
//! [`crate::transmit::TickOutcome`].

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the roadwarn core.
#[derive(Debug, Error)]
pub enum DetectError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The WebSocket layer reported an error (handshake, send, receive).
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The peer closed the stream without being asked to.
    #[error("connection closed by peer")]
    ClosedByPeer,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A message violated the detection wire contract.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Encoding or decoding of a JSON payload failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// An image field was not valid base64.
    #[error("invalid base64 image: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    // ── Configuration / State Errors ─────────────────────────────
    /// The detection endpoint could not be derived from the given origin.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A connection state transition was attempted from the wrong state.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    // ── Collaborator Errors ──────────────────────────────────────
    /// The camera could not produce a frame.
    #[error("capture failed: {0}")]
    Capture(String),

    /// The reverse-geocoding lookup failed.
    #[error("geocode lookup failed: {0}")]
    Geocode(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for DetectError {
    fn from(s: String) -> Self {
        DetectError::Other(s)
    }
}

impl From<&str> for DetectError {
    fn from(s: &str) -> Self {
        DetectError::Other(s.to_string())
    }
}

impl DetectError {
    /// Whether this error belongs to the transport class that the
    /// connection manager recovers from by reconnecting.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::WebSocket(_) | Self::Connection(_) | Self::ClosedByPeer | Self::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = DetectError::InvalidEndpoint("ftp://example".into());
        assert!(e.to_string().contains("ftp://example"));

        let e = DetectError::Timeout(Duration::from_millis(250));
        assert!(e.to_string().contains("250ms"));
    }

    #[test]
    fn from_string() {
        let e: DetectError = "something broke".into();
        assert!(matches!(e, DetectError::Other(_)));
    }

    #[test]
    fn from_io_is_transport() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let e: DetectError = io_err.into();
        assert!(matches!(e, DetectError::Connection(_)));
        assert!(e.is_transport());
    }

    #[test]
    fn from_json_is_not_transport() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let e: DetectError = json_err.into();
        assert!(matches!(e, DetectError::Encoding(_)));
        assert!(!e.is_transport());
    }
}
