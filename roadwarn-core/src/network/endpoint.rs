//! Detection endpoint resolution.

use std::fmt;

use crate::error::DetectError;

/// Path of the detection route on the service.
pub const DETECT_PATH: &str = "/api/v1/ws/detect";

/// A resolved `ws://` or `wss://` URL for the detection route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    secure: bool,
}

impl Endpoint {
    /// Derive the endpoint from a page origin such as
    /// `https://maps.example.org`. A secure origin yields `wss://`.
    /// Any path on the origin is discarded in favour of [`DETECT_PATH`].
    pub fn from_origin(origin: &str) -> Result<Self, DetectError> {
        Self::from_origin_with_path(origin, DETECT_PATH)
    }

    /// Like [`from_origin`](Self::from_origin) with a custom route path.
    pub fn from_origin_with_path(origin: &str, path: &str) -> Result<Self, DetectError> {
        let (scheme, rest) = origin
            .trim()
            .split_once("://")
            .ok_or_else(|| DetectError::InvalidEndpoint(format!("missing scheme: {origin}")))?;

        let secure = match scheme.to_ascii_lowercase().as_str() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => {
                return Err(DetectError::InvalidEndpoint(format!(
                    "unsupported scheme {other:?} in {origin}"
                )));
            }
        };

        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() {
            return Err(DetectError::InvalidEndpoint(format!("missing host: {origin}")));
        }

        let path = path.trim();
        let ws_scheme = if secure { "wss" } else { "ws" };
        let url = if path.starts_with('/') {
            format!("{ws_scheme}://{host}{path}")
        } else {
            format!("{ws_scheme}://{host}/{path}")
        };
        Ok(Self { url, secure })
    }

    /// Accept an explicit `ws://` / `wss://` URL verbatim.
    pub fn parse(url: &str) -> Result<Self, DetectError> {
        let url = url.trim();
        let secure = if url.starts_with("wss://") {
            true
        } else if url.starts_with("ws://") {
            false
        } else {
            return Err(DetectError::InvalidEndpoint(format!(
                "expected ws:// or wss:// url, got {url}"
            )));
        };
        if url.split_once("://").is_none_or(|(_, rest)| rest.is_empty()) {
            return Err(DetectError::InvalidEndpoint(format!("missing host: {url}")));
        }
        Ok(Self {
            url: url.to_string(),
            secure,
        })
    }

    /// The full URL.
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Whether the endpoint uses TLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}
