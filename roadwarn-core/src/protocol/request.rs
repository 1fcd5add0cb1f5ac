//! Outbound messages: frame requests and the keepalive ping.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::DetectError;

/// Keepalive payload sent while the link is open.
pub const KEEPALIVE_PING: &str = r#"{"type":"ping"}"#;

/// Bare acknowledgement token the service answers a ping with.
pub const KEEPALIVE_PONG: &str = "pong";

// ── DetectionParams ──────────────────────────────────────────────

/// Detection knobs forwarded verbatim with every frame.
///
/// The client never interprets these; they only shape what the
/// service reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Minimum score for a detection to be reported (0..1).
    pub confidence_threshold: f32,
    /// Sliding-window size `[width, height]` in pixels.
    pub window_size: [u32; 2],
    /// IoU threshold for non-max suppression (0..1).
    pub nms_threshold: f32,
    /// Additional numeric knobs, flattened into the request object.
    pub extra: BTreeMap<String, f64>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            window_size: [160, 160],
            nms_threshold: 0.5,
            extra: BTreeMap::new(),
        }
    }
}

// ── FrameRequest ─────────────────────────────────────────────────

/// One frame submitted for analysis.
///
/// Serialises to:
/// ```text
/// { "image": "<base64 jpeg>", "confidence_threshold": 0.3,
///   "window_size": [160, 160], "nms_threshold": 0.5, ...extra }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct FrameRequest {
    /// Base64-encoded JPEG bytes, without a data-URL prefix.
    pub image: String,
    pub confidence_threshold: f32,
    pub window_size: [u32; 2],
    pub nms_threshold: f32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl FrameRequest {
    /// Package raw JPEG bytes with the current detection parameters.
    pub fn new(jpeg: &[u8], params: &DetectionParams) -> Self {
        Self {
            image: STANDARD.encode(jpeg),
            confidence_threshold: params.confidence_threshold,
            window_size: params.window_size,
            nms_threshold: params.nms_threshold,
            extra: params.extra.clone(),
        }
    }

    /// Encode as the JSON text message sent over the link.
    pub fn to_json(&self) -> Result<String, DetectError> {
        Ok(serde_json::to_string(self)?)
    }
}
