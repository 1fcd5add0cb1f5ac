//! Inbound messages: detection results.
//!
//! The service answers each frame with either
//! `{ "error": "..." }` or `{ "warnings": [ ... ] }`. Unknown fields
//! are ignored so newer servers stay compatible.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::Deserialize;

use crate::error::DetectError;

/// Error text attached to results the client could not parse.
pub const UNREADABLE_RESPONSE: &str = "unable to process server response";

// ── Wire shapes ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireResponse {
    Failure {
        error: String,
    },
    Warnings {
        warnings: Vec<WireDetection>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        processing_time_ms: Option<f64>,
    },
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    class_name: String,
    confidence: f32,
    #[serde(default)]
    image: Option<String>,
    #[serde(default, rename = "box")]
    bbox: Option<[f32; 4]>,
    #[serde(default)]
    class_id: Option<u32>,
}

// ── Detection ────────────────────────────────────────────────────

/// One detected object.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Class label; the reconciliation key.
    pub class_name: String,
    /// Score in `[0, 1]`.
    pub confidence: f32,
    /// Decoded image crop, when the service attached one.
    pub image: Option<Bytes>,
    /// Bounding box `(x1, y1, x2, y2)` in source-image pixels.
    pub bbox: Option<[f32; 4]>,
    /// Numeric class id, when reported.
    pub class_id: Option<u32>,
}

impl Detection {
    /// Build a detection with just a label and a score.
    pub fn new(class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            class_name: class_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            image: None,
            bbox: None,
            class_id: None,
        }
    }

    /// Attach an image crop.
    pub fn with_image(mut self, image: impl Into<Bytes>) -> Self {
        self.image = Some(image.into());
        self
    }

    fn from_wire(wire: WireDetection) -> Result<Self, DetectError> {
        let image = match wire.image {
            Some(b64) if !b64.is_empty() => Some(Bytes::from(STANDARD.decode(b64)?)),
            _ => None,
        };
        if wire.confidence.is_nan() {
            return Err(DetectError::Protocol(format!(
                "confidence for {} is not a number",
                wire.class_name
            )));
        }
        Ok(Self {
            class_name: wire.class_name,
            confidence: wire.confidence.clamp(0.0, 1.0),
            image,
            bbox: wire.bbox,
            class_id: wire.class_id,
        })
    }
}

// ── DetectionResult ──────────────────────────────────────────────

/// A result message from the detection service.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    /// The service (or the client, for unreadable payloads) reported a
    /// failure for the frame.
    Error(String),

    /// Zero or more detections. An empty list means "nothing detected".
    Detections {
        detections: Vec<Detection>,
        message: Option<String>,
        processing_time_ms: Option<f64>,
    },
}

impl DetectionResult {
    /// A result carrying the given detections and no server metadata.
    pub fn detections(detections: Vec<Detection>) -> Self {
        Self::Detections {
            detections,
            message: None,
            processing_time_ms: None,
        }
    }

    /// The synthetic error result used for unparseable payloads.
    pub fn unreadable() -> Self {
        Self::Error(UNREADABLE_RESPONSE.to_string())
    }

    /// Parse a JSON text payload.
    pub fn parse(text: &str) -> Result<Self, DetectError> {
        Self::from_wire(serde_json::from_str(text)?)
    }

    /// Parse a JSON payload delivered as a binary frame.
    pub fn parse_slice(data: &[u8]) -> Result<Self, DetectError> {
        Self::from_wire(serde_json::from_slice(data)?)
    }

    /// Parse, converting any failure into [`DetectionResult::unreadable`].
    pub fn parse_or_unreadable(text: &str) -> Self {
        Self::parse(text).unwrap_or_else(|e| {
            tracing::warn!("unparseable detection payload: {e}");
            Self::unreadable()
        })
    }

    fn from_wire(wire: WireResponse) -> Result<Self, DetectError> {
        match wire {
            WireResponse::Failure { error } => Ok(Self::Error(error)),
            WireResponse::Warnings {
                warnings,
                message,
                processing_time_ms,
            } => {
                let detections = warnings
                    .into_iter()
                    .map(Detection::from_wire)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Detections {
                    detections,
                    message,
                    processing_time_ms,
                })
            }
        }
    }

    /// Returns `true` for error results.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The detections carried by this result (empty for errors).
    pub fn detection_list(&self) -> &[Detection] {
        match self {
            Self::Detections { detections, .. } => detections,
            Self::Error(_) => &[],
        }
    }
}
