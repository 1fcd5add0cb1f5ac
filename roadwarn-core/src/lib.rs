//! # roadwarn-core
//!
//! Client core for the roadwarn traffic-sign warning service.
//!
//! This crate contains:
//! - **Protocol**: `FrameRequest` / `DetectionResult`, the JSON wire contract
//! - **Network**: `ConnectionManager` for the WebSocket link with keepalive and backoff
//! - **State**: the `ConnectionState` machine with validated transitions
//! - **Transmit**: `FrameTransmitter`, the paced single-flight frame sender
//! - **Reconcile**: `WarningQueue` / `Reconciler`, per-label warnings with TTL
//! - **Geocode**: `CachedGeocoder`, rate-limited reverse geocoding with a bounded cache
//! - **Pipeline**: `Pipeline`, the single-task loop composing all of the above
//! - **Error**: `DetectError`, typed, `thiserror`-based error hierarchy

pub mod error;
pub mod geocode;
pub mod network;
pub mod pipeline;
pub mod protocol;
pub mod reconcile;
pub mod state;
pub mod transmit;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::DetectError;
pub use geocode::{CachedGeocoder, CoordKey, GeocodeCache, GeocodeConfig, ReverseGeocoder};
pub use network::{
    BackoffPolicy, ConnectionEvent, ConnectionManager, DETECT_PATH, Endpoint, LinkConfig,
    SendOutcome,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineStep, Wakeup};
pub use protocol::{Detection, DetectionParams, DetectionResult, FrameRequest};
pub use reconcile::{
    ApplyOutcome, DisplaySink, ReconcileConfig, Reconciler, WarningEntry, WarningQueue,
};
pub use state::ConnectionState;
pub use transmit::{
    CameraProvider, Facing, FrameLink, FrameTransmitter, TickOutcome, TransmitConfig,
    TransmitStats,
};
