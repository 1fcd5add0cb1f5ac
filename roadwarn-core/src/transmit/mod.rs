//! Frame transmission controller.
//!
//! On a fixed cadence, capture one frame and submit it through the
//! link, but only when the link is open and no earlier frame is still
//! waiting for its result. Busy ticks are dropped, never queued.

pub mod camera;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::DetectError;
use crate::network::{ConnectionManager, SendOutcome};
use crate::protocol::{DetectionParams, FrameRequest};
use crate::state::ConnectionState;

pub use camera::{CameraProvider, Facing};

// ── FrameLink ────────────────────────────────────────────────────

/// The view of the connection the transmitter is allowed to have.
#[async_trait]
pub trait FrameLink: Send {
    /// Whether frames are accepted right now.
    fn is_open(&self) -> bool;

    /// Hand one request to the link.
    async fn submit(&mut self, request: &FrameRequest) -> Result<SendOutcome, DetectError>;
}

#[async_trait]
impl FrameLink for ConnectionManager {
    fn is_open(&self) -> bool {
        self.state().is_open()
    }

    async fn submit(&mut self, request: &FrameRequest) -> Result<SendOutcome, DetectError> {
        self.send(request).await
    }
}

// ── Config / outcomes ────────────────────────────────────────────

/// Configuration for [`FrameTransmitter`].
#[derive(Debug, Clone)]
pub struct TransmitConfig {
    /// Tick period.
    pub interval: Duration,
    /// Knobs sent with every frame.
    pub params: DetectionParams,
    /// How long an unanswered frame may hold the in-flight slot.
    /// `None` waits for the result (or a link drop) indefinitely.
    pub result_timeout: Option<Duration>,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            params: DetectionParams::default(),
            result_timeout: None,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The transmitter is disabled.
    Disabled,
    /// The link is not open.
    SkippedNotOpen,
    /// A previous frame is still awaiting its result.
    SkippedBusy,
    /// The camera had nothing to give.
    NoFrame,
    /// The camera failed; the cycle was skipped.
    CaptureFailed(String),
    /// A frame went out; the slot is now busy.
    Sent,
    /// The link failed while taking the frame.
    SendFailed(String),
}

/// Running counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub sent: u64,
    pub results: u64,
    pub skipped_busy: u64,
    pub skipped_not_open: u64,
    pub empty_captures: u64,
    pub capture_errors: u64,
    pub timeouts: u64,
}

// ── FrameTransmitter ─────────────────────────────────────────────

/// Paced, single-flight frame sender.
pub struct FrameTransmitter {
    config: TransmitConfig,
    ticker: Option<Interval>,
    /// When the outstanding frame was sent; `None` when the slot is free.
    in_flight: Option<Instant>,
    last_facing: Option<Facing>,
    stats: TransmitStats,
}

impl FrameTransmitter {
    pub fn new(config: TransmitConfig) -> Self {
        Self {
            config,
            ticker: None,
            in_flight: None,
            last_facing: None,
            stats: TransmitStats::default(),
        }
    }

    /// Start ticking. The first tick fires immediately.
    pub fn enable(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        self.in_flight = None;
        debug!(interval_ms = self.config.interval.as_millis() as u64, "frame transmitter enabled");
    }

    /// Stop ticking. A frame already sent is not recalled; its result,
    /// should it arrive, is ignored.
    pub fn disable(&mut self) {
        if self.ticker.take().is_some() {
            debug!("frame transmitter disabled");
        }
        self.in_flight = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.ticker.is_some()
    }

    /// Whether a frame is awaiting its result.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn stats(&self) -> &TransmitStats {
        &self.stats
    }

    pub fn params(&self) -> &DetectionParams {
        &self.config.params
    }

    /// Replace the detection knobs; used from the next frame on.
    pub fn set_params(&mut self, params: DetectionParams) {
        self.config.params = params;
    }

    /// The facing observed on the most recent cycle.
    pub fn last_facing(&self) -> Option<Facing> {
        self.last_facing
    }

    /// Wait for the next tick. Pends forever while disabled.
    pub async fn wait_tick(&mut self) {
        match &mut self.ticker {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Run one send cycle.
    pub async fn tick<L, C>(&mut self, link: &mut L, camera: &mut C) -> TickOutcome
    where
        L: FrameLink + ?Sized,
        C: CameraProvider + ?Sized,
    {
        if !self.is_enabled() {
            return TickOutcome::Disabled;
        }
        self.expire_in_flight();

        if !link.is_open() {
            self.stats.skipped_not_open += 1;
            return TickOutcome::SkippedNotOpen;
        }
        if self.in_flight.is_some() {
            self.stats.skipped_busy += 1;
            debug!("frame skipped: previous frame still in flight");
            return TickOutcome::SkippedBusy;
        }

        let facing = camera.current_facing();
        if let Some(previous) = self.last_facing.replace(facing) {
            if previous != facing {
                info!("camera switched from {previous} to {facing}");
            }
        }

        let frame = match camera.capture_frame().await {
            Ok(Some(frame)) if !frame.is_empty() => frame,
            Ok(_) => {
                self.stats.empty_captures += 1;
                debug!(%facing, "camera returned no frame");
                return TickOutcome::NoFrame;
            }
            Err(e) => {
                self.stats.capture_errors += 1;
                debug!(%facing, "capture failed: {e}");
                return TickOutcome::CaptureFailed(e.to_string());
            }
        };

        let request = FrameRequest::new(&frame, &self.config.params);
        match link.submit(&request).await {
            Ok(SendOutcome::Sent) => {
                self.in_flight = Some(Instant::now());
                self.stats.sent += 1;
                debug!(%facing, bytes = frame.len(), "frame sent");
                TickOutcome::Sent
            }
            Ok(SendOutcome::NotReady) => {
                self.stats.skipped_not_open += 1;
                TickOutcome::SkippedNotOpen
            }
            Ok(SendOutcome::Failed) => TickOutcome::SendFailed("link failed while sending".into()),
            Err(e) => {
                warn!("frame could not be submitted: {e}");
                TickOutcome::SendFailed(e.to_string())
            }
        }
    }

    /// A result (success or error) arrived. Returns `true` when it
    /// released the in-flight slot.
    pub fn on_result(&mut self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.stats.results += 1;
        self.in_flight.take().is_some()
    }

    /// Follow link state: a result cannot arrive on a new connection,
    /// so leaving `Open` frees the slot.
    pub fn on_link_state(&mut self, state: ConnectionState) {
        if !state.is_open() && self.in_flight.take().is_some() {
            debug!(%state, "in-flight frame abandoned");
        }
    }

    fn expire_in_flight(&mut self) {
        let (Some(sent_at), Some(timeout)) = (self.in_flight, self.config.result_timeout) else {
            return;
        };
        if sent_at.elapsed() >= timeout {
            warn!(
                "no result after {}ms; releasing in-flight slot",
                timeout.as_millis()
            );
            self.stats.timeouts += 1;
            self.in_flight = None;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
