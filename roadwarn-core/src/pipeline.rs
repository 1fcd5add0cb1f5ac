//! Single-task event loop tying the link, the frame pacer and the
//! warning set together.
//!
//! Each [`Pipeline::step`] waits for whichever comes first: a link
//! event, a capture tick or a sweep tick, and handles it to completion
//! before returning. Nothing here is shared across tasks.

use tokio::time::Instant;
use tracing::{debug, info};

use crate::network::{ConnectionEvent, ConnectionManager, LinkConfig};
use crate::reconcile::{DisplaySink, ReconcileConfig, Reconciler};
use crate::state::ConnectionState;
use crate::transmit::{CameraProvider, FrameTransmitter, TickOutcome, TransmitConfig};

pub const STATUS_CONNECTING: &str = "connecting";
pub const STATUS_CONNECTED: &str = "connected";
pub const STATUS_STOPPED: &str = "stopped";

/// Settings for every stage of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub link: LinkConfig,
    pub transmit: TransmitConfig,
    pub reconcile: ReconcileConfig,
}

impl PipelineConfig {
    pub fn new(link: LinkConfig) -> Self {
        Self {
            link,
            transmit: TransmitConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

/// What one [`Pipeline::step`] handled.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStep {
    Connection(ConnectionEvent),
    Tick(TickOutcome),
    /// Expired warnings removed by the sweep.
    Swept(usize),
}

/// What woke the pipeline up; handed back to [`Pipeline::handle`].
#[derive(Debug)]
pub enum Wakeup {
    Event(ConnectionEvent),
    Tick,
    Sweep(Instant),
}

/// Camera → link → warning panel.
pub struct Pipeline<C, S> {
    manager: ConnectionManager,
    transmitter: FrameTransmitter,
    reconciler: Reconciler<S>,
    camera: C,
    status: String,
}

impl<C, S> Pipeline<C, S>
where
    C: CameraProvider,
    S: DisplaySink,
{
    /// Must be called inside a Tokio runtime.
    pub fn new(config: PipelineConfig, camera: C, sink: S) -> Self {
        Self {
            manager: ConnectionManager::new(config.link),
            transmitter: FrameTransmitter::new(config.transmit),
            reconciler: Reconciler::new(config.reconcile, sink),
            camera,
            status: STATUS_STOPPED.to_string(),
        }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn transmitter(&self) -> &FrameTransmitter {
        &self.transmitter
    }

    pub fn transmitter_mut(&mut self) -> &mut FrameTransmitter {
        &mut self.transmitter
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    /// Latest link or camera status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_enabled(&self) -> bool {
        self.transmitter.is_enabled()
    }

    /// Turn detection on: connect and start capturing.
    pub fn enable(&mut self) {
        if self.is_enabled() && self.manager.is_enabled() {
            return;
        }
        info!(facing = %self.camera.current_facing(), "detection enabled");
        self.manager.enable();
        self.transmitter.enable();
    }

    /// Turn detection off. Warnings already shown stay until they expire.
    pub fn disable(&mut self) {
        if !self.is_enabled() && !self.manager.is_enabled() {
            return;
        }
        info!("detection disabled");
        self.transmitter.disable();
        self.manager.disable();
        self.set_status(STATUS_STOPPED);
    }

    /// Wait for and handle one thing.
    pub async fn step(&mut self) -> PipelineStep {
        let wakeup = self.wait().await;
        self.handle(wakeup).await
    }

    /// Wait for the next wake-up. Cancel-safe, so it can be raced
    /// against other sources in a `select!`.
    pub async fn wait(&mut self) -> Wakeup {
        tokio::select! {
            event = self.manager.next_event() => Wakeup::Event(event),
            _ = self.transmitter.wait_tick() => Wakeup::Tick,
            now = self.reconciler.wait_sweep() => Wakeup::Sweep(now),
        }
    }

    /// Handle a wake-up to completion. Should not be cancelled: a tick
    /// may be halfway through handing a frame to the link.
    pub async fn handle(&mut self, wakeup: Wakeup) -> PipelineStep {
        match wakeup {
            Wakeup::Event(event) => {
                self.on_event(&event);
                PipelineStep::Connection(event)
            }
            Wakeup::Tick => {
                let outcome = self.transmitter.tick(&mut self.manager, &mut self.camera).await;
                self.on_tick(&outcome);
                PipelineStep::Tick(outcome)
            }
            Wakeup::Sweep(now) => PipelineStep::Swept(self.reconciler.sweep(now)),
        }
    }

    fn on_event(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged(state) => {
                self.transmitter.on_link_state(*state);
                match state {
                    ConnectionState::Connecting | ConnectionState::Error => {
                        self.set_status(STATUS_CONNECTING)
                    }
                    ConnectionState::Open => self.set_status(STATUS_CONNECTED),
                    ConnectionState::Closing | ConnectionState::Disconnected => {}
                }
            }
            ConnectionEvent::Result(result) => {
                if !self.transmitter.on_result() {
                    debug!("result arrived with no frame in flight");
                }
                self.reconciler.on_result(result, Instant::now());
            }
            ConnectionEvent::Exhausted { attempts } => {
                self.transmitter.disable();
                self.set_status(&format!(
                    "error: detection service unreachable after {attempts} attempts"
                ));
            }
        }
    }

    fn on_tick(&mut self, outcome: &TickOutcome) {
        if let TickOutcome::CaptureFailed(message) = outcome {
            self.set_status(&format!("camera error: {message}"));
        } else if *outcome == TickOutcome::Sent && self.status != STATUS_CONNECTED {
            self.set_status(STATUS_CONNECTED);
        }
    }

    /// Forward a status line to the display unless it repeats the last.
    fn set_status(&mut self, status: &str) {
        if self.status == status {
            return;
        }
        self.status = status.to_string();
        self.reconciler.status(status);
    }
}
