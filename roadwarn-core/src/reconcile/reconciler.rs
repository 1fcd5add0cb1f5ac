//! Drives a [`WarningQueue`] from results and a sweep timer, and keeps
//! the display in step with it.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace};

use crate::protocol::DetectionResult;
use crate::reconcile::queue::{ApplyOutcome, DEFAULT_TTL, WarningEntry, WarningQueue};

/// Status line shown when a frame came back empty.
pub const NOTHING_DETECTED: &str = "nothing detected";

/// Where warnings and status lines end up.
pub trait DisplaySink: Send {
    /// The full current warning set. Empty means hide the panel.
    fn on_warnings(&mut self, warnings: &[WarningEntry]);

    /// A one-line status message.
    fn on_status(&mut self, status: &str);
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn on_warnings(&mut self, warnings: &[WarningEntry]) {
        (**self).on_warnings(warnings);
    }

    fn on_status(&mut self, status: &str) {
        (**self).on_status(status);
    }
}

/// Configuration for [`Reconciler`].
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Lifetime of a warning without a fresh sighting.
    pub ttl: Duration,
    /// Period of the expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Owner of the warning set and the display it feeds.
pub struct Reconciler<S> {
    queue: WarningQueue,
    sink: S,
    sweeper: Interval,
}

impl<S: DisplaySink> Reconciler<S> {
    pub fn new(config: ReconcileConfig, sink: S) -> Self {
        let period = config.sweep_interval;
        let mut sweeper = tokio::time::interval_at(Instant::now() + period, period);
        sweeper.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            queue: WarningQueue::new(config.ttl),
            sink,
            sweeper,
        }
    }

    pub fn queue(&self) -> &WarningQueue {
        &self.queue
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Fold one result into the set and update the display. The panel
    /// only ever receives entries live at `now`.
    pub fn on_result(&mut self, result: &DetectionResult, now: Instant) -> ApplyOutcome {
        let expired = self.queue.sweep(now);
        let outcome = self.queue.apply(result, now);
        match &outcome {
            ApplyOutcome::Failed(message) => {
                debug!("detection error: {message}");
                if expired > 0 {
                    self.sink.on_warnings(self.queue.entries());
                }
                self.sink.on_status(&format!("error: {message}"));
            }
            ApplyOutcome::Empty => {
                trace!("empty detection result");
                if expired > 0 {
                    self.sink.on_warnings(self.queue.entries());
                }
                self.sink.on_status(NOTHING_DETECTED);
            }
            ApplyOutcome::Merged { inserted, refreshed } => {
                debug!(
                    inserted,
                    refreshed,
                    live = self.queue.len(),
                    "warnings merged"
                );
                self.sink.on_warnings(self.queue.entries());
            }
        }
        outcome
    }

    /// Remove expired warnings. The display is only told when
    /// something actually went away.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let removed = self.queue.sweep(now);
        if removed > 0 {
            debug!(removed, live = self.queue.len(), "expired warnings swept");
            self.sink.on_warnings(self.queue.entries());
        }
        removed
    }

    /// Wait for the next sweep tick.
    pub async fn wait_sweep(&mut self) -> Instant {
        self.sweeper.tick().await
    }

    /// Pass a status line through to the display.
    pub fn status(&mut self, status: &str) {
        self.sink.on_status(status);
    }

    /// Drop every warning and hide the panel.
    pub fn clear(&mut self) {
        if !self.queue.is_empty() {
            self.queue.clear();
            self.sink.on_warnings(&[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Detection;

    #[derive(Default)]
    struct Recorder {
        panels: Vec<Vec<String>>,
        statuses: Vec<String>,
    }

    impl DisplaySink for Recorder {
        fn on_warnings(&mut self, warnings: &[WarningEntry]) {
            self.panels
                .push(warnings.iter().map(|w| w.class_name.clone()).collect());
        }

        fn on_status(&mut self, status: &str) {
            self.statuses.push(status.to_string());
        }
    }

    fn reconciler() -> Reconciler<Recorder> {
        Reconciler::new(ReconcileConfig::default(), Recorder::default())
    }

    #[tokio::test]
    async fn merged_result_updates_panel() {
        let mut r = reconciler();
        let now = Instant::now();
        r.on_result(
            &DetectionResult::detections(vec![
                Detection::new("stop", 0.8),
                Detection::new("speed_limit_50", 0.7),
            ]),
            now,
        );
        assert_eq!(r.sink().panels, vec![vec!["stop", "speed_limit_50"]]);
        assert!(r.queue().is_visible(now));
    }

    #[tokio::test]
    async fn error_and_empty_only_touch_status() {
        let mut r = reconciler();
        let now = Instant::now();
        r.on_result(&DetectionResult::Error("model offline".into()), now);
        r.on_result(&DetectionResult::detections(Vec::new()), now);
        assert!(r.sink().panels.is_empty());
        assert_eq!(r.sink().statuses, vec!["error: model offline", NOTHING_DETECTED]);
    }

    #[tokio::test]
    async fn sweep_notifies_only_on_change() {
        let mut r = reconciler();
        let t0 = Instant::now();
        r.on_result(&DetectionResult::detections(vec![Detection::new("stop", 0.8)]), t0);

        assert_eq!(r.sweep(t0 + Duration::from_secs(1)), 0);
        assert_eq!(r.sink().panels.len(), 1);

        let later = t0 + Duration::from_secs(6);
        assert_eq!(r.sweep(later), 1);
        assert_eq!(r.sink().panels.last().unwrap(), &Vec::<String>::new());
        assert!(!r.queue().is_visible(later));
    }

    #[tokio::test]
    async fn merge_between_sweeps_drops_expired_labels() {
        let mut r = reconciler();
        let t0 = Instant::now();
        r.on_result(&DetectionResult::detections(vec![Detection::new("stop", 0.8)]), t0);

        let t1 = t0 + Duration::from_millis(5500);
        r.on_result(&DetectionResult::detections(vec![Detection::new("yield", 0.6)]), t1);
        assert_eq!(r.sink().panels.last().unwrap(), &vec!["yield".to_string()]);
        assert_eq!(r.queue().len(), 1);
    }

    #[tokio::test]
    async fn empty_result_between_sweeps_hides_expired_panel() {
        let mut r = reconciler();
        let t0 = Instant::now();
        r.on_result(&DetectionResult::detections(vec![Detection::new("stop", 0.8)]), t0);

        r.on_result(&DetectionResult::detections(Vec::new()), t0 + Duration::from_secs(6));
        assert_eq!(r.sink().panels.last().unwrap(), &Vec::<String>::new());
        assert_eq!(r.sink().statuses, vec![NOTHING_DETECTED]);
    }

    #[tokio::test]
    async fn clear_hides_panel() {
        let mut r = reconciler();
        r.clear();
        assert!(r.sink().panels.is_empty());

        r.on_result(
            &DetectionResult::detections(vec![Detection::new("stop", 0.8)]),
            Instant::now(),
        );
        r.clear();
        assert_eq!(r.sink().panels.last().unwrap(), &Vec::<String>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_ticks_every_period() {
        let mut r = reconciler();
        let start = Instant::now();
        r.wait_sweep().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        r.wait_sweep().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
