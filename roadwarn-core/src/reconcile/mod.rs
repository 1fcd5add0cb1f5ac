//! Result reconciliation.
//!
//! Incoming results are merged into a per-label warning set. Each label
//! lives for a fixed TTL after its latest sighting; a periodic sweep
//! removes stale labels. The panel is visible while the set is
//! non-empty.

pub mod queue;
pub mod reconciler;

pub use queue::{ApplyOutcome, DEFAULT_TTL, WarningEntry, WarningQueue};
pub use reconciler::{DisplaySink, NOTHING_DETECTED, ReconcileConfig, Reconciler};
