//! Per-label warning set with expiry.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::protocol::{Detection, DetectionResult};

/// Default lifetime of a warning without a fresh sighting.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// One label currently shown to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct WarningEntry {
    pub class_name: String,
    /// Confidence of the latest sighting.
    pub confidence: f32,
    /// Image crop of the latest sighting.
    pub image: Option<Bytes>,
    pub expires_at: Instant,
    pub first_seen: Instant,
    /// Sightings since the entry was created.
    pub sightings: u32,
}

impl WarningEntry {
    fn new(detection: &Detection, now: Instant, ttl: Duration) -> Self {
        Self {
            class_name: detection.class_name.clone(),
            confidence: detection.confidence,
            image: detection.image.clone(),
            expires_at: now + ttl,
            first_seen: now,
            sightings: 1,
        }
    }

    /// Live until the expiry instant is reached.
    pub fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }

    /// Confidence as a whole percentage, for display.
    pub fn percent(&self) -> u8 {
        (self.confidence * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// What [`WarningQueue::apply`] did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The service reported an error; the set is unchanged.
    Failed(String),
    /// Nothing was detected; the set is unchanged.
    Empty,
    /// Detections were merged.
    Merged { inserted: usize, refreshed: usize },
}

/// The live warning set.
///
/// Entries keep insertion order. A label appears at most once.
#[derive(Debug, Clone)]
pub struct WarningQueue {
    ttl: Duration,
    entries: Vec<WarningEntry>,
}

impl Default for WarningQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl WarningQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Vec::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Merge one result into the set.
    ///
    /// Entries already expired at `now` are dropped first, so a label
    /// that expired but was not swept yet comes back as a fresh entry.
    /// A label still live is refreshed in place: latest confidence and
    /// image, expiry pushed to `now + ttl`.
    pub fn apply(&mut self, result: &DetectionResult, now: Instant) -> ApplyOutcome {
        let detections = match result {
            DetectionResult::Error(message) => return ApplyOutcome::Failed(message.clone()),
            DetectionResult::Detections { detections, .. } if detections.is_empty() => {
                return ApplyOutcome::Empty;
            }
            DetectionResult::Detections { detections, .. } => detections,
        };

        self.sweep(now);
        let mut inserted = 0;
        let mut refreshed = 0;
        for detection in detections {
            let slot = self
                .entries
                .iter_mut()
                .find(|entry| entry.class_name == detection.class_name);
            match slot {
                Some(entry) => {
                    entry.confidence = detection.confidence;
                    entry.image = detection.image.clone();
                    entry.expires_at = now + self.ttl;
                    entry.sightings = entry.sightings.saturating_add(1);
                    refreshed += 1;
                }
                None => {
                    self.entries.push(WarningEntry::new(detection, now, self.ttl));
                    inserted += 1;
                }
            }
        }
        ApplyOutcome::Merged { inserted, refreshed }
    }

    /// Drop every entry whose expiry has been reached. Returns how many
    /// were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.is_live(now));
        before - self.entries.len()
    }

    pub fn entries(&self) -> &[WarningEntry] {
        &self.entries
    }

    pub fn get(&self, class_name: &str) -> Option<&WarningEntry> {
        self.entries.iter().find(|e| e.class_name == class_name)
    }

    /// Entries still live at `now`, in insertion order.
    pub fn live(&self, now: Instant) -> impl Iterator<Item = &WarningEntry> {
        self.entries.iter().filter(move |entry| entry.is_live(now))
    }

    /// Whether the warning panel should be shown at `now`.
    pub fn is_visible(&self, now: Instant) -> bool {
        self.live(now).next().is_some()
    }

    /// Stored entries, including expired ones the sweep has not reached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(items: &[(&str, f32)]) -> DetectionResult {
        DetectionResult::detections(
            items
                .iter()
                .map(|(name, conf)| Detection::new(*name, *conf))
                .collect(),
        )
    }

    #[test]
    fn new_labels_are_inserted() {
        let now = Instant::now();
        let mut q = WarningQueue::default();
        let outcome = q.apply(&result(&[("stop", 0.8), ("yield", 0.6)]), now);
        assert_eq!(outcome, ApplyOutcome::Merged { inserted: 2, refreshed: 0 });
        assert_eq!(q.len(), 2);
        assert!(q.is_visible(now));
        assert_eq!(q.get("stop").unwrap().expires_at, now + DEFAULT_TTL);
    }

    #[test]
    fn repeat_sighting_refreshes_in_place() {
        let t0 = Instant::now();
        let mut q = WarningQueue::default();
        q.apply(&result(&[("stop", 0.7)]), t0);

        let t1 = t0 + Duration::from_secs(2);
        let outcome = q.apply(&result(&[("stop", 0.9)]), t1);
        assert_eq!(outcome, ApplyOutcome::Merged { inserted: 0, refreshed: 1 });

        let entry = q.get("stop").unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(entry.confidence, 0.9);
        assert_eq!(entry.expires_at, t1 + DEFAULT_TTL);
        assert_eq!(entry.first_seen, t0);
        assert_eq!(entry.sightings, 2);
    }

    #[test]
    fn lower_confidence_still_refreshes() {
        let t0 = Instant::now();
        let mut q = WarningQueue::default();
        q.apply(&result(&[("stop", 0.9)]), t0);
        q.apply(&result(&[("stop", 0.4)]), t0 + Duration::from_secs(1));
        assert_eq!(q.get("stop").unwrap().confidence, 0.4);
    }

    #[test]
    fn duplicate_labels_in_one_result_collapse() {
        let now = Instant::now();
        let mut q = WarningQueue::default();
        let outcome = q.apply(&result(&[("stop", 0.5), ("stop", 0.6)]), now);
        assert_eq!(outcome, ApplyOutcome::Merged { inserted: 1, refreshed: 1 });
        assert_eq!(q.len(), 1);
        assert_eq!(q.get("stop").unwrap().confidence, 0.6);
    }

    #[test]
    fn ttl_boundaries() {
        let t0 = Instant::now();
        let mut q = WarningQueue::default();
        q.apply(&result(&[("stop", 0.8)]), t0);

        let before = t0 + Duration::from_millis(4900);
        assert_eq!(q.sweep(before), 0);
        assert!(q.is_visible(before));

        let after = t0 + Duration::from_millis(5100);
        assert_eq!(q.sweep(after), 1);
        assert!(!q.is_visible(after));
    }

    #[test]
    fn expiry_instant_itself_is_expired() {
        let t0 = Instant::now();
        let mut q = WarningQueue::default();
        q.apply(&result(&[("stop", 0.8)]), t0);
        assert_eq!(q.sweep(t0 + DEFAULT_TTL), 1);
    }

    #[test]
    fn expired_unswept_entry_is_replaced() {
        let t0 = Instant::now();
        let mut q = WarningQueue::default();
        q.apply(&result(&[("stop", 0.8)]), t0);

        let t1 = t0 + Duration::from_secs(6);
        let outcome = q.apply(&result(&[("stop", 0.5)]), t1);
        assert_eq!(outcome, ApplyOutcome::Merged { inserted: 1, refreshed: 0 });

        let entry = q.get("stop").unwrap();
        assert_eq!(entry.first_seen, t1);
        assert_eq!(entry.sightings, 1);
        assert_eq!(q.sweep(t1 + Duration::from_secs(1)), 0);
    }

    #[test]
    fn expired_entries_are_not_visible_before_the_sweep() {
        let t0 = Instant::now();
        let mut q = WarningQueue::default();
        q.apply(&result(&[("stop", 0.8)]), t0);

        let t1 = t0 + Duration::from_millis(5500);
        assert!(!q.is_visible(t1));
        assert_eq!(q.live(t1).count(), 0);

        q.apply(&result(&[("yield", 0.6)]), t1);
        let names: Vec<_> = q.entries().iter().map(|e| e.class_name.as_str()).collect();
        assert_eq!(names, vec!["yield"]);
        assert!(q.is_visible(t1));
    }

    #[test]
    fn empty_and_error_results_leave_set_unchanged() {
        let now = Instant::now();
        let mut q = WarningQueue::default();
        q.apply(&result(&[("stop", 0.8)]), now);
        let snapshot = q.entries().to_vec();

        let later = now + Duration::from_secs(1);
        assert_eq!(q.apply(&result(&[]), later), ApplyOutcome::Empty);
        assert_eq!(
            q.apply(&DetectionResult::Error("model offline".into()), later),
            ApplyOutcome::Failed("model offline".into())
        );
        assert_eq!(q.entries(), snapshot.as_slice());
    }

    #[test]
    fn refresh_keeps_other_labels_untouched() {
        let t0 = Instant::now();
        let mut q = WarningQueue::default();
        q.apply(&result(&[("stop", 0.8), ("yield", 0.6)]), t0);
        q.apply(&result(&[("stop", 0.9)]), t0 + Duration::from_secs(3));

        let swept = q.sweep(t0 + Duration::from_millis(5500));
        assert_eq!(swept, 1);
        assert!(q.get("yield").is_none());
        assert!(q.get("stop").is_some());
    }

    #[test]
    fn percent_rounds() {
        let now = Instant::now();
        let mut q = WarningQueue::default();
        q.apply(&result(&[("stop", 0.876)]), now);
        assert_eq!(q.get("stop").unwrap().percent(), 88);
    }
}
