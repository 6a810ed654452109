//! Per-marker alert suppression.
//!
//! # Invariants
//! - At most one `Notify` per entry into the radius.
//! - After a `Notify`, the next one for the same marker needs either an exit
//!   (`distance > radius`) or an elapsed cooldown.
//! - State is mutated only from the monitor tick.

use crate::model::marker::MarkerId;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Gate verdict for one marker on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Notify,
    /// Inside, but already alerted for this entry.
    Suppressed,
    Outside,
}

#[derive(Debug, Clone, Copy, Default)]
struct GateEntry {
    inside: bool,
    last_fired: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct NotificationGate {
    radius_m: f64,
    cooldown: Option<Duration>,
    entries: HashMap<MarkerId, GateEntry>,
}

impl NotificationGate {
    pub fn new(radius_m: f64, cooldown: Option<Duration>) -> Self {
        Self {
            radius_m,
            cooldown,
            entries: HashMap::new(),
        }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Feeds one distance sample and returns whether to alert.
    pub fn observe(&mut self, marker_id: MarkerId, distance_m: f64, now: Instant) -> GateDecision {
        let entry = self.entries.entry(marker_id).or_default();

        if distance_m > self.radius_m {
            entry.inside = false;
            return GateDecision::Outside;
        }

        let was_inside = entry.inside;
        entry.inside = true;

        let cooled_down = match (self.cooldown, entry.last_fired) {
            (Some(cooldown), Some(last)) => now.saturating_duration_since(last) >= cooldown,
            _ => false,
        };

        if !was_inside || cooled_down {
            entry.last_fired = Some(now);
            GateDecision::Notify
        } else {
            GateDecision::Suppressed
        }
    }

    /// Drops state for markers that are no longer in the snapshot.
    pub fn retain_markers(&mut self, live: &HashSet<MarkerId>) {
        self.entries.retain(|id, _| live.contains(id));
    }

    pub fn is_inside(&self, marker_id: MarkerId) -> bool {
        self.entries
            .get(&marker_id)
            .is_some_and(|entry| entry.inside)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{GateDecision, NotificationGate};
    use std::collections::HashSet;
    use std::time::{Duration, Instant};

    #[test]
    fn lingering_inside_alerts_once() {
        let mut gate = NotificationGate::new(100.0, None);
        let t0 = Instant::now();

        assert_eq!(gate.observe(1, 150.0, t0), GateDecision::Outside);
        assert_eq!(gate.observe(1, 80.0, t0), GateDecision::Notify);
        for step in 1..10 {
            let now = t0 + Duration::from_secs(step * 5);
            assert_eq!(gate.observe(1, 40.0, now), GateDecision::Suppressed);
        }
    }

    #[test]
    fn exit_and_reentry_alerts_again() {
        let mut gate = NotificationGate::new(100.0, None);
        let t0 = Instant::now();

        assert_eq!(gate.observe(1, 99.0, t0), GateDecision::Notify);
        assert_eq!(gate.observe(1, 101.0, t0), GateDecision::Outside);
        assert!(!gate.is_inside(1));
        assert_eq!(gate.observe(1, 100.0, t0), GateDecision::Notify);
    }

    #[test]
    fn cooldown_allows_repeat_while_inside() {
        let mut gate = NotificationGate::new(100.0, Some(Duration::from_secs(60)));
        let t0 = Instant::now();

        assert_eq!(gate.observe(3, 10.0, t0), GateDecision::Notify);
        assert_eq!(
            gate.observe(3, 10.0, t0 + Duration::from_secs(59)),
            GateDecision::Suppressed
        );
        assert_eq!(
            gate.observe(3, 10.0, t0 + Duration::from_secs(60)),
            GateDecision::Notify
        );
    }

    #[test]
    fn retain_forgets_deleted_markers() {
        let mut gate = NotificationGate::new(100.0, None);
        let t0 = Instant::now();
        gate.observe(1, 10.0, t0);
        gate.observe(2, 10.0, t0);

        gate.retain_markers(&HashSet::from([2]));

        assert!(!gate.is_inside(1));
        assert!(gate.is_inside(2));
        assert_eq!(gate.observe(1, 10.0, t0), GateDecision::Notify);
    }
}
