// src/analysis/history.rs
//
// Bounded, time-ordered ring of recent observations for one zone.
// Only the trend classifier reads it; nothing here outlives the process.

use crate::observation::Observation;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct ObservationHistory {
    entries: VecDeque<Observation>,
    capacity: usize,
    lookback: Duration,
}

impl ObservationHistory {
    pub fn new(capacity: usize, lookback: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            lookback,
        }
    }

    /// Insert keeping timestamp order, then evict from the old end.
    /// A late arrival older than everything retained is the one evicted.
    pub fn push(&mut self, observation: Observation) {
        let pos = self
            .entries
            .iter()
            .rposition(|e| e.timestamp <= observation.timestamp)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.entries.insert(pos, observation);

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&Observation> {
        self.entries.back()
    }

    /// Observations no older than the lookback window, measured back from
    /// the newest entry. Oldest first.
    pub fn in_window(&self) -> impl Iterator<Item = &Observation> {
        let cutoff: Option<DateTime<Utc>> = self.latest().map(|l| l.timestamp - self.lookback);
        self.entries
            .iter()
            .filter(move |e| cutoff.map_or(false, |c| e.timestamp >= c))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.entries.iter()
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{ObservationSource, RoadStatus};

    fn obs(at: DateTime<Utc>, depth: f32) -> Observation {
        Observation {
            timestamp: at,
            water_depth_cm: depth,
            road_status: RoadStatus::Passable,
            confidence: 0.9,
            source: ObservationSource::Auto,
            low_confidence: false,
            notes: None,
        }
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let t0 = Utc::now();
        let mut history = ObservationHistory::new(5, Duration::minutes(30));
        for i in 0..6 {
            history.push(obs(t0 + Duration::minutes(i), i as f32));
        }
        assert_eq!(history.len(), 5);
        let depths: Vec<f32> = history.iter().map(|o| o.water_depth_cm).collect();
        assert_eq!(depths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_out_of_order_arrival_is_sorted_in() {
        let t0 = Utc::now();
        let mut history = ObservationHistory::new(5, Duration::minutes(30));
        history.push(obs(t0, 1.0));
        history.push(obs(t0 + Duration::minutes(10), 3.0));
        history.push(obs(t0 + Duration::minutes(5), 2.0));
        let depths: Vec<f32> = history.iter().map(|o| o.water_depth_cm).collect();
        assert_eq!(depths, vec![1.0, 2.0, 3.0]);
        assert_eq!(history.latest().map(|o| o.water_depth_cm), Some(3.0));
    }

    #[test]
    fn test_window_excludes_old_entries_before_capacity_is_reached() {
        let t0 = Utc::now();
        let mut history = ObservationHistory::new(5, Duration::minutes(30));
        history.push(obs(t0, 1.0));
        history.push(obs(t0 + Duration::minutes(45), 2.0));
        history.push(obs(t0 + Duration::minutes(50), 3.0));
        assert_eq!(history.len(), 3);
        let in_window: Vec<f32> = history.in_window().map(|o| o.water_depth_cm).collect();
        assert_eq!(in_window, vec![2.0, 3.0]);
    }
}
