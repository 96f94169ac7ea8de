//! Aggregate statistics over folded events

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running counters maintained by the aggregator
///
/// `events_by_type` always sums to `total_events_processed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Events successfully folded in since start
    pub total_events_processed: u64,
    /// Per event type counts
    pub events_by_type: BTreeMap<String, u64>,
    /// Wall-clock time of the most recent fold
    pub last_processed: Option<DateTime<Utc>>,
}

impl AggregateStats {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one folded event
    pub fn record(&mut self, event_type: &str, at: DateTime<Utc>) {
        self.total_events_processed += 1;
        *self
            .events_by_type
            .entry(event_type.to_string())
            .or_insert(0) += 1;
        self.last_processed = Some(at);
    }

    /// Count for a single event type (0 if never seen)
    pub fn count_for(&self, event_type: &str) -> u64 {
        self.events_by_type.get(event_type).copied().unwrap_or(0)
    }

    /// Check the per-type counters against the total
    pub fn is_consistent(&self) -> bool {
        self.events_by_type.values().sum::<u64>() == self.total_events_processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_updates_all_counters() {
        let mut stats = AggregateStats::new();
        let now = Utc::now();

        stats.record("login", now);
        stats.record("login", now);
        stats.record("logout", now);

        assert_eq!(stats.total_events_processed, 3);
        assert_eq!(stats.count_for("login"), 2);
        assert_eq!(stats.count_for("logout"), 1);
        assert_eq!(stats.count_for("reboot"), 0);
        assert_eq!(stats.last_processed, Some(now));
        assert!(stats.is_consistent());
    }

    #[test]
    fn test_empty_stats_serialize_zeroed() {
        let json = serde_json::to_value(AggregateStats::new()).unwrap();
        assert_eq!(json["total_events_processed"], 0);
        assert_eq!(json["events_by_type"], serde_json::json!({}));
        assert!(json["last_processed"].is_null());
    }
}
