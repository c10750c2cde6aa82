//! Bounded failure history

use crate::failure::{FailureRecord, FailureType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Aggregated view over the failure history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureStats {
    pub total_failures: usize,
    pub by_provider: BTreeMap<String, usize>,
    pub by_type: BTreeMap<FailureType, usize>,
    /// Failures within the last hour
    pub recent_failures: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Ring buffer of failure records; the oldest record is evicted at capacity
#[derive(Debug)]
pub struct FailureHistory {
    records: Mutex<VecDeque<FailureRecord>>,
    capacity: usize,
}

impl FailureHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn push(&self, record: FailureRecord) {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Failures for `provider` newer than `window`, oldest first
    pub fn recent(&self, provider: &str, window: Duration) -> Vec<FailureRecord> {
        let cutoff = cutoff(window);
        let records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records
            .iter()
            .filter(|r| r.provider == provider && r.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> FailureStats {
        let recent_cutoff = cutoff(Duration::from_secs(3600));
        let records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut stats = FailureStats {
            total_failures: records.len(),
            oldest: records.front().map(|r| r.timestamp),
            newest: records.back().map(|r| r.timestamp),
            ..FailureStats::default()
        };
        for record in records.iter() {
            *stats.by_provider.entry(record.provider.clone()).or_default() += 1;
            *stats.by_type.entry(record.failure_type).or_default() += 1;
            if record.timestamp >= recent_cutoff {
                stats.recent_failures += 1;
            }
        }
        stats
    }

    /// Drop records older than `age`, returning how many were removed
    pub fn clear_older_than(&self, age: Duration) -> usize {
        let cutoff = cutoff(age);
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);
        let removed = before - records.len();
        if removed > 0 {
            tracing::info!(removed, "Cleared old failure records");
        }
        removed
    }
}

fn cutoff(window: Duration) -> DateTime<Utc> {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
