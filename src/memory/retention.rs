//! Retention policies and eviction selection.
//!
//! Selection is a pure function over a snapshot of entries; deleting the
//! selected ids is the orchestrator's job.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{MemoryEntry, MemoryId};
use crate::error::{Error, Result};

/// How entries are chosen for eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvictionStrategy {
    /// Least recently accessed first, down to `max_entries`
    Lru,
    /// Least frequently accessed first, down to `max_entries`
    Lfu,
    /// Oldest first, down to `max_entries`
    Fifo,
    /// Every entry below `min_importance`
    ImportanceThreshold { min_importance: f64 },
    /// All but the `keep` most important entries
    KeepTopN { keep: usize },
}

impl Default for EvictionStrategy {
    fn default() -> Self {
        Self::Lru
    }
}

/// Configured retention behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub strategy: EvictionStrategy,
    /// Capacity for the LRU, LFU and FIFO strategies
    pub max_entries: Option<usize>,
    /// Entries older than this are evicted under any strategy
    pub max_age_days: Option<i64>,
    /// Never evict entries marked persistent
    pub preserve_persistent: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            strategy: EvictionStrategy::default(),
            max_entries: Some(10_000),
            max_age_days: None,
            preserve_persistent: true,
        }
    }
}

impl RetentionPolicy {
    pub fn new(strategy: EvictionStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn keep_top(keep: usize) -> Self {
        Self::new(EvictionStrategy::KeepTopN { keep })
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_age_days(mut self, days: Option<i64>) -> Self {
        self.max_age_days = days;
        self
    }

    pub fn with_preserve_persistent(mut self, preserve: bool) -> Self {
        self.preserve_persistent = preserve;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let EvictionStrategy::ImportanceThreshold { min_importance } = self.strategy {
            if !(0.0..=1.0).contains(&min_importance) {
                return Err(Error::configuration(format!(
                    "min_importance must be within [0, 1], got {}",
                    min_importance
                )));
            }
        }
        if self.max_entries == Some(0) {
            return Err(Error::configuration("max_entries must be positive"));
        }
        if matches!(self.max_age_days, Some(days) if days <= 0) {
            return Err(Error::configuration("max_age_days must be positive"));
        }
        Ok(())
    }
}

/// Pick the ids to evict from `entries` under `policy`, in eviction order.
pub fn select_for_eviction(
    entries: &[MemoryEntry],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<MemoryId> {
    let evictable = |e: &&MemoryEntry| !(policy.preserve_persistent && e.metadata.persistent);

    // An age too large to represent has no cutoff
    let cutoff = policy
        .max_age_days
        .and_then(Duration::try_days)
        .and_then(|age| now.checked_sub_signed(age));
    let (expired, mut remaining): (Vec<&MemoryEntry>, Vec<&MemoryEntry>) = entries
        .iter()
        .filter(evictable)
        .partition(|e| cutoff.map_or(false, |c| e.created_at < c));

    let mut selected: Vec<MemoryId> = expired.iter().map(|e| e.id).collect();

    match policy.strategy {
        EvictionStrategy::Lru | EvictionStrategy::Lfu | EvictionStrategy::Fifo => {
            let Some(limit) = policy.max_entries else {
                return selected;
            };
            let retained_total = entries.len() - expired.len();
            if retained_total <= limit {
                return selected;
            }
            let excess = retained_total - limit;
            remaining.sort_by(|a, b| capacity_order(&policy.strategy, a, b));
            selected.extend(remaining.iter().take(excess).map(|e| e.id));
        }
        EvictionStrategy::ImportanceThreshold { min_importance } => {
            remaining.sort_by(|a, b| importance_asc(a, b));
            selected.extend(
                remaining
                    .iter()
                    .filter(|e| e.importance() < min_importance)
                    .map(|e| e.id),
            );
        }
        EvictionStrategy::KeepTopN { keep } => {
            // Most important first; newer wins ties
            remaining.sort_by(|a, b| importance_asc(b, a));
            selected.extend(remaining.iter().skip(keep).map(|e| e.id));
        }
    }

    selected
}

fn capacity_order(strategy: &EvictionStrategy, a: &MemoryEntry, b: &MemoryEntry) -> Ordering {
    match strategy {
        EvictionStrategy::Lfu => a
            .access_count
            .cmp(&b.access_count)
            .then(a.last_accessed_at.cmp(&b.last_accessed_at)),
        EvictionStrategy::Fifo => a.created_at.cmp(&b.created_at),
        _ => a
            .last_accessed_at
            .cmp(&b.last_accessed_at)
            .then(a.created_at.cmp(&b.created_at)),
    }
}

fn importance_asc(a: &MemoryEntry, b: &MemoryEntry) -> Ordering {
    a.importance()
        .partial_cmp(&b.importance())
        .unwrap_or(Ordering::Equal)
        .then(a.created_at.cmp(&b.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryMetadata, MemoryType};
    use pretty_assertions::assert_eq;

    fn entry(importance: f64, age_minutes: i64, now: DateTime<Utc>) -> MemoryEntry {
        MemoryEntry::new(
            "t1",
            format!("importance {}", importance),
            MemoryMetadata::new(MemoryType::Fact).with_importance(importance),
        )
        .with_created_at(now - Duration::minutes(age_minutes))
    }

    #[test]
    fn test_keep_top_n_evicts_lowest() {
        let now = Utc::now();
        let entries = vec![entry(0.2, 3, now), entry(0.9, 2, now), entry(0.5, 1, now)];
        let selected = select_for_eviction(&entries, &RetentionPolicy::keep_top(1), now);
        assert_eq!(selected, vec![entries[2].id, entries[0].id]);
    }

    #[test]
    fn test_importance_threshold() {
        let now = Utc::now();
        let entries = vec![entry(0.1, 3, now), entry(0.6, 2, now), entry(0.3, 1, now)];
        let policy =
            RetentionPolicy::new(EvictionStrategy::ImportanceThreshold { min_importance: 0.5 });
        let selected = select_for_eviction(&entries, &policy, now);
        assert_eq!(selected, vec![entries[0].id, entries[2].id]);
    }

    #[test]
    fn test_fifo_respects_capacity() {
        let now = Utc::now();
        let entries = vec![entry(0.5, 1, now), entry(0.5, 10, now), entry(0.5, 5, now)];
        let policy = RetentionPolicy::new(EvictionStrategy::Fifo).with_max_entries(Some(2));
        assert_eq!(select_for_eviction(&entries, &policy, now), vec![entries[1].id]);

        let roomy = policy.with_max_entries(Some(3));
        assert!(select_for_eviction(&entries, &roomy, now).is_empty());
    }

    #[test]
    fn test_lru_and_lfu_ordering() {
        let now = Utc::now();
        let mut entries = vec![entry(0.5, 30, now), entry(0.5, 20, now), entry(0.5, 10, now)];
        entries[0].record_access(now);
        entries[0].record_access(now);
        entries[1].record_access(now - Duration::minutes(1));

        let lru = RetentionPolicy::new(EvictionStrategy::Lru).with_max_entries(Some(2));
        assert_eq!(select_for_eviction(&entries, &lru, now), vec![entries[2].id]);

        let lfu = RetentionPolicy::new(EvictionStrategy::Lfu).with_max_entries(Some(1));
        assert_eq!(
            select_for_eviction(&entries, &lfu, now),
            vec![entries[2].id, entries[1].id]
        );
    }

    #[test]
    fn test_max_age_and_persistent_preservation() {
        let now = Utc::now();
        let old = entry(0.9, 60 * 24 * 10, now);
        let mut kept = entry(0.9, 60 * 24 * 10, now);
        kept.metadata.persistent = true;
        let fresh = entry(0.9, 1, now);
        let entries = vec![old.clone(), kept.clone(), fresh];

        let policy = RetentionPolicy::default().with_max_age_days(Some(7));
        assert_eq!(select_for_eviction(&entries, &policy, now), vec![old.id]);

        let unprotected = policy.with_preserve_persistent(false);
        let selected = select_for_eviction(&entries, &unprotected, now);
        assert!(selected.contains(&kept.id));
    }

    #[test]
    fn test_unrepresentable_max_age_has_no_cutoff() {
        let now = Utc::now();
        let entries = vec![entry(0.5, 60 * 24 * 365, now), entry(0.5, 1, now)];
        for days in [1_000_000_000_000_000, i64::MAX, 100_000_000] {
            let policy = RetentionPolicy::default().with_max_age_days(Some(days));
            assert!(policy.validate().is_ok());
            assert!(select_for_eviction(&entries, &policy, now).is_empty());
        }
    }

    #[test]
    fn test_validate() {
        assert!(RetentionPolicy::default().validate().is_ok());
        let bad = RetentionPolicy::new(EvictionStrategy::ImportanceThreshold {
            min_importance: 1.5,
        });
        assert!(bad.validate().is_err());
        assert!(RetentionPolicy::default()
            .with_max_entries(Some(0))
            .validate()
            .is_err());
    }

    #[test]
    fn test_policy_deserializes_tagged_strategy() {
        let policy: RetentionPolicy =
            serde_json::from_str(r#"{"strategy":{"type":"keep_top_n","keep":3}}"#).unwrap();
        assert_eq!(policy.strategy, EvictionStrategy::KeepTopN { keep: 3 });
        assert!(policy.preserve_persistent);
    }
}
