//! Property-based tests for entry normalization and eviction selection.
//!
//! - Importance always lands in [0, 1], whatever the input
//! - Keep-top-N never evicts more than it must, and never a kept entry
//! - Persistent entries survive every strategy when preservation is on
//! - Capacity strategies bring the store down to exactly `max_entries`

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    use crate::memory::{
        clamp_importance, select_for_eviction, EvictionStrategy, MemoryEntry, MemoryMetadata,
        MemoryType, RetentionPolicy,
    };

    fn strategy() -> impl Strategy<Value = EvictionStrategy> {
        prop_oneof![
            Just(EvictionStrategy::Lru),
            Just(EvictionStrategy::Lfu),
            Just(EvictionStrategy::Fifo),
            (0.0f64..=1.0).prop_map(|min_importance| EvictionStrategy::ImportanceThreshold {
                min_importance
            }),
            (0usize..6).prop_map(|keep| EvictionStrategy::KeepTopN { keep }),
        ]
    }

    // (importance, age in minutes, access count, persistent)
    fn entries() -> impl Strategy<Value = Vec<(f64, i64, u64, bool)>> {
        prop::collection::vec((0.0f64..=1.0, 0i64..10_000, 0u64..20, any::<bool>()), 0..12)
    }

    fn build(specs: &[(f64, i64, u64, bool)]) -> Vec<MemoryEntry> {
        let now = Utc::now();
        specs
            .iter()
            .map(|&(importance, age, accesses, persistent)| {
                let mut meta = MemoryMetadata::new(MemoryType::Fact).with_importance(importance);
                meta.persistent = persistent;
                let mut entry = MemoryEntry::new("t", "c", meta)
                    .with_created_at(now - Duration::minutes(age));
                for _ in 0..accesses {
                    entry.record_access(now);
                }
                entry
            })
            .collect()
    }

    proptest! {
        #[test]
        fn importance_is_always_clamped(value in any::<f64>()) {
            let clamped = clamp_importance(value);
            prop_assert!((0.0..=1.0).contains(&clamped), "{} -> {}", value, clamped);
        }

        #[test]
        fn persistent_entries_are_preserved(specs in entries(), strategy in strategy()) {
            let entries = build(&specs);
            let policy = RetentionPolicy::new(strategy)
                .with_max_entries(Some(1))
                .with_max_age_days(Some(1));
            let selected: HashSet<_> =
                select_for_eviction(&entries, &policy, Utc::now()).into_iter().collect();
            for entry in entries.iter().filter(|e| e.metadata.persistent) {
                prop_assert!(!selected.contains(&entry.id));
            }
        }

        #[test]
        fn selection_has_no_duplicates(specs in entries(), strategy in strategy()) {
            let entries = build(&specs);
            let policy = RetentionPolicy::new(strategy).with_max_age_days(Some(3));
            let selected = select_for_eviction(&entries, &policy, Utc::now());
            let unique: HashSet<_> = selected.iter().collect();
            prop_assert_eq!(unique.len(), selected.len());
        }

        #[test]
        fn keep_top_n_keeps_the_most_important(specs in entries(), keep in 0usize..6) {
            let entries = build(&specs);
            let policy = RetentionPolicy::keep_top(keep).with_preserve_persistent(false);
            let selected: HashSet<_> =
                select_for_eviction(&entries, &policy, Utc::now()).into_iter().collect();

            prop_assert_eq!(selected.len(), entries.len().saturating_sub(keep));
            let min_kept = entries
                .iter()
                .filter(|e| !selected.contains(&e.id))
                .map(|e| e.importance())
                .fold(f64::INFINITY, f64::min);
            for entry in entries.iter().filter(|e| selected.contains(&e.id)) {
                prop_assert!(entry.importance() <= min_kept);
            }
        }

        #[test]
        fn capacity_strategies_hit_the_limit(specs in entries(), limit in 1usize..8) {
            let entries = build(&specs);
            for strategy in [EvictionStrategy::Lru, EvictionStrategy::Lfu, EvictionStrategy::Fifo] {
                let policy = RetentionPolicy::new(strategy)
                    .with_max_entries(Some(limit))
                    .with_preserve_persistent(false);
                let selected = select_for_eviction(&entries, &policy, Utc::now());
                prop_assert_eq!(selected.len(), entries.len().saturating_sub(limit));
            }
        }
    }
}
