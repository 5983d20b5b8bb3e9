//! Shared admission counters.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// Current count and configured limit for one rule.
///
/// Shared by every transaction matching the rule. The count is only ever
/// moved by atomic operations and never rises above the limit.
#[derive(Debug)]
pub struct CounterTag {
    count: AtomicU32,
    limit: u32,
}

impl CounterTag {
    pub fn new(limit: u32) -> Self {
        Self {
            count: AtomicU32::new(0),
            limit,
        }
    }

    /// Take one unit if the count is below the limit.
    pub(crate) fn try_acquire(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.limit).then_some(count + 1)
            })
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// Fingerprint of a normalized rule text.
pub fn fingerprint(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Counters keyed by rule fingerprint.
///
/// Identical rules across rebuilds get the same counter back, so in-flight
/// transactions stay accounted for. Only the first sighting of a fingerprint
/// takes the map's write path.
#[derive(Debug, Default)]
pub struct CounterRegistry {
    counters: DashMap<u64, Arc<CounterTag>>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_for(&self, fingerprint: u64, limit: u32) -> Arc<CounterTag> {
        if let Some(existing) = self.counters.get(&fingerprint) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.counters
                .entry(fingerprint)
                .or_insert_with(|| Arc::new(CounterTag::new(limit)))
                .value(),
        )
    }

    /// Drop counters nobody but the registry references any more.
    pub fn prune(&self) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, tag| Arc::strong_count(tag) > 1);
        before - self.counters.len()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}
