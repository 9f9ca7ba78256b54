//! Memoized race statistics
//!
//! A race is recomputed only when a new revision (greater `updatedAt`) is
//! seen. One entry per race id is kept, always the newest revision computed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use super::aggregator::{compute_race_stats_with, RaceComputation};
use super::lap_stats::LapStatsOptions;
use crate::types::{FullRace, RaceId};

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe cache of [`RaceComputation`] keyed by `(race id, updatedAt)`
#[derive(Debug, Default)]
pub struct RaceStatsCache {
    entries: Mutex<HashMap<RaceId, Arc<RaceComputation>>>,
    options: LapStatsOptions,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RaceStatsCache {
    pub fn new(options: LapStatsOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> LapStatsOptions {
        self.options
    }

    /// Return the computation for this exact revision, computing it on a miss
    pub fn get_or_compute(&self, race: &FullRace) -> Arc<RaceComputation> {
        if let Some(hit) = self.lookup(race) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("Stats cache hit for race {} at {}", race.id, race.updated_at);
            return hit;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let computed = Arc::new(compute_race_stats_with(race, self.options));

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&race.id) {
            Some(existing) if existing.updated_at > computed.updated_at => {}
            _ => {
                entries.insert(race.id, Arc::clone(&computed));
            }
        }
        computed
    }

    fn lookup(&self, race: &FullRace) -> Option<Arc<RaceComputation>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&race.id)
            .filter(|entry| entry.updated_at == race.updated_at)
            .cloned()
    }

    pub fn invalidate(&self, race_id: RaceId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&race_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
