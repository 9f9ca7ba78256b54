//! Latest known revision of one race
//!
//! A race view receives data from two sources: a snapshot fetched on demand
//! and snapshots pushed by the live feed. Whichever carries the greater
//! `updatedAt` wins; ties keep the value already held.

use std::sync::Arc;

use tracing::{debug, info};

use super::aggregator::RaceComputation;
use super::cache::RaceStatsCache;
use crate::errors::{ApiError, CoreError, Result};
use crate::types::{FullRace, Millis, RaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Fetched,
    Pushed,
}

#[derive(Debug, Clone)]
pub struct RaceSnapshot {
    pub race: Arc<FullRace>,
    pub computation: Arc<RaceComputation>,
    pub source: SnapshotSource,
}

#[derive(Debug, Clone)]
pub enum TrackedRace {
    /// Nothing received yet
    Loading,
    /// The snapshot API does not know the race
    NotFound,
    /// The snapshot request failed before any data arrived
    Failed(ApiError),
    Ready(RaceSnapshot),
}

pub struct RaceDataTracker {
    race_id: RaceId,
    current: TrackedRace,
    cache: Arc<RaceStatsCache>,
}

impl RaceDataTracker {
    pub fn new(race_id: RaceId, cache: Arc<RaceStatsCache>) -> Self {
        Self {
            race_id,
            current: TrackedRace::Loading,
            cache,
        }
    }

    pub fn race_id(&self) -> RaceId {
        self.race_id
    }

    pub fn current(&self) -> &TrackedRace {
        &self.current
    }

    pub fn snapshot(&self) -> Option<&RaceSnapshot> {
        match &self.current {
            TrackedRace::Ready(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn updated_at(&self) -> Option<Millis> {
        self.snapshot().map(|snapshot| snapshot.race.updated_at)
    }

    /// Offer a revision of the race. Returns whether it replaced the held one.
    pub fn offer(&mut self, race: Arc<FullRace>, source: SnapshotSource) -> Result<bool> {
        if race.id != self.race_id {
            return Err(CoreError::RaceIdMismatch {
                expected: self.race_id,
                actual: race.id,
            });
        }

        if let Some(held) = self.updated_at() {
            if race.updated_at <= held {
                debug!(
                    "Dropping {:?} revision {} of race {}, holding {}",
                    source, race.updated_at, race.id, held
                );
                return Ok(false);
            }
        }

        let computation = self.cache.get_or_compute(&race);
        computation.stats.ensure_type(&race)?;

        info!(
            "Race {} updated to revision {} ({:?})",
            race.id, race.updated_at, source
        );
        self.current = TrackedRace::Ready(RaceSnapshot {
            race,
            computation,
            source,
        });
        Ok(true)
    }

    /// Record the result of a snapshot request
    ///
    /// Absence and failures only replace a view that has no data yet.
    pub fn record_fetch(
        &mut self,
        outcome: core::result::Result<Option<FullRace>, ApiError>,
    ) -> Result<bool> {
        match outcome {
            Ok(Some(race)) => self.offer(Arc::new(race), SnapshotSource::Fetched),
            Ok(None) if self.snapshot().is_none() => {
                self.current = TrackedRace::NotFound;
                Ok(true)
            }
            Err(err) if self.snapshot().is_none() => {
                self.current = TrackedRace::Failed(err);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Race, RaceType};

    fn revision(id: RaceId, updated_at: Millis) -> Arc<FullRace> {
        let mut race = Race::time_trial(id, 1);
        race.updated_at = updated_at;
        Arc::new(FullRace::new(race, Vec::new()))
    }

    fn tracker() -> RaceDataTracker {
        RaceDataTracker::new(1, Arc::new(RaceStatsCache::default()))
    }

    #[test]
    fn test_newer_revision_replaces_older() {
        let mut tracker = tracker();
        assert!(tracker.offer(revision(1, 10), SnapshotSource::Fetched).unwrap());
        assert!(tracker.offer(revision(1, 20), SnapshotSource::Pushed).unwrap());
        assert!(!tracker.offer(revision(1, 15), SnapshotSource::Fetched).unwrap());
        assert!(!tracker.offer(revision(1, 20), SnapshotSource::Fetched).unwrap());

        let snapshot = tracker.snapshot().unwrap();
        assert_eq!(snapshot.race.updated_at, 20);
        assert_eq!(snapshot.source, SnapshotSource::Pushed);
    }

    #[test]
    fn test_foreign_race_is_rejected() {
        let mut tracker = tracker();
        let err = tracker
            .offer(revision(2, 10), SnapshotSource::Pushed)
            .unwrap_err();
        assert!(matches!(err, CoreError::RaceIdMismatch { expected: 1, actual: 2 }));
    }

    #[test]
    fn test_fetch_failure_only_recorded_without_data() {
        let mut tracker = tracker();
        assert!(tracker
            .record_fetch(Err(ApiError::fetch_failed("offline")))
            .unwrap());
        assert!(matches!(tracker.current(), TrackedRace::Failed(_)));

        tracker.offer(revision(1, 5), SnapshotSource::Pushed).unwrap();
        assert!(!tracker.record_fetch(Ok(None)).unwrap());
        assert!(tracker.snapshot().is_some());
    }

    #[test]
    fn test_not_found_before_data() {
        let mut tracker = tracker();
        assert!(tracker.record_fetch(Ok(None)).unwrap());
        assert!(matches!(tracker.current(), TrackedRace::NotFound));
    }

    #[test]
    fn test_fetched_race_is_computed() {
        let mut tracker = tracker();
        let mut race = (*revision(1, 3)).clone();
        race.race.race_type = RaceType::HeadToHead;
        race.race.team_b_barrier_id = Some(2);

        assert!(tracker.record_fetch(Ok(Some(race))).unwrap());
        let snapshot = tracker.snapshot().unwrap();
        assert_eq!(snapshot.computation.stats.race_type(), RaceType::HeadToHead);
        assert_eq!(snapshot.source, SnapshotSource::Fetched);
    }
}
