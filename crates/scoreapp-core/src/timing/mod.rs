//! Lap and checkpoint timing
//!
//! [`lap_stats`] turns one team's crossings into [`TeamStats`] plus per-crossing
//! annotations, [`aggregator`] composes those runs per race type, [`cache`]
//! memoizes the result per race revision and [`tracker`] keeps the newest
//! revision of a race regardless of whether it was fetched or pushed.

pub mod aggregator;
pub mod cache;
pub mod lap_stats;
pub mod tracker;

use serde::{Deserialize, Serialize};

use crate::types::{known, Crossing, Millis, UNKNOWN};

pub use aggregator::{compute_race_stats, compute_race_stats_with, RaceComputation, RaceStats};
pub use cache::{CacheStats, RaceStatsCache};
pub use lap_stats::{compute_team_stats, LapStatsOptions, NegativeDiffPolicy, TeamTiming};
pub use tracker::{RaceDataTracker, RaceSnapshot, SnapshotSource, TrackedRace};

// ----------------------------------------------------------------------------
// Team Statistics
// ----------------------------------------------------------------------------

/// Timing summary of one team. Every time field is `-1` while unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStats {
    pub start_time: Millis,
    pub stop_time: Millis,
    pub num_laps: u32,
    pub best_lap_time: Millis,
    pub best_lap_crossing_id: i64,
    pub current_lap_start_time: Millis,
}

impl TeamStats {
    /// Stats of a team that has not crossed its home barrier
    pub const fn unknown() -> Self {
        Self {
            start_time: UNKNOWN,
            stop_time: UNKNOWN,
            num_laps: 0,
            best_lap_time: UNKNOWN,
            best_lap_crossing_id: UNKNOWN,
            current_lap_start_time: UNKNOWN,
        }
    }

    pub fn start(&self) -> Option<Millis> {
        known(self.start_time)
    }

    pub fn stop(&self) -> Option<Millis> {
        known(self.stop_time)
    }

    pub fn best_lap(&self) -> Option<Millis> {
        known(self.best_lap_time)
    }

    /// Time spent on the running lap at `now`, if the team is still racing
    pub fn current_lap_elapsed(&self, now: Millis) -> Option<Millis> {
        if self.stop().is_some() {
            return None;
        }
        known(self.current_lap_start_time).map(|start| now.saturating_sub(start))
    }

    /// Total race time at `now`, frozen at the stop time once known
    pub fn elapsed(&self, now: Millis) -> Option<Millis> {
        let start = self.start()?;
        Some(self.stop().unwrap_or(now).saturating_sub(start))
    }
}

impl Default for TeamStats {
    fn default() -> Self {
        Self::unknown()
    }
}

// ----------------------------------------------------------------------------
// Crossing Annotations
// ----------------------------------------------------------------------------

/// Split time of a non-home barrier within the running lap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapCheckpoint {
    pub lap_number: u32,
    pub number: u32,
    pub time: Millis,
}

/// A completed lap closed by a home-barrier crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lap {
    pub number: u32,
    pub time: Millis,
}

/// Fields derived for one crossing during a timing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossingAnnotation {
    #[serde(default, skip_serializing_if = "is_false")]
    pub start: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub excluded: bool,
    /// The crossing happened before the previous home-barrier crossing
    #[serde(default, skip_serializing_if = "is_false")]
    pub out_of_order: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<LapCheckpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lap: Option<Lap>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl CrossingAnnotation {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold another pass's annotation of the same crossing into this one
    pub fn merge(&mut self, other: CrossingAnnotation) {
        self.start |= other.start;
        self.excluded |= other.excluded;
        self.out_of_order |= other.out_of_order;
        self.checkpoint = self.checkpoint.or(other.checkpoint);
        self.lap = self.lap.or(other.lap);
    }
}

/// Crossing together with its derived fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedCrossing {
    #[serde(flatten)]
    pub crossing: Crossing,
    #[serde(flatten)]
    pub annotation: CrossingAnnotation,
}
