//! Single-team lap computation
//!
//! One left-to-right pass over a race's crossing log. The first home-barrier
//! crossing of the team starts the race, every later one closes a lap, and any
//! other barrier in between is a checkpoint of the running lap. The input is
//! never mutated; derived fields are returned as a parallel annotation list.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CrossingAnnotation, Lap, LapCheckpoint, TeamStats};
use crate::types::{BarrierId, Crossing, CrossingTeam, Millis, Race, UNKNOWN};

// ----------------------------------------------------------------------------
// Options
// ----------------------------------------------------------------------------

/// Handling of crossings timed before the previous home-barrier crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeDiffPolicy {
    /// Log and keep the negative lap/checkpoint time
    #[default]
    Retain,
    /// Mark the crossing excluded and leave lap state untouched
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LapStatsOptions {
    #[serde(default)]
    pub negative_diff: NegativeDiffPolicy,
}

impl LapStatsOptions {
    pub fn rejecting_negative_diffs() -> Self {
        Self {
            negative_diff: NegativeDiffPolicy::Reject,
        }
    }
}

// ----------------------------------------------------------------------------
// Computation
// ----------------------------------------------------------------------------

/// Result of one pass: stats plus one annotation per input crossing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamTiming {
    pub stats: TeamStats,
    pub annotations: Vec<CrossingAnnotation>,
}

impl TeamTiming {
    /// Timing of a team that cannot be computed, e.g. without a home barrier
    pub fn unknown(crossing_count: usize) -> Self {
        Self {
            stats: TeamStats::unknown(),
            annotations: vec![CrossingAnnotation::default(); crossing_count],
        }
    }
}

/// Compute the timing of `team` over `crossings`, using `home_barrier_id` as
/// its start/finish line.
pub fn compute_team_stats(
    crossings: &[Crossing],
    team: CrossingTeam,
    home_barrier_id: BarrierId,
    race: &Race,
    options: LapStatsOptions,
) -> TeamTiming {
    let mut stats = TeamStats::unknown();
    let mut annotations = vec![CrossingAnnotation::default(); crossings.len()];
    let fixed_duration = race.fixed_time_duration();

    let mut best_lap: Option<Millis> = None;
    let mut last_home_time: Option<Millis> = None;
    let mut checkpoint_number = 0u32;

    for (crossing, annotation) in crossings.iter().zip(annotations.iter_mut()) {
        if crossing.ignored || crossing.team != team {
            continue;
        }

        let through_home = crossing.barrier_id == home_barrier_id;

        if through_home && stats.start_time == UNKNOWN {
            annotation.start = true;
            stats.start_time = crossing.time;
            stats.current_lap_start_time = crossing.time;
            if let Some(duration) = fixed_duration {
                stats.stop_time = crossing.time.saturating_add(duration);
            }
        }

        if stats.stop_time != UNKNOWN && crossing.time > stats.stop_time {
            annotation.excluded = true;
            continue;
        }

        if let Some(last) = last_home_time {
            let diff = crossing.time.saturating_sub(last);
            if diff < 0 {
                annotation.out_of_order = true;
                warn!(
                    "Crossing {} of race {} is {}ms before the previous home-barrier crossing",
                    crossing.id, race.id, diff.saturating_neg()
                );
                if options.negative_diff == NegativeDiffPolicy::Reject {
                    annotation.excluded = true;
                    continue;
                }
            }

            if through_home {
                stats.num_laps += 1;
                checkpoint_number = 0;
                annotation.lap = Some(Lap {
                    number: stats.num_laps,
                    time: diff,
                });
                stats.current_lap_start_time = crossing.time;
                if best_lap.map_or(true, |best| diff < best) {
                    best_lap = Some(diff);
                    stats.best_lap_crossing_id = crossing.id as i64;
                }
            } else {
                checkpoint_number += 1;
                annotation.checkpoint = Some(LapCheckpoint {
                    lap_number: stats.num_laps + 1,
                    number: checkpoint_number,
                    time: diff,
                });
            }
        }

        if through_home {
            last_home_time = Some(crossing.time);
        }
    }

    if stats.stop_time == UNKNOWN && race.state.is_terminal() {
        if let Some(last) = last_home_time {
            stats.stop_time = last;
        }
    }
    stats.best_lap_time = best_lap.unwrap_or(UNKNOWN);

    debug!(
        "Race {} team {:?}: {} laps, best {}ms",
        race.id, team, stats.num_laps, stats.best_lap_time
    );

    TeamTiming { stats, annotations }
}
