//! Race-level statistics
//!
//! Time trials run the lap computation once over unattributed crossings;
//! head-to-head races run it once per team, each against its own home
//! barrier, and merge the annotations back into a single crossing list.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::lap_stats::{compute_team_stats, LapStatsOptions, TeamTiming};
use super::{AnnotatedCrossing, CrossingAnnotation, TeamStats};
use crate::errors::{CoreError, Result};
use crate::types::{CrossingTeam, FullRace, Millis, Race, RaceId, RaceType};

// ----------------------------------------------------------------------------
// Race Stats
// ----------------------------------------------------------------------------

/// Statistics of a race, tagged with the race type they were computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RaceStats {
    TimeTrial(TeamStats),
    HeadToHead {
        #[serde(rename = "teamA")]
        team_a: TeamStats,
        #[serde(rename = "teamB")]
        team_b: TeamStats,
    },
}

impl RaceStats {
    pub fn race_type(&self) -> RaceType {
        match self {
            RaceStats::TimeTrial(_) => RaceType::TimeTrial,
            RaceStats::HeadToHead { .. } => RaceType::HeadToHead,
        }
    }

    /// Fail when these stats were computed for a different kind of race
    pub fn ensure_type(&self, race: &Race) -> Result<()> {
        if self.race_type() == race.race_type {
            Ok(())
        } else {
            Err(CoreError::StatsTypeMismatch {
                race_id: race.id,
                race: race.race_type,
                stats: self.race_type(),
            })
        }
    }

    /// Stats of one team; time trials only answer for [`CrossingTeam::Unset`]
    pub fn team(&self, team: CrossingTeam) -> Option<&TeamStats> {
        match (self, team) {
            (RaceStats::TimeTrial(stats), CrossingTeam::Unset) => Some(stats),
            (RaceStats::HeadToHead { team_a, .. }, CrossingTeam::A) => Some(team_a),
            (RaceStats::HeadToHead { team_b, .. }, CrossingTeam::B) => Some(team_b),
            _ => None,
        }
    }
}

/// Output of one aggregation pass over one race revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceComputation {
    pub race_id: RaceId,
    pub updated_at: Millis,
    pub stats: RaceStats,
    pub crossings: Vec<AnnotatedCrossing>,
}

// ----------------------------------------------------------------------------
// Aggregation
// ----------------------------------------------------------------------------

pub fn compute_race_stats(race: &FullRace) -> RaceComputation {
    compute_race_stats_with(race, LapStatsOptions::default())
}

pub fn compute_race_stats_with(race: &FullRace, options: LapStatsOptions) -> RaceComputation {
    let crossings = &race.crossings;

    let (stats, annotations) = match race.race_type {
        RaceType::TimeTrial => {
            let timing = compute_team_stats(
                crossings,
                CrossingTeam::Unset,
                race.team_a_barrier_id,
                race,
                options,
            );
            (RaceStats::TimeTrial(timing.stats), timing.annotations)
        }
        RaceType::HeadToHead => {
            let team_a = compute_team_stats(
                crossings,
                CrossingTeam::A,
                race.team_a_barrier_id,
                race,
                options,
            );
            let team_b = match race.team_b_barrier_id {
                Some(barrier) => {
                    compute_team_stats(crossings, CrossingTeam::B, barrier, race, options)
                }
                None => {
                    warn!("Head-to-head race {} has no barrier for team B", race.id);
                    TeamTiming::unknown(crossings.len())
                }
            };
            let annotations = merge_annotations(team_a.annotations, team_b.annotations);
            (
                RaceStats::HeadToHead {
                    team_a: team_a.stats,
                    team_b: team_b.stats,
                },
                annotations,
            )
        }
    };

    debug!(
        "Computed {} stats for race {} at revision {}",
        stats.race_type(),
        race.id,
        race.updated_at
    );

    RaceComputation {
        race_id: race.id,
        updated_at: race.updated_at,
        stats,
        crossings: crossings
            .iter()
            .cloned()
            .zip(annotations)
            .map(|(crossing, annotation)| AnnotatedCrossing {
                crossing,
                annotation,
            })
            .collect(),
    }
}

fn merge_annotations(
    mut base: Vec<CrossingAnnotation>,
    other: Vec<CrossingAnnotation>,
) -> Vec<CrossingAnnotation> {
    for (annotation, extra) in base.iter_mut().zip(other) {
        annotation.merge(extra);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::Lap;
    use crate::types::Crossing;
    use serde_json::json;

    fn head_to_head() -> FullRace {
        let race = Race::head_to_head(5, 1, 2);
        let crossings = vec![
            Crossing::new(1, 1_000, 1, CrossingTeam::A),
            Crossing::new(2, 1_200, 2, CrossingTeam::B),
            Crossing::new(3, 9_000, 1, CrossingTeam::A),
            Crossing::new(4, 8_200, 2, CrossingTeam::B),
        ];
        FullRace::new(race, crossings)
    }

    #[test]
    fn test_time_trial_stats() {
        let race = FullRace::new(
            Race::time_trial(1, 1),
            vec![
                Crossing::new(1, 1_000, 1, CrossingTeam::Unset),
                Crossing::new(2, 9_000, 1, CrossingTeam::Unset),
            ],
        );

        let result = compute_race_stats(&race);
        let RaceStats::TimeTrial(stats) = result.stats else {
            panic!("expected time trial stats");
        };
        assert_eq!(stats.num_laps, 1);
        assert_eq!(result.crossings.len(), 2);
        assert!(result.crossings[0].annotation.start);
        assert!(result.stats.ensure_type(&race).is_ok());
    }

    #[test]
    fn test_head_to_head_runs_each_team() {
        let race = head_to_head();
        let result = compute_race_stats(&race);

        let a = result.stats.team(CrossingTeam::A).copied().unwrap();
        let b = result.stats.team(CrossingTeam::B).copied().unwrap();
        assert_eq!(a.best_lap_time, 8_000);
        assert_eq!(b.best_lap_time, 7_000);
        assert!(result.crossings[0].annotation.start);
        assert!(result.crossings[1].annotation.start);
        assert_eq!(
            result.crossings[3].annotation.lap,
            Some(Lap { number: 1, time: 7_000 })
        );
        assert!(result.stats.team(CrossingTeam::Unset).is_none());
    }

    #[test]
    fn test_missing_team_b_barrier_gives_unknown_stats() {
        let mut race = head_to_head();
        race.race.team_b_barrier_id = None;

        let result = compute_race_stats(&race);
        assert_eq!(result.stats.team(CrossingTeam::B), Some(&TeamStats::unknown()));
        assert_eq!(result.stats.team(CrossingTeam::A).unwrap().num_laps, 1);
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let race = head_to_head();
        let stats = RaceStats::TimeTrial(TeamStats::unknown());
        let err = stats.ensure_type(&race).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_stats_are_tagged_by_type() {
        let value = serde_json::to_value(RaceStats::HeadToHead {
            team_a: TeamStats::unknown(),
            team_b: TeamStats::unknown(),
        })
        .unwrap();
        assert_eq!(value["type"], json!("head_to_head"));
        assert_eq!(value["teamA"]["startTime"], json!(-1));

        let value = serde_json::to_value(RaceStats::TimeTrial(TeamStats::unknown())).unwrap();
        assert_eq!(value["type"], json!("time_trial"));
        assert_eq!(value["numLaps"], json!(0));
    }
}
