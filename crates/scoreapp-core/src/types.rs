//! Race data model
//!
//! Wire shapes of races, teams and barrier crossings as they arrive from the
//! snapshot API and the live feed. Keys are camelCase and timestamps are epoch
//! milliseconds; timestamps encoded as JSON floats are truncated.

use core::fmt;
use core::ops::Deref;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Identifiers and Time
// ----------------------------------------------------------------------------

pub type RaceId = u64;
pub type TeamId = u64;
pub type CrossingId = u64;
pub type BarrierId = u32;

/// Epoch milliseconds, or a duration in milliseconds
pub type Millis = i64;

/// Sentinel used by [`crate::timing::TeamStats`] for values that are not known yet
pub const UNKNOWN: Millis = -1;

/// Lift a sentinel-encoded value into an `Option`
pub fn known(value: i64) -> Option<i64> {
    (value != UNKNOWN).then_some(value)
}

struct MillisVisitor;

impl<'de> Visitor<'de> for MillisVisitor {
    type Value = Millis;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("milliseconds as a JSON number")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Millis, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Millis, E> {
        Millis::try_from(v).map_err(|_| E::custom("milliseconds out of range"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Millis, E> {
        if v.is_finite() {
            Ok(v.trunc() as Millis)
        } else {
            Err(E::custom("milliseconds must be finite"))
        }
    }
}

pub(crate) fn deserialize_millis<'de, D>(deserializer: D) -> Result<Millis, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(MillisVisitor)
}

pub(crate) fn deserialize_optional_millis<'de, D>(
    deserializer: D,
) -> Result<Option<Millis>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "deserialize_millis")] Millis);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(v)| v))
}

// ----------------------------------------------------------------------------
// Enumerations
// ----------------------------------------------------------------------------

/// Kind of race, which decides how many teams are timed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceType {
    TimeTrial,
    HeadToHead,
}

impl fmt::Display for RaceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RaceType::TimeTrial => write!(f, "time_trial"),
            RaceType::HeadToHead => write!(f, "head_to_head"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceState {
    BeforeStart,
    Running,
    Finished,
    Unfinished,
}

impl RaceState {
    /// Finished and unfinished races receive no further crossings
    pub fn is_terminal(self) -> bool {
        matches!(self, RaceState::Finished | RaceState::Unfinished)
    }
}

impl fmt::Display for RaceState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RaceState::BeforeStart => "before_start",
            RaceState::Running => "running",
            RaceState::Finished => "finished",
            RaceState::Unfinished => "unfinished",
        };
        f.write_str(name)
    }
}

/// Team a crossing is attributed to. Encoded on the wire as `0 | 1 | 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CrossingTeam {
    /// Time trials attribute every crossing to no team
    #[default]
    Unset,
    A,
    B,
}

impl From<CrossingTeam> for u8 {
    fn from(team: CrossingTeam) -> u8 {
        match team {
            CrossingTeam::Unset => 0,
            CrossingTeam::A => 1,
            CrossingTeam::B => 2,
        }
    }
}

impl TryFrom<u8> for CrossingTeam {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CrossingTeam::Unset),
            1 => Ok(CrossingTeam::A),
            2 => Ok(CrossingTeam::B),
            other => Err(format!("unknown crossing team {}", other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Records
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<Millis>,
    #[serde(default)]
    pub name: String,
}

/// One vehicle passing one barrier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Crossing {
    pub id: CrossingId,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<Millis>,
    #[serde(deserialize_with = "deserialize_millis")]
    pub time: Millis,
    #[serde(default)]
    pub ignored: bool,
    pub barrier_id: BarrierId,
    #[serde(default)]
    pub team: CrossingTeam,
    /// Marked by the operator as an interrupted run; informational only
    #[serde(default)]
    pub interrupted: bool,
}

impl Crossing {
    pub fn new(id: CrossingId, time: Millis, barrier_id: BarrierId, team: CrossingTeam) -> Self {
        Self {
            id,
            updated_at: None,
            time,
            ignored: false,
            barrier_id,
            team,
            interrupted: false,
        }
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }
}

/// Race header without its crossing log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Race {
    pub id: RaceId,
    #[serde(deserialize_with = "deserialize_millis")]
    pub updated_at: Millis,
    #[serde(rename = "type")]
    pub race_type: RaceType,
    pub state: RaceState,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub team_a_id: TeamId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_a: Option<Team>,
    pub team_a_barrier_id: BarrierId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_b_id: Option<TeamId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_b: Option<Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_b_barrier_id: Option<BarrierId>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_duration: Option<Millis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laps_duration: Option<u32>,
}

impl Race {
    /// Time trial with a single team passing `barrier_id`
    pub fn time_trial(id: RaceId, barrier_id: BarrierId) -> Self {
        Self {
            id,
            updated_at: 0,
            race_type: RaceType::TimeTrial,
            state: RaceState::Running,
            round: 0,
            team_a_id: 0,
            team_a: None,
            team_a_barrier_id: barrier_id,
            team_b_id: None,
            team_b: None,
            team_b_barrier_id: None,
            time_duration: None,
            laps_duration: None,
        }
    }

    /// Head-to-head race where each team has its own home barrier
    pub fn head_to_head(id: RaceId, barrier_a: BarrierId, barrier_b: BarrierId) -> Self {
        Self {
            race_type: RaceType::HeadToHead,
            team_b_id: Some(0),
            team_b_barrier_id: Some(barrier_b),
            ..Self::time_trial(id, barrier_a)
        }
    }

    /// Duration after which crossings no longer count, for fixed-time races
    pub fn fixed_time_duration(&self) -> Option<Millis> {
        match (self.race_type, self.time_duration) {
            (RaceType::TimeTrial, Some(duration)) if duration > 0 => Some(duration),
            _ => None,
        }
    }
}

/// Race together with its ordered crossing log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullRace {
    #[serde(flatten)]
    pub race: Race,
    #[serde(default)]
    pub crossings: Vec<Crossing>,
}

impl FullRace {
    pub fn new(race: Race, crossings: Vec<Crossing>) -> Self {
        Self { race, crossings }
    }
}

impl Deref for FullRace {
    type Target = Race;

    fn deref(&self) -> &Race {
        &self.race
    }
}

/// Pointer to the race currently shown on the presentation screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RaceRef {
    pub id: RaceId,
}
