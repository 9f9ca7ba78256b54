//! ScoreApp Core
//!
//! Runtime-free building blocks of the live race timing client: the race data
//! model, the lap/checkpoint timing engine and its race-level aggregation, the
//! listener registries and frame router of the live feed, and the sans-IO
//! connection state machine with its retry policies.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod connection;
pub mod errors;
pub mod listeners;
pub mod protocol;
pub mod retry;
pub mod timing;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{validate_live_url, LiveConfig, TimingConfig, DEFAULT_LIVE_URL};
pub use connection::{
    CloseInfo, ConnectionState, ConnectionStateMachine, ConnectionStateName, Effect, Generation,
    TransportEvent, TransportOutcome,
};
pub use errors::{ApiError, CoreError, Result};
pub use listeners::{ListenerRegistry, ListenerSet, Subscription};
pub use protocol::{InboundFrame, MessageRouter, RouteSummary};
pub use retry::{ConstantRetry, LinearRetry, NoRetry, RetryConfig, RetryLimit, RetryPolicy};
pub use timing::{
    compute_race_stats, compute_race_stats_with, compute_team_stats, AnnotatedCrossing,
    CrossingAnnotation, Lap, LapCheckpoint, LapStatsOptions, NegativeDiffPolicy,
    RaceComputation, RaceDataTracker, RaceSnapshot, RaceStats, RaceStatsCache, SnapshotSource,
    TeamStats, TeamTiming, TrackedRace,
};
pub use types::{
    BarrierId, Crossing, CrossingId, CrossingTeam, FullRace, Millis, Race, RaceId, RaceRef,
    RaceState, RaceType, Team, TeamId, UNKNOWN,
};
