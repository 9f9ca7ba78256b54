//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand, ValueEnum};

use scoreapp_core::{CrossingId, CrossingTeam, RaceId};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Live feed websocket URL (overrides the configuration file)
    #[arg(long)]
    pub url: Option<String>,

    /// Snapshot API base URL (overrides the configuration file)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Bearer token for race control requests
    #[arg(long, env = "SCOREAPP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch one race live, printing stats on every revision
    Watch {
        race_id: RaceId,
    },
    /// Follow whichever race the backend marks as current
    Follow,
    /// Print the barriers that are online
    Barriers {
        /// Keep printing updates until interrupted
        #[arg(short, long)]
        watch: bool,
    },
    /// Fetch a race once and print its stats
    Stats {
        race_id: RaceId,
        /// Print the computed stats as JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect to the live feed and report the connection state
    Status,
    /// Start, stop or cancel a race
    Race {
        #[arg(value_enum)]
        action: RaceAction,
        race_id: RaceId,
    },
    /// Reassign or ignore a crossing
    Crossing {
        crossing_id: CrossingId,
        /// Exclude the crossing from timing
        #[arg(long)]
        ignored: bool,
        #[arg(long, value_enum, default_value_t = TeamArg::None)]
        team: TeamArg,
        /// Mark the crossing as an interrupted run
        #[arg(long)]
        interrupted: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RaceAction {
    Start,
    Stop,
    Cancel,
}

impl RaceAction {
    /// Path segment of the control endpoint
    pub fn as_path(self) -> &'static str {
        match self {
            RaceAction::Start => "start",
            RaceAction::Stop => "stop",
            RaceAction::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TeamArg {
    None,
    A,
    B,
}

impl From<TeamArg> for CrossingTeam {
    fn from(team: TeamArg) -> Self {
        match team {
            TeamArg::None => CrossingTeam::Unset,
            TeamArg::A => CrossingTeam::A,
            TeamArg::B => CrossingTeam::B,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_with_overrides() {
        let cli = Cli::try_parse_from([
            "scoreapp",
            "--url",
            "ws://timing.local/ws",
            "-v",
            "watch",
            "12",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.url.as_deref(), Some("ws://timing.local/ws"));
        assert!(matches!(cli.command, Commands::Watch { race_id: 12 }));
    }

    #[test]
    fn test_parse_crossing_update() {
        let cli =
            Cli::try_parse_from(["scoreapp", "crossing", "5", "--team", "b", "--ignored"]).unwrap();
        match cli.command {
            Commands::Crossing {
                crossing_id,
                ignored,
                team,
                interrupted,
            } => {
                assert_eq!(crossing_id, 5);
                assert!(ignored);
                assert!(!interrupted);
                assert_eq!(CrossingTeam::from(team), CrossingTeam::B);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_race_action_paths() {
        let cli = Cli::try_parse_from(["scoreapp", "race", "cancel", "3"]).unwrap();
        match cli.command {
            Commands::Race { action, race_id } => {
                assert_eq!(action.as_path(), "cancel");
                assert_eq!(race_id, 3);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["scoreapp", "race", "pause", "3"]).is_err());
    }
}
