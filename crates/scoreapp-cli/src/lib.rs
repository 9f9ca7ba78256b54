//! ScoreApp CLI library
//!
//! Components of the `scoreapp` command-line client: argument parsing,
//! configuration, the snapshot/control API client, text rendering and the
//! command handlers that tie them to the live feed.

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod render;

pub use api::{CrossingUpdate, RaceApi};
pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
