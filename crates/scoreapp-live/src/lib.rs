//! ScoreApp Live Feed Client
//!
//! Runs the core connection state machine on tokio: a driver task executes
//! its effects against a websocket transport and routes inbound frames to
//! race, barrier and current-race listeners.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod client;
mod driver;
pub mod error;
pub mod transport;
pub mod ws;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use client::LiveClient;
pub use error::{LiveError, Result};
pub use transport::{Connection, Connector, Incoming};
pub use ws::{WsConnection, WsConnector};
