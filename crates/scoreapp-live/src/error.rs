//! Error types for the live client

use scoreapp_core::CoreError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Failed to connect to {url}: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("Websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Live client has stopped")]
    ClientStopped,

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = core::result::Result<T, LiveError>;
