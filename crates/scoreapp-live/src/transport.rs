//! Transport abstraction
//!
//! The driver only needs to open a connection to a URL, read inbound frames
//! and close it. Production uses [`crate::ws::WsConnector`]; tests plug in
//! in-memory connectors.

use async_trait::async_trait;
use scoreapp_core::CloseInfo;

use crate::error::Result;

/// Inbound frame as seen by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    /// Ping, pong or other control traffic; only proves liveness
    Keepalive,
    /// The peer closed the connection
    Closed(CloseInfo),
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

#[async_trait]
pub trait Connection: Send {
    /// Next inbound frame; `None` once the stream has ended
    async fn next_frame(&mut self) -> Option<Result<Incoming>>;

    async fn close(&mut self, close: CloseInfo) -> Result<()>;
}
