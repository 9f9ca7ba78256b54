//! Websocket connector built on tokio-tungstenite

use async_trait::async_trait;
use futures::StreamExt;
use scoreapp_core::CloseInfo;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{LiveError, Result};
use crate::transport::{Connection, Connector, Incoming};

/// Close code reported when the server closes without a status
const NO_STATUS_CODE: u16 = 1005;

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let (stream, response) =
            connect_async(url)
                .await
                .map_err(|e| LiveError::ConnectFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        debug!("Websocket handshake with {} ({})", url, response.status());
        Ok(Box::new(WsConnection { stream }))
    }
}

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsConnection {
    fn convert(message: Message) -> Incoming {
        match message {
            Message::Text(text) => Incoming::Text(text),
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Incoming::Text(text),
                Err(_) => {
                    warn!("Ignoring non UTF-8 binary frame");
                    Incoming::Keepalive
                }
            },
            Message::Close(Some(frame)) => Incoming::Closed(CloseInfo::new(
                u16::from(frame.code),
                frame.reason.into_owned(),
            )),
            Message::Close(None) => Incoming::Closed(CloseInfo::new(NO_STATUS_CODE, "")),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Incoming::Keepalive,
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn next_frame(&mut self) -> Option<Result<Incoming>> {
        let message = self.stream.next().await?;
        Some(message.map(Self::convert).map_err(LiveError::from))
    }

    async fn close(&mut self, close: CloseInfo) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(close.code),
            reason: close.reason.into(),
        };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }
}
