// Live socket transport
//
// `LiveTransport` opens one connection per subscriber; the WebSocket implementation
// speaks to `/monitoring/ws`. No handshake beyond the upgrade.

use crate::{Result, VigiError};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

#[async_trait]
pub trait LiveTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LiveConnection>>;
}

#[async_trait]
pub trait LiveConnection: Send {
    /// Next text payload; None once the peer has closed the socket
    async fn next_text(&mut self) -> Option<Result<String>>;

    async fn close(&mut self);
}

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl LiveTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn LiveConnection>> {
        debug!(target: "subscriber", url = %self.url, "Opening live socket");
        let (stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            warn!(target: "subscriber", url = %self.url, error = %e, "Live socket connect failed");
            VigiError::Socket(format!("Connect to {} failed: {}", self.url, e))
        })?;
        info!(target: "subscriber", url = %self.url, "Live socket open");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl LiveConnection for WsConnection {
    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                // Undecodable bytes fail JSON parsing downstream and are discarded there
                Some(Ok(Message::Binary(bytes))) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(target: "subscriber", frame = ?frame, "Peer closed live socket");
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Some(Err(VigiError::Socket(e.to_string()))),
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(target: "subscriber", error = %e, "Live socket close handshake failed");
        }
    }
}
