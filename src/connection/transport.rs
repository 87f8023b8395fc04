//! Streaming channel transport.
//!
//! # Responsibilities
//! - Open the push channel for a session (`Connector`)
//! - Yield text payloads until the peer closes (`PushChannel`)
//! - Close explicitly so no socket outlives its session
//!
//! # Design Decisions
//! - Ping/pong is handled inside `tokio-tungstenite`
//! - Binary frames are passed on as lossy UTF-8 and left to the decoder
//! - Handshake bounded by `connect_timeout`

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::api::types::Session;
use crate::config::ConnectionConfig;

/// Connection-level failures. Never surfaced to callers as errors; they
/// only show up in connection state.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("invalid notification URL: {0}")]
    InvalidUrl(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("stream error: {0}")]
    Stream(String),
}

/// An open push channel.
#[async_trait]
pub trait PushChannel: Send {
    /// Next payload; `None` once the peer has closed the channel.
    async fn recv(&mut self) -> Option<Result<String, ConnectionError>>;

    /// Close the channel from our side.
    async fn close(&mut self);
}

/// Opens push channels for a session.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, session: &Session) -> Result<Box<dyn PushChannel>, ConnectionError>;
}

/// WebSocket connector: `<url>?username=<u>&token=<t>`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        let url = Url::parse(&config.url)
            .map_err(|e| ConnectionError::InvalidUrl(format!("'{}': {}", config.url, e)))?;
        Ok(Self {
            url,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        })
    }

    /// Endpoint for `session`, with credentials query-encoded.
    pub fn session_url(&self, session: &Session) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("username", &session.username)
            .append_pair("token", session.token.as_str());
        url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, session: &Session) -> Result<Box<dyn PushChannel>, ConnectionError> {
        let url = self.session_url(session);
        tracing::debug!(endpoint = %self.url, username = %session.username, "Opening notification channel");

        let handshake = connect_async(url.as_str());
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| ConnectionError::Timeout(self.connect_timeout))?
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;

        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushChannel for WsChannel {
    async fn recv(&mut self) -> Option<Result<String, ConnectionError>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(WsMessage::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(WsMessage::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(ConnectionError::Stream(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Error while closing notification channel");
        }
    }
}
