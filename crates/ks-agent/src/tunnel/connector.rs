//! Outbound WebSocket connector
//!
//! Every connection to the server, inbound control channel and outbound
//! response channels alike, is dialed here with the agent token attached.

use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use ks_core::AgentConfig;
use ks_protocol::ProtocolError;

/// Header carrying the agent's shared secret
pub const TOKEN_HEADER: &str = "token";

/// Upper bound on the closing handshake against a peer that stopped reading
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// A dialed WebSocket connection
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// Token contains characters not allowed in a header
    #[error("Agent token is not a valid header value")]
    InvalidToken,

    /// Dial did not complete in time
    #[error("Connection to {url} timed out")]
    Timeout { url: String },

    /// Handshake, read or write failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame could not be encoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Dials authenticated WebSocket connections to the server
#[derive(Clone)]
pub struct Connector {
    /// Shared secret sent in [`TOKEN_HEADER`]
    token: Arc<str>,
    /// Dial timeout
    connect_timeout: Duration,
}

impl Connector {
    /// Create a new connector
    pub fn new(token: impl Into<Arc<str>>, connect_timeout: Duration) -> Self {
        Self {
            token: token.into(),
            connect_timeout,
        }
    }

    /// Create a connector from configuration
    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.token.as_str(), config.connect_timeout)
    }

    /// Dial `url` and complete the WebSocket handshake
    pub async fn dial(&self, url: &Url) -> Result<WsStream, TransportError> {
        let mut request = url.as_str().into_client_request()?;
        let token = HeaderValue::from_str(&self.token).map_err(|_| TransportError::InvalidToken)?;
        request.headers_mut().insert(TOKEN_HEADER, token);

        tracing::debug!(url = %url, "Dialing server");
        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| TransportError::Timeout {
                    url: url.to_string(),
                })??;

        Ok(stream)
    }
}

/// Write one text frame
pub async fn send_text(stream: &mut WsStream, text: String) -> Result<(), TransportError> {
    stream.send(Message::Text(text)).await?;
    Ok(())
}

/// Close a connection, ignoring errors from an already-broken peer
pub async fn close_quietly(stream: &mut WsStream) {
    match tokio::time::timeout(CLOSE_TIMEOUT, stream.close(None)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::trace!(error = %e, "Close on broken connection"),
        Err(_) => tracing::debug!("Close handshake timed out, dropping connection"),
    }
}
