//! Inbound control channel
//!
//! Keeps one connection to the server's connect endpoint alive for the
//! lifetime of the agent, decodes each inbound frame and routes it:
//! session teardown goes straight to the multiplexer, everything else to
//! the dispatcher queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use ks_protocol::{decode_request, Request};

use super::connector::{close_quietly, Connector, WsStream};
use super::reconnect::FixedInterval;
use crate::session::MultiplexerHandle;

/// Hook run after every successful connection, before reading starts
#[async_trait]
pub trait ConnectHook: Send + Sync {
    /// Failures are logged and never prevent the agent from serving
    async fn on_connect(&self) -> anyhow::Result<()>;
}

enum ReadOutcome {
    Shutdown,
    Disconnected(String),
}

/// Reconnecting reader of the control channel
pub struct Transport {
    connector: Connector,
    url: Url,
    retry_interval: Duration,
    requests: mpsc::Sender<Request>,
    sessions: MultiplexerHandle,
    hook: Option<Arc<dyn ConnectHook>>,
}

impl Transport {
    /// Create a transport that feeds decoded requests into `requests`
    pub fn new(
        connector: Connector,
        url: Url,
        retry_interval: Duration,
        requests: mpsc::Sender<Request>,
        sessions: MultiplexerHandle,
    ) -> Self {
        Self {
            connector,
            url,
            retry_interval,
            requests,
            sessions,
            hook: None,
        }
    }

    /// Run `hook` after every successful connection
    pub fn with_hook(mut self, hook: Arc<dyn ConnectHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Read until `shutdown` fires, reconnecting after every failure
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            let mut stream = tokio::select! {
                _ = shutdown.cancelled() => break,
                stream = self.connect_with_retry() => stream,
            };

            let outcome = self.read_loop(&mut stream, &shutdown).await;
            close_quietly(&mut stream).await;

            match outcome {
                ReadOutcome::Shutdown => break,
                ReadOutcome::Disconnected(reason) => {
                    // Redial at once; the retry interval only spaces failed dials
                    tracing::warn!("Disconnected from server: {}. Reconnecting...", reason);
                }
            }
        }
        tracing::info!("Control channel stopped");
    }

    /// Dial until a connection succeeds, then run the connect hook
    async fn connect_with_retry(&self) -> WsStream {
        let mut policy = FixedInterval::new(self.retry_interval);

        loop {
            match self.connector.dial(&self.url).await {
                Ok(stream) => {
                    tracing::info!(
                        url = %self.url,
                        attempts = policy.attempts() + 1,
                        "Connected to server"
                    );
                    policy.reset();
                    self.after_connect().await;
                    return stream;
                }
                Err(e) => {
                    let delay = policy.next_delay();
                    tracing::warn!(
                        url = %self.url,
                        attempt = policy.attempts(),
                        "Connection failed: {}. Retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn after_connect(&self) {
        if let Some(hook) = &self.hook {
            if let Err(e) = hook.on_connect().await {
                tracing::error!("Connect hook failed: {:#}", e);
            }
        }
    }

    async fn read_loop(&self, stream: &mut WsStream, shutdown: &CancellationToken) -> ReadOutcome {
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => return ReadOutcome::Shutdown,
                message = stream.next() => message,
            };

            let frame = match message {
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Close(frame))) => {
                    return ReadOutcome::Disconnected(format!("closed by server ({:?})", frame));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return ReadOutcome::Disconnected(e.to_string()),
                None => return ReadOutcome::Disconnected("stream ended".to_string()),
            };

            if !self.route(&frame).await {
                return ReadOutcome::Shutdown;
            }
        }
    }

    /// Route one frame; returns false once the dispatcher is gone
    async fn route(&self, frame: &[u8]) -> bool {
        let request = match decode_request(frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Dropping undecodable frame: {}", e);
                return true;
            }
        };

        tracing::debug!(
            request_id = %request.request_id,
            action = %request.action,
            "Received request"
        );

        if request.is_close_exec() {
            let sessions = self.sessions.clone();
            tokio::spawn(async move { sessions.handle_close_exec(request).await });
            return true;
        }

        self.requests.send(request).await.is_ok()
    }
}
