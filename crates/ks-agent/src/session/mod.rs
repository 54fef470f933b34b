//! Response delivery
//!
//! Every response leaves the agent through the [`MultiplexerHandle`]:
//! request-type responses each get their own short-lived connection, while
//! exec-type frames are funneled into one long-lived connection per
//! request ID.

mod exec;
mod multiplexer;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use ks_protocol::Response;

pub use exec::ExecStream;
pub use multiplexer::{MultiplexerConfig, MultiplexerHandle, SessionMultiplexer};

/// Session layer failures
#[derive(Debug, Error)]
pub enum SessionError {
    /// Close request without a session ID
    #[error("params not found session id")]
    MissingSessionId,

    /// Close request whose params could not be read
    #[error("invalid close params: {0}")]
    InvalidParams(String),

    /// No session with this ID
    #[error("session not found")]
    NotFound(String),

    /// The session was stopped before the frame was queued
    #[error("session {0} has been stopped")]
    Stopped(String),

    /// The multiplexer has shut down
    #[error("response multiplexer has stopped")]
    MultiplexerStopped,
}

/// Anything that accepts outgoing responses
///
/// Senders may wait for queue space but never perform network I/O
/// themselves.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    /// Queue a response for delivery
    async fn send(&self, response: Response) -> Result<(), SessionError>;
}

#[async_trait]
impl ResponseSink for mpsc::Sender<Response> {
    async fn send(&self, response: Response) -> Result<(), SessionError> {
        mpsc::Sender::send(self, response)
            .await
            .map_err(|_| SessionError::MultiplexerStopped)
    }
}

#[async_trait]
impl ResponseSink for MultiplexerHandle {
    async fn send(&self, response: Response) -> Result<(), SessionError> {
        MultiplexerHandle::send(self, response).await
    }
}
