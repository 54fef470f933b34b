//! Exec sessions
//!
//! A session is one long-lived response connection carrying every
//! exec-type frame of a single request ID, in order.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use ks_protocol::{encode_response, RequestId, Response, ResultPayload};

use super::SessionError;
use crate::tunnel::{close_quietly, send_text, Connector};

/// Notification that a session writer exited
pub(crate) struct Finished {
    pub request_id: RequestId,
    pub generation: u64,
}

#[derive(Debug)]
enum SessionEnd {
    Stopped,
    IdleTimeout,
    DialFailed,
    WriteFailed,
    QueueClosed,
}

enum Next {
    Frame(Response),
    Idle,
    Closed,
}

/// Writer task of one exec session
pub(crate) struct ExecSession {
    pub request_id: RequestId,
    pub queue: mpsc::Receiver<Response>,
    pub stop: CancellationToken,
    pub connector: Connector,
    pub url: Url,
    pub idle_timeout: Option<Duration>,
    pub generation: u64,
    pub finished: mpsc::UnboundedSender<Finished>,
}

impl ExecSession {
    pub(crate) async fn run(mut self) {
        let end = self.pump().await;

        // Producers holding this session's token stop on the next frame
        self.stop.cancel();
        self.queue.close();

        tracing::debug!(request_id = %self.request_id, reason = ?end, "Exec session finished");
        let _ = self.finished.send(Finished {
            request_id: self.request_id,
            generation: self.generation,
        });
    }

    async fn pump(&mut self) -> SessionEnd {
        let mut stream = tokio::select! {
            _ = self.stop.cancelled() => return SessionEnd::Stopped,
            dialed = self.connector.dial(&self.url) => match dialed {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(request_id = %self.request_id, error = %e, "Failed to open exec connection");
                    return SessionEnd::DialFailed;
                }
            },
        };

        let end = loop {
            let next = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break SessionEnd::Stopped,
                next = next_frame(&mut self.queue, self.idle_timeout) => next,
            };

            let response = match next {
                Next::Frame(response) => response,
                Next::Idle => break SessionEnd::IdleTimeout,
                Next::Closed => break SessionEnd::QueueClosed,
            };

            let text = match encode_response(&response) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(request_id = %self.request_id, error = %e, "Skipping unencodable exec frame");
                    continue;
                }
            };

            let written = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break SessionEnd::Stopped,
                written = send_text(&mut stream, text) => written,
            };
            if let Err(e) = written {
                tracing::warn!(request_id = %self.request_id, error = %e, "Exec connection write failed");
                break SessionEnd::WriteFailed;
            }
        };

        close_quietly(&mut stream).await;
        end
    }
}

async fn next_frame(queue: &mut mpsc::Receiver<Response>, idle: Option<Duration>) -> Next {
    let received = match idle {
        Some(limit) => match tokio::time::timeout(limit, queue.recv()).await {
            Ok(received) => received,
            Err(_) => return Next::Idle,
        },
        None => queue.recv().await,
    };

    match received {
        Some(response) => Next::Frame(response),
        None => Next::Closed,
    }
}

/// Queue and stop signal of one live session
///
/// Handed out by the session table; frames are pushed here directly so the
/// table never waits on a session.
#[derive(Clone)]
pub(crate) struct Route {
    pub queue: mpsc::Sender<Response>,
    pub stop: CancellationToken,
}

impl Route {
    /// Queue a frame, giving up as soon as the session stops
    pub(crate) async fn push(&self, response: Response) -> Result<(), SessionError> {
        if self.stop.is_cancelled() {
            return Err(SessionError::Stopped(response.request_id.to_string()));
        }
        let request_id = response.request_id.clone();
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Err(SessionError::Stopped(request_id.to_string())),
            sent = self.queue.send(response) => {
                sent.map_err(|_| SessionError::Stopped(request_id.to_string()))
            }
        }
    }
}

/// Producer side of an exec session
///
/// Handlers that stream output hold one of these, push frames with
/// [`ExecStream::send`] and watch [`ExecStream::stopped`] to know when to
/// give up. A full session queue blocks only the producer that hit it.
#[derive(Clone)]
pub struct ExecStream {
    request_id: RequestId,
    route: Route,
}

impl ExecStream {
    pub(crate) fn new(request_id: RequestId, route: Route) -> Self {
        Self { request_id, route }
    }

    /// Request ID the session is keyed by
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Queue one frame on the session
    pub async fn send(&self, payload: ResultPayload) -> Result<(), SessionError> {
        let response = Response::exec(self.request_id.clone(), payload);
        self.route.push(response).await
    }

    /// Whether the session has been stopped
    pub fn is_stopped(&self) -> bool {
        self.route.stop.is_cancelled()
    }

    /// Resolves once the session is stopped
    pub async fn stopped(&self) {
        self.route.stop.cancelled().await
    }
}
