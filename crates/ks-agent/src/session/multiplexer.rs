//! Session multiplexer
//!
//! Two background tasks sit behind a cloneable [`MultiplexerHandle`]:
//!
//! - the response writer drains one-shot responses, opening a fresh
//!   connection per response under a global concurrency limit
//! - the session table owns every exec session and is the only task that
//!   touches the table, so lookups, creation and removal never race
//!
//! Each exec session runs its own writer task that keeps one connection
//! open and writes its frames in the order they were queued. The table
//! only hands out session queues; producers push into them directly, so a
//! stalled session never holds up the table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use ks_core::{AgentConfig, ServerEndpoints};
use ks_protocol::{
    encode_response, CloseExecParams, Code, Request, RequestId, Response, ResultPayload,
};

use super::exec::{ExecSession, ExecStream, Finished, Route};
use super::SessionError;
use crate::tunnel::{close_quietly, send_text, Connector, TransportError};

/// Settings for the multiplexer tasks
#[derive(Clone)]
pub struct MultiplexerConfig {
    /// Where every response connection is dialed
    pub response_url: Url,
    /// Dialer carrying the agent token
    pub connector: Connector,
    /// Capacity of the one-shot response queue
    pub response_queue_capacity: usize,
    /// Capacity of the exec frame queue and of each session queue
    pub exec_queue_capacity: usize,
    /// Maximum one-shot connections open at once
    pub max_inflight_responses: usize,
    /// Stop sessions with no frames for this long
    pub session_idle_timeout: Option<Duration>,
}

impl MultiplexerConfig {
    /// Settings with default queue sizes
    pub fn new(response_url: Url, connector: Connector) -> Self {
        let defaults = AgentConfig::default();
        Self {
            response_url,
            connector,
            response_queue_capacity: defaults.response_queue_capacity,
            exec_queue_capacity: defaults.exec_queue_capacity,
            max_inflight_responses: defaults.max_inflight_responses,
            session_idle_timeout: defaults.session_idle_timeout,
        }
    }

    /// Settings from the agent configuration
    pub fn from_config(config: &AgentConfig, endpoints: &ServerEndpoints) -> Self {
        Self {
            response_url: endpoints.response.clone(),
            connector: Connector::from_config(config),
            response_queue_capacity: config.response_queue_capacity,
            exec_queue_capacity: config.exec_queue_capacity,
            max_inflight_responses: config.max_inflight_responses,
            session_idle_timeout: config.session_idle_timeout,
        }
    }
}

/// Commands handled by the session table task
enum Command {
    Route {
        request_id: RequestId,
        reply: oneshot::Sender<Route>,
    },
    Close {
        request_id: RequestId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable entry point for sending responses and managing sessions
#[derive(Clone)]
pub struct MultiplexerHandle {
    responses: mpsc::Sender<Response>,
    commands: mpsc::Sender<Command>,
}

impl MultiplexerHandle {
    /// Queue a response on the path its type selects
    ///
    /// Waits while the target queue is full.
    pub async fn send(&self, response: Response) -> Result<(), SessionError> {
        if response.is_exec() {
            let route = self.route(response.request_id.clone()).await?;
            route.push(response).await
        } else {
            self.responses
                .send(response)
                .await
                .map_err(|_| SessionError::MultiplexerStopped)
        }
    }

    /// Open (or join) the exec session for `request_id`
    pub async fn open_stream(&self, request_id: RequestId) -> Result<ExecStream, SessionError> {
        let route = self.route(request_id.clone()).await?;
        Ok(ExecStream::new(request_id, route))
    }

    async fn route(&self, request_id: RequestId) -> Result<Route, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Route { request_id, reply }).await?;
        rx.await.map_err(|_| SessionError::MultiplexerStopped)
    }

    /// Stop and forget the exec session for `request_id`
    pub async fn close(&self, request_id: &str) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Close {
            request_id: RequestId::from(request_id),
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::MultiplexerStopped)?
    }

    /// Number of live exec sessions
    pub async fn active_sessions(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.command(Command::Count { reply }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Handle the reserved `closeExecConn` action and answer it
    pub async fn handle_close_exec(&self, request: Request) {
        let result = match session_id_from(&request.params) {
            Ok(session_id) => self.close(&session_id).await,
            Err(e) => Err(e),
        };

        let payload = match result {
            Ok(()) => ResultPayload::ok(),
            Err(e) => {
                tracing::debug!(request_id = %request.request_id, error = %e, "Close exec rejected");
                ResultPayload::failure(Code::ParamsError, e.to_string())
            }
        };

        if let Err(e) = self.send(Response::request(request.request_id, payload)).await {
            tracing::warn!("Failed to queue close exec reply: {}", e);
        }
    }

    async fn command(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::MultiplexerStopped)
    }
}

fn session_id_from(params: &Value) -> Result<String, SessionError> {
    let params: CloseExecParams = if params.is_null() {
        CloseExecParams::default()
    } else {
        serde_json::from_value(params.clone())
            .map_err(|e| SessionError::InvalidParams(e.to_string()))?
    };

    if params.session_id.is_empty() {
        return Err(SessionError::MissingSessionId);
    }
    Ok(params.session_id)
}

/// Running multiplexer tasks
pub struct SessionMultiplexer {
    writer: JoinHandle<()>,
    table: JoinHandle<()>,
}

impl SessionMultiplexer {
    /// Spawn the multiplexer tasks; they stop when `shutdown` fires
    pub fn spawn(
        config: MultiplexerConfig,
        shutdown: CancellationToken,
    ) -> (MultiplexerHandle, Self) {
        let (responses_tx, responses_rx) = mpsc::channel(config.response_queue_capacity);
        let (commands_tx, commands_rx) = mpsc::channel(config.exec_queue_capacity);
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();

        let writer = ResponseWriter {
            queue: responses_rx,
            connector: config.connector.clone(),
            url: config.response_url.clone(),
            permits: Arc::new(Semaphore::new(config.max_inflight_responses)),
        };

        let table = SessionTable {
            sessions: HashMap::new(),
            next_generation: 0,
            commands: commands_rx,
            finished_tx,
            finished_rx,
            connector: config.connector,
            url: config.response_url,
            queue_capacity: config.exec_queue_capacity,
            idle_timeout: config.session_idle_timeout,
            shutdown: shutdown.clone(),
        };

        let handle = MultiplexerHandle {
            responses: responses_tx,
            commands: commands_tx,
        };

        let tasks = Self {
            writer: tokio::spawn(writer.run(shutdown)),
            table: tokio::spawn(table.run()),
        };

        (handle, tasks)
    }

    /// Wait for both tasks to finish
    pub async fn join(self) {
        if let Err(e) = self.writer.await {
            tracing::error!("Response writer task failed: {}", e);
        }
        if let Err(e) = self.table.await {
            tracing::error!("Session table task failed: {}", e);
        }
    }
}

/// Delivers request-type responses, one connection each
struct ResponseWriter {
    queue: mpsc::Receiver<Response>,
    connector: Connector,
    url: Url,
    permits: Arc<Semaphore>,
}

impl ResponseWriter {
    async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let response = tokio::select! {
                _ = shutdown.cancelled() => break,
                response = self.queue.recv() => match response {
                    Some(response) => response,
                    None => break,
                },
            };

            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let connector = self.connector.clone();
            let url = self.url.clone();
            tokio::spawn(async move {
                if let Err(e) = deliver_once(&connector, &url, &response).await {
                    tracing::warn!(
                        request_id = %response.request_id,
                        error = %e,
                        "Dropping response after delivery failure"
                    );
                }
                drop(permit);
            });
        }
        tracing::debug!("Response writer stopped");
    }
}

async fn deliver_once(
    connector: &Connector,
    url: &Url,
    response: &Response,
) -> Result<(), TransportError> {
    let text = encode_response(response)?;
    let mut stream = connector.dial(url).await?;
    let written = send_text(&mut stream, text).await;
    close_quietly(&mut stream).await;
    written
}

struct SessionEntry {
    queue: mpsc::Sender<Response>,
    stop: CancellationToken,
    generation: u64,
}

/// Owner of the exec session table
struct SessionTable {
    sessions: HashMap<RequestId, SessionEntry>,
    next_generation: u64,
    commands: mpsc::Receiver<Command>,
    finished_tx: mpsc::UnboundedSender<Finished>,
    finished_rx: mpsc::UnboundedReceiver<Finished>,
    connector: Connector,
    url: Url,
    queue_capacity: usize,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl SessionTable {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(done) = self.finished_rx.recv() => self.forget(done),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        for (_, entry) in self.sessions.drain() {
            entry.stop.cancel();
        }
        tracing::debug!("Session table stopped");
    }

    /// Never awaits; every reply goes out on a oneshot
    fn handle(&mut self, command: Command) {
        match command {
            Command::Route { request_id, reply } => {
                let entry = self.entry(&request_id);
                let _ = reply.send(Route {
                    queue: entry.queue.clone(),
                    stop: entry.stop.clone(),
                });
            }
            Command::Close { request_id, reply } => {
                let result = match self.sessions.remove(&request_id) {
                    Some(entry) => {
                        entry.stop.cancel();
                        tracing::info!(request_id = %request_id, "Exec session closed");
                        Ok(())
                    }
                    None => Err(SessionError::NotFound(request_id.to_string())),
                };
                let _ = reply.send(result);
            }
            Command::Count { reply } => {
                let _ = reply.send(self.sessions.len());
            }
        }
    }

    fn entry(&mut self, request_id: &RequestId) -> &SessionEntry {
        if !self.sessions.contains_key(request_id) {
            let entry = self.start_session(request_id.clone());
            self.sessions.insert(request_id.clone(), entry);
        }
        &self.sessions[request_id]
    }

    fn start_session(&mut self, request_id: RequestId) -> SessionEntry {
        let (queue, rx) = mpsc::channel(self.queue_capacity);
        let stop = self.shutdown.child_token();
        self.next_generation += 1;

        tracing::info!(request_id = %request_id, "Exec session opened");
        let session = ExecSession {
            request_id,
            queue: rx,
            stop: stop.clone(),
            connector: self.connector.clone(),
            url: self.url.clone(),
            idle_timeout: self.idle_timeout,
            generation: self.next_generation,
            finished: self.finished_tx.clone(),
        };
        tokio::spawn(session.run());

        SessionEntry {
            queue,
            stop,
            generation: self.next_generation,
        }
    }

    /// Remove a session whose writer exited, unless the ID was reused since
    fn forget(&mut self, done: Finished) {
        let current = self
            .sessions
            .get(&done.request_id)
            .is_some_and(|entry| entry.generation == done.generation);
        if current {
            self.sessions.remove(&done.request_id);
        }
    }
}
