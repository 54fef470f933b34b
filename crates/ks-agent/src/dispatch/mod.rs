//! Action dispatch
//!
//! Maps action names to handlers. Every request runs on its own task and
//! always produces exactly one request-type response, even when the
//! handler fails or panics.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ks_protocol::{Code, Request, RequestId, Response, ResultPayload};

use crate::resource::ResourceError;
use crate::session::ResponseSink;

/// One request as seen by a handler
#[derive(Debug, Clone)]
pub struct Call {
    pub request_id: RequestId,
    pub action: String,
    pub params: Value,
}

impl Call {
    /// Decode the params; missing params decode as the default value
    pub fn params<T: DeserializeOwned + Default>(&self) -> Result<T, ResourceError> {
        if self.params.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.params.clone())
            .map_err(|e| ResourceError::Params(format!("invalid params: {}", e)))
    }
}

type Handler = Arc<dyn Fn(Call) -> BoxFuture<'static, ResultPayload> + Send + Sync>;

/// Action name to handler table
#[derive(Default, Clone)]
pub struct Registry {
    handlers: HashMap<String, Handler>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `action`, replacing any previous one
    pub fn register<F, Fut>(&mut self, action: impl Into<String>, handler: F)
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResultPayload> + Send + 'static,
    {
        let handler: Handler =
            Arc::new(move |call| -> BoxFuture<'static, ResultPayload> { Box::pin(handler(call)) });
        self.handlers.insert(action.into(), handler);
    }

    pub fn contains(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    /// Registered action names, sorted
    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }

    /// Run the handler for `request` and build its response
    pub async fn dispatch(&self, request: Request) -> Response {
        let Request {
            request_id,
            action,
            params,
        } = request;

        let Some(handler) = self.handlers.get(&action).cloned() else {
            tracing::warn!(request_id = %request_id, action = %action, "Unknown action");
            return Response::request(
                request_id,
                ResultPayload::failure(Code::ParamsError, format!("unknown action: {}", action)),
            );
        };

        let call = Call {
            request_id: request_id.clone(),
            action: action.clone(),
            params,
        };

        let payload = match tokio::spawn(handler(call)).await {
            Ok(payload) => payload,
            Err(e) if e.is_panic() => {
                tracing::error!(request_id = %request_id, action = %action, "Handler panicked");
                ResultPayload::failure(Code::Unknown, format!("handler for {} panicked", action))
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, action = %action, error = %e, "Handler aborted");
                ResultPayload::failure(Code::Unknown, e.to_string())
            }
        };

        if payload.is_success() {
            tracing::debug!(request_id = %request_id, action = %action, "Request handled");
        } else {
            tracing::info!(
                request_id = %request_id,
                action = %action,
                code = payload.code.as_u16(),
                "Request failed: {}",
                payload.msg
            );
        }

        Response::request(request_id, payload)
    }
}

/// Consumes decoded requests and answers each on its own task
pub struct Dispatcher {
    registry: Arc<Registry>,
    requests: mpsc::Receiver<Request>,
    sink: Arc<dyn ResponseSink>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        requests: mpsc::Receiver<Request>,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        Self {
            registry,
            requests,
            sink,
        }
    }

    /// Dispatch until the request queue closes or `shutdown` fires
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let request = tokio::select! {
                _ = shutdown.cancelled() => break,
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let registry = Arc::clone(&self.registry);
            let sink = Arc::clone(&self.sink);
            tokio::spawn(async move {
                let response = registry.dispatch(request).await;
                let request_id = response.request_id.clone();
                if let Err(e) = sink.send(response).await {
                    tracing::warn!(request_id = %request_id, "Failed to queue response: {}", e);
                }
            });
        }
        tracing::debug!("Dispatcher stopped");
    }
}
