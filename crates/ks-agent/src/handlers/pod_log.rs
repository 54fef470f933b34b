//! `pod.log`: follow a container log over an exec session
//!
//! The request is answered as soon as the session is open. Each log line
//! then travels as one exec frame for the same request ID until the log
//! ends or the server closes the session.

use std::io;

use futures::{AsyncBufReadExt, Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, LogParams};
use kube::Client;
use serde::Deserialize;
use serde_json::Value;

use ks_protocol::{Code, ResultPayload};

use super::require;
use crate::dispatch::{Call, Registry};
use crate::resource::{Operation, ResourceError};
use crate::session::{ExecStream, MultiplexerHandle, SessionError};

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct LogRequest {
    name: String,
    namespace: String,
    container: Option<String>,
    tail_lines: Option<i64>,
}

impl LogRequest {
    fn validate(&self) -> Result<(), ResourceError> {
        require(&self.name, "Name")?;
        require(&self.namespace, "Namespace")?;
        Ok(())
    }

    fn log_params(&self) -> LogParams {
        LogParams {
            follow: true,
            container: self.container.clone().filter(|c| !c.is_empty()),
            tail_lines: self.tail_lines,
            ..Default::default()
        }
    }
}

pub fn register(registry: &mut Registry, client: Client, sessions: MultiplexerHandle) {
    registry.register("pod.log", move |call: Call| {
        let client = client.clone();
        let sessions = sessions.clone();
        async move {
            match open(client, sessions, call).await {
                Ok(()) => ResultPayload::ok(),
                Err(e) => e,
            }
        }
    });
}

async fn open(client: Client, sessions: MultiplexerHandle, call: Call) -> Result<(), ResultPayload> {
    let request: LogRequest = call.params().map_err(ResultPayload::from)?;
    request.validate().map_err(ResultPayload::from)?;

    let stream = sessions
        .open_stream(call.request_id.clone())
        .await
        .map_err(|e| ResultPayload::failure(Code::Unknown, e.to_string()))?;

    tokio::spawn(follow(client, sessions, request, stream));
    Ok(())
}

async fn follow(client: Client, sessions: MultiplexerHandle, request: LogRequest, stream: ExecStream) {
    let request_id = stream.request_id().clone();
    let api: Api<Pod> = Api::namespaced(client, &request.namespace);

    match api.log_stream(&request.name, &request.log_params()).await {
        Ok(reader) => {
            tracing::info!(request_id = %request_id, pod = %request.name, namespace = %request.namespace, "Following pod log");
            let sent = forward_lines(reader.lines(), &stream).await;
            tracing::debug!(request_id = %request_id, lines = sent, "Pod log ended");
        }
        Err(e) => {
            tracing::warn!(request_id = %request_id, pod = %request.name, error = %e, "Failed to open pod log");
            let payload = ResultPayload::from(ResourceError::api(Operation::Get, e));
            let _ = stream.send(payload).await;
        }
    }

    if !stream.is_stopped() {
        match sessions.close(request_id.as_str()).await {
            Ok(()) | Err(SessionError::NotFound(_)) => {}
            Err(e) => tracing::debug!(request_id = %request_id, "Session close after log end: {}", e),
        }
    }
}

/// Send each line as one exec frame; returns the number of lines sent
pub(crate) async fn forward_lines<S>(lines: S, stream: &ExecStream) -> usize
where
    S: Stream<Item = io::Result<String>>,
{
    futures::pin_mut!(lines);
    let mut sent = 0;
    loop {
        let line = tokio::select! {
            _ = stream.stopped() => break,
            line = lines.next() => line,
        };
        match line {
            Some(Ok(line)) => {
                if stream.send(ResultPayload::success(Value::String(line))).await.is_err() {
                    break;
                }
                sent += 1;
            }
            Some(Err(e)) => {
                tracing::warn!(request_id = %stream.request_id(), error = %e, "Pod log read failed");
                break;
            }
            None => break,
        }
    }
    sent
}
