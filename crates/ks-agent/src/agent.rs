//! Agent wiring
//!
//! Builds every component from the configuration and runs them until the
//! root shutdown token fires.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ks_core::{AgentConfig, ServerEndpoints};

use crate::dispatch::{Dispatcher, Registry};
use crate::handlers::{self, HandlerContext};
use crate::resource::{create_client, ClusterCapabilities, DynamicResource, KubeObjectClient};
use crate::session::{MultiplexerConfig, ResponseSink, SessionMultiplexer};
use crate::tunnel::{Connector, Transport};
use crate::updater::SelfUpdater;
use crate::watch::spawn_watches;

/// Capacity of the decoded request queue between transport and dispatcher
const REQUEST_QUEUE_CAPACITY: usize = 256;

/// A configured, not yet running agent
pub struct Agent {
    config: AgentConfig,
    endpoints: ServerEndpoints,
}

impl Agent {
    /// Validate the configuration and derive the server endpoints
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate().context("Invalid agent configuration")?;
        let endpoints =
            ServerEndpoints::from_config(&config).context("Invalid server address")?;
        Ok(Self { config, endpoints })
    }

    pub fn endpoints(&self) -> &ServerEndpoints {
        &self.endpoints
    }

    /// Run until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Agent { config, endpoints } = self;

        let client = create_client(config.kubeconfig.as_deref(), config.connect_timeout)
            .await
            .context("Failed to create cluster client")?;
        let caps = ClusterCapabilities::probe(&client).await;

        let objects = KubeObjectClient::new(client.clone(), config.field_manager.clone());
        let engine = Arc::new(DynamicResource::new(Arc::new(objects)));

        let (sessions, multiplexer) = SessionMultiplexer::spawn(
            MultiplexerConfig::from_config(&config, &endpoints),
            shutdown.clone(),
        );

        let mut registry = Registry::new();
        handlers::register_all(
            &mut registry,
            &HandlerContext::new(Arc::clone(&engine), caps.clone()),
        );
        handlers::pod_log::register(&mut registry, client.clone(), sessions.clone());
        tracing::info!("Registered {} actions", registry.actions().len());

        let sink: Arc<dyn ResponseSink> = Arc::new(sessions.clone());
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let dispatcher = Dispatcher::new(Arc::new(registry), request_rx, Arc::clone(&sink));

        let updater = SelfUpdater::from_config(&config, &endpoints, Arc::clone(&engine))?;
        let transport = Transport::new(
            Connector::from_config(&config),
            endpoints.connect.clone(),
            config.retry_interval,
            request_tx,
            sessions.clone(),
        )
        .with_hook(Arc::new(updater));

        let watches = if config.watch {
            spawn_watches(client, &caps, sink, shutdown.clone())
        } else {
            tracing::info!("Watch relay disabled");
            Vec::new()
        };

        tracing::info!("Agent running, server {}", endpoints.connect);
        let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.clone()));
        transport.run(shutdown.clone()).await;

        // Transport returns only on shutdown
        shutdown.cancel();
        join_logged("Dispatcher", dispatcher_task).await;
        for watch in watches {
            join_logged("Watch", watch).await;
        }
        multiplexer.join().await;

        tracing::info!("Agent stopped");
        Ok(())
    }
}

/// Wait for a task, logging a panic or abort instead of propagating it
async fn join_logged(what: &str, task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("{} task failed: {}", what, e);
            false
        }
    }
}
