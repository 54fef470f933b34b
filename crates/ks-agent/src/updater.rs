//! Self-update on connect
//!
//! After every successful connection the agent fetches its own deployment
//! manifest from the server and applies it, so a changed agent spec rolls
//! out without operator action.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

use ks_core::{AgentConfig, ServerEndpoints};

use crate::resource::DynamicResource;
use crate::tunnel::ConnectHook;

/// Fetches and applies the agent manifest
pub struct SelfUpdater {
    http: reqwest::Client,
    url: Url,
    engine: Arc<DynamicResource>,
}

impl SelfUpdater {
    pub fn new(url: Url, timeout: Duration, engine: Arc<DynamicResource>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, url, engine })
    }

    /// Updater for the manifest published for this agent's token
    pub fn from_config(
        config: &AgentConfig,
        endpoints: &ServerEndpoints,
        engine: Arc<DynamicResource>,
    ) -> Result<Self> {
        Self::new(
            endpoints.self_update_url(&config.token),
            config.connect_timeout,
            engine,
        )
    }

    /// Download the manifest text
    pub async fn fetch_manifest(&self) -> Result<String> {
        let response = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .context("Failed to request agent manifest")?
            .error_for_status()
            .context("Server refused agent manifest")?;
        response
            .text()
            .await
            .context("Failed to read agent manifest")
    }

    /// Fetch and apply the manifest once
    pub async fn update(&self) -> Result<()> {
        let manifest = self.fetch_manifest().await?;
        let report = self.engine.apply_manifest(&manifest).await;
        if !report.is_success() {
            let failed = report
                .failures()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("Agent manifest apply failed: {}", failed);
        }
        tracing::info!(documents = report.documents.len(), "Agent manifest applied");
        Ok(())
    }
}

#[async_trait]
impl ConnectHook for SelfUpdater {
    async fn on_connect(&self) -> Result<()> {
        self.update().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::FakeObjectClient;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP server answering every request with `status` and `body`
    async fn http_server(status: &'static str, body: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        let endpoints = ServerEndpoints::new(&addr.to_string(), false).unwrap();
        endpoints.self_update_url("secret")
    }

    fn updater(url: Url) -> (SelfUpdater, Arc<FakeObjectClient>) {
        let fake = Arc::new(FakeObjectClient::new());
        let engine = Arc::new(DynamicResource::new(fake.clone()));
        (
            SelfUpdater::new(url, Duration::from_secs(5), engine).unwrap(),
            fake,
        )
    }

    #[tokio::test]
    async fn test_applies_fetched_manifest() {
        let manifest = "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: ks-agent\n  namespace: kubespace\n";
        let url = http_server("200 OK", manifest).await;
        let (updater, fake) = updater(url);

        updater.on_connect().await.unwrap();
        assert!(fake.stored("serviceaccounts", Some("kubespace"), "ks-agent").is_some());
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let url = http_server("500 Internal Server Error", "boom").await;
        let (updater, _) = updater(url);
        assert!(updater.on_connect().await.is_err());
    }

    #[tokio::test]
    async fn test_bad_manifest_fails() {
        let url = http_server("200 OK", "kind: ConfigMap\nmetadata:\n  name: x\n").await;
        let (updater, _) = updater(url);
        let err = updater.on_connect().await.unwrap_err();
        assert!(err.to_string().contains("missing apiVersion"));
    }
}
