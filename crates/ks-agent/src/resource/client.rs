//! Object access seam
//!
//! The engine and the handlers talk to the cluster only through
//! [`ObjectClient`], so they can be exercised against an in-memory store.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::discovery::Scope;
use kube::{Client, Config};
use tracing::debug;

/// Kinds that live outside any namespace, used when discovery is unavailable
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PriorityClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

/// A kind resolved to its REST address
#[derive(Debug, Clone)]
pub struct ResolvedKind {
    pub resource: ApiResource,
    pub namespaced: bool,
}

/// Minimal dynamic object API
///
/// `namespace` of `None` addresses the cluster scope (or all namespaces
/// when listing a namespaced kind).
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Resolve `apiVersion` + `kind` to a resource
    async fn resolve(&self, api_version: &str, kind: &str) -> Result<ResolvedKind, kube::Error>;

    /// List objects, optionally filtered by a label selector
    async fn list(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, kube::Error>;

    /// Fetch one object
    async fn get(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, kube::Error>;

    /// Create an object
    async fn create(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error>;

    /// Replace an object; `object` must carry the live resource version
    async fn replace(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error>;

    /// Delete an object
    async fn delete(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), kube::Error>;
}

/// [`ObjectClient`] backed by the API server
#[derive(Clone)]
pub struct KubeObjectClient {
    client: Client,
    field_manager: String,
}

impl KubeObjectClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, ar: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) if !ns.is_empty() => Api::namespaced_with(self.client.clone(), ns, ar),
            _ => Api::all_with(self.client.clone(), ar),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..PostParams::default()
        }
    }
}

#[async_trait]
impl ObjectClient for KubeObjectClient {
    async fn resolve(&self, api_version: &str, kind: &str) -> Result<ResolvedKind, kube::Error> {
        let (group, version) = parse_api_version(api_version);
        let gvk = GroupVersionKind::gvk(group, version, kind);

        match kube::discovery::pinned_kind(&self.client, &gvk).await {
            Ok((resource, caps)) => Ok(ResolvedKind {
                resource,
                namespaced: matches!(caps.scope, Scope::Namespaced),
            }),
            Err(e) => {
                // Freshly installed CRDs may not be discoverable yet
                debug!(
                    api_version = %api_version,
                    kind = %kind,
                    error = %e,
                    "Kind not found in discovery, using fallback pluralization"
                );
                Ok(fallback_kind(api_version, kind))
            }
        }
    }

    async fn list(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, kube::Error> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        Ok(self.api(ar, namespace).list(&params).await?.items)
    }

    async fn get(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, kube::Error> {
        self.api(ar, namespace).get(name).await
    }

    async fn create(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        self.api(ar, namespace).create(&self.post_params(), object).await
    }

    async fn replace(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        self.api(ar, namespace)
            .replace(name, &self.post_params(), object)
            .await
    }

    async fn delete(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), kube::Error> {
        self.api(ar, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
    }
}

/// Build a client from a kubeconfig file, or from the inferred environment
pub async fn create_client(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
) -> anyhow::Result<Client> {
    use anyhow::Context;

    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {:?}", path))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Failed to load kubeconfig")?
        }
        None => Config::infer()
            .await
            .context("Failed to infer cluster config")?,
    };
    config.connect_timeout = Some(connect_timeout);

    Client::try_from(config).context("Failed to create cluster client")
}

/// Split `group/version`; the core group is empty
pub fn parse_api_version(api_version: &str) -> (&str, &str) {
    match api_version.rfind('/') {
        Some(idx) => (&api_version[..idx], &api_version[idx + 1..]),
        None => ("", api_version),
    }
}

/// Resolution used when discovery fails
pub fn fallback_kind(api_version: &str, kind: &str) -> ResolvedKind {
    let (group, version) = parse_api_version(api_version);
    let gvk = GroupVersionKind::gvk(group, version, kind);
    ResolvedKind {
        resource: ApiResource::from_gvk_with_plural(&gvk, &pluralize_kind(kind)),
        namespaced: !CLUSTER_SCOPED_KINDS.contains(&kind),
    }
}

/// Lowercase plural of a kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") || lower.ends_with('x') {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}
