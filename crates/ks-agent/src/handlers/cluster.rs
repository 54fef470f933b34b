//! `cluster.get`: object counts and capacity for the overview page

use std::sync::Arc;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{register_op, require, typed, HandlerContext};
use crate::dispatch::{Call, Registry};
use crate::resource::{ClusterCapabilities, DynamicResource, ResourceError, ResourceIdentity};

/// Label marking objects that belong to a workspace project
pub const WORKSPACE_SELECTOR: &str = "kubespace.cn/belong-to=project";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClusterParams {
    workspace: u64,
    namespace: String,
}

#[derive(Debug, Default, Serialize)]
struct ClusterOverview {
    cluster_version: String,
    cluster_cpu: String,
    cluster_memory: String,
    node_num: usize,
    namespace_num: usize,
    pod_num: usize,
    pod_running_num: usize,
    pod_succeeded_num: usize,
    pod_pending_num: usize,
    pod_failed_num: usize,
    deployment_num: usize,
    statefulset_num: usize,
    daemonset_num: usize,
    service_num: usize,
    ingress_num: usize,
    storageclass_num: usize,
    pv_num: usize,
    pv_available_num: usize,
    pv_released_num: usize,
    pv_bound_num: usize,
    pv_failed_num: usize,
    pvc_num: usize,
    config_map_num: usize,
    secret_num: usize,
}

struct Overview {
    engine: Arc<DynamicResource>,
    caps: ClusterCapabilities,
}

pub fn register(registry: &mut Registry, ctx: &HandlerContext) {
    let overview = Arc::new(Overview {
        engine: Arc::clone(&ctx.engine),
        caps: ctx.caps.clone(),
    });
    register_op(registry, "cluster.get", &overview, get);
}

async fn get(overview: Arc<Overview>, call: Call) -> Result<Value, ResourceError> {
    let params: ClusterParams = call.params()?;
    let summary = if params.workspace != 0 {
        let namespace = require(&params.namespace, "Namespace")?;
        overview.workspace(namespace).await?
    } else {
        overview.cluster().await?
    };
    Ok(serde_json::to_value(summary)?)
}

impl Overview {
    async fn list(
        &self,
        id: ResourceIdentity,
        selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ResourceError> {
        self.engine.list(&id, selector).await
    }

    async fn count(&self, id: ResourceIdentity, selector: Option<&str>) -> Result<usize, ResourceError> {
        Ok(self.list(id, selector).await?.len())
    }

    async fn cluster(&self) -> Result<ClusterOverview, ResourceError> {
        let mut view = ClusterOverview {
            cluster_version: self.caps.git_version.clone(),
            ..Default::default()
        };

        let nodes = self.list(ResourceIdentity::core("nodes", "Node"), None).await?;
        view.node_num = nodes.len();
        let mut capacity = Capacity::default();
        for node in nodes {
            capacity.add(&typed::<Node>(node)?);
        }
        view.cluster_cpu = format_cpu(capacity.cpu_millis);
        view.cluster_memory = format_memory(capacity.memory_bytes);

        view.namespace_num = self
            .count(ResourceIdentity::core("namespaces", "Namespace"), None)
            .await?;

        let pods = self.list(ResourceIdentity::core("pods", "Pod"), None).await?;
        view.pod_num = pods.len();
        for pod in &pods {
            match phase(pod) {
                "Running" => view.pod_running_num += 1,
                "Succeeded" => view.pod_succeeded_num += 1,
                "Pending" => view.pod_pending_num += 1,
                "Failed" => view.pod_failed_num += 1,
                _ => {}
            }
        }

        view.deployment_num = self
            .count(ResourceIdentity::new("apps", "v1", "deployments", "Deployment"), None)
            .await?;
        view.statefulset_num = self
            .count(ResourceIdentity::new("apps", "v1", "statefulsets", "StatefulSet"), None)
            .await?;
        view.daemonset_num = self
            .count(ResourceIdentity::new("apps", "v1", "daemonsets", "DaemonSet"), None)
            .await?;
        view.service_num = self
            .count(ResourceIdentity::core("services", "Service"), None)
            .await?;
        view.ingress_num = self.count(self.caps.ingress.identity(), None).await?;
        view.storageclass_num = self
            .count(
                ResourceIdentity::new("storage.k8s.io", "v1", "storageclasses", "StorageClass"),
                None,
            )
            .await?;

        let volumes = self
            .list(ResourceIdentity::core("persistentvolumes", "PersistentVolume"), None)
            .await?;
        view.pv_num = volumes.len();
        for pv in &volumes {
            match phase(pv) {
                "Available" => view.pv_available_num += 1,
                "Released" => view.pv_released_num += 1,
                "Bound" => view.pv_bound_num += 1,
                "Failed" => view.pv_failed_num += 1,
                _ => {}
            }
        }

        view.pvc_num = self
            .count(
                ResourceIdentity::core("persistentvolumeclaims", "PersistentVolumeClaim"),
                None,
            )
            .await?;
        view.config_map_num = self
            .count(ResourceIdentity::core("configmaps", "ConfigMap"), None)
            .await?;
        view.secret_num = self
            .count(ResourceIdentity::core("secrets", "Secret"), None)
            .await?;

        Ok(view)
    }

    /// Counts of project-owned objects in one namespace
    async fn workspace(&self, namespace: &str) -> Result<ClusterOverview, ResourceError> {
        let selector = Some(WORKSPACE_SELECTOR);
        let scoped = |id: ResourceIdentity| id.in_namespace(namespace);

        Ok(ClusterOverview {
            cluster_version: self.caps.git_version.clone(),
            service_num: self
                .count(scoped(ResourceIdentity::core("services", "Service")), selector)
                .await?,
            ingress_num: self
                .count(scoped(self.caps.ingress.identity()), selector)
                .await?,
            pvc_num: self
                .count(
                    scoped(ResourceIdentity::core(
                        "persistentvolumeclaims",
                        "PersistentVolumeClaim",
                    )),
                    selector,
                )
                .await?,
            config_map_num: self
                .count(scoped(ResourceIdentity::core("configmaps", "ConfigMap")), selector)
                .await?,
            secret_num: self
                .count(scoped(ResourceIdentity::core("secrets", "Secret")), selector)
                .await?,
            ..Default::default()
        })
    }
}

fn phase(object: &DynamicObject) -> &str {
    object.data["status"]["phase"].as_str().unwrap_or_default()
}

/// Summed node capacity
#[derive(Debug, Default)]
struct Capacity {
    cpu_millis: u64,
    memory_bytes: u64,
}

impl Capacity {
    fn add(&mut self, node: &Node) {
        let Some(capacity) = node.status.as_ref().and_then(|s| s.capacity.as_ref()) else {
            return;
        };
        if let Some(cpu) = capacity.get("cpu").and_then(parse_quantity) {
            self.cpu_millis += (cpu * 1000.0).round() as u64;
        }
        if let Some(memory) = capacity.get("memory").and_then(parse_quantity) {
            self.memory_bytes += memory.round() as u64;
        }
    }
}

/// Parse a resource quantity such as `3800m`, `16Gi` or `1e3`
pub fn parse_quantity(quantity: &Quantity) -> Option<f64> {
    let text = quantity.0.trim();
    let split = text
        .find(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);

    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        _ => return None,
    };
    number.parse::<f64>().ok().map(|n| n * multiplier)
}

/// Whole cores when exact, otherwise millicores
fn format_cpu(millis: u64) -> String {
    if millis % 1000 == 0 {
        (millis / 1000).to_string()
    } else {
        format!("{}m", millis)
    }
}

/// Largest binary suffix that divides the total exactly
fn format_memory(bytes: u64) -> String {
    const UNITS: [(&str, u64); 4] = [
        ("Ti", 1 << 40),
        ("Gi", 1 << 30),
        ("Mi", 1 << 20),
        ("Ki", 1 << 10),
    ];
    if bytes == 0 {
        return "0".to_string();
    }
    UNITS
        .iter()
        .find(|(_, size)| bytes % size == 0)
        .map(|(unit, size)| format!("{}{}", bytes / size, unit))
        .unwrap_or_else(|| bytes.to_string())
}
