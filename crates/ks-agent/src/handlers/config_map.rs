//! `config_map.*` actions

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{register_op, require, typed, HandlerContext};
use crate::dispatch::{Call, Registry};
use crate::resource::{label_selector, DynamicResource, OutputFormat, ResourceError, ResourceIdentity};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigMapParams {
    name: String,
    namespace: String,
    output: Option<String>,
    labels: BTreeMap<String, String>,
    data: BTreeMap<String, String>,
}

impl ConfigMapParams {
    /// Identity of the addressed config map; name and namespace required
    fn target(&self) -> Result<ResourceIdentity, ResourceError> {
        let name = require(&self.name, "Name")?;
        let namespace = require(&self.namespace, "Namespace")?;
        Ok(config_maps().in_namespace(namespace).named(name))
    }
}

/// List entry
#[derive(Debug, Serialize)]
struct ConfigMapSummary {
    name: String,
    namespace: String,
    keys: Vec<String>,
    labels: BTreeMap<String, String>,
    create_time: Option<Time>,
    data: BTreeMap<String, String>,
}

impl From<ConfigMap> for ConfigMapSummary {
    fn from(cm: ConfigMap) -> Self {
        let data = cm.data.unwrap_or_default();
        Self {
            name: cm.metadata.name.unwrap_or_default(),
            namespace: cm.metadata.namespace.unwrap_or_default(),
            keys: data.keys().cloned().collect(),
            labels: cm.metadata.labels.unwrap_or_default(),
            create_time: cm.metadata.creation_timestamp,
            data,
        }
    }
}

fn config_maps() -> ResourceIdentity {
    ResourceIdentity::core("configmaps", "ConfigMap")
}

pub fn register(registry: &mut Registry, ctx: &HandlerContext) {
    let engine = &ctx.engine;
    register_op(registry, "config_map.list", engine, list);
    register_op(registry, "config_map.get", engine, get);
    register_op(registry, "config_map.create", engine, create);
    register_op(registry, "config_map.update", engine, update);
}

async fn list(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: ConfigMapParams = call.params()?;
    let mut id = config_maps();
    if !params.namespace.is_empty() {
        id = id.in_namespace(&params.namespace);
    }
    let selector = label_selector(&params.labels);

    let summaries = engine
        .list(&id, selector.as_deref())
        .await?
        .into_iter()
        .map(|obj| typed::<ConfigMap>(obj).map(ConfigMapSummary::from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::to_value(summaries)?)
}

async fn get(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: ConfigMapParams = call.params()?;
    let object = engine.get(&params.target()?).await?;
    OutputFormat::parse(params.output.as_deref()).render(&object)
}

async fn create(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: ConfigMapParams = call.params()?;
    let id = params.target()?;
    let object = json!({
        "metadata": { "labels": params.labels },
        "data": params.data,
    });
    let created = engine.create(&id, object).await?;
    Ok(serde_json::to_value(created)?)
}

/// Replace the data of an existing config map
async fn update(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: ConfigMapParams = call.params()?;
    let id = params.target()?;
    if params.data.is_empty() {
        return Err(ResourceError::Params("Data is blank".to_string()));
    }

    let mut live = engine.get(&id).await?;
    live.data["data"] = serde_json::to_value(&params.data)?;
    let updated = engine.update(&id, serde_json::to_value(live)?).await?;
    Ok(serde_json::to_value(updated)?)
}
