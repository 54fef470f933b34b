//! `crd.*` and `cr.*` actions
//!
//! Definitions are served from the API chosen by the capability probe;
//! custom resources are addressed by explicit group, version and resource.

use std::sync::Arc;

use kube::core::DynamicObject;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{register_op, require, HandlerContext};
use crate::dispatch::{Call, Registry};
use crate::resource::{CrdApi, DynamicResource, OutputFormat, ResourceError, ResourceIdentity};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CrdParams {
    name: String,
    output: Option<String>,
}

/// List entry of a definition
#[derive(Debug, Serialize)]
struct CrdSummary {
    name: String,
    scope: Value,
    version: String,
    group: Value,
    resource: Value,
    create_time: Value,
}

impl From<&DynamicObject> for CrdSummary {
    fn from(crd: &DynamicObject) -> Self {
        let spec = &crd.data["spec"];
        Self {
            name: crd.name_any(),
            scope: spec["scope"].clone(),
            version: storage_version(spec),
            group: spec["group"].clone(),
            resource: spec["names"]["plural"].clone(),
            create_time: creation_time(crd),
        }
    }
}

/// The version marked as storage, else the legacy single `version` field
fn storage_version(spec: &Value) -> String {
    spec["versions"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|v| v["storage"].as_bool() == Some(true))
        .filter_map(|v| v["name"].as_str())
        .last()
        .or_else(|| spec["version"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn creation_time(object: &DynamicObject) -> Value {
    serde_json::to_value(&object.metadata.creation_timestamp).unwrap_or(Value::Null)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CrParams {
    group: String,
    version: String,
    resource: String,
    name: String,
    namespace: String,
    output: Option<String>,
}

impl CrParams {
    fn identity(&self) -> Result<ResourceIdentity, ResourceError> {
        let group = require(&self.group, "CR group")?;
        let resource = require(&self.resource, "CR resource")?;
        let version = require(&self.version, "CR version")?;

        let mut id = ResourceIdentity {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
            ..Default::default()
        };
        if !self.namespace.is_empty() {
            id = id.in_namespace(&self.namespace);
        }
        if !self.name.is_empty() {
            id = id.named(&self.name);
        }
        Ok(id)
    }
}

/// List entry of a custom resource
#[derive(Debug, Serialize)]
struct CrSummary {
    name: String,
    namespace: String,
    create_time: Value,
}

struct Definitions {
    engine: Arc<DynamicResource>,
    api: CrdApi,
}

pub fn register(registry: &mut Registry, ctx: &HandlerContext) {
    let definitions = Arc::new(Definitions {
        engine: Arc::clone(&ctx.engine),
        api: ctx.caps.crd,
    });
    register_op(registry, "crd.list", &definitions, list_crds);
    register_op(registry, "crd.get", &definitions, get_crd);

    register_op(registry, "cr.list", &ctx.engine, list_crs);
    register_op(registry, "cr.get", &ctx.engine, get_cr);
    register_op(registry, "cr.delete", &ctx.engine, delete_cr);
}

async fn list_crds(definitions: Arc<Definitions>, _call: Call) -> Result<Value, ResourceError> {
    let entries: Vec<CrdSummary> = definitions
        .engine
        .list(&definitions.api.identity(), None)
        .await?
        .iter()
        .map(CrdSummary::from)
        .collect();
    Ok(serde_json::to_value(entries)?)
}

async fn get_crd(definitions: Arc<Definitions>, call: Call) -> Result<Value, ResourceError> {
    let params: CrdParams = call.params()?;
    let name = require(&params.name, "Name")?;
    let object = definitions
        .engine
        .get(&definitions.api.identity().named(name))
        .await?;
    OutputFormat::parse(params.output.as_deref()).render(&object)
}

async fn list_crs(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: CrParams = call.params()?;
    let entries: Vec<CrSummary> = engine
        .list(&params.identity()?, None)
        .await?
        .iter()
        .map(|cr| CrSummary {
            name: cr.name_any(),
            namespace: cr.namespace().unwrap_or_default(),
            create_time: creation_time(cr),
        })
        .collect();
    Ok(serde_json::to_value(entries)?)
}

async fn get_cr(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: CrParams = call.params()?;
    let object = engine.get(&params.identity()?).await?;
    OutputFormat::parse(params.output.as_deref()).render(&object)
}

async fn delete_cr(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: CrParams = call.params()?;
    engine.delete(&params.identity()?).await?;
    Ok(Value::Null)
}
