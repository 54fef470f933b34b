//! `ingress.*` actions
//!
//! The API group is fixed at startup by the capability probe. Entries are
//! read from the unstructured form so both groups share one shape.

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::core::DynamicObject;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{register_op, require, HandlerContext};
use crate::dispatch::{Call, Registry};
use crate::resource::{
    label_selector, DynamicResource, IngressApi, OutputFormat, ResourceError, ResourceIdentity,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IngressParams {
    name: String,
    namespace: String,
    uid: String,
    output: Option<String>,
    labels: BTreeMap<String, String>,
}

impl IngressParams {
    /// Whether a listed ingress passes the uid and name filters
    fn matches(&self, object: &DynamicObject) -> bool {
        if !self.uid.is_empty() && object.uid().as_deref() != Some(self.uid.as_str()) {
            return false;
        }
        self.name.is_empty() || object.name_any().contains(&self.name)
    }
}

/// List entry
#[derive(Debug, Serialize)]
struct IngressSummary {
    uid: String,
    name: String,
    namespace: String,
    backend: Value,
    tls: Value,
    rules: Value,
    created: Value,
    resource_version: String,
}

impl From<&DynamicObject> for IngressSummary {
    fn from(object: &DynamicObject) -> Self {
        let spec = &object.data["spec"];
        let backend = match &spec["defaultBackend"] {
            Value::Null => spec["backend"].clone(),
            backend => backend.clone(),
        };
        Self {
            uid: object.uid().unwrap_or_default(),
            name: object.name_any(),
            namespace: object.namespace().unwrap_or_default(),
            backend,
            tls: spec["tls"].clone(),
            rules: spec["rules"].clone(),
            created: serde_json::to_value(&object.metadata.creation_timestamp).unwrap_or(Value::Null),
            resource_version: object.resource_version().unwrap_or_default(),
        }
    }
}

struct Ingresses {
    engine: Arc<DynamicResource>,
    api: IngressApi,
}

impl Ingresses {
    fn identity(&self) -> ResourceIdentity {
        self.api.identity()
    }
}

pub fn register(registry: &mut Registry, ctx: &HandlerContext) {
    let ingresses = Arc::new(Ingresses {
        engine: Arc::clone(&ctx.engine),
        api: ctx.caps.ingress,
    });
    register_op(registry, "ingress.list", &ingresses, list);
    register_op(registry, "ingress.get", &ingresses, get);
}

async fn list(ingresses: Arc<Ingresses>, call: Call) -> Result<Value, ResourceError> {
    let params: IngressParams = call.params()?;
    let mut id = ingresses.identity();
    if !params.namespace.is_empty() {
        id = id.in_namespace(&params.namespace);
    }
    let selector = label_selector(&params.labels);

    let entries: Vec<IngressSummary> = ingresses
        .engine
        .list(&id, selector.as_deref())
        .await?
        .iter()
        .filter(|obj| params.matches(obj))
        .map(IngressSummary::from)
        .collect();

    Ok(json!({
        "ingresses": entries,
        "group": ingresses.api.label(),
    }))
}

async fn get(ingresses: Arc<Ingresses>, call: Call) -> Result<Value, ResourceError> {
    let params: IngressParams = call.params()?;
    let name = require(&params.name, "Ingress name")?;
    let namespace = require(&params.namespace, "Ingress namespace")?;

    let object = ingresses
        .engine
        .get(&ingresses.identity().in_namespace(namespace).named(name))
        .await?;
    OutputFormat::parse(params.output.as_deref()).render(&object)
}
