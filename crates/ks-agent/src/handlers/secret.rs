//! `secret.*` actions

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{register_op, require, typed, HandlerContext};
use crate::dispatch::{Call, Registry};
use crate::resource::{label_selector, DynamicResource, OutputFormat, ResourceError, ResourceIdentity};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SecretParams {
    name: String,
    namespace: String,
    output: Option<String>,
    labels: BTreeMap<String, String>,
}

/// List entry; values stay base64 encoded
#[derive(Debug, Serialize)]
struct SecretSummary {
    name: String,
    namespace: String,
    keys: Vec<String>,
    labels: BTreeMap<String, String>,
    create_time: Option<Time>,
    #[serde(rename = "type")]
    type_: String,
    data: BTreeMap<String, ByteString>,
}

impl From<Secret> for SecretSummary {
    fn from(secret: Secret) -> Self {
        let data = secret.data.unwrap_or_default();
        Self {
            name: secret.metadata.name.unwrap_or_default(),
            namespace: secret.metadata.namespace.unwrap_or_default(),
            keys: data.keys().cloned().collect(),
            labels: secret.metadata.labels.unwrap_or_default(),
            create_time: secret.metadata.creation_timestamp,
            type_: secret.type_.unwrap_or_default(),
            data,
        }
    }
}

fn secrets() -> ResourceIdentity {
    ResourceIdentity::core("secrets", "Secret")
}

pub fn register(registry: &mut Registry, ctx: &HandlerContext) {
    register_op(registry, "secret.list", &ctx.engine, list);
    register_op(registry, "secret.get", &ctx.engine, get);
}

async fn list(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: SecretParams = call.params()?;
    let mut id = secrets();
    if !params.namespace.is_empty() {
        id = id.in_namespace(&params.namespace);
    }
    let selector = label_selector(&params.labels);

    let summaries = engine
        .list(&id, selector.as_deref())
        .await?
        .into_iter()
        .map(|obj| typed::<Secret>(obj).map(SecretSummary::from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::to_value(summaries)?)
}

async fn get(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: SecretParams = call.params()?;
    let name = require(&params.name, "Name")?;
    let namespace = require(&params.namespace, "Namespace")?;

    let object = engine
        .get(&secrets().in_namespace(namespace).named(name))
        .await?;
    OutputFormat::parse(params.output.as_deref()).render(&object)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{call, registry_with};
    use crate::resource::ServerVersion;
    use ks_protocol::Code;
    use kube::core::DynamicObject;
    use serde_json::json;

    fn secret(name: &str, namespace: &str) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": name, "namespace": namespace, "labels": {"tier": "db"}},
            "type": "Opaque",
            "data": {"password": "aHVudGVyMg=="},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_summaries() {
        let (registry, fake, _) = registry_with(ServerVersion::new(1, 24));
        fake.insert("secrets", secret("db", "ns"));
        fake.insert("secrets", secret("other", "elsewhere"));

        let response = call(&registry, "secret.list", json!({"namespace": "ns"})).await;
        assert!(response.data.is_success(), "{}", response.data.msg);
        let entries = response.data.data.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["type"], "Opaque");
        assert_eq!(entries[0]["keys"], json!(["password"]));
        assert_eq!(entries[0]["data"]["password"], "aHVudGVyMg==");
    }

    #[tokio::test]
    async fn test_get_yaml() {
        let (registry, fake, _) = registry_with(ServerVersion::new(1, 24));
        fake.insert("secrets", secret("db", "ns"));

        let response = call(
            &registry,
            "secret.get",
            json!({"name": "db", "namespace": "ns", "output": "yaml"}),
        )
        .await;
        let text = response.data.data.as_str().unwrap();
        assert!(text.contains("kind: Secret"));

        let blank = call(&registry, "secret.get", json!({"namespace": "ns"})).await;
        assert_eq!(blank.data.code, Code::ParamsError);
    }
}
