//! `resource.*` actions: the dynamic engine exposed directly

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use ks_protocol::ResultPayload;

use super::{register_op, HandlerContext};
use crate::dispatch::{Call, Registry};
use crate::resource::{label_selector, DynamicResource, OutputFormat, ResourceError, ResourceIdentity};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResourceParams {
    #[serde(flatten)]
    identity: ResourceIdentity,
    labels: BTreeMap<String, String>,
    output: Option<String>,
    object: Option<Value>,
    yaml: Option<String>,
}

impl ResourceParams {
    fn object(&mut self) -> Result<Value, ResourceError> {
        self.object
            .take()
            .filter(|o| !o.is_null())
            .ok_or_else(|| ResourceError::Params("object is required".to_string()))
    }
}

pub fn register(registry: &mut Registry, ctx: &HandlerContext) {
    let engine = &ctx.engine;
    register_op(registry, "resource.list", engine, list);
    register_op(registry, "resource.get", engine, get);
    register_op(registry, "resource.create", engine, create);
    register_op(registry, "resource.update", engine, update);
    register_op(registry, "resource.delete", engine, delete);

    // Apply reports per-document outcomes, so it builds its own payload.
    let engine = Arc::clone(&ctx.engine);
    registry.register("resource.apply", move |call: Call| {
        let engine = Arc::clone(&engine);
        async move {
            let params: ResourceParams = match call.params() {
                Ok(params) => params,
                Err(e) => return ResultPayload::from(e),
            };
            match params.yaml.as_deref().filter(|y| !y.trim().is_empty()) {
                Some(manifest) => engine.apply_manifest(manifest).await.into_payload(),
                None => ResourceError::Params("yaml is required".to_string()).into(),
            }
        }
    });
}

async fn list(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: ResourceParams = call.params()?;
    let selector = label_selector(&params.labels);
    let objects = engine.list(&params.identity, selector.as_deref()).await?;
    Ok(serde_json::to_value(objects)?)
}

async fn get(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: ResourceParams = call.params()?;
    let object = engine.get(&params.identity).await?;
    OutputFormat::parse(params.output.as_deref()).render(&object)
}

async fn create(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let mut params: ResourceParams = call.params()?;
    let object = params.object()?;
    let created = engine.create(&params.identity, object).await?;
    Ok(serde_json::to_value(created)?)
}

async fn update(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let mut params: ResourceParams = call.params()?;
    let object = params.object()?;
    let updated = engine.update(&params.identity, object).await?;
    Ok(serde_json::to_value(updated)?)
}

async fn delete(engine: Arc<DynamicResource>, call: Call) -> Result<Value, ResourceError> {
    let params: ResourceParams = call.params()?;
    engine.delete(&params.identity).await?;
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{call, registry_with};
    use crate::resource::ServerVersion;
    use ks_protocol::Code;
    use serde_json::json;

    fn config_map(name: &str) -> serde_json::Value {
        json!({"version": "v1", "resource": "configmaps", "kind": "ConfigMap", "namespace": "team", "name": name})
    }

    #[tokio::test]
    async fn test_crud_cycle() {
        let (registry, fake, _) = registry_with(ServerVersion::new(1, 24));

        let mut params = config_map("settings");
        params["object"] = json!({"data": {"mode": "slow"}});
        params["labels"] = json!({"app": "web"});
        let created = call(&registry, "resource.create", params.clone()).await;
        assert!(created.data.is_success(), "{}", created.data.msg);
        assert_eq!(created.data.data["metadata"]["name"], "settings");

        params["object"] = json!({"data": {"mode": "fast"}});
        let updated = call(&registry, "resource.update", params).await;
        assert!(updated.data.is_success(), "{}", updated.data.msg);
        let stored = fake.stored("configmaps", Some("team"), "settings").unwrap();
        assert_eq!(stored.data["data"]["mode"], "fast");

        let yaml = call(
            &registry,
            "resource.get",
            json!({"version": "v1", "resource": "configmaps", "namespace": "team", "name": "settings", "output": "yaml"}),
        )
        .await;
        assert!(yaml.data.data.as_str().unwrap().contains("mode: fast"));

        let deleted = call(&registry, "resource.delete", config_map("settings")).await;
        assert!(deleted.data.is_success());
        assert_eq!(deleted.data.data, serde_json::Value::Null);
        assert!(fake.stored("configmaps", Some("team"), "settings").is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_labels() {
        let (registry, _, _) = registry_with(ServerVersion::new(1, 24));
        for (name, app) in [("a", "web"), ("b", "db")] {
            let mut params = config_map(name);
            params["object"] = json!({"metadata": {"labels": {"app": app}}});
            call(&registry, "resource.create", params).await;
        }

        let response = call(
            &registry,
            "resource.list",
            json!({"version": "v1", "resource": "configmaps", "labels": {"app": "db"}}),
        )
        .await;
        let items = response.data.data.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["metadata"]["name"], "b");
    }

    #[tokio::test]
    async fn test_errors_carry_operation_codes() {
        let (registry, _, _) = registry_with(ServerVersion::new(1, 24));

        let missing = call(&registry, "resource.get", config_map("ghost")).await;
        assert_eq!(missing.data.code, Code::GetError);

        let no_object = call(&registry, "resource.create", config_map("x")).await;
        assert_eq!(no_object.data.code, Code::ParamsError);
        assert_eq!(no_object.data.msg, "object is required");

        let no_version = call(&registry, "resource.list", json!({"resource": "pods"})).await;
        assert_eq!(no_version.data.code, Code::ParamsError);
    }

    #[tokio::test]
    async fn test_apply() {
        let (registry, fake, _) = registry_with(ServerVersion::new(1, 24));
        let yaml = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: applied\n  namespace: team\n";

        let response = call(&registry, "resource.apply", json!({"yaml": yaml})).await;
        assert!(response.data.is_success(), "{}", response.data.msg);
        assert_eq!(response.data.data["documents"][0]["status"], "created");
        assert!(fake.stored("configmaps", Some("team"), "applied").is_some());

        let empty = call(&registry, "resource.apply", json!({})).await;
        assert_eq!(empty.data.code, Code::ParamsError);
    }
}
