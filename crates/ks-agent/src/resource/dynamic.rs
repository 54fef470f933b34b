//! Dynamic resource engine
//!
//! Generic CRUD over any kind addressed by [`ResourceIdentity`], plus
//! multi-document manifest apply. Kind-specific handlers are thin layers
//! over this.

use std::fmt;
use std::sync::Arc;

use kube::core::{DynamicObject, TypeMeta};
use kube::ResourceExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use ks_protocol::{Code, ResultPayload};

use super::client::ObjectClient;
use super::error::{is_not_found, Operation, ResourceError};
use super::identity::ResourceIdentity;
use super::manifest::{decode_document, split_documents, ManifestObject};

/// Encoding requested for single-object output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    /// `"yaml"` selects YAML; anything else is JSON
    pub fn parse(output: Option<&str>) -> Self {
        match output {
            Some(o) if o.eq_ignore_ascii_case("yaml") => OutputFormat::Yaml,
            _ => OutputFormat::Json,
        }
    }

    /// Render an object, as a YAML string or as a JSON value
    pub fn render<T: Serialize>(self, object: &T) -> Result<Value, ResourceError> {
        match self {
            OutputFormat::Yaml => serde_yaml::to_string(object)
                .map(Value::String)
                .map_err(|e| ResourceError::Encode(e.to_string())),
            OutputFormat::Json => Ok(serde_json::to_value(object)?),
        }
    }
}

/// What apply did with one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApplyStatus {
    Created,
    Updated,
    Failed { error: String },
}

/// Outcome of one manifest document
#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub index: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub status: ApplyStatus,
}

impl DocumentOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ApplyStatus::Failed { .. })
    }
}

impl fmt::Display for DocumentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document {}", self.index)?;
        if !self.kind.is_empty() {
            write!(f, " ({}/{})", self.kind, self.name)?;
        }
        if let ApplyStatus::Failed { error } = &self.status {
            write!(f, ": {}", error)?;
        }
        Ok(())
    }
}

/// Per-document results of a manifest apply
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub documents: Vec<DocumentOutcome>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.documents.iter().filter(|d| d.is_failed())
    }

    /// Documents that were created or updated
    pub fn applied(&self) -> usize {
        self.documents.len() - self.failures().count()
    }

    /// Success, or an apply error naming only the failed documents
    pub fn into_payload(self) -> ResultPayload {
        let data = serde_json::to_value(&self).unwrap_or(Value::Null);
        if self.is_success() {
            return ResultPayload::success(data);
        }
        let msg = self
            .failures()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        ResultPayload::failure(Code::ApplyError, msg).with_data(data)
    }
}

/// Generic CRUD and apply over [`ObjectClient`]
#[derive(Clone)]
pub struct DynamicResource {
    client: Arc<dyn ObjectClient>,
}

impl DynamicResource {
    pub fn new(client: Arc<dyn ObjectClient>) -> Self {
        Self { client }
    }

    /// List objects of a kind, in one namespace or across all of them
    pub async fn list(
        &self,
        id: &ResourceIdentity,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ResourceError> {
        id.validate()?;
        self.client
            .list(&id.api_resource(), id.namespace(), label_selector)
            .await
            .map_err(|e| ResourceError::api(Operation::List, e))
    }

    /// Fetch the named object
    pub async fn get(&self, id: &ResourceIdentity) -> Result<DynamicObject, ResourceError> {
        id.validate()?;
        let name = id.require_name()?;
        self.client
            .get(&id.api_resource(), id.namespace(), name)
            .await
            .map_err(|e| ResourceError::api(Operation::Get, e))
    }

    /// Create an object from its JSON form
    pub async fn create(
        &self,
        id: &ResourceIdentity,
        object: Value,
    ) -> Result<DynamicObject, ResourceError> {
        id.validate()?;
        let object = self.prepare(id, object)?;
        let namespace = object.namespace().or_else(|| id.namespace().map(str::to_string));
        self.client
            .create(&id.api_resource(), namespace.as_deref(), &object)
            .await
            .map_err(|e| ResourceError::api(Operation::Create, e))
    }

    /// Replace an object from its JSON form
    ///
    /// Without a resource version in `object`, the live one is used.
    pub async fn update(
        &self,
        id: &ResourceIdentity,
        object: Value,
    ) -> Result<DynamicObject, ResourceError> {
        id.validate()?;
        let mut object = self.prepare(id, object)?;
        let name = match id.name() {
            Some(name) => name.to_string(),
            None => object.name_any(),
        };
        if name.is_empty() {
            return Err(ResourceError::Params("name is required".to_string()));
        }
        let namespace = object.namespace().or_else(|| id.namespace().map(str::to_string));
        let ar = id.api_resource();

        if object.metadata.resource_version.is_none() {
            let live = self
                .client
                .get(&ar, namespace.as_deref(), &name)
                .await
                .map_err(|e| ResourceError::api(Operation::Update, e))?;
            object.metadata.resource_version = live.metadata.resource_version;
        }

        self.client
            .replace(&ar, namespace.as_deref(), &name, &object)
            .await
            .map_err(|e| ResourceError::api(Operation::Update, e))
    }

    /// Delete the named object
    pub async fn delete(&self, id: &ResourceIdentity) -> Result<(), ResourceError> {
        id.validate()?;
        let name = id.require_name()?;
        self.client
            .delete(&id.api_resource(), id.namespace(), name)
            .await
            .map_err(|e| ResourceError::api(Operation::Delete, e))?;
        info!(
            kind = %id.resource,
            name = %name,
            namespace = id.namespace().unwrap_or(""),
            "Deleted object"
        );
        Ok(())
    }

    /// Create-or-update every document of a multi-document manifest
    ///
    /// A failing document does not stop the remaining ones.
    pub async fn apply_manifest(&self, manifest: &str) -> ApplyReport {
        let mut report = ApplyReport::default();

        for (index, document) in split_documents(manifest).iter().enumerate() {
            let outcome = match decode_document(index, document) {
                Ok(object) => self.apply_object(object).await,
                Err(e) => {
                    warn!(index, error = %e, "Skipping undecodable manifest document");
                    DocumentOutcome {
                        index,
                        kind: String::new(),
                        name: String::new(),
                        namespace: None,
                        status: ApplyStatus::Failed {
                            error: e.to_string(),
                        },
                    }
                }
            };
            report.documents.push(outcome);
        }

        info!(
            documents = report.documents.len(),
            applied = report.applied(),
            "Applied manifest"
        );
        report
    }

    async fn apply_object(&self, manifest: ManifestObject) -> DocumentOutcome {
        let name = manifest.name();
        let mut namespace = manifest.namespace();
        let index = manifest.index;
        let kind = manifest.kind.clone();

        let status = match self.create_or_update(manifest, &mut namespace).await {
            Ok(status) => {
                info!(kind = %kind, name = %name, namespace = namespace.as_deref().unwrap_or(""), ?status, "Applied object");
                status
            }
            Err(e) => {
                warn!(kind = %kind, name = %name, error = %e, "Failed to apply object");
                ApplyStatus::Failed {
                    error: e.to_string(),
                }
            }
        };

        DocumentOutcome {
            index,
            kind,
            name,
            namespace,
            status,
        }
    }

    async fn create_or_update(
        &self,
        manifest: ManifestObject,
        namespace: &mut Option<String>,
    ) -> Result<ApplyStatus, ResourceError> {
        let resolved = self
            .client
            .resolve(&manifest.api_version, &manifest.kind)
            .await
            .map_err(|e| ResourceError::api(Operation::Apply, e))?;

        let mut object = manifest.object;
        let name = object.name_any();
        if resolved.namespaced {
            let ns = namespace.get_or_insert_with(|| "default".to_string()).clone();
            object.metadata.namespace = Some(ns);
        } else {
            *namespace = None;
            object.metadata.namespace = None;
        }
        let ar = &resolved.resource;

        match self.client.get(ar, namespace.as_deref(), &name).await {
            Ok(live) => {
                object.metadata.resource_version = live.metadata.resource_version;
                self.client
                    .replace(ar, namespace.as_deref(), &name, &object)
                    .await
                    .map_err(|e| ResourceError::api(Operation::Apply, e))?;
                Ok(ApplyStatus::Updated)
            }
            Err(e) if is_not_found(&e) => {
                object.metadata.resource_version = None;
                self.client
                    .create(ar, namespace.as_deref(), &object)
                    .await
                    .map_err(|e| ResourceError::api(Operation::Apply, e))?;
                Ok(ApplyStatus::Created)
            }
            Err(e) => Err(ResourceError::api(Operation::Apply, e)),
        }
    }

    /// Decode `object` and fill in the identity's namespace and name
    fn prepare(&self, id: &ResourceIdentity, mut object: Value) -> Result<DynamicObject, ResourceError> {
        let Some(fields) = object.as_object_mut() else {
            return Err(ResourceError::Params("object is required".to_string()));
        };
        fields
            .entry("metadata")
            .or_insert_with(|| Value::Object(Default::default()));

        let mut object: DynamicObject = serde_json::from_value(object)
            .map_err(|e| ResourceError::Params(format!("invalid object: {}", e)))?;

        if object.types.is_none() {
            if let Some(kind) = &id.kind {
                object.types = Some(TypeMeta {
                    api_version: id.api_version(),
                    kind: kind.clone(),
                });
            }
        }

        if object.metadata.namespace.is_none() {
            object.metadata.namespace = id.namespace().map(str::to_string);
        }
        if object.metadata.name.is_none() {
            object.metadata.name = id.name().map(str::to_string);
        }
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::FakeObjectClient;
    use serde_json::json;

    fn engine() -> (DynamicResource, Arc<FakeObjectClient>) {
        let fake = Arc::new(FakeObjectClient::new());
        (DynamicResource::new(fake.clone()), fake)
    }

    fn config_maps(ns: &str) -> ResourceIdentity {
        ResourceIdentity::core("configmaps", "ConfigMap").in_namespace(ns)
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (engine, _) = engine();
        let id = config_maps("team").named("settings");

        engine
            .create(&id, json!({"data": {"a": "1"}}))
            .await
            .unwrap();
        let obj = engine.get(&id).await.unwrap();

        assert_eq!(obj.name_any(), "settings");
        assert_eq!(obj.namespace().as_deref(), Some("team"));
        assert_eq!(obj.data["data"]["a"], "1");
    }

    #[tokio::test]
    async fn test_get_missing_is_get_error() {
        let (engine, _) = engine();
        let err = engine.get(&config_maps("team").named("nope")).await.unwrap_err();

        assert_eq!(err.code(), Code::GetError);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_get_requires_name() {
        let (engine, _) = engine();
        let err = engine.get(&config_maps("team")).await.unwrap_err();
        assert_eq!(err.code(), Code::ParamsError);
    }

    #[tokio::test]
    async fn test_update_uses_live_resource_version() {
        let (engine, fake) = engine();
        let id = config_maps("team").named("settings");
        engine.create(&id, json!({"data": {"a": "1"}})).await.unwrap();

        engine.update(&id, json!({"data": {"a": "2"}})).await.unwrap();

        let stored = fake.stored("configmaps", Some("team"), "settings").unwrap();
        assert_eq!(stored.data["data"]["a"], "2");
        assert_eq!(stored.metadata.resource_version.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_update_missing_is_update_error() {
        let (engine, _) = engine();
        let err = engine
            .update(&config_maps("team").named("ghost"), json!({"data": {}}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::UpdateError);
    }

    #[tokio::test]
    async fn test_list_by_namespace_and_labels() {
        let (engine, _) = engine();
        engine
            .create(
                &config_maps("a").named("one"),
                json!({"metadata": {"labels": {"app": "web"}}}),
            )
            .await
            .unwrap();
        engine.create(&config_maps("a").named("two"), json!({})).await.unwrap();
        engine.create(&config_maps("b").named("three"), json!({})).await.unwrap();

        assert_eq!(engine.list(&config_maps("a"), None).await.unwrap().len(), 2);
        assert_eq!(
            engine
                .list(&ResourceIdentity::core("configmaps", "ConfigMap"), None)
                .await
                .unwrap()
                .len(),
            3
        );
        let labelled = engine.list(&config_maps("a"), Some("app=web")).await.unwrap();
        assert_eq!(labelled.len(), 1);
        assert_eq!(labelled[0].name_any(), "one");
    }

    #[tokio::test]
    async fn test_delete() {
        let (engine, fake) = engine();
        let id = config_maps("a").named("one");
        engine.create(&id, json!({})).await.unwrap();

        engine.delete(&id).await.unwrap();
        assert!(fake.stored("configmaps", Some("a"), "one").is_none());

        let err = engine.delete(&id).await.unwrap_err();
        assert_eq!(err.code(), Code::DeleteError);
    }

    #[tokio::test]
    async fn test_apply_creates_then_updates() {
        let (engine, fake) = engine();
        let manifest = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  namespace: team
data:
  mode: slow
";
        let first = engine.apply_manifest(manifest).await;
        assert!(first.is_success());
        assert_eq!(first.documents[0].status, ApplyStatus::Created);

        let second = engine
            .apply_manifest(&manifest.replace("slow", "fast"))
            .await;
        assert_eq!(second.documents[0].status, ApplyStatus::Updated);

        let stored = fake.stored("configmaps", Some("team"), "settings").unwrap();
        assert_eq!(stored.data["data"]["mode"], "fast");
    }

    #[tokio::test]
    async fn test_apply_continues_past_bad_document() {
        let (engine, fake) = engine();
        let manifest = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: first
---
apiVersion: v1
metadata:
  name: no-kind
---
apiVersion: v1
kind: Namespace
metadata:
  name: team
";
        let report = engine.apply_manifest(manifest).await;

        assert_eq!(report.documents.len(), 3);
        assert_eq!(report.applied(), 2);
        let failed: Vec<_> = report.failures().map(|d| d.index).collect();
        assert_eq!(failed, vec![1]);

        // Namespaced kinds default to "default"; cluster-scoped kinds carry none
        assert!(fake.stored("configmaps", Some("default"), "first").is_some());
        assert!(fake.stored("namespaces", None, "team").is_some());

        let payload = report.into_payload();
        assert_eq!(payload.code, Code::ApplyError);
        assert_eq!(payload.msg, "document 1: missing kind");
        assert_eq!(payload.data["documents"][0]["status"], "created");
        assert_eq!(payload.data["documents"][1]["status"], "failed");
    }

    #[tokio::test]
    async fn test_apply_empty_manifest_succeeds() {
        let (engine, _) = engine();
        let report = engine.apply_manifest("---\n# nothing\n").await;
        assert!(report.documents.is_empty());
        assert!(report.into_payload().is_success());
    }

    #[test]
    fn test_output_format() {
        assert_eq!(OutputFormat::parse(Some("yaml")), OutputFormat::Yaml);
        assert_eq!(OutputFormat::parse(Some("json")), OutputFormat::Json);
        assert_eq!(OutputFormat::parse(None), OutputFormat::Json);

        let rendered = OutputFormat::Yaml.render(&json!({"a": 1})).unwrap();
        assert_eq!(rendered, Value::String("a: 1\n".to_string()));
    }
}
