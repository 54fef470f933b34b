//! Resource identity: which kind, and optionally which object

use kube::core::ApiResource;
use serde::{Deserialize, Serialize};

use super::error::ResourceError;

/// `{group, version, resource}` plus optional kind, namespace and name
///
/// The group is empty for the core API. An empty namespace is the same as
/// no namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentity {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    /// Plural resource name, e.g. `configmaps`
    #[serde(default)]
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ResourceIdentity {
    /// Identity of a kind
    pub fn new(group: &str, version: &str, resource: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
            kind: Some(kind.to_string()),
            namespace: None,
            name: None,
        }
    }

    /// Identity of a core (`v1`) kind
    pub fn core(resource: &str, kind: &str) -> Self {
        Self::new("", "v1", resource, kind)
    }

    /// Scope to a namespace
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Point at a single object
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Dynamic type used to address the kind
    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone().unwrap_or_else(|| self.resource.clone()),
            plural: self.resource.clone(),
        }
    }

    /// Non-empty namespace, if any
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    /// Non-empty name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    /// Name of the target object, or a parameter error
    pub fn require_name(&self) -> Result<&str, ResourceError> {
        self.name()
            .ok_or_else(|| ResourceError::Params("name is required".to_string()))
    }

    /// Check that the kind is addressable
    pub fn validate(&self) -> Result<(), ResourceError> {
        if self.version.is_empty() {
            return Err(ResourceError::Params("version is required".to_string()));
        }
        if self.resource.is_empty() {
            return Err(ResourceError::Params("resource is required".to_string()));
        }
        Ok(())
    }
}

/// Build the `k=v,k2=v2` label selector for a label map
pub fn label_selector<'a, I>(labels: I) -> Option<String>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let selector = labels
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    (!selector.is_empty()).then_some(selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_api_version() {
        assert_eq!(ResourceIdentity::core("pods", "Pod").api_version(), "v1");
        assert_eq!(
            ResourceIdentity::new("apps", "v1", "deployments", "Deployment").api_version(),
            "apps/v1"
        );
    }

    #[test]
    fn test_api_resource_defaults_kind_to_resource() {
        let id: ResourceIdentity =
            serde_json::from_str(r#"{"group":"example.com","version":"v1","resource":"widgets"}"#)
                .unwrap();
        let ar = id.api_resource();
        assert_eq!(ar.plural, "widgets");
        assert_eq!(ar.kind, "widgets");
        assert_eq!(ar.api_version, "example.com/v1");
    }

    #[test]
    fn test_empty_namespace_is_none() {
        let id = ResourceIdentity::core("configmaps", "ConfigMap").in_namespace("");
        assert_eq!(id.namespace(), None);
    }

    #[test]
    fn test_validate() {
        assert!(ResourceIdentity::default().validate().is_err());
        assert!(ResourceIdentity::core("pods", "Pod").validate().is_ok());
        assert!(ResourceIdentity::core("pods", "Pod").require_name().is_err());
    }

    #[test]
    fn test_label_selector() {
        let mut labels = BTreeMap::new();
        assert_eq!(label_selector(&labels), None);
        labels.insert("app".to_string(), "web".to_string());
        labels.insert("tier".to_string(), "front".to_string());
        assert_eq!(label_selector(&labels).as_deref(), Some("app=web,tier=front"));
    }
}
