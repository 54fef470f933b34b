//! Multi-document YAML manifests

use kube::core::DynamicObject;
use kube::ResourceExt;
use serde_json::Value;

use super::error::ResourceError;

/// One decoded manifest document
#[derive(Debug, Clone)]
pub struct ManifestObject {
    /// Position among the non-empty documents, starting at 0
    pub index: usize,
    pub api_version: String,
    pub kind: String,
    pub object: DynamicObject,
}

impl ManifestObject {
    pub fn name(&self) -> String {
        self.object.name_any()
    }

    pub fn namespace(&self) -> Option<String> {
        self.object.namespace()
    }
}

/// Split a manifest on `---` separator lines, dropping empty documents
///
/// A document holding only whitespace and comments counts as empty.
pub fn split_documents(manifest: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();

    for line in manifest.lines() {
        if is_separator(line) {
            push_document(&mut documents, std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    push_document(&mut documents, current);

    documents
}

fn is_separator(line: &str) -> bool {
    let line = line.trim_end();
    line == "---" || line.starts_with("--- ")
}

fn push_document(documents: &mut Vec<String>, document: String) {
    let has_content = document.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#')
    });
    if has_content {
        documents.push(document);
    }
}

/// Decode one document into an object with apiVersion, kind and name
pub fn decode_document(index: usize, document: &str) -> Result<ManifestObject, ResourceError> {
    let value: Value = serde_yaml::from_str(document)
        .map_err(|e| ResourceError::Manifest(format!("invalid yaml: {}", e)))?;

    if !value.is_object() {
        return Err(ResourceError::Manifest(
            "document is not a mapping".to_string(),
        ));
    }

    let api_version = required_str(&value, &["apiVersion"])?;
    let kind = required_str(&value, &["kind"])?;
    required_str(&value, &["metadata", "name"])?;

    let object: DynamicObject = serde_json::from_value(value)
        .map_err(|e| ResourceError::Manifest(format!("invalid object: {}", e)))?;

    Ok(ManifestObject {
        index,
        api_version,
        kind,
        object,
    })
}

fn required_str(value: &Value, path: &[&str]) -> Result<String, ResourceError> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(key).unwrap_or(&Value::Null);
    }
    match cursor.as_str() {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(ResourceError::Manifest(format!(
            "missing {}",
            path.join(".")
        ))),
    }
}
