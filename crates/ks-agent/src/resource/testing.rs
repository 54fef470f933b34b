//! In-memory [`ObjectClient`] for unit tests

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kube::core::{ApiResource, DynamicObject};
use kube::error::ErrorResponse;
use kube::ResourceExt;

use super::client::{fallback_kind, ObjectClient, ResolvedKind};

type Key = (String, String, String);

/// Stores objects keyed by `(plural, namespace, name)`
#[derive(Default)]
pub struct FakeObjectClient {
    objects: Mutex<BTreeMap<Key, DynamicObject>>,
    revision: Mutex<u64>,
}

impl FakeObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing create semantics
    pub fn insert(&self, plural: &str, object: DynamicObject) {
        let key = (
            plural.to_string(),
            object.namespace().unwrap_or_default(),
            object.name_any(),
        );
        self.objects.lock().unwrap().insert(key, object);
    }

    pub fn stored(&self, plural: &str, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&key(plural, namespace, name))
            .cloned()
    }

    fn next_revision(&self) -> String {
        let mut revision = self.revision.lock().unwrap();
        *revision += 1;
        revision.to_string()
    }
}

fn key(plural: &str, namespace: Option<&str>, name: &str) -> Key {
    (
        plural.to_string(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    })
}

fn not_found(ar: &ApiResource, name: &str) -> kube::Error {
    api_error(404, "NotFound", format!("{} \"{}\" not found", ar.plural, name))
}

fn matches_selector(object: &DynamicObject, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        let (k, v) = term.split_once('=').unwrap_or((term, ""));
        object.labels().get(k).map(String::as_str) == Some(v)
    })
}

#[async_trait]
impl ObjectClient for FakeObjectClient {
    async fn resolve(&self, api_version: &str, kind: &str) -> Result<ResolvedKind, kube::Error> {
        Ok(fallback_kind(api_version, kind))
    }

    async fn list(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, kube::Error> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((plural, ns, _), _)| {
                plural == &ar.plural && namespace.map_or(true, |want| want == ns)
            })
            .filter(|(_, obj)| matches_selector(obj, label_selector))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn get(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, kube::Error> {
        self.stored(&ar.plural, namespace, name)
            .ok_or_else(|| not_found(ar, name))
    }

    async fn create(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        let name = object.name_any();
        let key = key(&ar.plural, namespace, &name);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{} \"{}\" already exists", ar.plural, name),
            ));
        }

        let mut created = object.clone();
        created.metadata.namespace = namespace.map(str::to_string);
        created.metadata.resource_version = Some(self.next_revision());
        objects.insert(key, created.clone());
        Ok(created)
    }

    async fn replace(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        let key = key(&ar.plural, namespace, name);
        let mut objects = self.objects.lock().unwrap();
        let live = objects.get(&key).ok_or_else(|| not_found(ar, name))?;
        if live.metadata.resource_version != object.metadata.resource_version {
            return Err(api_error(
                409,
                "Conflict",
                format!("operation cannot be fulfilled on {} \"{}\"", ar.plural, name),
            ));
        }

        let mut replaced = object.clone();
        replaced.metadata.namespace = namespace.map(str::to_string);
        replaced.metadata.resource_version = Some(self.next_revision());
        objects.insert(key, replaced.clone());
        Ok(replaced)
    }

    async fn delete(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), kube::Error> {
        self.objects
            .lock()
            .unwrap()
            .remove(&key(&ar.plural, namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found(ar, name))
    }
}
