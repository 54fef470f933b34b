//! Watch cache
//!
//! Turns the raw watch stream of one kind into add/update/delete
//! notifications against a local cache keyed by `namespace/name`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::Api;
use kube::core::DynamicObject;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;

/// Receiver of cache notifications
///
/// Implementations may wait for queue space but must not perform network
/// I/O inline.
#[async_trait]
pub trait ResourceEventHandler: Send + Sync {
    async fn on_add(&self, object: &DynamicObject);
    async fn on_update(&self, old: &DynamicObject, new: &DynamicObject);
    async fn on_delete(&self, object: &DynamicObject);
}

/// Cache key of an object
pub fn object_key(object: &DynamicObject) -> String {
    match object.namespace() {
        Some(ns) => format!("{}/{}", ns, object.name_any()),
        None => object.name_any(),
    }
}

/// Local cache of one kind
pub struct Informer {
    kind: String,
    store: HashMap<String, DynamicObject>,
    relist: Option<HashMap<String, DynamicObject>>,
    handler: Arc<dyn ResourceEventHandler>,
}

impl Informer {
    pub fn new(kind: impl Into<String>, handler: Arc<dyn ResourceEventHandler>) -> Self {
        Self {
            kind: kind.into(),
            store: HashMap::new(),
            relist: None,
            handler,
        }
    }

    /// Objects currently cached
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Apply one watch event to the cache and notify the handler
    pub async fn handle(&mut self, event: Event<DynamicObject>) {
        match event {
            Event::Apply(object) => {
                let previous = self.store.insert(object_key(&object), object.clone());
                match previous {
                    Some(old) => self.handler.on_update(&old, &object).await,
                    None => self.handler.on_add(&object).await,
                }
            }
            Event::Delete(object) => {
                self.store.remove(&object_key(&object));
                self.handler.on_delete(&object).await;
            }
            Event::Init => {
                self.relist = Some(HashMap::new());
            }
            Event::InitApply(object) => {
                self.relist
                    .get_or_insert_with(HashMap::new)
                    .insert(object_key(&object), object);
            }
            Event::InitDone => self.finish_relist().await,
        }
    }

    /// Replace the cache with a completed relist, notifying the difference
    ///
    /// Objects whose resource version did not change are not re-announced.
    async fn finish_relist(&mut self) {
        let fresh = self.relist.take().unwrap_or_default();
        let previous = std::mem::replace(&mut self.store, fresh);

        for (key, old) in &previous {
            if !self.store.contains_key(key) {
                self.handler.on_delete(old).await;
            }
        }

        for (key, object) in &self.store {
            match previous.get(key) {
                Some(old) if old.resource_version() == object.resource_version() => {}
                Some(old) => self.handler.on_update(old, object).await,
                None => self.handler.on_add(object).await,
            }
        }

        tracing::debug!(kind = %self.kind, objects = self.store.len(), "Watch cache synced");
    }

    /// Follow the watch stream until `shutdown` fires
    ///
    /// Stream errors are retried with backoff and never end the watch.
    pub async fn run(mut self, api: Api<DynamicObject>, shutdown: CancellationToken) {
        let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
        futures::pin_mut!(stream);

        tracing::info!(kind = %self.kind, "Watching");
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = stream.next() => event,
            };

            match event {
                Some(Ok(event)) => self.handle(event).await,
                Some(Err(e)) => {
                    tracing::warn!(kind = %self.kind, error = %e, "Watch error, retrying");
                }
                None => break,
            }
        }
        tracing::debug!(kind = %self.kind, "Watch stopped");
    }
}
