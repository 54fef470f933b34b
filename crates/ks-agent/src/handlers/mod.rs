//! Action handlers
//!
//! Each module translates request params into engine calls for one family
//! of actions and shapes the result the way the server expects it.

pub mod cluster;
pub mod config_map;
pub mod crd;
pub mod ingress;
pub mod pod_log;
pub mod resource;
pub mod secret;

use std::future::Future;
use std::sync::Arc;

use kube::core::DynamicObject;
use serde::de::DeserializeOwned;
use serde_json::Value;

use ks_protocol::ResultPayload;

use crate::dispatch::{Call, Registry};
use crate::resource::{ClusterCapabilities, DynamicResource, ResourceError};

/// Shared state handed to every handler family
#[derive(Clone)]
pub struct HandlerContext {
    pub engine: Arc<DynamicResource>,
    pub caps: ClusterCapabilities,
}

impl HandlerContext {
    pub fn new(engine: Arc<DynamicResource>, caps: ClusterCapabilities) -> Self {
        Self { engine, caps }
    }
}

/// Register every request/response action
///
/// Streaming actions need the cluster client and the multiplexer and are
/// registered separately through [`pod_log::register`].
pub fn register_all(registry: &mut Registry, ctx: &HandlerContext) {
    resource::register(registry, ctx);
    config_map::register(registry, ctx);
    secret::register(registry, ctx);
    ingress::register(registry, ctx);
    crd::register(registry, ctx);
    cluster::register(registry, ctx);
}

/// Register `op` for `action`, sharing `state` between calls
pub(crate) fn register_op<S, F, Fut>(registry: &mut Registry, action: &str, state: &Arc<S>, op: F)
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ResourceError>> + Send + 'static,
{
    let state = Arc::clone(state);
    registry.register(action, move |call| {
        let result = op(Arc::clone(&state), call);
        async move {
            match result.await {
                Ok(data) => ResultPayload::success(data),
                Err(e) => e.into(),
            }
        }
    });
}

/// Reinterpret a dynamic object as a typed one
pub(crate) fn typed<K: DeserializeOwned>(object: DynamicObject) -> Result<K, ResourceError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Fail with `"<what> is blank"` when `value` is empty
pub(crate) fn require<'a>(value: &'a str, what: &str) -> Result<&'a str, ResourceError> {
    if value.is_empty() {
        Err(ResourceError::Params(format!("{} is blank", what)))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::resource::testing::FakeObjectClient;
    use crate::resource::ServerVersion;
    use ks_protocol::{Request, Response};

    /// Registry wired to an in-memory cluster
    pub fn registry_with(
        version: ServerVersion,
    ) -> (Registry, Arc<FakeObjectClient>, HandlerContext) {
        let fake = Arc::new(FakeObjectClient::new());
        let ctx = HandlerContext::new(
            Arc::new(DynamicResource::new(fake.clone())),
            ClusterCapabilities::for_version(version),
        );
        let mut registry = Registry::new();
        register_all(&mut registry, &ctx);
        (registry, fake, ctx)
    }

    pub async fn call(registry: &Registry, action: &str, params: Value) -> Response {
        registry
            .dispatch(Request::new("test-request", action, params))
            .await
    }
}
