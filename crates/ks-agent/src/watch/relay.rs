//! Change relay
//!
//! Every cache notification of a watched kind becomes one request-type
//! response addressed to that kind's fixed marker.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::Api;
use kube::core::DynamicObject;
use kube::Client;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ks_protocol::{RequestId, Response, ResultPayload};

use super::informer::{Informer, ResourceEventHandler};
use crate::resource::{ClusterCapabilities, ResourceIdentity};
use crate::session::ResponseSink;

pub const WATCH_POD: &str = "watch_pod";
pub const WATCH_DEPLOYMENT: &str = "watch_deployment";
pub const WATCH_SERVICE: &str = "watch_service";
pub const WATCH_INGRESS: &str = "watch_ingress";
pub const WATCH_SECRET: &str = "watch_secret";
pub const WATCH_CONFIG_MAP: &str = "watch_config_map";

/// A watched kind and the marker its changes are sent under
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub marker: &'static str,
    pub identity: ResourceIdentity,
}

/// The kinds whose changes are relayed
pub fn watch_targets(caps: &ClusterCapabilities) -> Vec<WatchTarget> {
    vec![
        WatchTarget {
            marker: WATCH_POD,
            identity: ResourceIdentity::core("pods", "Pod"),
        },
        WatchTarget {
            marker: WATCH_DEPLOYMENT,
            identity: ResourceIdentity::new("apps", "v1", "deployments", "Deployment"),
        },
        WatchTarget {
            marker: WATCH_SERVICE,
            identity: ResourceIdentity::core("services", "Service"),
        },
        WatchTarget {
            marker: WATCH_INGRESS,
            identity: caps.ingress.identity(),
        },
        WatchTarget {
            marker: WATCH_SECRET,
            identity: ResourceIdentity::core("secrets", "Secret"),
        },
        WatchTarget {
            marker: WATCH_CONFIG_MAP,
            identity: ResourceIdentity::core("configmaps", "ConfigMap"),
        },
    ]
}

/// Forwards cache notifications to a response sink
pub struct WatchRelay {
    marker: RequestId,
    sink: Arc<dyn ResponseSink>,
}

impl WatchRelay {
    pub fn new(marker: impl Into<RequestId>, sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            marker: marker.into(),
            sink,
        }
    }

    async fn relay(&self, event: &str, object: &DynamicObject) {
        let payload = ResultPayload::success(json!({
            "event": event,
            "obj": object,
        }));
        if let Err(e) = self
            .sink
            .send(Response::request(self.marker.clone(), payload))
            .await
        {
            tracing::warn!(marker = %self.marker, event, "Dropping watch event: {}", e);
        }
    }
}

#[async_trait]
impl ResourceEventHandler for WatchRelay {
    async fn on_add(&self, object: &DynamicObject) {
        self.relay("add", object).await;
    }

    async fn on_update(&self, _old: &DynamicObject, new: &DynamicObject) {
        self.relay("update", new).await;
    }

    async fn on_delete(&self, object: &DynamicObject) {
        self.relay("delete", object).await;
    }
}

/// Start one cluster-wide watch per target
pub fn spawn_watches(
    client: Client,
    caps: &ClusterCapabilities,
    sink: Arc<dyn ResponseSink>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    watch_targets(caps)
        .into_iter()
        .map(|target| {
            let api: Api<DynamicObject> =
                Api::all_with(client.clone(), &target.identity.api_resource());
            let relay = WatchRelay::new(target.marker, Arc::clone(&sink));
            let informer = Informer::new(target.identity.resource, Arc::new(relay));
            tokio::spawn(informer.run(api, shutdown.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{IngressApi, ServerVersion};
    use kube::runtime::watcher::Event;
    use tokio::sync::mpsc;

    fn config_map(name: &str, version: &str) -> DynamicObject {
        let ar = ResourceIdentity::core("configmaps", "ConfigMap").api_resource();
        let mut obj = DynamicObject::new(name, &ar).within("team");
        obj.metadata.resource_version = Some(version.to_string());
        obj
    }

    #[tokio::test]
    async fn test_relays_each_change_once() {
        let (tx, mut rx) = mpsc::channel(16);
        let relay = Arc::new(WatchRelay::new(WATCH_CONFIG_MAP, Arc::new(tx)));
        let mut informer = Informer::new("configmaps", relay);

        informer.handle(Event::Apply(config_map("settings", "1"))).await;
        informer.handle(Event::Apply(config_map("settings", "2"))).await;
        informer.handle(Event::Delete(config_map("settings", "2"))).await;

        let mut events = Vec::new();
        while let Ok(response) = rx.try_recv() {
            assert_eq!(response.request_id.as_str(), "watch_config_map");
            assert!(!response.is_exec());
            assert!(response.data.is_success());
            assert_eq!(response.data.data["obj"]["metadata"]["name"], "settings");
            events.push(response.data.data["event"].as_str().unwrap().to_string());
        }
        assert_eq!(events, vec!["add", "update", "delete"]);
    }

    #[test]
    fn test_targets_follow_capabilities() {
        let old = ClusterCapabilities::for_version(ServerVersion::new(1, 14));
        let targets = watch_targets(&old);
        assert_eq!(targets.len(), 6);

        let ingress = targets.iter().find(|t| t.marker == WATCH_INGRESS).unwrap();
        assert_eq!(ingress.identity, IngressApi::ExtensionsV1beta1.identity());
    }
}
