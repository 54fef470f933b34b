//! Cluster change relay

mod informer;
mod relay;

pub use informer::{object_key, Informer, ResourceEventHandler};
pub use relay::{
    spawn_watches, watch_targets, WatchRelay, WatchTarget, WATCH_CONFIG_MAP, WATCH_DEPLOYMENT,
    WATCH_INGRESS, WATCH_POD, WATCH_SECRET, WATCH_SERVICE,
};
