//! ks-agent: cluster-resident KubeSpace agent
//!
//! The agent keeps an outbound WebSocket control channel to the KubeSpace
//! server, executes the actions it receives against the cluster API and
//! streams results back over per-response and per-session connections.

pub mod agent;
pub mod dispatch;
pub mod handlers;
pub mod resource;
pub mod session;
pub mod tunnel;
pub mod updater;
pub mod watch;

pub use agent::Agent;
