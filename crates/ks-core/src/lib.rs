//! ks-core: Configuration and shared types for the KubeSpace agent
//!
//! This crate holds the agent configuration, the derivation of server
//! endpoints from it, and the configuration error type.

pub mod config;
pub mod error;

pub use config::{AgentConfig, ServerEndpoints};
pub use error::ConfigError;
