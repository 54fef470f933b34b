//! Cluster object access

pub mod client;
mod dynamic;
mod error;
mod identity;
pub mod manifest;
mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{create_client, KubeObjectClient, ObjectClient, ResolvedKind};
pub use dynamic::{ApplyReport, ApplyStatus, DocumentOutcome, DynamicResource, OutputFormat};
pub use error::{is_not_found, Operation, ResourceError};
pub use identity::{label_selector, ResourceIdentity};
pub use version::{ClusterCapabilities, CrdApi, IngressApi, ServerVersion};
