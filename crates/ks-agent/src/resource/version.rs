//! Server version probe
//!
//! Some kinds moved API groups over the years. The probe runs once at
//! startup and picks the group/version every version-dependent handler
//! and watch uses afterwards.

use std::fmt;

use kube::Client;

use super::identity::ResourceIdentity;

/// `major.minor` of the API server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse the `major`/`minor` fields of the version endpoint
    ///
    /// Managed clusters report values such as `"20+"`, so only the leading
    /// digits count.
    pub fn parse(major: &str, minor: &str) -> Option<Self> {
        Some(Self::new(leading_number(major)?, leading_number(minor)?))
    }

    /// Parse a git version such as `v1.20.3-eks-1`
    pub fn from_git_version(git_version: &str) -> Option<Self> {
        let mut parts = git_version.trim_start_matches('v').split('.');
        Self::parse(parts.next()?, parts.next()?)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// API group serving Ingress objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressApi {
    /// `networking.k8s.io/v1`, 1.19 and later
    NetworkingV1,
    /// `extensions/v1beta1`
    ExtensionsV1beta1,
}

impl IngressApi {
    pub fn identity(self) -> ResourceIdentity {
        match self {
            IngressApi::NetworkingV1 => {
                ResourceIdentity::new("networking.k8s.io", "v1", "ingresses", "Ingress")
            }
            IngressApi::ExtensionsV1beta1 => {
                ResourceIdentity::new("extensions", "v1beta1", "ingresses", "Ingress")
            }
        }
    }

    /// Short group label reported next to ingress listings
    pub fn label(self) -> &'static str {
        match self {
            IngressApi::NetworkingV1 => "networking",
            IngressApi::ExtensionsV1beta1 => "extensions",
        }
    }
}

/// API version serving CustomResourceDefinitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrdApi {
    /// `apiextensions.k8s.io/v1`, 1.16 and later
    V1,
    /// `apiextensions.k8s.io/v1beta1`
    V1beta1,
}

impl CrdApi {
    pub fn identity(self) -> ResourceIdentity {
        let version = match self {
            CrdApi::V1 => "v1",
            CrdApi::V1beta1 => "v1beta1",
        };
        ResourceIdentity::new(
            "apiextensions.k8s.io",
            version,
            "customresourcedefinitions",
            "CustomResourceDefinition",
        )
    }
}

/// Version-dependent choices made at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCapabilities {
    /// Parsed server version, when it could be read
    pub version: Option<ServerVersion>,
    /// Raw git version string reported by the server
    pub git_version: String,
    pub ingress: IngressApi,
    pub crd: CrdApi,
}

impl ClusterCapabilities {
    /// Choices for a known server version
    pub fn for_version(version: ServerVersion) -> Self {
        Self {
            version: Some(version),
            git_version: format!("v{}", version),
            ingress: if version >= ServerVersion::new(1, 19) {
                IngressApi::NetworkingV1
            } else {
                IngressApi::ExtensionsV1beta1
            },
            crd: if version >= ServerVersion::new(1, 16) {
                CrdApi::V1
            } else {
                CrdApi::V1beta1
            },
        }
    }

    /// Choices when the version is unknown: assume a current server
    pub fn latest() -> Self {
        Self {
            version: None,
            git_version: String::new(),
            ingress: IngressApi::NetworkingV1,
            crd: CrdApi::V1,
        }
    }

    /// Ask the API server for its version
    pub async fn probe(client: &Client) -> Self {
        match client.apiserver_version().await {
            Ok(info) => {
                let parsed = ServerVersion::parse(&info.major, &info.minor)
                    .or_else(|| ServerVersion::from_git_version(&info.git_version));
                match parsed {
                    Some(version) => {
                        let caps = Self {
                            git_version: info.git_version,
                            ..Self::for_version(version)
                        };
                        tracing::info!(
                            version = %caps.git_version,
                            ingress = ?caps.ingress,
                            crd = ?caps.crd,
                            "Probed API server version"
                        );
                        caps
                    }
                    None => {
                        tracing::warn!(
                            major = %info.major,
                            minor = %info.minor,
                            "Unparseable server version, assuming current APIs"
                        );
                        Self {
                            git_version: info.git_version,
                            ..Self::latest()
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read server version, assuming current APIs");
                Self::latest()
            }
        }
    }
}
