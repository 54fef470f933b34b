//! Server endpoint derivation

use url::Url;

use super::AgentConfig;
use crate::error::ConfigError;

/// Control channel path (server → agent requests)
pub const CONNECT_PATH: &str = "/api/v1/kube/connect";

/// Response channel path (agent → server responses)
pub const RESPONSE_PATH: &str = "/api/v1/kube/response";

/// Agent manifest path used by the self-update step
pub const SELF_UPDATE_PATH: &str = "/api/v1/kube/agent/yaml";

/// The three server URLs the agent talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoints {
    /// WebSocket URL of the control channel
    pub connect: Url,
    /// WebSocket URL of the response channel
    pub response: Url,
    /// HTTP base URL
    pub http: Url,
}

impl ServerEndpoints {
    /// Build endpoints from `host[:port]` and the TLS flag
    pub fn new(server_url: &str, tls: bool) -> Result<Self, ConfigError> {
        let (ws, http) = if tls { ("wss", "https") } else { ("ws", "http") };
        let host = server_url.trim().trim_end_matches('/');

        let parse = |scheme: &str, path: &str| {
            let raw = format!("{}://{}{}", scheme, host, path);
            Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { url: raw, source })
        };

        Ok(Self {
            connect: parse(ws, CONNECT_PATH)?,
            response: parse(ws, RESPONSE_PATH)?,
            http: parse(http, "/")?,
        })
    }

    /// Build endpoints from the agent configuration
    pub fn from_config(config: &AgentConfig) -> Result<Self, ConfigError> {
        Self::new(&config.server_url, config.tls)
    }

    /// URL of the agent manifest for `token`
    pub fn self_update_url(&self, token: &str) -> Url {
        let mut url = self.http.clone();
        url.set_path(SELF_UPDATE_PATH);
        url.query_pairs_mut().clear().append_pair("token", token);
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_endpoints() {
        let endpoints = ServerEndpoints::new("kubespace:8080", false).unwrap();
        assert_eq!(
            endpoints.connect.as_str(),
            "ws://kubespace:8080/api/v1/kube/connect"
        );
        assert_eq!(
            endpoints.response.as_str(),
            "ws://kubespace:8080/api/v1/kube/response"
        );
        assert_eq!(endpoints.http.as_str(), "http://kubespace:8080/");
    }

    #[test]
    fn test_tls_endpoints() {
        let endpoints = ServerEndpoints::new("kubespace.example.com/", true).unwrap();
        assert_eq!(endpoints.connect.scheme(), "wss");
        assert_eq!(endpoints.http.scheme(), "https");
    }

    #[test]
    fn test_self_update_url_encodes_token() {
        let endpoints = ServerEndpoints::new("kubespace", false).unwrap();
        let url = endpoints.self_update_url("a b&c");
        assert_eq!(
            url.as_str(),
            "http://kubespace/api/v1/kube/agent/yaml?token=a+b%26c"
        );
    }

    #[test]
    fn test_invalid_host() {
        assert!(matches!(
            ServerEndpoints::new("bad host", false),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
