//! TOML file configuration structures.
//!
//! These structs directly map to the `lnhub-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub node: NodeConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// External node connection section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Local node id used to scope all persisted records.
    #[serde(default = "default_node_id")]
    pub id: i32,
    /// HTTP base address of the node's management API.
    pub address: Url,
    /// Websocket base address; derived from `address` when omitted.
    pub ws_address: Option<Url>,
    /// Bearer token for the management API.
    pub auth_token: String,
}

fn default_node_id() -> i32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3001"

[node]
id = 2
address = "https://node.local:8080/"
auth_token = "secret"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3001);
        assert_eq!(config.node.id, 2);
        assert_eq!(config.node.address.as_str(), "https://node.local:8080/");
        assert!(config.node.ws_address.is_none());
    }

    #[test]
    fn server_section_is_optional() {
        let toml_str = r#"
[node]
address = "http://localhost:10009/"
auth_token = "t"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.node.id, 1);
    }
}
