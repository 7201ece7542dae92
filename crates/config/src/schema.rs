use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Default RPC listen port.
pub const DEFAULT_RPC_PORT: u16 = 7000;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KrakenConfig {
    pub rpc: RpcConfig,
}

/// The JSON-RPC HTTP listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Interface to bind. Defaults to all interfaces.
    pub bind: String,

    pub port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

impl RpcConfig {
    /// Parse `bind:port` into a socket address. IPv6 binds may be given
    /// with or without brackets.
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let host = self.bind.trim_start_matches('[').trim_end_matches(']');
        let addr = if host.contains(':') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        };
        addr.parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid rpc bind address {addr}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_listen_on_all_interfaces() {
        let cfg = KrakenConfig::default();
        assert_eq!(cfg.rpc.socket_addr().unwrap().to_string(), "0.0.0.0:7000");
    }

    #[test]
    fn ipv6_bind_is_bracketed() {
        let rpc = RpcConfig {
            bind: "::1".into(),
            port: 9000,
        };
        assert_eq!(rpc.socket_addr().unwrap().to_string(), "[::1]:9000");
        let rpc = RpcConfig {
            bind: "[::1]".into(),
            port: 9000,
        };
        assert_eq!(rpc.socket_addr().unwrap().to_string(), "[::1]:9000");
    }

    #[test]
    fn hostname_bind_is_rejected() {
        let rpc = RpcConfig {
            bind: "localhost".into(),
            port: 1,
        };
        assert!(rpc.socket_addr().is_err());
    }
}
