//! Bridge configuration.

use serde::{Deserialize, Serialize};

/// Local HTTP/WebSocket bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Enable the bridge server.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum concurrent page sockets.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Broadcast buffer for slow page sockets.
    #[serde(default = "default_push_buffer")]
    pub push_buffer: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_max_connections() -> usize {
    16
}

fn default_push_buffer() -> usize {
    64
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind: default_bind(),
            port: default_port(),
            max_connections: default_max_connections(),
            push_buffer: default_push_buffer(),
        }
    }
}

impl BridgeConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
