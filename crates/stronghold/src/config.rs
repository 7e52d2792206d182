//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stronghold_protocol::DEFAULT_MAX_VALUE_LEN;
use stronghold_session::SessionConfig;
use stronghold_transport::DEFAULT_OUTBOUND_QUEUE;
use tracing::warn;

/// Everything the listener and connection loops need to know.
///
/// Deserializes from JSON with every field optional:
///
/// ```rust
/// use stronghold::ServerConfig;
///
/// let config: ServerConfig = serde_json::from_str(r#"{ "ports": [7777, 7778] }"#).unwrap();
/// assert_eq!(config.ports, vec![7777, 7778]);
/// assert_eq!(config.read_buffer_size, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// One listener per port.
    pub ports: Vec<u16>,
    /// Size of the per-connection read buffer.
    pub read_buffer_size: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue: usize,
    /// Drop connections silent for this many seconds. `None` disables
    /// the check.
    pub idle_timeout_secs: Option<u64>,
    /// Largest string or byte-array value accepted from a client.
    pub max_value_len: usize,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            ports: vec![7777],
            read_buffer_size: 4096,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            idle_timeout_secs: None,
            max_value_len: DEFAULT_MAX_VALUE_LEN,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    const MIN_READ_BUFFER: usize = 64;

    /// Returns a copy with values clamped to workable ranges.
    ///
    /// Rules:
    /// - `read_buffer_size` is at least 64 bytes.
    /// - `outbound_queue` is at least 1.
    /// - An idle timeout of 0 disables the check.
    /// - An empty `ports` list falls back to the default port.
    pub fn validated(mut self) -> Self {
        if self.read_buffer_size < Self::MIN_READ_BUFFER {
            warn!(
                size = self.read_buffer_size,
                min = Self::MIN_READ_BUFFER,
                "read_buffer_size too small, clamping"
            );
            self.read_buffer_size = Self::MIN_READ_BUFFER;
        }
        if self.outbound_queue == 0 {
            warn!("outbound_queue of 0, using 1");
            self.outbound_queue = 1;
        }
        if self.idle_timeout_secs == Some(0) {
            warn!("idle_timeout_secs of 0, disabling idle timeout");
            self.idle_timeout_secs = None;
        }
        if self.ports.is_empty() {
            warn!("no ports configured, using the default");
            self.ports = Self::default().ports;
        }
        self
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// The canned reply to the client's policy-file request.
    pub fn policy_reply(&self) -> Vec<u8> {
        let ports = self
            .ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let mut reply = format!(
            r#"<cross-domain-policy><allow-access-from domain="*" to-ports="{ports}"/></cross-domain-policy>"#
        )
        .into_bytes();
        reply.push(0);
        reply
    }
}
