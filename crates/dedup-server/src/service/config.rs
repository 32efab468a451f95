//! Process-level configuration layered on top of [`DedupConfig`]: bind
//! address and node identity, the settings a process needs that have no
//! place in the pure decision-pipeline config.

use dedup_core::DedupConfig;

/// Full server configuration: the dedup tunables plus process settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub dedup: DedupConfig,
    /// Identifier for this server process, used in logs and traces.
    pub node_id: String,
    pub bind_host: String,
    pub bind_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dedup: DedupConfig::default(),
            node_id: String::new(),
            bind_host: "0.0.0.0".to_string(),
            bind_port: 0,
        }
    }
}
