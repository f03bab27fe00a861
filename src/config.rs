use crate::error::{GaggleError, Result};
use crate::types::RoleLabels;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Consensus address (`host:port`). Also this node's member id.
    pub node_addr: String,

    pub http_addr: String,
    pub http_port: u16,

    /// HTTP address of an existing member to join through.
    pub join: Option<String>,

    pub data_dir: PathBuf,

    pub labels: RoleLabels,

    pub raft: RaftSettings,

    pub proposal_timeout_secs: u64,
    pub announce_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftSettings {
    pub heartbeat_interval_ms: u64,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub rpc_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_addr: "127.0.0.1:7000".to_string(),
            http_addr: "0.0.0.0".to_string(),
            http_port: 8000,
            join: None,
            data_dir: PathBuf::from("data"),
            labels: RoleLabels::default(),
            raft: RaftSettings::default(),
            proposal_timeout_secs: 30,
            announce_interval_ms: 500,
        }
    }
}

impl Default for RaftSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 500,
            election_timeout_min_ms: 1500,
            election_timeout_max_ms: 3000,
            rpc_timeout_ms: 5000,
        }
    }
}

impl NodeConfig {
    pub fn load(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &PathBuf) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_addr.trim().is_empty() {
            return Err(GaggleError::Config("node_addr must not be empty".to_string()));
        }
        if self.http_port == 0 {
            return Err(GaggleError::Config("http_port must not be zero".to_string()));
        }
        if matches!(&self.join, Some(addr) if addr.trim().is_empty()) {
            return Err(GaggleError::Config("join address must not be empty".to_string()));
        }
        if self.raft.election_timeout_min_ms >= self.raft.election_timeout_max_ms {
            return Err(GaggleError::Config(
                "election_timeout_min_ms must be below election_timeout_max_ms".to_string(),
            ));
        }
        if self.proposal_timeout_secs == 0 {
            return Err(GaggleError::Config(
                "proposal_timeout_secs must not be zero".to_string(),
            ));
        }
        if self.announce_interval_ms == 0 {
            return Err(GaggleError::Config(
                "announce_interval_ms must not be zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn http_listen_addr(&self) -> String {
        format!("{}:{}", self.http_addr, self.http_port)
    }

    pub fn proposal_timeout(&self) -> Duration {
        Duration::from_secs(self.proposal_timeout_secs)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }
}
