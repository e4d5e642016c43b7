//! TOML configuration for the `strandd` CLI.
//!
//! Every section is optional; missing values fall back to the defaults of
//! the effective-value accessors below.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use strand_log::{CapabilitySet, LogConfig};
use strand_sync::SyncConfig;
use strand_types::PeerId;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Identity, data directory and feed name.
    pub node: NodeSection,
    /// Content store backend.
    pub storage: StorageSection,
    /// Write capabilities.
    pub access: AccessSection,
    /// Replication tuning.
    pub replication: ReplicationSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Identity to write as: a name, or a 64-character hex peer id.
    pub identity: Option<String>,
    /// Directory for the file store.
    pub data_dir: PathBuf,
    /// Name of the log (the feed) to open.
    pub log_name: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".strand"))
            .unwrap_or_else(|| PathBuf::from(".strand"));
        Self {
            identity: None,
            data_dir,
            log_name: "hello".to_string(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Backend type: `"file"` (default) or `"memory"`.
    pub backend: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
        }
    }
}

/// `[access]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AccessSection {
    /// Who may write: `"*"`, hex peer ids, or `"name:<name>"`.
    pub write: Vec<String>,
}

impl Default for AccessSection {
    fn default() -> Self {
        Self {
            write: vec!["*".to_string()],
        }
    }
}

/// `[replication]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReplicationSection {
    /// Bound on entries fetched per branch. Unbounded if omitted.
    pub max_resolve_depth: Option<usize>,
    pub store_retry_attempts: Option<u32>,
    pub store_retry_base_ms: Option<u64>,
    pub pending_retry_interval_ms: Option<u64>,
    pub announce_interval_ms: Option<u64>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Whether the store lives only in memory.
    pub fn is_memory(&self) -> bool {
        self.storage.backend == "memory"
    }

    /// Effective identity: the configured value, then `$USER`, then
    /// `"anonymous"`.
    pub fn identity(&self) -> PeerId {
        let name = self
            .node
            .identity
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "anonymous".to_string());
        parse_identity(&name)
    }

    /// Effective write capabilities (open write by default).
    pub fn capabilities(&self) -> anyhow::Result<CapabilitySet> {
        CapabilitySet::parse(&self.access.write).context("invalid [access] write list")
    }

    pub fn log_config(&self) -> anyhow::Result<LogConfig> {
        Ok(LogConfig::default()
            .with_access(self.capabilities()?)
            .with_max_resolve_depth(self.replication.max_resolve_depth))
    }

    pub fn sync_config(&self) -> SyncConfig {
        let defaults = SyncConfig::default();
        let r = &self.replication;

        SyncConfig {
            max_resolve_depth: r.max_resolve_depth,
            store_retry_attempts: r
                .store_retry_attempts
                .unwrap_or(defaults.store_retry_attempts),
            store_retry_base_ms: r.store_retry_base_ms.unwrap_or(defaults.store_retry_base_ms),
            pending_retry_interval_ms: r
                .pending_retry_interval_ms
                .unwrap_or(defaults.pending_retry_interval_ms),
            announce_interval_ms: r
                .announce_interval_ms
                .unwrap_or(defaults.announce_interval_ms),
        }
    }
}

/// A 64-character hex string is taken as a peer id; anything else is a
/// name hashed with [`PeerId::from_name`].
pub fn parse_identity(s: &str) -> PeerId {
    s.parse().unwrap_or_else(|_| PeerId::from_name(s))
}
