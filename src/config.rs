use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::network::discovery::RetryPolicy;
use crate::store::{AcceptAllValidator, OpinionValidator, RecordValidator};

pub const DEFAULT_CONFIG_PATH: &str = "config/opinion_chat.json";
pub const DEFAULT_LISTEN_ADDR: &str = "/ip4/0.0.0.0/tcp/0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidatorKind {
    #[default]
    Opinion,
    AcceptAll,
}

impl ValidatorKind {
    pub fn build(self) -> Box<dyn RecordValidator> {
        match self {
            ValidatorKind::Opinion => Box::new(OpinionValidator),
            ValidatorKind::AcceptAll => Box::new(AcceptAllValidator),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bootstrap_nodes: Vec<String>,
    pub listen_addr: String,
    pub enable_mdns: bool,
    pub dial_timeout_secs: u64,
    pub dial_retry_attempts: u32,
    pub dial_retry_base_ms: u64,
    pub dial_retry_max_ms: u64,
    pub peer_refresh_ms: u64,
    /// Thư mục chứa file `<room>.txt` cho lệnh /share. Defaults to `stocks-<nick>`.
    pub share_dir: Option<PathBuf>,
    pub validator: ValidatorKind,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bootstrap_nodes: Vec::new(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            enable_mdns: true,
            dial_timeout_secs: 10,
            dial_retry_attempts: 5,
            dial_retry_base_ms: 500,
            dial_retry_max_ms: 30_000,
            peer_refresh_ms: 1_000,
            share_dir: None,
            validator: ValidatorKind::Opinion,
        }
    }
}

impl AppConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs.max(1))
    }

    pub fn peer_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.peer_refresh_ms.max(100))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.dial_retry_attempts.max(1),
            base_delay: Duration::from_millis(self.dial_retry_base_ms),
            max_delay: Duration::from_millis(self.dial_retry_max_ms),
        }
    }

    pub fn share_dir_for(&self, nick: &str) -> PathBuf {
        self.share_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("stocks-{nick}")))
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}

/// Moves `entry` to the front of the bootstrap list and saves the file.
pub fn persist_bootstrap_node(path: &str, entry: &str) {
    let mut config = load_config(path);
    config.bootstrap_nodes.retain(|node| node != entry);
    config.bootstrap_nodes.insert(0, entry.to_string());

    if let Err(err) = save_config(path, &config) {
        log::error!("Failed to write bootstrap config {}: {err}", path);
    } else {
        log::info!("Persisted bootstrap node {} to {}", entry, path);
    }
}
