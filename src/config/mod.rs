use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding one snapshot file per durable queue.
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweepConfig {
    /// How often the expiry sweeper visits every queue, in seconds.
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentsConfig {
    /// Whether the admission-agent chain starts enabled.
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub sweep: SweepConfig,
    pub agents: AgentsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                bind_addr: "127.0.0.1:7878".to_string(),
            },
            storage: StorageConfig {
                data_dir: "relayq-data".to_string(),
            },
            sweep: SweepConfig { interval_secs: 30 },
            agents: AgentsConfig { enabled: true },
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, anyhow::Error> {
    let raw: String = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&raw)?;
    Ok(config)
}
