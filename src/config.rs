//! Engine configuration
//!
//! Settings come from the environment with an optional mounted YAML file
//! override (`ENGINE_CONFIG_PATH`). The file, when present, wins over the
//! environment so deployments can ship one ConfigMap per environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Base URL of the job-manager service supplying executable jobs
    #[serde(default = "default_jobmanager_url")]
    pub jobmanager_url: String,

    /// Listen address for the HTTP server
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Managed-cluster namespaces scanned by the resource-status sync
    #[serde(default)]
    pub managed_clusters: Vec<String>,
}

fn default_jobmanager_url() -> String {
    "http://jobmanager:8080".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jobmanager_url: default_jobmanager_url(),
            bind_addr: default_bind_addr(),
            managed_clusters: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load from the environment, then overlay the mounted file when
    /// `ENGINE_CONFIG_PATH` points at one.
    pub fn load() -> Self {
        let mut config = Self::from_env();

        if let Ok(path) = std::env::var("ENGINE_CONFIG_PATH") {
            if Path::new(&path).exists() {
                match Self::from_mounted_file(&path) {
                    Ok(file_config) => {
                        info!("Loaded engine configuration from {path}");
                        config = file_config;
                    }
                    Err(err) => {
                        warn!("Failed to load configuration from {path}: {err}. Using environment values.");
                    }
                }
            } else {
                warn!("ENGINE_CONFIG_PATH is set but {path} does not exist");
            }
        }

        config
    }

    fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("JOBMANAGER_URL") {
            config.jobmanager_url = url;
        }
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(clusters) = std::env::var("MANAGED_CLUSTERS") {
            config.managed_clusters = clusters
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        config
    }

    pub fn from_mounted_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.jobmanager_url.is_empty() {
            return Err("jobmanager_url must not be empty".to_string());
        }
        if self.bind_addr.is_empty() {
            return Err("bind_addr must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_overrides_every_field() {
        let yaml = "
jobmanager_url: http://jm.internal:9000
bind_addr: 127.0.0.1:3000
managed_clusters:
  - cluster1
  - cluster2
";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.jobmanager_url, "http://jm.internal:9000");
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.managed_clusters, vec!["cluster1", "cluster2"]);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str("managed_clusters: [c1]").unwrap();
        assert_eq!(config.jobmanager_url, default_jobmanager_url());
        assert_eq!(config.bind_addr, default_bind_addr());
    }
}
