//! Configuration management for the CLI

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration, read from `~/.config/vexctl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Namespace used when `-n` is not given
    pub default_namespace: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Namespace to use: explicit flag, then configured default, then `default`
    pub fn namespace(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.default_namespace.clone())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("vexctl").join("config.json"))
    }
}

/// Get kubeconfig path
pub fn kubeconfig_path(override_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var("KUBECONFIG") {
        return Ok(PathBuf::from(path));
    }

    let home = dirs_next::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".kube").join("config"))
}

/// Build a Kubernetes client from the kubeconfig, falling back to the
/// in-cluster environment when no kubeconfig file exists
pub async fn kube_client(override_path: Option<&str>) -> Result<Client> {
    let path = kubeconfig_path(override_path)?;

    let config = if path.exists() {
        let kubeconfig = Kubeconfig::read_from(&path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("Invalid kubeconfig")?
    } else {
        kube::Config::infer()
            .await
            .context("No kubeconfig found and not running in a cluster")?
    };

    Client::try_from(config).context("Failed to create Kubernetes client")
}
