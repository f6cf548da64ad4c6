// src/config.rs

//! TOML configuration
//!
//! Connection settings for the Orchestrator tenant plus the local folders
//! orchsync works against. Every path is explicit in the config so tests and
//! CI can point everything at temporary directories.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Orchestrator connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the Orchestrator instance
    pub base_url: String,
    /// Organization name (cloud) or empty (on-prem)
    pub org: String,
    /// Tenant name
    pub tenant: String,
    /// External application client id
    pub client_id: String,
    /// External application client secret
    pub client_secret: String,
    /// OAuth scope for the client-credentials grant
    pub scope: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cloud.uipath.com".to_string(),
            org: String::new(),
            tenant: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: "OR.Default".to_string(),
        }
    }
}

/// Local filesystem layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Folder containing the automation project folders to scan
    pub projects_dir: Option<PathBuf>,
    /// Folder downloaded archives land in
    pub packages_dir: Option<PathBuf>,
    /// Override for the local NuGet cache root (defaults to ~/.nuget/packages)
    pub cache_root: Option<PathBuf>,
    /// Whitelist prefixes for custom libraries; empty means blacklist mode
    pub custom_prefixes: Vec<String>,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields defaults;
    /// a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Effective cache root: configured override or the conventional default.
    pub fn cache_root(&self) -> PathBuf {
        self.paths
            .cache_root
            .clone()
            .unwrap_or_else(crate::cache::PackageCache::default_root)
    }
}
