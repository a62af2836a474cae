// ABOUTME: Figment-layered settings for the example server/client binaries
// ABOUTME: Layers hardcoded defaults, an optional TOML file, then TARP_*-prefixed env vars

//! Layered configuration for the `tarp-server`/`tarp-client` example binaries,
//! following the same Figment merge order the other example services in this
//! codebase use: defaults, then a config file, then environment variables as
//! the final override.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::constants::{limits, network};
use crate::error::{Result, TarpError};

/// Settings for the `tarp-server` demo binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
    pub max_workers: usize,
    pub log_level: String,
    pub tls_enabled: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: network::DEFAULT_BIND_ADDRESS.to_string(),
            port: network::DEFAULT_PORT,
            max_workers: limits::DEFAULT_MAX_WORKERS,
            log_level: "info".to_string(),
            tls_enabled: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ServerSettings {
    /// Load settings: defaults, then `tarp-server.toml` if present, then
    /// `TARP_*` environment variables (highest priority).
    pub fn load() -> Result<Self> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("tarp-server.toml"))
            .merge(Env::prefixed("TARP_"))
            .extract()
            .map_err(|e| TarpError::config(format!("failed to load server settings: {e}")))
    }
}

/// Settings for the `tarp-client` demo binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub base_url: String,
    pub log_level: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl ClientSettings {
    /// Load settings: defaults, then `tarp-client.toml` if present, then
    /// `TARP_*` environment variables.
    pub fn load() -> Result<Self> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("tarp-client.toml"))
            .merge(Env::prefixed("TARP_"))
            .extract()
            .map_err(|e| TarpError::config(format!("failed to load client settings: {e}")))
    }
}
