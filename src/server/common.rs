// ABOUTME: TarpServer configuration: bind address/port, TLS, worker pool sizing
// ABOUTME: Builder pattern mirroring the teacher crate's ServerBuilder

//! Server-side configuration for [`crate::server::rest::TarpServer`].

use crate::config::tls::TlsConfig;
use crate::constants::{limits, network};
use crate::jobs::JobTableConfig;

/// Bind, TLS, and worker settings for a `TarpServer`.
#[derive(Debug, Clone)]
pub struct TarpServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,
    pub max_workers: usize,
    pub job_table: JobTableConfig,
}

impl Default for TarpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: network::DEFAULT_BIND_ADDRESS.to_string(),
            port: network::DEFAULT_PORT,
            tls: None,
            max_workers: limits::DEFAULT_MAX_WORKERS,
            job_table: JobTableConfig::default(),
        }
    }
}

/// Builder for [`TarpServerConfig`].
pub struct TarpServerBuilder {
    config: TarpServerConfig,
}

impl TarpServerBuilder {
    pub fn new() -> Self {
        Self {
            config: TarpServerConfig::default(),
        }
    }

    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.config.bind_address = address.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        if tls.enabled && self.config.port == network::DEFAULT_PORT {
            self.config.port = network::DEFAULT_TLS_PORT;
        }
        self.config.tls = Some(tls);
        self
    }

    pub fn max_workers(mut self, max: usize) -> Self {
        self.config.max_workers = max;
        self
    }

    pub fn job_table(mut self, job_table: JobTableConfig) -> Self {
        self.config.job_table = job_table;
        self
    }

    pub fn build(self) -> TarpServerConfig {
        self.config
    }
}

impl Default for TarpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
