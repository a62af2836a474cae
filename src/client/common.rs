// ABOUTME: TarpClient connection configuration: base URL, TLS trust hint, timeouts
// ABOUTME: Builder pattern mirroring the teacher crate's ClientBuilder

//! Client-side configuration for [`crate::client::rest::TarpClient`].

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::timeouts;

/// Connection settings for a [`crate::client::rest::TarpClient`].
///
/// `server_key` is the opaque shared-key TLS-trust hint from §4.5/§6 of the
/// protocol: a CA certificate path the client trusts for this particular
/// server, distinct from (and simpler than) full mutual-TLS client
/// authentication, which TARP does not support.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub server_key: Option<PathBuf>,
    pub request_timeout: Duration,
    pub default_retry_after: u64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            server_key: None,
            request_timeout: timeouts::DEFAULT_CLIENT_TIMEOUT,
            default_retry_after: timeouts::DEFAULT_RETRY_AFTER_SECS,
        }
    }

    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url)
    }
}

/// Builder for [`ClientConfig`].
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(base_url),
        }
    }

    /// Pin a CA certificate to trust for this server (the `server_key` hint).
    pub fn server_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.server_key = Some(path.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn default_retry_after(mut self, seconds: u64) -> Self {
        self.config.default_retry_after = seconds;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
