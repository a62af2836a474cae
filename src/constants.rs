// ABOUTME: Default values and well-known paths for the TARP protocol
// ABOUTME: Centralizes network defaults, discovery paths, and tuning knobs

//! Constants and default values used throughout the crate.

use std::time::Duration;

/// Well-known HTTP paths fixed by the protocol.
pub mod paths {
    /// Discovery endpoint (`GET /`).
    pub const DISCOVERY: &str = "/";

    /// Async job status probe (`GET /asyncProbe?UUID=...`).
    pub const ASYNC_PROBE: &str = "/asyncProbe";

    /// Async job result retrieval (`GET /asyncGet?UUID=...`).
    pub const ASYNC_GET: &str = "/asyncGet";

    /// Query parameter carrying the job id on the async paths above.
    pub const JOB_ID_PARAM: &str = "UUID";
}

/// Network defaults.
pub mod network {
    /// Default plaintext HTTP port.
    pub const DEFAULT_PORT: u16 = 8080;

    /// Default HTTPS port. Chosen above the reserved/privileged range so the
    /// server can bind without elevated privileges; see DESIGN.md.
    pub const DEFAULT_TLS_PORT: u16 = 8443;

    /// Default bind address (all interfaces).
    pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

    /// Default bind address for local-only deployments.
    pub const DEFAULT_BIND_LOCALHOST: &str = "127.0.0.1";
}

/// Timeouts and tuning knobs.
pub mod timeouts {
    use super::*;

    /// Default `suggested_wait` advertised for async RPC endpoints when the
    /// caller does not specify one, in seconds.
    pub const DEFAULT_SUGGESTED_WAIT_SECS: u64 = 5;

    /// Default `Retry-After` value used when an `OperationInProgress` error
    /// does not carry an explicit retry hint, in seconds.
    pub const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

    /// Default graceful shutdown grace period.
    pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

    /// Default client request timeout.
    pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Resource limits.
pub mod limits {
    /// Default bound on concurrently running RPC tasks in the worker pool.
    pub const DEFAULT_MAX_WORKERS: usize = 10;

    /// Default maximum request body size accepted by the server (1 MiB).
    pub const DEFAULT_MAX_REQUEST_SIZE: usize = 1024 * 1024;
}

/// HTTP header and content-type constants.
pub mod http {
    /// Content-Type used for the envelope JSON body.
    pub const CONTENT_TYPE_JSON: &str = "application/json";

    /// `Retry-After` header name, sent on `OperationInProgress` responses.
    pub const HEADER_RETRY_AFTER: &str = "Retry-After";

    /// Default description used when an endpoint is registered without one,
    /// matching the Python original's docstring fallback.
    pub const DEFAULT_DESCRIPTION: &str = "No description provided";
}

/// Environment variable names consulted by the example binaries' config
/// loader.
pub mod env_vars {
    /// Overrides the bind port.
    pub const TARP_PORT: &str = "TARP_PORT";

    /// Enables TLS.
    pub const TARP_TLS_ENABLED: &str = "TARP_TLS_ENABLED";

    /// TLS certificate path.
    pub const TARP_TLS_CERT_PATH: &str = "TARP_TLS_CERT_PATH";

    /// TLS private key path.
    pub const TARP_TLS_KEY_PATH: &str = "TARP_TLS_KEY_PATH";

    /// Log level, consumed by `tracing_subscriber::EnvFilter`.
    pub const TARP_LOG_LEVEL: &str = "TARP_LOG_LEVEL";
}
