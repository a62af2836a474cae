// ABOUTME: TARP library entry point
// ABOUTME: Wires together the envelope codec, registry, dispatcher, job manager, and client proxy

//! # TARP
//!
//! A lightweight HTTP-framed RPC and resource-endpoint framework. A server
//! process exposes named procedures and resource handlers to remote clients
//! over HTTP(S); a client discovers them at connect time and invokes them as
//! if they were local.
//!
//! Four endpoint flavors share one envelope protocol:
//!
//! - **GET** resource handlers — query string in, JSON-or-raw out.
//! - **POST** resource handlers — body + query string in, JSON-or-raw out.
//! - **synchronous RPC** — positional/keyword arguments in, a single value out.
//! - **asynchronous RPC** — same request shape as sync RPC, but the handler
//!   runs on a worker pool and the caller polls for completion.
//!
//! ## Quick start (server)
//!
//! ```rust
//! use tarp::registry::{EndpointOptions, HandlerOutput, Registry};
//!
//! let mut registry = Registry::new();
//! registry.register_rpc("add", EndpointOptions::new().description("adds two numbers"), |args, _kwargs| async move {
//!     let x = args[0].as_i64().unwrap_or(0);
//!     let y = args[1].as_i64().unwrap_or(0);
//!     Ok(HandlerOutput::from(serde_json::Value::from(x + y)))
//! });
//! ```
//!
//! Feed the populated [`registry::Registry`] to
//! [`server::rest::TarpServer`] (behind the `rest-server` feature) to serve
//! it; on the client side, [`client::rest::TarpClient`] (behind
//! `rest-client`) discovers and binds to whatever a server advertises.

pub mod constants;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod jobs;
pub mod registry;
pub mod rpc;

#[cfg(any(feature = "config", feature = "tls"))]
pub mod config;

#[cfg(feature = "rest-client")]
pub mod client;

#[cfg(feature = "rest-server")]
pub mod server;

pub use crypto::ensure_crypto_provider;

/// Commonly used types, re-exported for convenience.
pub mod prelude {
    pub use crate::envelope::{Envelope, RawPayload, ResultValue};
    pub use crate::error::{Result, TarpError};
    pub use crate::registry::{EndpointOptions, Flavor, HandlerOutput, Registry};

    #[cfg(feature = "rest-server")]
    pub use crate::server::{TarpServer, TarpServerBuilder, TarpServerConfig};

    #[cfg(feature = "rest-client")]
    pub use crate::client::rest::{
        AsyncHandle, ClientResponse, EndpointBinding, JobStatus, PostPayload, TarpClient,
    };
    #[cfg(feature = "rest-client")]
    pub use crate::client::ClientConfig;

    #[cfg(any(feature = "config", feature = "tls"))]
    pub use crate::config::{TlsConfig, TlsConfigBuilder};
}

/// Crate version, as recorded in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
