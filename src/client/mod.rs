// ABOUTME: Client-side TARP: connection configuration plus the REST proxy
// ABOUTME: Single transport (HTTP via reqwest); other transports are out of scope

//! Client-side TARP.
//!
//! A [`rest::TarpClient`] connects to a server's discovery endpoint, binds a
//! callable for every advertised GET/POST/RPC/async-RPC endpoint, and
//! enforces the envelope contract (status handling, error taxonomy) on every
//! response.

pub mod common;

#[cfg(feature = "rest-client")]
pub mod rest;

pub use common::{ClientConfig, ClientConfigBuilder};

#[cfg(feature = "rest-client")]
pub use rest::{AsyncHandle, ClientResponse, EndpointBinding, JobStatus, PostPayload, TarpClient};
