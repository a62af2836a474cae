// ABOUTME: Server-side TARP: configuration plus the REST dispatcher
// ABOUTME: Single transport (HTTP via Axum); other transports are out of scope

//! Server-side TARP.
//!
//! A [`TarpServer`] binds a [`crate::registry::Registry`] to a socket and
//! serves it behind one dispatcher; see [`rest`] for how requests are
//! routed.

pub mod common;

#[cfg(feature = "rest-server")]
pub mod rest;

pub use common::{TarpServerBuilder, TarpServerConfig};

#[cfg(feature = "rest-server")]
pub use rest::TarpServer;
