// ABOUTME: Configuration surface for TARP servers and clients
// ABOUTME: Re-exports the TLS config; server/client builders live in their own modules

//! Configuration types shared across TARP.
//!
//! TLS is the only cross-cutting configuration concern for the library
//! itself; server bind settings and client connection settings live next to
//! the transports they configure ([`crate::server::common`],
//! [`crate::client::common`]). The example binaries layer their own
//! configuration (defaults, file, environment) through [`settings`].

pub mod tls;

#[cfg(feature = "config")]
pub mod settings;

pub use tls::{TlsConfig, TlsConfigBuilder, VerificationMode};

#[cfg(feature = "config")]
pub use settings::{ClientSettings, ServerSettings};
