// ABOUTME: TLS configuration for the TARP server and client transports
// ABOUTME: Certificate loading, path expansion, and rustls configuration

//! TLS configuration shared by the server and client REST transports.
//!
//! This mirrors the teacher crate's unified `TlsConfig`, trimmed to the
//! verification modes TARP actually needs: a server always presents a
//! cert/key pair, and a client either trusts the system CA store, trusts a
//! custom CA (the `server_key` trust hint), or skips verification for local
//! development. Mutual TLS has no counterpart here — TARP's client
//! authentication story stops at an opaque shared-key trust hint, not
//! bespoke client certificates.
//!
//! # Quick Start
//!
//! ```rust
//! use tarp::config::tls::{TlsConfig, TlsConfigBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tls_config = TlsConfigBuilder::new()
//!     .enabled(true)
//!     .cert_path("/path/to/cert.pem")
//!     .key_path("/path/to/key.pem")
//!     .verify_certificates(true)
//!     .build()?;
//!
//! let server_config = tls_config.create_server_config().await?;
//! # Ok(())
//! # }
//! ```

use crate::constants::env_vars;
use crate::error::{Result, TarpError};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Certificate verification modes for TLS connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum VerificationMode {
    /// Use system CA store for verification (default).
    #[default]
    SystemCa,
    /// Use a custom CA certificate for verification (the `server_key` trust hint).
    CustomCa,
    /// Skip certificate verification (development only).
    Skip,
}

/// TLS configuration for a server or client transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub ca_cert_path: Option<PathBuf>,
    pub verification_mode: VerificationMode,
}

/// Builder for [`TlsConfig`].
#[derive(Debug, Default)]
pub struct TlsConfigBuilder {
    config: TlsConfig,
}

impl TlsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn cert_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.cert_path = Some(TlsConfig::expand_path(&path.as_ref().to_string_lossy()));
        self
    }

    pub fn key_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.key_path = Some(TlsConfig::expand_path(&path.as_ref().to_string_lossy()));
        self
    }

    pub fn ca_cert_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.ca_cert_path = Some(TlsConfig::expand_path(&path.as_ref().to_string_lossy()));
        self
    }

    pub fn verification_mode(mut self, mode: VerificationMode) -> Self {
        self.config.verification_mode = mode;
        self
    }

    pub fn verify_certificates(mut self, verify: bool) -> Self {
        self.config.verification_mode = if verify {
            VerificationMode::SystemCa
        } else {
            VerificationMode::Skip
        };
        self
    }

    pub fn build(self) -> Result<TlsConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl TlsConfig {
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::new()
    }

    /// Build a `TlsConfig` from `TARP_TLS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(enabled_str) = env::var(env_vars::TARP_TLS_ENABLED) {
            config.enabled = enabled_str.eq_ignore_ascii_case("true");
        }

        if let Ok(cert_path) = env::var(env_vars::TARP_TLS_CERT_PATH) {
            config.cert_path = Some(Self::expand_path(&cert_path));
        }

        if let Ok(key_path) = env::var(env_vars::TARP_TLS_KEY_PATH) {
            config.key_path = Some(Self::expand_path(&key_path));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.cert_path.is_none() {
            return Err(TarpError::config(
                "certificate path is required when TLS is enabled",
            ));
        }

        if self.key_path.is_none() {
            return Err(TarpError::config(
                "private key path is required when TLS is enabled",
            ));
        }

        if self.verification_mode == VerificationMode::CustomCa && self.ca_cert_path.is_none() {
            return Err(TarpError::config(
                "CA certificate path is required for CustomCa verification mode",
            ));
        }

        Ok(())
    }

    /// Build the rustls client config (used by the `server_key` trust hint
    /// path when a client is pinned to a specific server's CA).
    #[cfg(all(feature = "rest-client", feature = "tls"))]
    pub async fn create_client_config(&self) -> Result<Arc<rustls::ClientConfig>> {
        if !self.enabled {
            return Err(TarpError::config(
                "cannot create client config when TLS is disabled",
            ));
        }

        crate::crypto::ensure_crypto_provider()?;

        let config_builder = rustls::ClientConfig::builder();

        let mut config = match self.verification_mode {
            VerificationMode::SystemCa => config_builder
                .with_root_certificates(rustls::RootCertStore::from_iter(
                    webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
                ))
                .with_no_client_auth(),
            VerificationMode::CustomCa => {
                let ca_path = self.ca_cert_path.as_ref().ok_or_else(|| {
                    TarpError::config("CA certificate path is required for CustomCa mode")
                })?;

                let ca_cert = Self::load_ca_certificate(ca_path).await?;
                let mut root_cert_store = rustls::RootCertStore::empty();
                root_cert_store
                    .add(ca_cert)
                    .map_err(|e| TarpError::transport(format!("failed to add CA certificate: {e}")))?;

                config_builder
                    .with_root_certificates(root_cert_store)
                    .with_no_client_auth()
            }
            VerificationMode::Skip => config_builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification))
                .with_no_client_auth(),
        };

        if self.verification_mode == VerificationMode::Skip {
            config.enable_sni = false;
        }

        Ok(Arc::new(config))
    }

    /// Build the rustls server config from the configured cert/key pair.
    #[cfg(all(feature = "rest-server", feature = "tls"))]
    pub async fn create_server_config(&self) -> Result<Arc<rustls::ServerConfig>> {
        if !self.enabled {
            return Err(TarpError::config(
                "cannot create server config when TLS is disabled",
            ));
        }

        crate::crypto::ensure_crypto_provider()?;

        let (cert_chain, private_key) = self.load_certificate_chain().await?;

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, private_key)
            .map_err(|e| TarpError::transport(format!("failed to create server config: {e}")))?;

        Ok(Arc::new(config))
    }

    #[cfg(all(any(feature = "rest-server", feature = "rest-client"), feature = "tls"))]
    async fn load_certificate_chain(
        &self,
    ) -> Result<(
        Vec<rustls::pki_types::CertificateDer<'static>>,
        rustls::pki_types::PrivateKeyDer<'static>,
    )> {
        let cert_path = self
            .cert_path
            .as_ref()
            .ok_or_else(|| TarpError::config("certificate path is required"))?;
        let key_path = self
            .key_path
            .as_ref()
            .ok_or_else(|| TarpError::config("private key path is required"))?;

        let (cert_chain, private_key) = tokio::task::spawn_blocking({
            let cert_path = cert_path.clone();
            let key_path = key_path.clone();
            move || -> Result<(Vec<rustls::pki_types::CertificateDer<'static>>, rustls::pki_types::PrivateKeyDer<'static>)> {
                use rustls_pemfile::{certs, private_key};
                use std::io::BufReader;

                let cert_file = std::fs::File::open(&cert_path)
                    .map_err(|e| TarpError::transport(format!("failed to open certificate file {cert_path:?}: {e}")))?;
                let mut cert_reader = BufReader::new(cert_file);

                let cert_chain: Vec<rustls::pki_types::CertificateDer<'static>> = certs(&mut cert_reader)
                    .collect::<std::result::Result<Vec<_>, std::io::Error>>()
                    .map_err(|e| TarpError::transport(format!("failed to parse certificate file: {e}")))?;

                if cert_chain.is_empty() {
                    return Err(TarpError::transport("no certificates found in certificate file"));
                }

                let key_file = std::fs::File::open(&key_path)
                    .map_err(|e| TarpError::transport(format!("failed to open private key file {key_path:?}: {e}")))?;
                let mut key_reader = BufReader::new(key_file);

                let private_key = private_key(&mut key_reader)
                    .map_err(|e| TarpError::transport(format!("failed to parse private key file: {e}")))?
                    .ok_or_else(|| TarpError::transport("no private key found in key file"))?;

                Ok((cert_chain, private_key))
            }
        })
        .await
        .map_err(|e| TarpError::transport(format!("failed to load certificates: {e}")))??;

        Ok((cert_chain, private_key))
    }

    #[cfg(all(any(feature = "rest-server", feature = "rest-client"), feature = "tls"))]
    async fn load_ca_certificate(ca_path: &Path) -> Result<rustls::pki_types::CertificateDer<'static>> {
        let ca_path = ca_path.to_path_buf();
        let ca_cert = tokio::task::spawn_blocking(
            move || -> Result<rustls::pki_types::CertificateDer<'static>> {
                use rustls_pemfile::certs;
                use std::io::BufReader;

                let ca_file = std::fs::File::open(&ca_path)
                    .map_err(|e| TarpError::transport(format!("failed to open CA certificate file {ca_path:?}: {e}")))?;
                let mut ca_reader = BufReader::new(ca_file);

                let mut ca_certs: Vec<rustls::pki_types::CertificateDer<'static>> = certs(&mut ca_reader)
                    .collect::<std::result::Result<Vec<_>, std::io::Error>>()
                    .map_err(|e| TarpError::transport(format!("failed to parse CA certificate file: {e}")))?;

                if ca_certs.is_empty() {
                    return Err(TarpError::transport("no CA certificates found in CA certificate file"));
                }

                Ok(ca_certs.remove(0))
            },
        )
        .await
        .map_err(|e| TarpError::transport(format!("failed to load CA certificate: {e}")))??;

        Ok(ca_cert)
    }

    fn expand_path(path: &str) -> PathBuf {
        let mut expanded = path.to_string();

        if expanded.starts_with('~') {
            if let Some(home) = env::var_os("HOME") {
                expanded = expanded.replacen('~', &home.to_string_lossy(), 1);
            }
        }

        while let Some(start) = expanded.find("${") {
            if let Some(end) = expanded[start..].find('}') {
                let var_name = &expanded[start + 2..start + end];
                let replacement = env::var(var_name).unwrap_or_else(|_| format!("${{{var_name}}}"));
                expanded.replace_range(start..start + end + 1, &replacement);
            } else {
                break;
            }
        }

        PathBuf::from(expanded)
    }
}

/// Accepts any certificate. Development only — enabled via `VerificationMode::Skip`.
#[cfg(all(feature = "rest-client", feature = "tls"))]
#[derive(Debug)]
struct NoVerification;

#[cfg(all(feature = "rest-client", feature = "tls"))]
impl rustls::client::danger::ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA1,
            rustls::SignatureScheme::ECDSA_SHA1_Legacy,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::ED448,
        ]
    }
}

impl TlsConfig {
    /// Development preset: self-signed certs, no verification.
    pub fn development() -> Self {
        Self {
            enabled: true,
            cert_path: Some(PathBuf::from("./certs/dev-cert.pem")),
            key_path: Some(PathBuf::from("./certs/dev-key.pem")),
            ca_cert_path: None,
            verification_mode: VerificationMode::Skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn test_tls_config_default() {
        let config = TlsConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.verification_mode, VerificationMode::SystemCa);
    }

    #[test]
    fn test_tls_config_builder() {
        let config = TlsConfig::builder()
            .enabled(true)
            .cert_path("/path/to/cert.pem")
            .key_path("/path/to/key.pem")
            .verification_mode(VerificationMode::Skip)
            .build()
            .unwrap();

        assert!(config.enabled);
        assert_eq!(config.cert_path, Some(PathBuf::from("/path/to/cert.pem")));
        assert_eq!(config.verification_mode, VerificationMode::Skip);
    }

    #[test]
    fn test_tls_config_from_env() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var(env_vars::TARP_TLS_ENABLED, "true");
        env::set_var(env_vars::TARP_TLS_CERT_PATH, "/path/to/cert.pem");
        env::set_var(env_vars::TARP_TLS_KEY_PATH, "/path/to/key.pem");

        let config = TlsConfig::from_env().unwrap();
        assert!(config.enabled);
        assert_eq!(config.cert_path, Some(PathBuf::from("/path/to/cert.pem")));

        env::remove_var(env_vars::TARP_TLS_ENABLED);
        env::remove_var(env_vars::TARP_TLS_CERT_PATH);
        env::remove_var(env_vars::TARP_TLS_KEY_PATH);
    }

    #[test]
    fn test_tls_config_validation() {
        let config = TlsConfig::default();
        assert!(config.validate().is_ok());

        let config = TlsConfig::builder().enabled(true).build();
        assert!(config.is_err());

        let config = TlsConfig::builder()
            .enabled(true)
            .cert_path("/path/to/cert.pem")
            .key_path("/path/to/key.pem")
            .verification_mode(VerificationMode::CustomCa)
            .build();
        assert!(config.is_err());

        let config = TlsConfig::builder()
            .enabled(true)
            .cert_path("/path/to/cert.pem")
            .key_path("/path/to/key.pem")
            .verification_mode(VerificationMode::Skip)
            .build()
            .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_path_basic() {
        let path = TlsConfig::expand_path("/absolute/path/to/cert.pem");
        assert_eq!(path, PathBuf::from("/absolute/path/to/cert.pem"));
    }

    #[test]
    fn test_expand_path_home() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("HOME", "/home/user");
        let path = TlsConfig::expand_path("~/cert.pem");
        assert_eq!(path, PathBuf::from("/home/user/cert.pem"));
        env::remove_var("HOME");
    }

    #[test]
    fn test_expand_path_env_var() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("CERT_DIR", "/etc/ssl/certs");
        let path = TlsConfig::expand_path("${CERT_DIR}/cert.pem");
        assert_eq!(path, PathBuf::from("/etc/ssl/certs/cert.pem"));
        env::remove_var("CERT_DIR");
    }

    #[test]
    fn test_verification_mode_serialization() {
        let mode = VerificationMode::SystemCa;
        let serialized = serde_json::to_string(&mode).unwrap();
        let deserialized: VerificationMode = serde_json::from_str(&serialized).unwrap();
        assert_eq!(mode, deserialized);
    }

    #[test]
    fn test_development_preset() {
        let dev_config = TlsConfig::development();
        assert!(dev_config.enabled);
        assert_eq!(dev_config.verification_mode, VerificationMode::Skip);
    }
}
