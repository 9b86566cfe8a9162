//! TLS utilities for loading certificates and configuring mTLS.
//!
//! This module loads PEM material from the paths in [`TlsConfig`] and builds
//! the acceptor used by the agent listener, the connector used by
//! [`AgentClient`](crate::client::AgentClient) and the HTTP client used for
//! heartbeats. Every side presents its certificate and verifies the peer
//! against the cluster CA.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::fs;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::config::TlsConfig;

/// Name every agent certificate must carry, since peers connect by IP.
pub const CLUSTER_DOMAIN: &str = "shardline-cluster";

/// Error type for TLS configuration issues.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("CA certificate path not configured")]
    MissingCaCert,

    #[error("Node certificate path not configured")]
    MissingCert,

    #[error("Private key path not configured")]
    MissingKey,

    #[error("CA certificate not found: {0}")]
    CaCertNotFound(PathBuf),

    #[error("Node certificate not found: {0}")]
    CertNotFound(PathBuf),

    #[error("Private key not found: {0}")]
    KeyNotFound(PathBuf),

    #[error("No certificate in PEM data")]
    NoCertificates,

    #[error("No private key in PEM data")]
    NoPrivateKey,

    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    #[error("Client verifier: {0}")]
    Verifier(String),

    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),
}

/// Loaded PEM material for this node plus the cluster CA.
#[derive(Clone)]
pub struct TlsIdentity {
    ca_pem: Vec<u8>,
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl TlsIdentity {
    /// Load TLS materials from file paths specified in the config.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Any required path is not configured
    /// - Any file does not exist or cannot be read
    pub async fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        let ca_cert_path = config
            .ca_cert_path
            .as_ref()
            .ok_or(TlsError::MissingCaCert)?;
        let cert_path = config.cert_path.as_ref().ok_or(TlsError::MissingCert)?;
        let key_path = config.key_path.as_ref().ok_or(TlsError::MissingKey)?;

        let ca_pem = read_existing(ca_cert_path, TlsError::CaCertNotFound).await?;
        let cert_pem = read_existing(cert_path, TlsError::CertNotFound).await?;
        let key_pem = read_existing(key_path, TlsError::KeyNotFound).await?;

        Self::from_pem(ca_pem, cert_pem, key_pem)
    }

    /// Decide whether the agent runs with TLS.
    ///
    /// Returns `None` when TLS is disabled, or when it is requested but cannot
    /// be set up and `allow_insecure` permits plaintext.
    pub async fn resolve(config: &TlsConfig) -> Result<Option<Self>, TlsError> {
        if !config.enabled {
            return Ok(None);
        }
        match Self::load(config).await {
            Ok(identity) => {
                tracing::info!("TLS enabled with mTLS authentication");
                Ok(Some(identity))
            }
            Err(e) if config.allow_insecure => {
                tracing::warn!(error = %e, "TLS setup failed, running in insecure mode");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Build from in-memory PEM, checking that each part parses.
    pub fn from_pem(
        ca_pem: impl Into<Vec<u8>>,
        cert_pem: impl Into<Vec<u8>>,
        key_pem: impl Into<Vec<u8>>,
    ) -> Result<Self, TlsError> {
        let identity = Self {
            ca_pem: ca_pem.into(),
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        };
        identity.roots()?;
        identity.certs()?;
        identity.key()?;
        Ok(identity)
    }

    /// Acceptor for the agent listener; client certificates are required.
    pub fn acceptor(&self) -> Result<TlsAcceptor, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(self.roots()?), provider.clone())
                .build()
                .map_err(|e| TlsError::Verifier(e.to_string()))?;

        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(self.certs()?, self.key()?)?;

        Ok(TlsAcceptor::from(Arc::new(config)))
    }

    /// Connector for talking to other agents.
    pub fn connector(&self) -> Result<TlsConnector, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(self.roots()?)
            .with_client_auth_cert(self.certs()?, self.key()?)?;

        Ok(TlsConnector::from(Arc::new(config)))
    }

    /// HTTP client that trusts the cluster CA and presents this node's certificate.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut identity_pem = self.cert_pem.clone();
        identity_pem.extend_from_slice(&self.key_pem);

        reqwest::Client::builder()
            .use_rustls_tls()
            .add_root_certificate(reqwest::Certificate::from_pem(&self.ca_pem)?)
            .identity(reqwest::Identity::from_pem(&identity_pem)?)
            .build()
    }

    pub fn server_name() -> Result<ServerName<'static>, TlsError> {
        ServerName::try_from(CLUSTER_DOMAIN)
            .map_err(|e| TlsError::InvalidServerName(e.to_string()))
    }

    fn roots(&self) -> Result<RootCertStore, TlsError> {
        let mut roots = RootCertStore::empty();
        for cert in parse_certs(&self.ca_pem)? {
            roots.add(cert)?;
        }
        Ok(roots)
    }

    fn certs(&self) -> Result<Vec<CertificateDer<'static>>, TlsError> {
        parse_certs(&self.cert_pem)
    }

    fn key(&self) -> Result<PrivateKeyDer<'static>, TlsError> {
        rustls_pemfile::private_key(&mut self.key_pem.as_slice())?.ok_or(TlsError::NoPrivateKey)
    }
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut &pem[..]).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates);
    }
    Ok(certs)
}

async fn read_existing(
    path: &Path,
    missing: fn(PathBuf) -> TlsError,
) -> Result<Vec<u8>, TlsError> {
    if !path.exists() {
        return Err(missing(path.to_path_buf()));
    }
    Ok(fs::read(path).await?)
}
