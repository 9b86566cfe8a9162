//! Tests for TLS/mTLS functionality.
//!
//! These tests verify:
//! - TLS configuration validation and fallback
//! - Certificate loading
//! - Shard and control traffic over mutual TLS
//! - Rejection of plaintext and unauthenticated clients

mod test_harness;

use std::path::{Path, PathBuf};

use rcgen::{CertificateParams, DistinguishedName, DnType, IsCa, BasicConstraints, KeyPair};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use shardline::client::AgentClient;
use shardline::config::TlsConfig;
use shardline::protocol::{write_frame, Frame, RequestHead};
use shardline::tls::{TlsError, TlsIdentity, CLUSTER_DOMAIN};
use test_harness::{test_agent_config, TestAgent};

struct TestPki {
    ca_pem: String,
    node_cert_pem: String,
    node_key_pem: String,
    rogue_ca_pem: String,
    rogue_cert_pem: String,
    rogue_key_pem: String,
}

fn generate_ca(name: &str) -> (rcgen::Certificate, KeyPair) {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, name);
    params.distinguished_name = dn;

    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert, key)
}

fn generate_node(ca: &rcgen::Certificate, ca_key: &KeyPair) -> (String, String) {
    let params =
        CertificateParams::new(vec![CLUSTER_DOMAIN.to_string(), "localhost".to_string()]).unwrap();
    let key = KeyPair::generate().unwrap();
    let cert = params.signed_by(&key, ca, ca_key).unwrap();
    (cert.pem(), key.serialize_pem())
}

/// Helper to generate a cluster CA, a node identity, and an unrelated
/// identity signed by a different CA.
fn generate_test_pki() -> TestPki {
    let (ca, ca_key) = generate_ca("shardline test CA");
    let (node_cert_pem, node_key_pem) = generate_node(&ca, &ca_key);

    let (rogue_ca, rogue_key) = generate_ca("rogue CA");
    let (rogue_cert_pem, rogue_key_pem) = generate_node(&rogue_ca, &rogue_key);

    TestPki {
        ca_pem: ca.pem(),
        node_cert_pem,
        node_key_pem,
        rogue_ca_pem: rogue_ca.pem(),
        rogue_cert_pem,
        rogue_key_pem,
    }
}

fn node_identity(pki: &TestPki) -> TlsIdentity {
    TlsIdentity::from_pem(
        pki.ca_pem.clone(),
        pki.node_cert_pem.clone(),
        pki.node_key_pem.clone(),
    )
    .unwrap()
}

fn write_pki(dir: &Path, pki: &TestPki) -> (PathBuf, PathBuf, PathBuf) {
    let ca = dir.join("ca.crt");
    let cert = dir.join("node.crt");
    let key = dir.join("node.key");
    std::fs::write(&ca, &pki.ca_pem).unwrap();
    std::fs::write(&cert, &pki.node_cert_pem).unwrap();
    std::fs::write(&key, &pki.node_key_pem).unwrap();
    (ca, cert, key)
}

// ============================================================================
// TlsConfig Unit Tests
// ============================================================================

#[test]
fn test_tls_config_default() {
    let config = TlsConfig::default();

    assert!(!config.enabled);
    assert!(config.ca_cert_path.is_none());
    assert!(config.cert_path.is_none());
    assert!(config.key_path.is_none());
    assert!(!config.allow_insecure);
}

#[test]
fn test_tls_config_is_complete_when_all_paths_set() {
    let config = TlsConfig {
        enabled: true,
        ca_cert_path: Some(PathBuf::from("/path/to/ca.crt")),
        cert_path: Some(PathBuf::from("/path/to/node.crt")),
        key_path: Some(PathBuf::from("/path/to/node.key")),
        allow_insecure: false,
    };

    assert!(config.is_complete());
}

#[test]
fn test_tls_config_is_not_complete_when_disabled() {
    let config = TlsConfig {
        enabled: false,
        ca_cert_path: Some(PathBuf::from("/path/to/ca.crt")),
        cert_path: Some(PathBuf::from("/path/to/node.crt")),
        key_path: Some(PathBuf::from("/path/to/node.key")),
        allow_insecure: false,
    };

    assert!(!config.is_complete());
}

// ============================================================================
// Identity Loading
// ============================================================================

#[tokio::test]
async fn test_load_identity_from_files() {
    let temp = TempDir::new().unwrap();
    let pki = generate_test_pki();
    let (ca, cert, key) = write_pki(temp.path(), &pki);

    let config = TlsConfig {
        enabled: true,
        ca_cert_path: Some(ca),
        cert_path: Some(cert),
        key_path: Some(key),
        allow_insecure: false,
    };

    let identity = TlsIdentity::load(&config).await.unwrap();
    assert!(identity.acceptor().is_ok());
    assert!(identity.connector().is_ok());
    assert!(identity.http_client().is_ok());
}

#[tokio::test]
async fn test_resolve_disabled_is_plaintext() {
    let resolved = TlsIdentity::resolve(&TlsConfig::default()).await.unwrap();
    assert!(resolved.is_none());
}

#[tokio::test]
async fn test_resolve_missing_files_fails_unless_insecure() {
    let mut config = TlsConfig {
        enabled: true,
        ca_cert_path: Some(PathBuf::from("/nonexistent/ca.crt")),
        cert_path: Some(PathBuf::from("/nonexistent/node.crt")),
        key_path: Some(PathBuf::from("/nonexistent/node.key")),
        allow_insecure: false,
    };

    assert!(matches!(
        TlsIdentity::resolve(&config).await,
        Err(TlsError::CaCertNotFound(_))
    ));

    config.allow_insecure = true;
    assert!(TlsIdentity::resolve(&config).await.unwrap().is_none());
}

// ============================================================================
// Agent over mTLS
// ============================================================================

#[tokio::test]
async fn test_shard_round_trip_over_mtls() {
    let pki = generate_test_pki();
    let temp = TempDir::new().unwrap();
    let identity = node_identity(&pki);

    let agent = TestAgent::start_with(test_agent_config(temp.path()), Some(identity.clone())).await;
    let client = AgentClient::with_tls(&agent.addr, &identity).unwrap();

    client.put("secure@0", b"encrypted bytes").await.unwrap();
    assert_eq!(
        client.get("secure@0", 10).await.unwrap(),
        b"bytes".to_vec()
    );
    assert!(client.list().await.unwrap().is_empty());

    agent.stop().await;
}

#[tokio::test]
async fn test_plaintext_client_is_rejected() {
    let pki = generate_test_pki();
    let temp = TempDir::new().unwrap();

    let agent =
        TestAgent::start_with(test_agent_config(temp.path()), Some(node_identity(&pki))).await;

    // Speak the plaintext protocol at a TLS listener.
    let mut stream = TcpStream::connect(&agent.addr).await.unwrap();
    let head = RequestHead::Put("plain".to_string());
    let _ = write_frame(&mut stream, &Frame::data(head.to_payload())).await;
    let _ = stream.write_all(b"data").await;
    let _ = stream.shutdown().await;
    let mut reply = Vec::new();
    let _ = stream.read_to_end(&mut reply).await;

    assert!(agent.handler.store.len("plain").await.is_err());

    agent.stop().await;
}

#[tokio::test]
async fn test_client_from_other_ca_is_rejected() {
    let pki = generate_test_pki();
    let temp = TempDir::new().unwrap();

    let agent =
        TestAgent::start_with(test_agent_config(temp.path()), Some(node_identity(&pki))).await;

    // Trusts the real CA, but presents a certificate from the rogue CA.
    let rogue = TlsIdentity::from_pem(
        pki.ca_pem.clone(),
        pki.rogue_cert_pem.clone(),
        pki.rogue_key_pem.clone(),
    )
    .unwrap();
    let client = AgentClient::with_tls(&agent.addr, &rogue).unwrap();

    let _ = client.put("intruder", b"data").await;
    assert!(agent.handler.store.len("intruder").await.is_err());

    agent.stop().await;
}

#[tokio::test]
async fn test_client_distrusting_agent_fails() {
    let pki = generate_test_pki();
    let temp = TempDir::new().unwrap();

    let agent =
        TestAgent::start_with(test_agent_config(temp.path()), Some(node_identity(&pki))).await;

    // Only trusts the rogue CA, so the agent's certificate does not verify.
    let wary = TlsIdentity::from_pem(
        pki.rogue_ca_pem.clone(),
        pki.rogue_cert_pem.clone(),
        pki.rogue_key_pem.clone(),
    )
    .unwrap();
    let client = AgentClient::with_tls(&agent.addr, &wary).unwrap();

    assert!(client.get("anything", 0).await.is_err());

    agent.stop().await;
}
