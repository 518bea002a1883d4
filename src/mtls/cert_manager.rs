//! Certificate loading and rustls server config building.
//!
//! Provides:
//! - [`build_tls_config`] — build a `rustls::ServerConfig` from [`MtlsConfig`]
//! - [`load_certs`] / [`load_private_key`] — PEM file loading
//! - [`preflight`] — report unreadable server credential files before bind
//!
//! # File format
//!
//! All certificate and key files are expected in **PEM format**. A single
//! file may hold both the chain and the key, as grid proxy files do.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{debug, error};

use crate::mtls::config::MtlsConfig;
use crate::mtls::verifier::PresentedChainVerifier;
use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Public: build TLS server config
// ─────────────────────────────────────────────────────────────────────────────

/// The crypto provider used for every TLS config in the process.
#[must_use]
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Build a `rustls::ServerConfig` that requests client certificates.
///
/// Presented chains are not validated against a CA (see
/// [`PresentedChainVerifier`]). When `config.require_client_cert` is `true`
/// a client that sends no certificate fails the handshake.
///
/// # Errors
///
/// Returns `Error::Tls` if the certificate or key file cannot be read or
/// parsed, or if the key does not match the certificate.
pub fn build_tls_config(config: &MtlsConfig) -> Result<ServerConfig> {
    let server_certs = load_certs(&config.server_cert).map_err(into_tls)?;
    let server_key = load_private_key(&config.server_key).map_err(into_tls)?;

    let provider = crypto_provider();
    let verifier = Arc::new(PresentedChainVerifier::new(
        Arc::clone(&provider),
        config.require_client_cert,
    ));

    let mut tls_cfg = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("Unsupported protocol versions: {e}")))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(server_certs, server_key)
        .map_err(|e| Error::Tls(format!("TLS config error (cert/key mismatch?): {e}")))?;

    // Prefer HTTP/2, fall back to HTTP/1.1
    tls_cfg.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    debug!(
        server_cert = %config.server_cert,
        require_client_cert = config.require_client_cert,
        "mTLS config built"
    );

    Ok(tls_cfg)
}

/// Log every server credential file that cannot be opened.
///
/// Startup continues regardless; the subsequent [`build_tls_config`] call is
/// what decides whether the process can serve.
pub fn preflight(config: &MtlsConfig) {
    for (kind, path) in [("key", &config.server_key), ("cert", &config.server_cert)] {
        if let Err(e) = fs::File::open(path) {
            error!(error = %e, path = %path, "unable to open server {kind} file");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public: PEM loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load all certificates from a PEM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains no valid PEM
/// certificate blocks.
pub fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    parse_certs(&read_file(path)?, path)
}

/// Load the first private key from a PEM file.
///
/// Supports RSA (`RSA PRIVATE KEY`), PKCS#8 (`PRIVATE KEY`), and EC keys.
///
/// # Errors
///
/// Returns an error if the file cannot be read, contains no private key, or
/// the key format is unsupported.
pub fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    parse_private_key(&read_file(path)?, path)
}

/// Parse all certificates from in-memory PEM data; `origin` names the source
/// in error messages.
pub(crate) fn parse_certs(pem_data: &[u8], origin: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &pem_data[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("Failed to parse certs from '{origin}': {e}")))?;

    if certs.is_empty() {
        return Err(Error::Config(format!(
            "No certificates found in '{origin}'"
        )));
    }

    Ok(certs)
}

/// Parse the first private key from in-memory PEM data.
pub(crate) fn parse_private_key(pem_data: &[u8], origin: &str) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem_data[..])
        .map_err(|e| Error::Config(format!("Failed to parse private key from '{origin}': {e}")))?
        .ok_or_else(|| Error::Config(format!("No private key found in '{origin}'")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Private helpers
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn read_file(path: &str) -> Result<Vec<u8>> {
    fs::read(Path::new(path)).map_err(|e| Error::Config(format!("Cannot read '{path}': {e}")))
}

fn into_tls(err: Error) -> Error {
    match err {
        Error::Config(msg) => Error::Tls(msg),
        other => other,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
