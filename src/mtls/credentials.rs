//! Outbound client credentials.
//!
//! Resolves the X.509 identity this process presents when it calls other
//! services. Resolution order, first match wins:
//!
//! 1. the per-user proxy `<proxy_dir>/x509up_u<uid>` if that file exists
//! 2. the proxy named by `X509_USER_PROXY`
//! 3. the certificate/key pair named by `X509_USER_CERT` / `X509_USER_KEY`
//!
//! Having none of them is not an error: outbound calls are then made without
//! a client certificate. The first resolution result is cached for the life of
//! the [`CredentialLoader`]; a renewed proxy is only picked up after restart.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::mtls::cert_manager::{parse_certs, parse_private_key, read_file};
use crate::{Error, Result};

/// Environment variable naming a proxy credential file.
pub const ENV_USER_PROXY: &str = "X509_USER_PROXY";
/// Environment variable naming the user private key file.
pub const ENV_USER_KEY: &str = "X509_USER_KEY";
/// Environment variable naming the user certificate file.
pub const ENV_USER_CERT: &str = "X509_USER_CERT";

// ─────────────────────────────────────────────────────────────────────────────
// Environment snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Credential-related environment values, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialEnv {
    /// `X509_USER_PROXY`
    pub proxy: Option<String>,
    /// `X509_USER_KEY`
    pub user_key: Option<String>,
    /// `X509_USER_CERT`
    pub user_cert: Option<String>,
}

impl CredentialEnv {
    /// Capture the current process environment. Empty values count as unset.
    #[must_use]
    pub fn from_process() -> Self {
        let var = |name: &str| env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            proxy: var(ENV_USER_PROXY),
            user_key: var(ENV_USER_KEY),
            user_cert: var(ENV_USER_CERT),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Source resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Where the outbound identity comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Per-user proxy file in the proxy directory
    UidProxy(PathBuf),
    /// Proxy file named by `X509_USER_PROXY`
    EnvProxy(PathBuf),
    /// Long-lived user certificate and key
    UserPair {
        /// Certificate (chain) file
        cert: PathBuf,
        /// Private key file
        key: PathBuf,
    },
}

impl CredentialSource {
    /// Short name used in logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::UidProxy(_) => "uid-proxy",
            Self::EnvProxy(_) => "env-proxy",
            Self::UserPair { .. } => "user-cert",
        }
    }
}

/// Per-user proxy path for the current process, e.g. `/tmp/x509up_u1000`.
#[cfg(unix)]
#[must_use]
pub fn uid_proxy_path(proxy_dir: &Path) -> Option<PathBuf> {
    let uid = nix::unistd::getuid().as_raw();
    Some(proxy_dir.join(format!("x509up_u{uid}")))
}

/// Per-user proxies are a Unix convention.
#[cfg(not(unix))]
#[must_use]
pub fn uid_proxy_path(_proxy_dir: &Path) -> Option<PathBuf> {
    None
}

/// Pick the credential source, or `None` when nothing is configured.
///
/// # Errors
///
/// `Error::Credential` when only one half of the user cert/key pair is set.
pub fn resolve_source(
    env: &CredentialEnv,
    uid_proxy: Option<&Path>,
) -> Result<Option<CredentialSource>> {
    if let Some(path) = uid_proxy.filter(|p| p.is_file()) {
        return Ok(Some(CredentialSource::UidProxy(path.to_path_buf())));
    }
    if let Some(ref proxy) = env.proxy {
        return Ok(Some(CredentialSource::EnvProxy(PathBuf::from(proxy))));
    }
    match (&env.user_cert, &env.user_key) {
        (Some(cert), Some(key)) => Ok(Some(CredentialSource::UserPair {
            cert: PathBuf::from(cert),
            key: PathBuf::from(key),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(Error::Credential(format!(
            "{ENV_USER_CERT} is set but {ENV_USER_KEY} is not"
        ))),
        (None, Some(_)) => Err(Error::Credential(format!(
            "{ENV_USER_KEY} is set but {ENV_USER_CERT} is not"
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loaded identity
// ─────────────────────────────────────────────────────────────────────────────

/// A loaded certificate chain and private key.
pub struct ClientIdentity {
    source: CredentialSource,
    chain: Vec<CertificateDer<'static>>,
    /// Key and chain as one PEM document.
    pem: Vec<u8>,
    subject: String,
    expired: bool,
}

impl ClientIdentity {
    /// Read and validate the credential files behind `source`.
    ///
    /// # Errors
    ///
    /// `Error::Credential` if a file is unreadable, holds no certificate or
    /// key, or the leaf certificate is not valid X.509.
    pub fn load(source: &CredentialSource) -> Result<Self> {
        let (pem, origin) = match source {
            CredentialSource::UidProxy(path) | CredentialSource::EnvProxy(path) => {
                (read_credential(path)?, path.display().to_string())
            }
            CredentialSource::UserPair { cert, key } => {
                let mut pem = read_credential(key)?;
                pem.push(b'\n');
                pem.extend_from_slice(&read_credential(cert)?);
                (pem, format!("{} + {}", cert.display(), key.display()))
            }
        };

        let chain = parse_certs(&pem, &origin).map_err(into_credential)?;
        parse_private_key(&pem, &origin).map_err(into_credential)?;

        let (_, leaf) = X509Certificate::from_der(chain[0].as_ref())
            .map_err(|e| Error::Credential(format!("Invalid certificate in '{origin}': {e}")))?;
        let subject = leaf.subject().to_string();
        let not_after = leaf.validity().not_after.to_string();
        let expired = !leaf.validity().is_valid();

        if expired {
            warn!(
                source = source.label(),
                subject = %subject,
                not_after = %not_after,
                "Outbound credential is outside its validity period"
            );
        } else {
            info!(
                source = source.label(),
                subject = %subject,
                not_after = %not_after,
                "Loaded outbound credential"
            );
        }

        Ok(Self {
            source: source.clone(),
            chain,
            pem,
            subject,
            expired,
        })
    }

    /// Where this identity was loaded from.
    #[must_use]
    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Certificate chain, leaf first.
    #[must_use]
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// Leaf subject in RFC 4514 form.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Whether the leaf was outside its validity window when loaded.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Convert to an HTTP client identity.
    ///
    /// # Errors
    ///
    /// `Error::Credential` if the TLS backend rejects the key or chain.
    pub fn to_reqwest_identity(&self) -> Result<reqwest::Identity> {
        reqwest::Identity::from_pem(&self.pem)
            .map_err(|e| Error::Credential(format!("Unusable client identity: {e}")))
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("source", &self.source)
            .field("subject", &self.subject)
            .field("chain_len", &self.chain.len())
            .field("expired", &self.expired)
            .finish_non_exhaustive()
    }
}

fn read_credential(path: &Path) -> Result<Vec<u8>> {
    read_file(&path.to_string_lossy()).map_err(into_credential)
}

fn into_credential(err: Error) -> Error {
    match err {
        Error::Config(msg) => Error::Credential(msg),
        other => other,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cached loader
// ─────────────────────────────────────────────────────────────────────────────

/// Loads the outbound identity once and hands out the cached result.
#[derive(Debug)]
pub struct CredentialLoader {
    env: CredentialEnv,
    uid_proxy: Option<PathBuf>,
    cell: OnceCell<Option<Arc<ClientIdentity>>>,
}

impl CredentialLoader {
    /// Loader over an explicit environment snapshot.
    #[must_use]
    pub fn new(env: CredentialEnv, uid_proxy: Option<PathBuf>) -> Self {
        Self {
            env,
            uid_proxy,
            cell: OnceCell::new(),
        }
    }

    /// Loader over the process environment and the per-user proxy in `proxy_dir`.
    #[must_use]
    pub fn from_process(proxy_dir: &Path) -> Self {
        Self::new(CredentialEnv::from_process(), uid_proxy_path(proxy_dir))
    }

    /// The outbound identity, or `None` for anonymous outbound calls.
    ///
    /// # Errors
    ///
    /// `Error::Credential` for malformed credential files. Errors are not
    /// cached; a successful result (including `None`) is.
    pub async fn load(&self) -> Result<Option<Arc<ClientIdentity>>> {
        self.cell
            .get_or_try_init(|| async { self.load_uncached() })
            .await
            .cloned()
    }

    fn load_uncached(&self) -> Result<Option<Arc<ClientIdentity>>> {
        let Some(source) = resolve_source(&self.env, self.uid_proxy.as_deref())? else {
            warn!(
                "Neither proxy nor user certificates found; outbound calls carry no client certificate"
            );
            return Ok(None);
        };
        ClientIdentity::load(&source).map(|id| Some(Arc::new(id)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
