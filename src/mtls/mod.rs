//! X.509 identity handling on both sides of the service.
//!
//! # Architecture
//!
//! ```text
//! inbound:  TLS handshake (client chain requested, not CA-validated)
//!             → PeerCertificates injected into request extensions
//!             → UserDn extracted by the authorization gate
//!
//! outbound: CredentialLoader (uid proxy → X509_USER_PROXY → cert/key pair)
//!             → ClientIdentity presented by the directory client
//! ```
//!
//! # Modules
//!
//! - [`config`] — inbound TLS configuration (`MtlsConfig`)
//! - [`cert_manager`] — PEM loading and rustls server config building
//! - [`verifier`] — client certificate verifier used by the server config
//! - [`identity`] — grid DN extraction (`UserDn`, `PeerCertificates`)
//! - [`credentials`] — outbound proxy / user credential resolution

pub mod cert_manager;
pub mod config;
pub mod credentials;
pub mod identity;
pub mod verifier;

pub use cert_manager::{build_tls_config, load_certs, load_private_key};
pub use config::MtlsConfig;
pub use credentials::{ClientIdentity, CredentialEnv, CredentialLoader, CredentialSource};
pub use identity::{DnError, PeerCertificates, UserDn};
