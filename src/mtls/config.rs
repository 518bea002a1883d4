//! Inbound TLS configuration types.
//!
//! # Example YAML
//!
//! ```yaml
//! tls:
//!   server_cert: "/etc/tfaas/server.crt"
//!   server_key:  "/etc/tfaas/server.key"
//!   require_client_cert: true
//! ```

use serde::{Deserialize, Serialize};

/// Server certificate paths and client-certificate policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MtlsConfig {
    /// Path to the PEM-encoded server certificate (chain).
    pub server_cert: String,

    /// Path to the PEM-encoded server private key.
    pub server_key: String,

    /// Abort the handshake when the client presents no certificate.
    ///
    /// Presented chains are never validated against a CA either way: the
    /// caller's DN is checked against the allowlist after the handshake.
    /// When `false`, clients without a certificate complete the handshake and
    /// are then refused by the authorization gate.
    pub require_client_cert: bool,
}

impl Default for MtlsConfig {
    fn default() -> Self {
        Self {
            server_cert: "server.crt".to_string(),
            server_key: "server.key".to_string(),
            require_client_cert: true,
        }
    }
}
