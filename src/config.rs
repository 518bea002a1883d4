//! Configuration management

use std::{path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::mtls::MtlsConfig;
use crate::{Error, Result};

/// Default identity directory endpoint (tabular people listing).
pub const DEFAULT_DIRECTORY_URL: &str = "https://cmsweb.cern.ch/sitedb/data/prod/people";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before credentials are resolved.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Inbound TLS configuration
    pub tls: MtlsConfig,
    /// Outbound credential configuration
    pub credentials: CredentialsConfig,
    /// Identity directory configuration
    pub directory: DirectoryConfig,
}

/// Listener and request handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory served under `/models/` and searched by `data?model=`
    pub dir: PathBuf,
    /// Maximum accepted request body size
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
            dir: PathBuf::from("models"),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Outbound credential lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Directory searched for the per-user `x509up_u<uid>` proxy
    pub proxy_dir: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            proxy_dir: PathBuf::from("/tmp"),
        }
    }
}

/// Identity directory (allowlist source) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// URL returning the tabular people listing
    pub url: String,
    /// Connect and request timeout for the directory call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Skip verification of the directory server's certificate when a client
    /// certificate is presented.
    ///
    /// This is a trust relaxation: the allowlist could be served by anyone
    /// able to intercept the connection. It is on by default because the
    /// reference deployment talks to a host whose chain is issued by a grid
    /// CA absent from the system roots.
    pub insecure_skip_verify: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DIRECTORY_URL.to_string(),
            timeout: Duration::from_secs(30),
            insecure_skip_verify: true,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (TFAAS_ prefix)
        figment = figment.merge(Env::prefixed("TFAAS_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before credential lookup)
        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_home(path_str);
            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }
}

fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}
