//! Error types for the TFaaS server

use std::io;

use thiserror::Error;

use crate::mtls::identity::DnError;

/// Result type alias for the TFaaS server
pub type Result<T> = std::result::Result<T, Error>;

/// TFaaS server errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed proxy or user credential files
    #[error("Credential error: {0}")]
    Credential(String),

    /// Server-side TLS setup error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Failure reaching or parsing the identity directory
    #[error("Directory fetch error: {0}")]
    Fetch(String),

    /// Caller DN could not be derived from the peer certificate chain
    #[error("DN extraction error: {0}")]
    Dn(#[from] DnError),

    /// Malformed inbound payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}
