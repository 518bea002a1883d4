//! TFaaS server library
//!
//! HTTPS front end for model serving, authorized by grid X.509 identities.
//!
//! # Features
//!
//! - **Certificate authorization**: callers present a (proxy) certificate;
//!   its DN must appear in the allowlist published by an identity directory
//! - **Outbound identity**: directory calls carry the process's own proxy or
//!   user certificate
//! - **Endpoints**: model file download, protobuf prediction, runtime
//!   verbosity control
//! - **Logging**: structured `tracing` output, text or JSON, with a filter
//!   retuned at runtime by the verbosity endpoint

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authz;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod mtls;
pub mod predict;
pub mod verbosity;

pub use error::{Error, Result};
pub use verbosity::Verbosity;

use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

/// Handle for swapping the global log filter at runtime
pub type LogReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Setup tracing/logging
///
/// `RUST_LOG`, when set, takes precedence over `level`. The returned
/// [`Verbosity`] restores whichever filter was installed here when its level
/// drops back to 0.
///
/// # Errors
///
/// `Error::Config` if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<Verbosity> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = startup_directive(rust_log.as_deref(), level);
    let (filter, handle) = reload::Layer::new(EnvFilter::new(&directive));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };
    installed.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))?;

    Ok(Verbosity::new(directive, Some(handle)))
}

/// Filter directive to install at startup: a non-blank, parseable `RUST_LOG`
/// value, else `level`.
fn startup_directive(rust_log: Option<&str>, level: &str) -> String {
    rust_log
        .filter(|value| !value.trim().is_empty() && EnvFilter::try_new(value).is_ok())
        .unwrap_or(level)
        .to_string()
}
