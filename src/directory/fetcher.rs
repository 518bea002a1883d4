//! Allowed-DN listing from the identity directory.
//!
//! The directory answers with a generic tabular document:
//!
//! ```json
//! { "desc": { "columns": ["username", "dn", "email"] },
//!   "result": [["alice", "/DC=ch/...", "alice@example.org"], ["bob", null, "..."]] }
//! ```
//!
//! Rows are positional arrays aligned with `desc.columns`. The DN list is the
//! `dn` column projected over all rows, `null` cells skipped.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{error, info};

use super::client::build_client;
use crate::config::DirectoryConfig;
use crate::mtls::CredentialLoader;
use crate::{Error, Result};

/// Column holding the distinguished name.
pub const DN_COLUMN: &str = "dn";

/// Source of the authorized DN list.
///
/// Implementations never fail: every error is logged and reported as an empty
/// list, which the authorization gate treats as "nobody is allowed".
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Fetch every DN the directory currently lists.
    async fn fetch_allowed_dns(&self) -> Vec<String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tabular response
// ─────────────────────────────────────────────────────────────────────────────

/// Column-described tabular response.
#[derive(Debug, Clone, Deserialize)]
pub struct TabularResponse {
    /// Column descriptor
    pub desc: TabularDesc,
    /// Rows, positionally aligned with `desc.columns`
    pub result: Vec<Vec<Value>>,
}

/// Column names of a [`TabularResponse`].
#[derive(Debug, Clone, Deserialize)]
pub struct TabularDesc {
    /// Column names in row order
    pub columns: Vec<String>,
}

/// Project the named string column over every row.
///
/// `null` cells and rows too short to hold the column are skipped.
///
/// # Errors
///
/// `Error::Fetch` if the column does not exist or a cell holds a non-string,
/// non-null value.
pub fn project_column(table: &TabularResponse, column: &str) -> Result<Vec<String>> {
    let idx = table
        .desc
        .columns
        .iter()
        .position(|c| c == column)
        .ok_or_else(|| Error::Fetch(format!("column '{column}' missing from response")))?;

    let mut out = Vec::with_capacity(table.result.len());
    for (row_no, row) in table.result.iter().enumerate() {
        match row.get(idx) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => out.push(s.clone()),
            Some(other) => {
                return Err(Error::Fetch(format!(
                    "row {row_no}: column '{column}' holds non-string value {other}"
                )));
            }
        }
    }
    Ok(out)
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Directory reached over HTTP(S) with the process's outbound identity.
pub struct HttpDirectory {
    config: DirectoryConfig,
    credentials: Arc<CredentialLoader>,
    client: OnceCell<Client>,
}

impl HttpDirectory {
    /// Create a directory client; the HTTP client is built on first use.
    #[must_use]
    pub fn new(config: DirectoryConfig, credentials: Arc<CredentialLoader>) -> Self {
        Self {
            config,
            credentials,
            client: OnceCell::new(),
        }
    }

    /// Directory URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                let identity = self.credentials.load().await?;
                build_client(identity.as_deref(), &self.config)
            })
            .await
    }

    async fn try_fetch(&self) -> Result<Vec<String>> {
        let response = self
            .client()
            .await?
            .get(&self.config.url)
            .header(ACCEPT, "*/*")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("directory returned HTTP {status}")));
        }

        let body = response.bytes().await?;
        let table: TabularResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::Fetch(format!("unable to decode directory response: {e}")))?;
        project_column(&table, DN_COLUMN)
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectory {
    async fn fetch_allowed_dns(&self) -> Vec<String> {
        match self.try_fetch().await {
            Ok(dns) => {
                info!(url = %self.config.url, count = dns.len(), "Fetched allowed DNs");
                dns
            }
            Err(e) => {
                error!(url = %self.config.url, error = %e, "Unable to fetch allowed DNs");
                Vec::new()
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
