//! Identity directory access.
//!
//! - [`client`] — outbound HTTP client carrying the process identity
//! - [`fetcher`] — allowed-DN listing (`DirectoryClient`, `HttpDirectory`)

pub mod client;
pub mod fetcher;

pub use client::build_client;
pub use fetcher::{DirectoryClient, HttpDirectory, TabularResponse, project_column};
