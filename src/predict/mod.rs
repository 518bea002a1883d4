//! Prediction exchange format and the model seam.
//!
//! Wire messages are protobuf:
//!
//! ```text
//! Row         { repeated string key = 1; repeated float value = 2; }
//! Hits        { repeated Row hits = 1; }
//! Class       { string name = 1; float p = 2; }
//! Predictions { repeated Class data = 1; }
//! ```

use async_trait::async_trait;
use prost::Message;

use crate::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Wire messages
// ─────────────────────────────────────────────────────────────────────────────

/// One event: parallel key and value arrays.
#[derive(Clone, PartialEq, Message)]
pub struct Row {
    /// Feature names
    #[prost(string, repeated, tag = "1")]
    pub key: Vec<String>,
    /// Feature values, aligned with `key`
    #[prost(float, repeated, tag = "2")]
    pub value: Vec<f32>,
}

/// Batch of input rows.
#[derive(Clone, PartialEq, Message)]
pub struct Hits {
    /// Rows to classify
    #[prost(message, repeated, tag = "1")]
    pub hits: Vec<Row>,
}

/// A single class probability.
#[derive(Clone, PartialEq, Message)]
pub struct Class {
    /// Class label
    #[prost(string, tag = "1")]
    pub name: String,
    /// Probability
    #[prost(float, tag = "2")]
    pub p: f32,
}

/// Prediction output.
#[derive(Clone, PartialEq, Message)]
pub struct Predictions {
    /// Class probabilities
    #[prost(message, repeated, tag = "1")]
    pub data: Vec<Class>,
}

impl Class {
    /// Build a class entry.
    #[must_use]
    pub fn new(name: impl Into<String>, p: f32) -> Self {
        Self {
            name: name.into(),
            p,
        }
    }
}

impl Hits {
    /// Decode a protobuf-encoded batch.
    ///
    /// # Errors
    ///
    /// `Error::Decode` if `bytes` is not a valid `Hits` message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::decode(bytes)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model seam
// ─────────────────────────────────────────────────────────────────────────────

/// Model invoked by the `predict` endpoint.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Classify a batch of rows.
    ///
    /// # Errors
    ///
    /// Implementation specific; the endpoint answers 500.
    async fn predict(&self, hits: &Hits) -> Result<Predictions>;
}

/// Fixed-answer predictor: `higgs` 0.2, `qcd` 0.8 for any input.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPredictor;

#[async_trait]
impl Predictor for StaticPredictor {
    async fn predict(&self, _hits: &Hits) -> Result<Predictions> {
        Ok(Predictions {
            data: vec![Class::new("higgs", 0.2), Class::new("qcd", 0.8)],
        })
    }
}
