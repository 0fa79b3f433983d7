//! The metrics-backend query seam.
//!
//! Validators receive an optional [`MetricsClient`] so that kinds which need
//! live backend state can query it. The template engine uses the same trait
//! for the `query` template function; static validation plugs in
//! [`NoopClient`] so embedded queries never reach a backend.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by a [`MetricsClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The backend rejected or failed to evaluate the query.
    #[error("query {expr:?} failed: {reason}")]
    Query {
        /// The query expression.
        expr: String,
        /// The reason reported by the backend.
        reason: String,
    },

    /// The backend could not be reached.
    #[error("metrics backend unavailable: {0}")]
    Unavailable(String),
}

/// A single instant-vector sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    /// Series labels, including `__name__` when present.
    pub labels: BTreeMap<String, String>,
    /// Sample value.
    pub value: f64,
}

impl Sample {
    /// Creates a sample with no labels.
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self {
            labels: BTreeMap::new(),
            value,
        }
    }

    /// Adds a label to the sample.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A client able to evaluate instant queries against a metrics backend.
///
/// Implementations must be safe to call concurrently; validators share a
/// single client across rules.
pub trait MetricsClient: Send + Sync + fmt::Debug {
    /// Evaluates `expr` at the instant `at`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when the query cannot be evaluated.
    fn query(&self, expr: &str, at: DateTime<Utc>) -> Result<Vec<Sample>, ClientError>;
}

/// A client that answers every query with an empty result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClient;

impl MetricsClient for NoopClient {
    fn query(&self, _expr: &str, _at: DateTime<Utc>) -> Result<Vec<Sample>, ClientError> {
        Ok(Vec::new())
    }
}
