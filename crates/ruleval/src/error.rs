//! Error types for the ruleval crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::duration::PromDuration;
use crate::template::TemplateError;

/// Errors raised while building validators from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No constructor is registered for the requested kind.
    #[error("unknown validator type: {kind}")]
    UnknownKind {
        /// The requested kind.
        kind: String,
    },

    /// The parameter blob did not decode into the kind's parameters.
    #[error("invalid params for {kind}: {source}")]
    Decode {
        /// The validator kind.
        kind: String,
        /// The underlying decode failure.
        #[source]
        source: serde_yaml::Error,
    },

    /// A required parameter was absent or left at its zero value.
    #[error("invalid params for {kind}: missing {param}")]
    MissingParam {
        /// The validator kind.
        kind: String,
        /// The missing parameter.
        param: &'static str,
    },

    /// A configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A configuration document is not valid YAML for the expected layout.
    #[error("invalid validation config: {0}")]
    Parse(#[source] serde_yaml::Error),
}

/// A finding reported by a validator against a single rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The rule waits longer than the configured limit before firing.
    #[error("alert has `for: {actual}` which is longer than the specified limit of {limit}")]
    ForTooLong {
        /// The rule's `for` duration.
        actual: PromDuration,
        /// The configured limit.
        limit: PromDuration,
    },

    /// A label value is not a well-formed template.
    #[error("invalid template of label {label}: {source}")]
    InvalidLabelTemplate {
        /// The label name.
        label: String,
        /// The template failure.
        #[source]
        source: TemplateError,
    },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
