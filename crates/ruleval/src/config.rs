//! Validator configuration.
//!
//! A configuration document lists validator instances by kind, each with an
//! untyped parameter blob:
//!
//! ```yaml
//! validators:
//!   - type: forIsNotLongerThan
//!     params:
//!       limit: 1h
//!   - type: validateLabelTemplates
//! ```
//!
//! Blobs stay untyped until a kind's constructor decodes them with
//! [`decode_params`].

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Kind-specific, untyped validator parameters.
pub type ValidatorConfig = serde_yaml::Value;

/// One configured validator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorSpec {
    /// The registered validator kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Parameters handed to the kind's constructor.
    #[serde(default)]
    pub params: ValidatorConfig,
}

impl ValidatorSpec {
    /// Creates a spec with no parameters.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: ValidatorConfig::Null,
        }
    }

    /// Sets the parameter blob.
    #[must_use]
    pub fn with_params(mut self, params: ValidatorConfig) -> Self {
        self.params = params;
        self
    }
}

/// A full validation configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// Validators to run, in order.
    #[serde(default)]
    pub validators: Vec<ValidatorSpec>,
}

impl ValidationConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(ConfigError::Parse)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is malformed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&yaml)?;
        debug!(path = %path.display(), validators = config.validators.len(), "loaded validation config");
        Ok(config)
    }
}

/// Decodes a parameter blob into a kind's typed parameters.
///
/// A `null` blob decodes as an empty mapping, so kinds whose parameters are
/// all optional accept an omitted `params` key.
///
/// # Errors
///
/// Returns [`ConfigError::Decode`] if the blob has unknown or mistyped fields.
pub fn decode_params<T: DeserializeOwned>(kind: &str, config: &ValidatorConfig) -> Result<T> {
    let decoded = if config.is_null() {
        serde_yaml::from_value(ValidatorConfig::Mapping(serde_yaml::Mapping::new()))
    } else {
        serde_yaml::from_value(config.clone())
    };
    decoded.map_err(|source| ConfigError::Decode {
        kind: kind.to_string(),
        source,
    })
}
