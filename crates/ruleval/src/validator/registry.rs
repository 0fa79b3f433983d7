//! Validator kind registry.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::ValidatorConfig;
use crate::error::ConfigError;

use super::{ForIsNotLongerThan, ValidateLabelTemplates, Validator};

/// Builds a validator of one kind from its configuration blob.
pub type Constructor = fn(&ValidatorConfig) -> Result<Box<dyn Validator>, ConfigError>;

/// Maps validator kind names to their constructors.
#[derive(Debug, Clone)]
pub struct Registry {
    constructors: BTreeMap<String, Constructor>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Creates a registry holding every built-in kind.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ForIsNotLongerThan::KIND, ForIsNotLongerThan::from_config);
        registry.register(ValidateLabelTemplates::KIND, ValidateLabelTemplates::from_config);
        registry
    }

    /// Registers `constructor` under `kind`, replacing any previous entry.
    pub fn register(&mut self, kind: impl Into<String>, constructor: Constructor) {
        let kind = kind.into();
        debug!(kind = %kind, "registered validator kind");
        self.constructors.insert(kind, constructor);
    }

    /// Returns true if `kind` is registered.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Returns the registered kinds in sorted order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Builds a validator of `kind` from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownKind`] for an unregistered kind, or the
    /// kind constructor's error.
    pub fn build(&self, kind: &str, config: &ValidatorConfig) -> Result<Box<dyn Validator>, ConfigError> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownKind {
                kind: kind.to_string(),
            })?;
        constructor(config)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
