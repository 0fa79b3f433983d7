//! The `forIsNotLongerThan` validator.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::MetricsClient;
use crate::config::{ValidatorConfig, decode_params};
use crate::duration::PromDuration;
use crate::error::{ConfigError, ValidationError};
use crate::rule::{Rule, RuleGroup};

use super::Validator;

/// Parameters of [`ForIsNotLongerThan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForLimitParams {
    /// Longest accepted `for` duration. Must be non-zero.
    #[serde(default)]
    pub limit: PromDuration,
}

/// Fails alerts whose `for` duration exceeds a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForIsNotLongerThan {
    limit: PromDuration,
}

impl ForIsNotLongerThan {
    /// Registered kind name.
    pub const KIND: &'static str = "forIsNotLongerThan";

    /// Creates the validator from typed parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingParam`] if `limit` is zero.
    pub fn new(params: ForLimitParams) -> Result<Self, ConfigError> {
        if params.limit.is_zero() {
            return Err(ConfigError::MissingParam {
                kind: Self::KIND.to_string(),
                param: "limit",
            });
        }
        Ok(Self {
            limit: params.limit,
        })
    }

    /// Builds the validator from a configuration blob.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] for unknown or mistyped fields and
    /// [`ConfigError::MissingParam`] for an absent or zero `limit`.
    pub fn from_config(config: &ValidatorConfig) -> Result<Box<dyn Validator>, ConfigError> {
        let params: ForLimitParams = decode_params(Self::KIND, config)?;
        let validator = Self::new(params)?;
        debug!(kind = Self::KIND, limit = %validator.limit, "built validator");
        Ok(Box::new(validator))
    }

    /// Returns the configured limit.
    #[must_use]
    pub const fn limit(&self) -> PromDuration {
        self.limit
    }
}

impl Validator for ForIsNotLongerThan {
    fn describe(&self) -> String {
        format!("`for` is not longer than `{}`", self.limit)
    }

    fn validate(
        &self,
        _group: &RuleGroup,
        rule: &Rule,
        _client: Option<&dyn MetricsClient>,
    ) -> Vec<ValidationError> {
        let actual = rule.for_duration;
        if !actual.is_zero() && actual > self.limit {
            return vec![ValidationError::ForTooLong {
                actual,
                limit: self.limit,
            }];
        }
        Vec::new()
    }
}
