//! Pluggable static validation for Prometheus-style alerting and recording
//! rules.
//!
//! Validators are configured per kind from YAML, built through a
//! [`Registry`], and run against rules without a live metrics backend.
//!
//! # Built-in validators
//!
//! - `forIsNotLongerThan`: an alert's `for` duration must not exceed `limit`.
//! - `validateLabelTemplates`: every label value must be a well-formed
//!   template. Values are rendered against placeholder alert data; failures
//!   that only stem from missing runtime data are not reported.
//!
//! # Example
//!
//! ```
//! use ruleval::{PromDuration, Registry, Rule, RuleGroup, ValidationConfig, ValidatorSet};
//!
//! let config = ValidationConfig::from_yaml_str(
//!     r"
//! validators:
//!   - type: forIsNotLongerThan
//!     params:
//!       limit: 5m
//!   - type: validateLabelTemplates
//! ",
//! )?;
//! let validators = ValidatorSet::from_config(&Registry::default(), &config)?;
//!
//! let group = RuleGroup::new("node").with_rule(
//!     Rule::alert("NodeDown", "up == 0")
//!         .with_for(PromDuration::from_mins(10))
//!         .with_label("instance", "{{ $labels.instance }}"),
//! );
//! let reports = validators.validate_groups(&[group], None);
//!
//! assert_eq!(reports.len(), 1);
//! assert_eq!(
//!     reports[0].errors[0].to_string(),
//!     "alert has `for: 10m` which is longer than the specified limit of 5m"
//! );
//! # Ok::<(), ruleval::ConfigError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
mod duration;
mod error;
mod rule;
pub mod template;
pub mod validator;

pub use client::{ClientError, MetricsClient, NoopClient, Sample};
pub use config::{ValidationConfig, ValidatorConfig, ValidatorSpec, decode_params};
pub use duration::{DurationError, PromDuration};
pub use error::{ConfigError, ValidationError};
pub use rule::{Rule, RuleGroup};
pub use validator::{
    Constructor, ForIsNotLongerThan, ForLimitParams, LabelTemplateParams, Registry, RuleReport,
    ValidateLabelTemplates, Validator, ValidatorSet,
};
