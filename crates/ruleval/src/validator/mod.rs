//! Rule validators.
//!
//! Every validator kind implements [`Validator`] and is built from an untyped
//! [`ValidatorConfig`](crate::config::ValidatorConfig) through the
//! [`Registry`]. Built-in kinds:
//!
//! | kind                     | checks                                        |
//! |--------------------------|-----------------------------------------------|
//! | `forIsNotLongerThan`     | an alert's `for` does not exceed a limit      |
//! | `validateLabelTemplates` | every label value parses as a template        |

mod for_limit;
mod label_templates;
mod registry;
mod set;

use std::fmt::Debug;

use crate::client::MetricsClient;
use crate::error::ValidationError;
use crate::rule::{Rule, RuleGroup};

pub use for_limit::{ForIsNotLongerThan, ForLimitParams};
pub use label_templates::{LabelTemplateParams, ValidateLabelTemplates};
pub use registry::{Constructor, Registry};
pub use set::{RuleReport, ValidatorSet};

/// A configured check applied to individual rules.
///
/// Instances are immutable after construction and may be shared across
/// threads. `validate` reports findings as data and never fails on account of
/// the validator's own configuration.
pub trait Validator: Send + Sync + Debug {
    /// One-line, human-readable description of what is checked.
    fn describe(&self) -> String;

    /// Inspects `rule`, a member of `group`. An empty result means the rule
    /// passed.
    ///
    /// `client` gives access to a metrics backend for kinds that need it.
    fn validate(
        &self,
        group: &RuleGroup,
        rule: &Rule,
        client: Option<&dyn MetricsClient>,
    ) -> Vec<ValidationError>;
}
