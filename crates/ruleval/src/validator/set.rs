//! Running a configured set of validators over rule groups.

use tracing::{debug, info, warn};

use crate::client::MetricsClient;
use crate::config::ValidationConfig;
use crate::error::{ConfigError, ValidationError};
use crate::rule::{Rule, RuleGroup};

use super::{Registry, Validator};

/// Findings of one validator against one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleReport {
    /// Name of the rule's group.
    pub group: String,
    /// Name of the rule.
    pub rule: String,
    /// Description of the validator that reported the findings.
    pub validator: String,
    /// The findings, never empty.
    pub errors: Vec<ValidationError>,
}

/// An ordered collection of built validators.
#[derive(Debug, Default)]
pub struct ValidatorSet {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every validator listed in `config`.
    ///
    /// # Errors
    ///
    /// Returns the first construction error encountered.
    pub fn from_config(registry: &Registry, config: &ValidationConfig) -> Result<Self, ConfigError> {
        let validators = config
            .validators
            .iter()
            .map(|spec| registry.build(&spec.kind, &spec.params))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = validators.len(), "built validator set");
        Ok(Self { validators })
    }

    /// Appends a validator.
    pub fn push(&mut self, validator: Box<dyn Validator>) {
        self.validators.push(validator);
    }

    /// Returns the number of validators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Returns true if the set holds no validators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Returns the description of every validator, in order.
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        self.validators.iter().map(|v| v.describe()).collect()
    }

    /// Runs every validator against one rule, keeping only reports with
    /// findings.
    pub fn validate_rule(
        &self,
        group: &RuleGroup,
        rule: &Rule,
        client: Option<&dyn MetricsClient>,
    ) -> Vec<RuleReport> {
        self.validators
            .iter()
            .filter_map(|validator| {
                let errors = validator.validate(group, rule, client);
                if errors.is_empty() {
                    return None;
                }
                let report = RuleReport {
                    group: group.name.clone(),
                    rule: rule.name().to_string(),
                    validator: validator.describe(),
                    errors,
                };
                warn!(
                    group = %report.group,
                    rule = %report.rule,
                    validator = %report.validator,
                    findings = report.errors.len(),
                    "rule failed validation"
                );
                Some(report)
            })
            .collect()
    }

    /// Runs every validator against every rule of every group.
    pub fn validate_groups(
        &self,
        groups: &[RuleGroup],
        client: Option<&dyn MetricsClient>,
    ) -> Vec<RuleReport> {
        let mut reports = Vec::new();
        let mut rules = 0usize;
        for group in groups {
            for rule in &group.rules {
                rules += 1;
                reports.extend(self.validate_rule(group, rule, client));
            }
        }
        info!(
            groups = groups.len(),
            rules,
            validators = self.validators.len(),
            failures = reports.len(),
            "validation finished"
        );
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidatorSpec;
    use crate::duration::PromDuration;
    use crate::validator::{ForIsNotLongerThan, ForLimitParams, ValidateLabelTemplates};

    fn config() -> ValidationConfig {
        ValidationConfig::from_yaml_str(
            "validators:\n  - type: forIsNotLongerThan\n    params: {limit: 5m}\n  - type: validateLabelTemplates\n",
        )
        .unwrap()
    }

    #[test]
    fn from_config_builds_in_order() {
        let set = ValidatorSet::from_config(&Registry::default(), &config()).unwrap();
        assert_eq!(
            set.describe(),
            vec!["`for` is not longer than `5m`", "labels are valid templates"]
        );
    }

    #[test]
    fn from_config_stops_at_first_error() {
        let config = ValidationConfig {
            validators: vec![
                ValidatorSpec::new("validateLabelTemplates"),
                ValidatorSpec::new("unknown"),
                ValidatorSpec::new("forIsNotLongerThan"),
            ],
        };
        let err = ValidatorSet::from_config(&Registry::default(), &config).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKind { .. }));
    }

    #[test]
    fn empty_set_reports_nothing() {
        let set = ValidatorSet::new();
        assert!(set.is_empty());
        let group = RuleGroup::new("g").with_rule(Rule::alert("A", "up == 0").with_label("x", "{{ if }}"));
        assert!(set.validate_groups(&[group], None).is_empty());
    }

    #[test]
    fn reports_name_group_rule_and_validator() {
        let mut set = ValidatorSet::new();
        set.push(Box::new(
            ForIsNotLongerThan::new(ForLimitParams {
                limit: PromDuration::from_mins(5),
            })
            .unwrap(),
        ));
        set.push(Box::new(ValidateLabelTemplates));
        assert_eq!(set.len(), 2);

        let group = RuleGroup::new("api")
            .with_rule(Rule::alert("Slow", "x").with_for(PromDuration::from_mins(10)))
            .with_rule(Rule::alert("Fine", "y"))
            .with_rule(
                Rule::alert("Broken", "z")
                    .with_for(PromDuration::from_mins(30))
                    .with_label("bad", "{{ if }}"),
            );

        let reports = set.validate_groups(&[group], None);
        let summary: Vec<(&str, &str, usize)> = reports
            .iter()
            .map(|r| (r.rule.as_str(), r.validator.as_str(), r.errors.len()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Slow", "`for` is not longer than `5m`", 1),
                ("Broken", "`for` is not longer than `5m`", 1),
                ("Broken", "labels are valid templates", 1),
            ]
        );
        assert!(reports.iter().all(|r| r.group == "api"));
    }
}
