//! The `validateLabelTemplates` validator.
//!
//! Each label value is rendered against placeholder alert data: empty label
//! maps, an empty external URL, a zero value, the Unix epoch as evaluation
//! time, and a query client that never returns samples. Only parse failures
//! are reported. Execution failures depend on real alert data and are
//! expected here, so they are logged and dropped.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{MetricsClient, NoopClient};
use crate::config::{ValidatorConfig, decode_params};
use crate::error::{ConfigError, ValidationError};
use crate::rule::{Rule, RuleGroup};
use crate::template::{Expander, TemplateData, TemplateError};

use super::Validator;

/// Parameters of [`ValidateLabelTemplates`]. The kind takes none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelTemplateParams {}

/// Fails rules whose label values are not well-formed templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateLabelTemplates;

impl ValidateLabelTemplates {
    /// Registered kind name.
    pub const KIND: &'static str = "validateLabelTemplates";

    /// Builds the validator from a configuration blob.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the blob carries any field.
    pub fn from_config(config: &ValidatorConfig) -> Result<Box<dyn Validator>, ConfigError> {
        let LabelTemplateParams {} = decode_params(Self::KIND, config)?;
        debug!(kind = Self::KIND, "built validator");
        Ok(Box::new(Self))
    }

    /// Renders one label value against placeholder data.
    fn check_label(label: &str, text: &str) -> Result<(), TemplateError> {
        let data = TemplateData::default().to_value();
        Expander::new(label, text, data, DateTime::UNIX_EPOCH, &NoopClient)
            .expand_alert()
            .map(|_| ())
    }
}

impl Validator for ValidateLabelTemplates {
    fn describe(&self) -> String {
        "labels are valid templates".to_string()
    }

    fn validate(
        &self,
        _group: &RuleGroup,
        rule: &Rule,
        _client: Option<&dyn MetricsClient>,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (label, text) in &rule.labels {
            match Self::check_label(label, text) {
                Ok(()) => {}
                Err(err) if err.is_exec() => {
                    debug!(rule = rule.name(), label = %label, error = %err, "ignoring template execution error");
                }
                Err(source) => errors.push(ValidationError::InvalidLabelTemplate {
                    label: label.clone(),
                    source,
                }),
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn validate(rule: &Rule) -> Vec<ValidationError> {
        ValidateLabelTemplates.validate(&RuleGroup::new("g"), rule, None)
    }

    fn labelled(key: &str, value: &str) -> Rule {
        Rule::alert("A", "up == 0").with_label(key, value)
    }

    #[test]
    fn describe() {
        assert_eq!(ValidateLabelTemplates.describe(), "labels are valid templates");
    }

    #[test]
    fn no_labels() {
        assert!(validate(&Rule::alert("A", "up == 0")).is_empty());
    }

    #[test_case("critical" ; "static text")]
    #[test_case("{{ $labels.instance }}" ; "labels variable")]
    #[test_case("{{ $externalLabels.cluster }}" ; "external labels variable")]
    #[test_case("{{ $externalURL }}" ; "external url variable")]
    #[test_case("{{ $value }}" ; "value variable")]
    #[test_case("{{ .Labels.job }}/{{ .ExternalLabels.dc }}" ; "label fields")]
    #[test_case("{{ .ExternalURL }} {{ .Value | humanize }}" ; "url and value fields")]
    #[test_case("{{ if gt $value 10.0 }}page{{ else }}ticket{{ end }}" ; "conditional")]
    #[test_case("{{ range query \"up\" }}{{ .Labels.instance }}{{ end }}" ; "query range")]
    #[test_case("{{ with query \"up\" }}{{ . | first | value }}{{ end }}" ; "query with")]
    #[test_case("{{ reReplaceAll \"-.*\" \"\" $labels.pod }}" ; "regex replace")]
    #[test_case("{{/* comment */}}x" ; "comment")]
    #[test_case("{{ .Value | toTime }}" ; "to time")]
    #[test_case("{{ $value | toDuration }}" ; "to duration")]
    #[test_case("{{ slice \"abc\" 1 }}" ; "slice string")]
    #[test_case("{{ printf \"%*d\" 3 $value }}" ; "star width")]
    fn sound_templates(text: &str) {
        assert!(validate(&labelled("team", text)).is_empty(), "{text}");
    }

    #[test_case("{{ .Labels.nonexistent }}" ; "absent label")]
    #[test_case("{{ query \"up\" | first | value }}" ; "empty query result")]
    #[test_case("{{ index $labels.missing 0 }}" ; "index on nothing")]
    #[test_case("{{ humanizeTimestamp \"x\" }}" ; "bad runtime conversion")]
    #[test_case("{{ template \"nope\" }}" ; "undefined named template")]
    #[test_case("{{ call $value }}" ; "call on a non-function")]
    #[test_case("{{ slice $labels.missing 1 }}" ; "slice of nothing")]
    #[test_case("{{ range 9223372036854775807 }}{{ end }}" ; "huge integer range")]
    #[test_case("{{ define \"t\" }}{{ template \"t\" }}{{ end }}{{ template \"t\" }}" ; "unbounded recursion")]
    #[test_case("{{ range 100 }}{{ printf \"%1000000d\" 1 }}{{ end }}" ; "oversized output")]
    fn execution_failures_are_suppressed(text: &str) {
        assert!(validate(&labelled("team", text)).is_empty(), "{text}");
    }

    #[test_case("{{ if }}" ; "empty if")]
    #[test_case("{{ .Labels.x " ; "unclosed action")]
    #[test_case("{{ nosuchfunc }}" ; "undefined function")]
    #[test_case("{{ $nosuch }}" ; "undefined variable")]
    #[test_case("{{ end }}" ; "stray end")]
    #[test_case("{{ else }}" ; "stray else")]
    #[test_case("{{ range $labels }}" ; "unterminated range")]
    #[test_case("{{ break }}" ; "break outside range")]
    #[test_case("{{ \"unterminated }}" ; "unterminated string")]
    fn malformed_templates_are_reported(text: &str) {
        assert_reported_as_parse_error(text);
    }

    #[test]
    fn deeply_nested_parens_are_reported() {
        let text = format!("{{{{ {}1{} }}}}", "(".repeat(3000), ")".repeat(3000));
        assert_reported_as_parse_error(&text);
    }

    #[test]
    fn deeply_nested_controls_are_reported() {
        assert_reported_as_parse_error(&"{{ if 1 }}".repeat(5000));
    }

    #[test]
    fn huge_printf_widths_render() {
        assert_eq!(
            ValidateLabelTemplates::check_label("w", "{{ printf \"%99999999999999999999d\" 1 }}"),
            Ok(())
        );
    }

    fn assert_reported_as_parse_error(text: &str) {
        let errors = validate(&labelled("bad", text));
        assert_eq!(errors.len(), 1, "{text}");
        let ValidationError::InvalidLabelTemplate { label, source } = &errors[0] else {
            unreachable!("unexpected error {:?}", errors[0]);
        };
        assert_eq!(label, "bad");
        assert!(source.is_parse());
        assert_eq!(source.name(), "bad");
        assert!(errors[0].to_string().starts_with("invalid template of label bad: "));
    }

    #[test]
    fn empty_if_message() {
        let errors = validate(&labelled("bad", "{{ if }}"));
        assert_eq!(
            errors[0].to_string(),
            "invalid template of label bad: error parsing template bad: line 1: missing value for if"
        );
    }

    #[test]
    fn errors_follow_label_order() {
        let rule = Rule::alert("A", "up == 0")
            .with_label("zeta", "{{ if }}")
            .with_label("alpha", "{{ end }}")
            .with_label("ok", "fine");
        let labels: Vec<String> = validate(&rule)
            .into_iter()
            .map(|e| match e {
                ValidationError::InvalidLabelTemplate { label, .. } => label,
                other => unreachable!("unexpected error {other:?}"),
            })
            .collect();
        assert_eq!(labels, vec!["alpha", "zeta"]);
    }

    #[test]
    fn annotations_are_ignored() {
        let rule = Rule::alert("A", "up == 0").with_annotation("summary", "{{ if }}");
        assert!(validate(&rule).is_empty());
    }

    #[test_case("" ; "null params")]
    #[test_case("{}" ; "empty mapping")]
    fn accepts_no_params(yaml: &str) {
        let config: ValidatorConfig = serde_yaml::from_str(yaml).unwrap();
        let validator = ValidateLabelTemplates::from_config(&config).unwrap();
        assert_eq!(validator.describe(), "labels are valid templates");
    }

    #[test]
    fn rejects_any_param() {
        let config: ValidatorConfig = serde_yaml::from_str("strict: true").unwrap();
        let err = ValidateLabelTemplates::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Decode { .. }));
    }
}
