//! Rule and rule group definitions.
//!
//! These mirror the Prometheus rule-file layout so an external loader can
//! deserialize them directly. Validators only ever see them by shared
//! reference.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::duration::PromDuration;

/// An alerting or recording rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Name of the recorded series, for recording rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    /// Name of the alert, for alerting rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    /// The query expression. Opaque to this crate.
    pub expr: String,
    /// How long the expression must hold before the alert fires. Zero means unset.
    #[serde(rename = "for", default, skip_serializing_if = "PromDuration::is_zero")]
    pub for_duration: PromDuration,
    /// Label templates attached to the resulting series or alert.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotation templates attached to the alert.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Rule {
    /// Creates an alerting rule.
    #[must_use]
    pub fn alert(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            alert: Some(name.into()),
            expr: expr.into(),
            ..Self::default()
        }
    }

    /// Creates a recording rule.
    #[must_use]
    pub fn record(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            record: Some(name.into()),
            expr: expr.into(),
            ..Self::default()
        }
    }

    /// Returns the alert or record name, whichever is set.
    #[must_use]
    pub fn name(&self) -> &str {
        self.alert
            .as_deref()
            .or(self.record.as_deref())
            .unwrap_or_default()
    }

    /// Returns true for alerting rules.
    #[must_use]
    pub const fn is_alert(&self) -> bool {
        self.alert.is_some()
    }

    /// Sets the `for` duration.
    #[must_use]
    pub const fn with_for(mut self, duration: PromDuration) -> Self {
        self.for_duration = duration;
        self
    }

    /// Adds a label template.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an annotation template.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// A named group of rules evaluated on a shared interval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    /// Group name, unique within a rule file.
    pub name: String,
    /// Evaluation interval; the global default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<PromDuration>,
    /// Rules in evaluation order.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the evaluation interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: PromDuration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Appends a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}
