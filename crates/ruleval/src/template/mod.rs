//! The alerting template language.
//!
//! Templates follow the Go `text/template` dialect used by Prometheus for
//! alert labels and annotations: `{{ }}` actions with pipelines, variables,
//! `if`/`with`/`range` control structures, named templates, and the
//! Prometheus function set (`query`, `humanize`, `reReplaceAll`, ...).
//!
//! Parsing and execution are separate phases and report distinct
//! [`TemplateError`] variants, which is what lets validators tell a broken
//! template from one that merely needs live data.
//!
//! ```
//! use chrono::DateTime;
//! use ruleval::NoopClient;
//! use ruleval::template::{Expander, TemplateData};
//!
//! let data = TemplateData::default().with_label("instance", "node-1");
//! let expander = Expander::new(
//!     "summary",
//!     "{{ $labels.instance }} is down",
//!     data.to_value(),
//!     DateTime::UNIX_EPOCH,
//!     &NoopClient,
//! );
//! let text = expander.expand_alert().unwrap_or_default();
//! assert_eq!(text, "node-1 is down");
//! ```

mod error;
mod exec;
mod funcs;
mod humanize;
mod lexer;
mod parse;
mod printf;
mod value;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use url::Url;

use crate::client::MetricsClient;

pub use error::TemplateError;
pub use value::Value;

/// Variable declarations Prometheus prepends to every alert template.
pub const ALERT_DEFINITIONS: &str = "{{$labels := .Labels}}{{$externalLabels := .ExternalLabels}}{{$externalURL := .ExternalURL}}{{$value := .Value}}";

/// The data an alert template is rendered against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateData {
    /// Labels of the alert.
    pub labels: BTreeMap<String, String>,
    /// External labels of the evaluating server.
    pub external_labels: BTreeMap<String, String>,
    /// External URL of the evaluating server.
    pub external_url: String,
    /// Value of the alert's sample.
    pub value: f64,
}

impl TemplateData {
    /// Adds an alert label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an external label.
    #[must_use]
    pub fn with_external_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.external_labels.insert(key.into(), value.into());
        self
    }

    /// Sets the external URL.
    #[must_use]
    pub fn with_external_url(mut self, url: impl Into<String>) -> Self {
        self.external_url = url.into();
        self
    }

    /// Sets the sample value.
    #[must_use]
    pub const fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    /// Converts the record into the template root: `.Labels`,
    /// `.ExternalLabels`, `.ExternalURL` and `.Value`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut root = BTreeMap::new();
        root.insert("Labels".to_string(), Value::from(&self.labels));
        root.insert("ExternalLabels".to_string(), Value::from(&self.external_labels));
        root.insert("ExternalURL".to_string(), Value::Str(self.external_url.clone()));
        root.insert("Value".to_string(), Value::Float(self.value));
        Value::Map(root)
    }
}

/// Renders one named template against a data value.
#[derive(Debug, Clone)]
pub struct Expander<'a> {
    name: String,
    text: String,
    data: Value,
    timestamp: DateTime<Utc>,
    client: &'a dyn MetricsClient,
    external_url: Option<&'a Url>,
}

impl<'a> Expander<'a> {
    /// Creates an expander. `timestamp` is the evaluation time passed to
    /// `query` calls; `client` answers them.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        text: impl Into<String>,
        data: Value,
        timestamp: DateTime<Utc>,
        client: &'a dyn MetricsClient,
    ) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            data,
            timestamp,
            client,
            external_url: None,
        }
    }

    /// Sets the URL reported by `externalURL` and `pathPrefix`.
    #[must_use]
    pub const fn with_external_url(mut self, url: &'a Url) -> Self {
        self.external_url = Some(url);
        self
    }

    /// Returns the template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks that the template parses, without rendering it.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] for malformed text.
    pub fn parse(&self) -> Result<(), TemplateError> {
        parse::parse(&self.name, &self.text, &funcs::is_defined).map(|_| ())
    }

    /// Parses and renders the template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] for malformed text and
    /// [`TemplateError::Exec`] when rendering fails.
    pub fn expand(&self) -> Result<String, TemplateError> {
        self.expand_text(&self.text)
    }

    /// Like [`expand`](Self::expand), with [`ALERT_DEFINITIONS`] prepended so
    /// `$labels`, `$externalLabels`, `$externalURL` and `$value` are in scope.
    ///
    /// # Errors
    ///
    /// Same as [`expand`](Self::expand).
    pub fn expand_alert(&self) -> Result<String, TemplateError> {
        self.expand_text(&format!("{ALERT_DEFINITIONS}{}", self.text))
    }

    fn expand_text(&self, text: &str) -> Result<String, TemplateError> {
        let tree = parse::parse(&self.name, text, &funcs::is_defined)?;
        let env = exec::Env {
            client: self.client,
            timestamp: self.timestamp,
            external_url: self.external_url,
        };
        exec::execute(&self.name, &tree, &self.data, &env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NoopClient;

    fn expander(text: &str, data: &TemplateData) -> Expander<'static> {
        Expander::new("test", text, data.to_value(), DateTime::UNIX_EPOCH, &NoopClient)
    }

    #[test]
    fn alert_definitions_bind_variables() {
        let data = TemplateData::default()
            .with_label("job", "api")
            .with_external_label("cluster", "eu-1")
            .with_external_url("http://prom")
            .with_value(3.0);
        let out = expander(
            "{{ $labels.job }} {{ $externalLabels.cluster }} {{ $externalURL }} {{ $value }}",
            &data,
        )
        .expand_alert();
        assert_eq!(out.as_deref(), Ok("api eu-1 http://prom 3"));
    }

    #[test]
    fn plain_expand_has_no_alert_variables() {
        let err = expander("{{ $labels.job }}", &TemplateData::default()).expand();
        assert!(matches!(err, Err(TemplateError::Parse { .. })));
    }

    #[test]
    fn parse_only() {
        assert!(expander("{{ .Labels.x }}", &TemplateData::default()).parse().is_ok());
        assert!(expander("{{ if }}", &TemplateData::default()).parse().is_err());
    }

    #[test]
    fn external_url_functions() {
        let url = Url::parse("https://example.com/prom").unwrap();
        let data = TemplateData::default();
        let out = expander("{{ pathPrefix }}|{{ graphLink \"up\" }}", &data)
            .with_external_url(&url)
            .expand();
        assert_eq!(out.as_deref(), Ok("/prom|/graph?g0.expr=up&g0.tab=0"));
    }

    #[test]
    fn errors_carry_template_name() {
        let err = expander("{{ nosuch }}", &TemplateData::default()).expand().err();
        assert_eq!(err.as_ref().map(TemplateError::name), Some("test"));
    }

    #[test]
    fn placeholder_data_shape() {
        let Value::Map(root) = TemplateData::default().to_value() else {
            unreachable!("template data must be a map");
        };
        assert_eq!(root.get("Value"), Some(&Value::Float(0.0)));
        assert_eq!(root.get("ExternalURL"), Some(&Value::from("")));
        assert!(matches!(root.get("Labels"), Some(Value::Map(m)) if m.is_empty()));
    }
}
