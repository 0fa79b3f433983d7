//! Template error types.

use thiserror::Error;

/// An error raised while parsing or executing a template.
///
/// The two phases are kept apart structurally so callers can decide how
/// strictly to treat each one without inspecting messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template text is malformed.
    #[error("error parsing template {name}: line {line}: {message}")]
    Parse {
        /// Template name.
        name: String,
        /// One-based line of the offending token.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// The template parsed but failed while rendering.
    #[error("error executing template {name}: line {line}: {message}")]
    Exec {
        /// Template name.
        name: String,
        /// One-based line of the failing action.
        line: usize,
        /// Description of the problem.
        message: String,
    },
}

impl TemplateError {
    pub(crate) fn parse(name: &str, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            name: name.to_string(),
            line,
            message: message.into(),
        }
    }

    pub(crate) fn exec(name: &str, line: usize, message: impl Into<String>) -> Self {
        Self::Exec {
            name: name.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Returns true for parse-phase errors.
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// Returns true for execution-phase errors.
    #[must_use]
    pub const fn is_exec(&self) -> bool {
        matches!(self, Self::Exec { .. })
    }

    /// Returns the template name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Parse { name, .. } | Self::Exec { name, .. } => name,
        }
    }

    /// Returns the line the error refers to.
    #[must_use]
    pub const fn line(&self) -> usize {
        match self {
            Self::Parse { line, .. } | Self::Exec { line, .. } => *line,
        }
    }

    /// Returns the bare error message without the name and line prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Parse { message, .. } | Self::Exec { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_phase_and_position() {
        let err = TemplateError::parse("__alert_X", 1, "unexpected \"}\" in operand");
        assert_eq!(
            err.to_string(),
            "error parsing template __alert_X: line 1: unexpected \"}\" in operand"
        );
        assert!(err.is_parse());
        assert!(!err.is_exec());

        let err = TemplateError::exec("t", 3, "boom");
        assert_eq!(err.to_string(), "error executing template t: line 3: boom");
        assert_eq!(err.line(), 3);
        assert_eq!(err.name(), "t");
        assert_eq!(err.message(), "boom");
    }
}
