//! Construction-time diagnostics
//!
//! Problems found while building statements are collected here rather than
//! returned as errors, so one pass over a unit surfaces all of them. The
//! statement being built stays constructible; its node just carries an error
//! type or an empty case table.

use std::fmt;

use super::types::Span;

/// Severity levels for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Blocks loading the unit
    Error,
    /// Reported but not fatal
    Warning,
}

/// One construction problem attached to a source location
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub span: Span,
    pub message: String,
    pub severity: Severity,
    /// Earlier location this one conflicts with (first `default`, first
    /// duplicate label)
    pub related: Option<Span>,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{} at line {}, col {}: {}",
            severity, self.span.start_line, self.span.start_col, self.message
        )?;
        if let Some(related) = &self.related {
            write!(f, " (see line {})", related.start_line)?;
        }
        Ok(())
    }
}

/// Diagnostic sink
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, span: Span, message: String, severity: Severity, related: Option<Span>) {
        tracing::debug!(line = span.start_line, ?severity, "{}", message);
        self.items.push(Diagnostic {
            span,
            message,
            severity,
            related,
        });
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.push(span, message.into(), Severity::Error, None);
    }

    pub fn error_related(&mut self, span: Span, message: impl Into<String>, related: Span) {
        self.push(span, message.into(), Severity::Error, Some(related));
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.push(span, message.into(), Severity::Warning, None);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Whether any diagnostic message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.items.iter().any(|d| d.message.contains(needle))
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
