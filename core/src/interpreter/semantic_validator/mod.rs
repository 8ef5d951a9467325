//! Semantic validation of constructed units
//!
//! Rule-based analysis passes that run after a unit built cleanly. They catch
//! things construction accepts but that are almost certainly mistakes. Every
//! rule walks the statement tree through the visitor interface.
//!
//! # Adding a New Rule
//!
//! 1. Create a new file in `semantic_validator/rules/`
//! 2. Implement `ValidationRule` for your struct
//! 3. Add it to the `Validator::new()` constructor

pub mod rules;

use std::fmt;

use super::builder::Unit;
use super::types::Span;

/// A finding produced by a validation rule
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub span: Span,
    pub message: String,
    pub severity: Severity,
    /// Which rule produced this error
    pub rule_id: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Hint,
}

impl ValidationError {
    pub fn error(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Error,
            rule_id,
        }
    }

    pub fn warning(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Warning,
            rule_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Hint => "hint",
        };
        write!(
            f,
            "{} at line {}, col {}: {} [{}]",
            severity, self.span.start_line, self.span.start_col, self.message, self.rule_id
        )
    }
}

impl std::error::Error for ValidationError {}

/// One analysis pass
pub trait ValidationRule {
    /// Unique identifier for this rule (e.g., "unused-variable")
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Findings for `unit`; empty when the rule has nothing to report
    fn validate(&self, unit: &Unit) -> Vec<ValidationError>;
}

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    /// Validator with all built-in rules
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(rules::UnreachableCodeRule),
                Box::new(rules::UnusedVariableRule),
            ],
        }
    }

    pub fn validate(&self, unit: &Unit) -> Vec<ValidationError> {
        self.rules
            .iter()
            .flat_map(|rule| rule.validate(unit))
            .collect()
    }

    /// (id, description) of every registered rule
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run every built-in rule against `unit`
pub fn validate_unit(unit: &Unit) -> Vec<ValidationError> {
    Validator::new().validate(unit)
}

/// Whether validation found anything of error severity
pub fn has_errors(unit: &Unit) -> bool {
    validate_unit(unit).iter().any(|e| e.is_error())
}

#[cfg(test)]
mod tests;
