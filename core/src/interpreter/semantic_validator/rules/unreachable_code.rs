//! Rule: Unreachable Code
//!
//! Warns about a statement that follows `break`, `next`, `fallthrough` or
//! `return` in the same statement list. Only the first such statement of a
//! list is reported.

use crate::interpreter::builder::Unit;
use crate::interpreter::statements::{Stmt, StmtKind, StmtTag};
use crate::interpreter::traverse::{TraversalCallback, TraversalCode};

use super::super::{ValidationError, ValidationRule};

pub struct UnreachableCodeRule;

impl ValidationRule for UnreachableCodeRule {
    fn id(&self) -> &'static str {
        "unreachable-code"
    }

    fn description(&self) -> &'static str {
        "Statements after break/next/fallthrough/return never execute"
    }

    fn validate(&self, unit: &Unit) -> Vec<ValidationError> {
        let mut finder = Finder {
            rule_id: self.id(),
            errors: Vec::new(),
        };
        unit.body.traverse(&mut finder);
        finder.errors
    }
}

struct Finder {
    rule_id: &'static str,
    errors: Vec<ValidationError>,
}

impl TraversalCallback for Finder {
    fn pre_stmt(&mut self, s: &Stmt) -> TraversalCode {
        if let StmtKind::List(stmts) = &s.kind {
            let mut pairs = stmts.iter().zip(stmts.iter().skip(1));
            let terminator = pairs.find(|(prev, _)| {
                matches!(
                    prev.tag(),
                    StmtTag::Break | StmtTag::Next | StmtTag::Fallthrough | StmtTag::Return
                )
            });
            if let Some((prev, next)) = terminator {
                self.errors.push(ValidationError::warning(
                    next.span,
                    format!("Unreachable code after '{}'", prev.tag().name()),
                    self.rule_id,
                ));
            }
        }
        TraversalCode::Continue
    }
}
