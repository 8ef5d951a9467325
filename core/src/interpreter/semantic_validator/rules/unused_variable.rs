//! Rule: Unused Variable
//!
//! Warns about loop variables, `for` value variables and `type ... as`
//! bindings that nothing reads. Names starting with `_` are exempt.

use std::collections::{BTreeMap, HashSet};

use crate::interpreter::builder::Unit;
use crate::interpreter::expressions::{Expr, ExprKind};
use crate::interpreter::statements::{Stmt, StmtKind};
use crate::interpreter::switch::CaseLabels;
use crate::interpreter::traverse::{TraversalCallback, TraversalCode};
use crate::interpreter::types::Span;

use super::super::{ValidationError, ValidationRule};

pub struct UnusedVariableRule;

impl ValidationRule for UnusedVariableRule {
    fn id(&self) -> &'static str {
        "unused-variable"
    }

    fn description(&self) -> &'static str {
        "Loop variables and case bindings should be used"
    }

    fn validate(&self, unit: &Unit) -> Vec<ValidationError> {
        let mut collector = Collector::default();
        unit.body.traverse(&mut collector);

        collector
            .declared
            .into_iter()
            .filter(|(slot, (name, _))| !name.starts_with('_') && !collector.used.contains(slot))
            .map(|(_, (name, span))| {
                ValidationError::warning(
                    span,
                    format!("Variable '{}' is declared but never used", name),
                    self.id(),
                )
            })
            .collect()
    }
}

#[derive(Default)]
struct Collector {
    /// slot -> (name, where it was introduced)
    declared: BTreeMap<usize, (String, Span)>,
    used: HashSet<usize>,
}

impl TraversalCallback for Collector {
    fn pre_stmt(&mut self, s: &Stmt) -> TraversalCode {
        match &s.kind {
            StmtKind::For(fs) => {
                for id in fs.loop_vars.iter().chain(fs.value_var.iter()) {
                    self.declared
                        .entry(id.slot)
                        .or_insert_with(|| (id.name.clone(), s.span));
                }
            }
            StmtKind::Switch(sw) => {
                for case in sw.cases() {
                    if let CaseLabels::Types(types) = &case.labels {
                        for t in types {
                            if let Some(id) = &t.binding {
                                self.declared
                                    .entry(id.slot)
                                    .or_insert_with(|| (id.name.clone(), t.span));
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        TraversalCode::Continue
    }

    fn pre_expr(&mut self, e: &Expr) -> TraversalCode {
        if let ExprKind::Name(id) = &e.kind {
            self.used.insert(id.slot);
        }
        TraversalCode::Continue
    }
}
