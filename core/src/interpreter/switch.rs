//! `switch` statements and their case dispatch table
//!
//! Cases are labelled either by constant values or by types, never both in
//! one switch. Value labels are hashed with the same composite-key scheme
//! table indices use, so dispatch on a value is a single map lookup. Type
//! labels are kept in declaration order and tried one after another.
//!
//! Execution starts at the matching case and keeps running the following case
//! bodies until one of them breaks or returns. Every body must end in
//! `break`, `fallthrough` or `return`, which is what makes running into the
//! next case an explicit decision.

use std::collections::HashMap;
use std::rc::Rc;

use super::describe::Desc;
use super::diagnostics::Diagnostics;
use super::errors::{internal_error, RuntimeError};
use super::expressions::{Expr, ExprKind, Id};
use super::frame::Frame;
use super::hash::{CompositeHash, HashKey};
use super::statements::{Stmt, StmtTag};
use super::traverse::{TraversalCallback, TraversalCode};
use super::types::ty::{can_cast_type, same_type};
use super::types::values::{can_cast_value_to_type, cast_value_to_type};
use super::types::{Flow, Span, Type, Val};
use crate::handle_tc_stmt_pre;

/// `type T` / `type T as name` label
#[derive(Debug)]
pub struct TypeCase {
    pub ty: Type,
    pub binding: Option<Rc<Id>>,
    pub span: Span,
}

#[derive(Debug)]
pub enum CaseLabels {
    Values(Vec<Expr>),
    Types(Vec<TypeCase>),
    Default,
}

#[derive(Debug)]
pub struct Case {
    pub labels: CaseLabels,
    pub body: Stmt,
    pub span: Span,
}

impl Case {
    pub fn new(labels: CaseLabels, body: Stmt, span: Span, diags: &mut Diagnostics) -> Self {
        let last = body.last_tag();
        if !matches!(last, StmtTag::Break | StmtTag::Fallthrough | StmtTag::Return) {
            diags.error(span, "case block must end in break/fallthrough/return statement");
        }
        Self { labels, body, span }
    }

    pub fn is_default(&self) -> bool {
        matches!(self.labels, CaseLabels::Default)
    }

    fn describe(&self, d: &mut Desc) {
        match &self.labels {
            CaseLabels::Default => {
                if d.is_readable() {
                    d.add("default:");
                }
                d.add_count(0);
            }
            CaseLabels::Values(exprs) => {
                if d.is_readable() {
                    d.add("case");
                }
                d.add_count(exprs.len() as u64);
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 && d.is_readable() {
                        d.add(",");
                    }
                    d.sp();
                    d.add(&e.to_string());
                }
                if d.is_readable() {
                    d.add(":");
                }
            }
            CaseLabels::Types(types) => {
                if d.is_readable() {
                    d.add("case");
                }
                d.add_count(types.len() as u64);
                for (i, t) in types.iter().enumerate() {
                    if i > 0 && d.is_readable() {
                        d.add(",");
                    }
                    d.sp();
                    d.add("type");
                    d.sp();
                    d.add(&t.ty.to_string());
                    if let Some(id) = &t.binding {
                        d.sp();
                        d.add("as");
                        d.sp();
                        d.add(&id.name);
                    }
                }
                if d.is_readable() {
                    d.add(":");
                }
            }
        }
        self.body.describe_nested(d);
    }
}

/// Entry of the ordered type-case list
#[derive(Debug)]
struct TypeMapping {
    ty: Type,
    binding: Option<Rc<Id>>,
    case_idx: usize,
}

#[derive(Debug)]
pub struct SwitchStmt {
    expr: Expr,
    cases: Vec<Case>,
    comp_hash: CompositeHash,
    value_map: HashMap<HashKey, usize>,
    type_list: Vec<TypeMapping>,
    default_idx: Option<usize>,
}

impl SwitchStmt {
    pub fn new(expr: Expr, mut cases: Vec<Case>, diags: &mut Diagnostics) -> Self {
        let comp_hash = CompositeHash::singleton(expr.ty.clone());
        let mut value_map = HashMap::new();
        let mut value_spans: HashMap<HashKey, Span> = HashMap::new();
        let mut type_list: Vec<TypeMapping> = Vec::new();
        let mut default_idx: Option<usize> = None;
        let mut default_span: Option<Span> = None;
        let mut have_exprs = false;
        let mut have_types = false;

        for (i, case) in cases.iter_mut().enumerate() {
            match &mut case.labels {
                CaseLabels::Values(exprs) => {
                    have_exprs = true;

                    if !expr.is_error() && !expr.ty.is_atomic() {
                        diags.error(
                            expr.span,
                            "switch expression must be of an atomic type when cases are expressions",
                        );
                        continue;
                    }
                    if exprs.iter().any(|e| !same_type(&e.ty, &expr.ty)) {
                        diags.error_related(
                            case.span,
                            "case expression type differs from switch type",
                            expr.span,
                        );
                        continue;
                    }

                    for label in exprs.iter_mut() {
                        if label.is_error() {
                            continue;
                        }
                        if !label.is_const() {
                            if let Some(v) = label.fold_constant() {
                                *label = Expr::constant(v, label.span);
                            }
                        }
                        let v = match &label.kind {
                            ExprKind::Const(v) => v.clone(),
                            _ => {
                                diags.error(label.span, "case label expression isn't constant");
                                continue;
                            }
                        };
                        if expr.is_error() {
                            continue;
                        }

                        let Some(key) = comp_hash.compute_hash(&v, true) else {
                            internal_error(&format!(
                                "switch expression type mismatch ({}/{})",
                                v.ty(),
                                expr.ty
                            ));
                        };
                        if let Some(first) = value_spans.get(&key) {
                            diags.error_related(label.span, "duplicate case label", *first);
                            continue;
                        }
                        value_spans.insert(key.clone(), label.span);
                        value_map.insert(key, i);
                    }
                }

                CaseLabels::Types(types) => {
                    have_types = true;

                    for t in types.iter() {
                        if !can_cast_type(&expr.ty, &t.ty) {
                            diags.error(t.span, "cannot cast switch expression to case type");
                            continue;
                        }
                        if type_list.iter().any(|m| same_type(&m.ty, &t.ty)) {
                            diags.error(t.span, "duplicate case label");
                            continue;
                        }
                        type_list.push(TypeMapping {
                            ty: t.ty.clone(),
                            binding: t.binding.clone(),
                            case_idx: i,
                        });
                    }
                }

                CaseLabels::Default => match default_span {
                    Some(first) => {
                        diags.error_related(case.span, "multiple default labels", first);
                    }
                    None => {
                        default_idx = Some(i);
                        default_span = Some(case.span);
                    }
                },
            }
        }

        if have_exprs && have_types {
            diags.error(expr.span, "cannot mix cases with expressions and types");
        }

        Self {
            expr,
            cases,
            comp_hash,
            value_map,
            type_list,
            default_idx,
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn default_idx(&self) -> Option<usize> {
        self.default_idx
    }

    /// Index of the case `v` selects, and the identifier to bind it to.
    ///
    /// A matching type label takes precedence over a value label; since
    /// construction forbids mixing the two, at most one of them applies.
    pub fn find_case_label_match(&self, v: &Val) -> (Option<usize>, Option<Rc<Id>>) {
        let mut label_idx = None;
        let mut label_id = None;

        if !self.value_map.is_empty() {
            let Some(key) = self.comp_hash.compute_hash(v, true) else {
                internal_error(&format!(
                    "switch expression type mismatch ({}/{})",
                    v.ty(),
                    self.expr.ty
                ));
            };
            label_idx = self.value_map.get(&key).copied();
        }

        if let Some(m) = self
            .type_list
            .iter()
            .find(|m| can_cast_value_to_type(v, &m.ty))
        {
            label_idx = Some(m.case_idx);
            label_id = m.binding.clone();
        }

        match label_idx {
            Some(idx) => (Some(idx), label_id),
            None => (self.default_idx, None),
        }
    }

    pub(crate) fn exec(&self, f: &Frame, flow: &mut Flow) -> Result<Option<Val>, RuntimeError> {
        let v = self.expr.eval(f)?;
        let (Some(start), binding) = self.find_case_label_match(&v) else {
            return Ok(None);
        };

        let mut rval = None;
        for case in &self.cases[start..] {
            if let Some(id) = &binding {
                match cast_value_to_type(&v, &id.ty) {
                    Some(cv) => f.set(id.slot, cv),
                    None => internal_error(&format!("cannot bind {} as {}", v.ty(), id.ty)),
                }
            }

            *flow = Flow::Next;
            rval = case.body.exec(f, flow)?;
            if flow.stops_loop() {
                break;
            }
        }

        if *flow != Flow::Return {
            *flow = Flow::Next;
        }
        Ok(rval)
    }

    pub fn is_pure(&self) -> bool {
        self.expr.is_pure()
            && self.cases.iter().all(|c| {
                let labels_pure = match &c.labels {
                    CaseLabels::Values(exprs) => exprs.iter().all(Expr::is_pure),
                    _ => true,
                };
                labels_pure && c.body.is_pure()
            })
    }

    pub(crate) fn traverse(&self, cb: &mut dyn TraversalCallback) -> TraversalCode {
        let tc = self.expr.traverse(cb);
        handle_tc_stmt_pre!(tc);

        for case in &self.cases {
            if let CaseLabels::Values(exprs) = &case.labels {
                for e in exprs {
                    let tc = e.traverse(cb);
                    handle_tc_stmt_pre!(tc);
                }
            }
            let tc = case.body.traverse(cb);
            handle_tc_stmt_pre!(tc);
        }
        TraversalCode::Continue
    }

    pub(crate) fn describe(&self, stmt: &Stmt, d: &mut Desc) {
        stmt.add_tag(d);
        d.add(&self.expr.to_string());
        d.sp();
        if d.is_readable() {
            d.add("{");
        }
        d.push_indent();
        d.add_count(self.cases.len() as u64);
        for case in &self.cases {
            case.describe(d);
        }
        d.pop_indent();
        if d.is_readable() {
            d.add("}");
        }
        d.nl();
    }
}
