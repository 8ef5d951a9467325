//! Expressions
//!
//! The expression subset statements are built from. Constructors type-check
//! their operands and report problems to a [`Diagnostics`] sink; a node that
//! fails to check gets [`Type::Error`], which every later check accepts, so
//! one mistake yields one diagnostic.

use chrono::Duration;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::diagnostics::Diagnostics;
use super::errors::RuntimeError;
use super::frame::Frame;
use super::traverse::{TraversalCallback, TraversalCode};
use super::types::ast::{BinaryOp, UnaryOp};
use super::types::ty::{can_assign, promote_numeric, same_type};
use super::types::values::coerce_to;
use super::types::{Span, Type, Val};
use crate::{handle_tc_expr_post, handle_tc_expr_pre};

/// A resolved identifier: a frame slot, or a named constant
#[derive(Debug, Clone)]
pub struct Id {
    pub name: String,
    pub slot: usize,
    pub ty: Type,
    pub konst: Option<Val>,
}

impl Id {
    pub fn new(name: impl Into<String>, slot: usize, ty: Type) -> Self {
        Self {
            name: name.into(),
            slot,
            ty,
            konst: None,
        }
    }

    pub fn constant(name: impl Into<String>, slot: usize, value: Val) -> Self {
        Self {
            name: name.into(),
            slot,
            ty: value.ty(),
            konst: Some(value),
        }
    }

    pub fn is_const(&self) -> bool {
        self.konst.is_some()
    }
}

#[derive(Debug)]
pub enum ExprKind {
    Const(Val),
    Name(Rc<Id>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Vec<Expr>,
    },
    In {
        elem: Vec<Expr>,
        target: Box<Expr>,
    },
    Size(Box<Expr>),
    /// Placeholder for something that failed to construct
    Error,
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

impl Expr {
    /* ---------- construction ---------- */

    pub fn constant(value: Val, span: Span) -> Self {
        Self {
            ty: value.ty(),
            kind: ExprKind::Const(value),
            span,
        }
    }

    pub fn name(id: Rc<Id>, span: Span) -> Self {
        Self {
            ty: id.ty.clone(),
            kind: ExprKind::Name(id),
            span,
        }
    }

    pub fn error(span: Span) -> Self {
        Self {
            kind: ExprKind::Error,
            ty: Type::Error,
            span,
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr, span: Span, diags: &mut Diagnostics) -> Self {
        let ty = match (op, &operand.ty) {
            (_, Type::Error) => Type::Error,
            (UnaryOp::Not, Type::Bool) => Type::Bool,
            (UnaryOp::Not, _) => {
                diags.error(span, "requires boolean operand");
                Type::Error
            }
            (_, Type::Count) | (_, Type::Int) => Type::Int,
            (_, Type::Double) => Type::Double,
            (_, Type::Interval) => Type::Interval,
            _ => {
                diags.error(span, "requires arithmetic operand");
                Type::Error
            }
        };
        Self {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
            span,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, span: Span, diags: &mut Diagnostics) -> Self {
        let ty = binary_type(op, &lhs.ty, &rhs.ty, span, diags);
        Self {
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
            span,
        }
    }

    pub fn assign(target: Expr, value: Expr, span: Span, diags: &mut Diagnostics) -> Self {
        let ty = match &target.kind {
            ExprKind::Name(id) if id.is_const() => {
                diags.error(span, format!("cannot assign to constant '{}'", id.name));
                Type::Error
            }
            ExprKind::Name(_) | ExprKind::Index { .. } if matches!(target.ty, Type::Void) => {
                diags.error(span, "illegal assignment target");
                Type::Error
            }
            ExprKind::Name(_) | ExprKind::Index { .. } | ExprKind::Error => {
                if can_assign(&value.ty, &target.ty) {
                    target.ty.clone()
                } else {
                    diags.error(
                        span,
                        format!("type clash in assignment ({} := {})", target.ty, value.ty),
                    );
                    Type::Error
                }
            }
            _ => {
                diags.error(span, "illegal assignment target");
                Type::Error
            }
        };
        Self {
            kind: ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
            span,
        }
    }

    pub fn index(target: Expr, index: Vec<Expr>, span: Span, diags: &mut Diagnostics) -> Self {
        let ty = match &target.ty {
            Type::Error => Type::Error,
            Type::Table {
                index: index_types,
                yield_type,
            } => {
                if check_index_list(index_types, &index, span, diags) {
                    match yield_type {
                        Some(y) => (**y).clone(),
                        // Only meaningful as an add/delete target
                        None => Type::Void,
                    }
                } else {
                    Type::Error
                }
            }
            Type::Vector { elem } => {
                if index.len() != 1 {
                    diags.error(span, "vector index must be a single value");
                    Type::Error
                } else if !index[0].ty.is_integral() && !index[0].ty.is_error() {
                    diags.error(span, "vector index must be integral");
                    Type::Error
                } else {
                    (**elem).clone()
                }
            }
            other => {
                diags.error(span, format!("not an indexable type: {}", other));
                Type::Error
            }
        };
        Self {
            kind: ExprKind::Index {
                target: Box::new(target),
                index,
            },
            ty,
            span,
        }
    }

    pub fn in_expr(elem: Vec<Expr>, target: Expr, span: Span, diags: &mut Diagnostics) -> Self {
        let ok = match &target.ty {
            Type::Error => true,
            Type::Table { index, .. } => check_index_list(index, &elem, span, diags),
            Type::Vector { .. } => {
                let ok = elem.len() == 1 && (elem[0].ty.is_integral() || elem[0].ty.is_error());
                if !ok {
                    diags.error(span, "vector membership requires a single integral index");
                }
                ok
            }
            Type::String => {
                let ok = elem.len() == 1 && matches!(elem[0].ty, Type::String | Type::Error);
                if !ok {
                    diags.error(span, "string membership requires a string");
                }
                ok
            }
            other => {
                diags.error(span, format!("not a table, set or vector: {}", other));
                false
            }
        };
        Self {
            kind: ExprKind::In {
                elem,
                target: Box::new(target),
            },
            ty: if ok { Type::Bool } else { Type::Error },
            span,
        }
    }

    pub fn size(operand: Expr, span: Span, diags: &mut Diagnostics) -> Self {
        let ty = match &operand.ty {
            Type::Error => Type::Error,
            Type::Table { .. } | Type::Vector { .. } | Type::String | Type::Count | Type::Int => {
                Type::Count
            }
            Type::Double => Type::Double,
            Type::Interval => Type::Interval,
            other => {
                diags.error(span, format!("size of a value of type {} is undefined", other));
                Type::Error
            }
        };
        Self {
            kind: ExprKind::Size(Box::new(operand)),
            ty,
            span,
        }
    }

    /* ---------- static properties ---------- */

    pub fn is_error(&self) -> bool {
        self.ty.is_error()
    }

    pub fn is_const(&self) -> bool {
        matches!(self.kind, ExprKind::Const(_))
    }

    /// Value of a constant expression, folding the forms case labels use:
    /// literals, named constants, and unary `-`/`+` applied to those
    pub fn fold_constant(&self) -> Option<Val> {
        match &self.kind {
            ExprKind::Const(v) => Some(v.clone()),
            ExprKind::Name(id) => id.konst.clone(),
            ExprKind::Unary {
                op: op @ (UnaryOp::Negate | UnaryOp::Positive),
                operand,
            } => eval_unary(*op, operand.fold_constant()?).ok(),
            _ => None,
        }
    }

    /// Whether evaluation has no side effects
    pub fn is_pure(&self) -> bool {
        match &self.kind {
            ExprKind::Const(_) | ExprKind::Name(_) | ExprKind::Error => true,
            ExprKind::Assign { .. } => false,
            ExprKind::Unary { operand, .. } | ExprKind::Size(operand) => operand.is_pure(),
            ExprKind::Binary { lhs, rhs, .. } => lhs.is_pure() && rhs.is_pure(),
            ExprKind::Index { target, index } => {
                target.is_pure() && index.iter().all(Expr::is_pure)
            }
            ExprKind::In { elem, target } => target.is_pure() && elem.iter().all(Expr::is_pure),
        }
    }

    /// Whether this can be the target of an `add` statement
    pub fn can_add(&self) -> bool {
        match &self.kind {
            ExprKind::Index { target, .. } => target.ty.is_set(),
            ExprKind::Error => true,
            _ => false,
        }
    }

    /// Whether this can be the target of a `delete` statement
    pub fn can_del(&self) -> bool {
        match &self.kind {
            ExprKind::Index { target, .. } => {
                matches!(target.ty, Type::Table { .. } | Type::Vector { .. })
            }
            ExprKind::Error => true,
            _ => false,
        }
    }

    /* ---------- evaluation ---------- */

    pub fn eval(&self, f: &Frame) -> Result<Val, RuntimeError> {
        match &self.kind {
            ExprKind::Const(v) => Ok(v.clone()),
            ExprKind::Name(id) => match &id.konst {
                Some(v) => Ok(v.clone()),
                None => f.get(id.slot, &id.name),
            },
            ExprKind::Unary { op, operand } => eval_unary(*op, operand.eval(f)?),
            ExprKind::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                if lhs.eval(f)?.is_zero() {
                    Ok(Val::Bool(false))
                } else {
                    Ok(Val::Bool(!rhs.eval(f)?.is_zero()))
                }
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => {
                if !lhs.eval(f)?.is_zero() {
                    Ok(Val::Bool(true))
                } else {
                    Ok(Val::Bool(!rhs.eval(f)?.is_zero()))
                }
            }
            ExprKind::Binary { op, lhs, rhs } => eval_binary(*op, lhs.eval(f)?, rhs.eval(f)?),
            ExprKind::Assign { target, value } => {
                let v = coerce_to(value.eval(f)?, &target.ty);
                target.store(f, v.clone())?;
                Ok(v)
            }
            ExprKind::Index { target, index } => {
                let container = target.eval(f)?;
                let index = eval_list(index, f)?;
                match &container {
                    Val::Table(t) => {
                        let t = t.borrow();
                        if t.is_set() {
                            return Err(RuntimeError::TypeMismatch(
                                "cannot look up an element of a set".to_string(),
                            ));
                        }
                        t.lookup(&index)?.ok_or(RuntimeError::NoSuchIndex)
                    }
                    Val::Vector(v) => {
                        let i = vector_index(&index[0])?;
                        v.borrow().lookup(i).cloned().ok_or(RuntimeError::NoSuchIndex)
                    }
                    other => Err(RuntimeError::TypeMismatch(format!(
                        "cannot index a value of type {}",
                        other.ty()
                    ))),
                }
            }
            ExprKind::In { elem, target } => {
                let container = target.eval(f)?;
                let elem = eval_list(elem, f)?;
                let found = match (&container, elem.as_slice()) {
                    (Val::Table(t), _) => t.borrow().contains(&elem)?,
                    (Val::Vector(v), [i]) => match vector_index(i) {
                        Ok(i) => v.borrow().lookup(i).is_some(),
                        Err(_) => false,
                    },
                    (Val::Str(s), [Val::Str(needle)]) => {
                        needle.is_empty() || s.windows(needle.len()).any(|w| w == needle.as_slice())
                    }
                    (other, _) => {
                        return Err(RuntimeError::TypeMismatch(format!(
                            "membership test on a value of type {}",
                            other.ty()
                        )))
                    }
                };
                Ok(Val::Bool(found))
            }
            ExprKind::Size(operand) => Ok(match operand.eval(f)? {
                Val::Table(t) => Val::Count(t.borrow().len() as u64),
                Val::Vector(v) => Val::Count(v.borrow().size() as u64),
                Val::Str(s) => Val::Count(s.len() as u64),
                Val::Count(c) => Val::Count(c),
                Val::Int(i) => Val::Count(i.unsigned_abs()),
                Val::Double(d) => Val::Double(d.abs()),
                Val::Interval(d) => Val::Interval(d.abs()),
                other => {
                    return Err(RuntimeError::TypeMismatch(format!(
                        "size of a value of type {}",
                        other.ty()
                    )))
                }
            }),
            ExprKind::Error => Err(RuntimeError::TypeMismatch(
                "evaluated an expression that failed to construct".to_string(),
            )),
        }
    }

    /// Store `v` into the location this expression names
    fn store(&self, f: &Frame, v: Val) -> Result<(), RuntimeError> {
        match &self.kind {
            ExprKind::Name(id) => {
                f.set(id.slot, v);
                Ok(())
            }
            ExprKind::Index { target, index } => {
                let container = target.eval(f)?;
                let index = eval_list(index, f)?;
                match &container {
                    Val::Table(t) => t.borrow_mut().assign(&index, Some(v)),
                    Val::Vector(vec) => {
                        let i = vector_index(&index[0])?;
                        vec.borrow_mut().assign(i, v);
                        Ok(())
                    }
                    other => Err(RuntimeError::TypeMismatch(format!(
                        "cannot assign into a value of type {}",
                        other.ty()
                    ))),
                }
            }
            _ => Err(RuntimeError::TypeMismatch(
                "illegal assignment target".to_string(),
            )),
        }
    }

    /// `add` semantics: insert the indexed element into its set
    pub fn add(&self, f: &Frame) -> Result<(), RuntimeError> {
        match &self.kind {
            ExprKind::Index { target, index } => {
                let container = target.eval(f)?;
                let index = eval_list(index, f)?;
                match container.as_table() {
                    Some(t) => t.borrow_mut().assign(&index, None),
                    None => Err(RuntimeError::TypeMismatch("add on a non-set".to_string())),
                }
            }
            _ => Err(RuntimeError::TypeMismatch(
                "illegal add statement".to_string(),
            )),
        }
    }

    /// `delete` semantics: remove the indexed element. Deleting an absent
    /// element is not an error.
    pub fn delete(&self, f: &Frame) -> Result<(), RuntimeError> {
        match &self.kind {
            ExprKind::Index { target, index } => {
                let container = target.eval(f)?;
                let index = eval_list(index, f)?;
                match &container {
                    Val::Table(t) => {
                        t.borrow_mut().remove(&index)?;
                        Ok(())
                    }
                    Val::Vector(v) => {
                        let i = vector_index(&index[0])?;
                        v.borrow_mut().remove(i);
                        Ok(())
                    }
                    other => Err(RuntimeError::TypeMismatch(format!(
                        "delete from a value of type {}",
                        other.ty()
                    ))),
                }
            }
            _ => Err(RuntimeError::TypeMismatch(
                "illegal delete statement".to_string(),
            )),
        }
    }

    /* ---------- traversal ---------- */

    pub fn traverse(&self, cb: &mut dyn TraversalCallback) -> TraversalCode {
        let tc = cb.pre_expr(self);
        handle_tc_expr_pre!(tc);

        let children: Vec<&Expr> = match &self.kind {
            ExprKind::Const(_) | ExprKind::Name(_) | ExprKind::Error => Vec::new(),
            ExprKind::Unary { operand, .. } | ExprKind::Size(operand) => vec![&**operand],
            ExprKind::Binary { lhs, rhs, .. } => vec![&**lhs, &**rhs],
            ExprKind::Assign { target, value } => vec![&**target, &**value],
            ExprKind::Index { target, index } => {
                std::iter::once(&**target).chain(index.iter()).collect()
            }
            ExprKind::In { elem, target } => {
                elem.iter().chain(std::iter::once(&**target)).collect()
            }
        };
        for child in children {
            let tc = child.traverse(cb);
            handle_tc_expr_pre!(tc);
        }

        let tc = cb.post_expr(self);
        handle_tc_expr_post!(tc)
    }
}

fn eval_list(exprs: &[Expr], f: &Frame) -> Result<Vec<Val>, RuntimeError> {
    exprs.iter().map(|e| e.eval(f)).collect()
}

fn vector_index(v: &Val) -> Result<usize, RuntimeError> {
    match v {
        Val::Count(c) => usize::try_from(*c).map_err(|_| RuntimeError::NoSuchIndex),
        Val::Int(i) => usize::try_from(*i).map_err(|_| RuntimeError::NoSuchIndex),
        other => Err(RuntimeError::TypeMismatch(format!(
            "vector index of type {}",
            other.ty()
        ))),
    }
}

fn check_index_list(types: &[Type], index: &[Expr], span: Span, diags: &mut Diagnostics) -> bool {
    if types.len() != index.len() {
        diags.error(
            span,
            format!("wrong number of indices (expected {}, got {})", types.len(), index.len()),
        );
        return false;
    }
    for (ty, e) in types.iter().zip(index) {
        if !can_assign(&e.ty, ty) {
            diags.error(e.span, format!("index type mismatch ({} vs. {})", e.ty, ty));
            return false;
        }
    }
    true
}

fn binary_type(op: BinaryOp, a: &Type, b: &Type, span: Span, diags: &mut Diagnostics) -> Type {
    if a.is_error() || b.is_error() {
        return Type::Error;
    }

    if op.is_logical() {
        if a.is_bool() && b.is_bool() {
            return Type::Bool;
        }
        diags.error(span, "requires boolean operands");
        return Type::Error;
    }

    if op.is_comparison() {
        let comparable = promote_numeric(a, b).is_some()
            || (matches!(a, Type::String | Type::Time | Type::Interval) && same_type(a, b))
            || (a.is_bool() && b.is_bool() && matches!(op, BinaryOp::Eq | BinaryOp::Ne));
        if comparable {
            return Type::Bool;
        }
        diags.error(span, format!("illegal comparison ({} {} {})", a, op.symbol(), b));
        return Type::Error;
    }

    let ty = match (op, a, b) {
        (_, x, y) if x.is_numeric() && y.is_numeric() => promote_numeric(x, y),
        (BinaryOp::Add | BinaryOp::Sub, Type::Time, Type::Interval) => Some(Type::Time),
        (BinaryOp::Add, Type::Interval, Type::Time) => Some(Type::Time),
        (BinaryOp::Sub, Type::Time, Type::Time) => Some(Type::Interval),
        (BinaryOp::Add | BinaryOp::Sub, Type::Interval, Type::Interval) => Some(Type::Interval),
        (BinaryOp::Div, Type::Interval, Type::Interval) => Some(Type::Double),
        (BinaryOp::Mul | BinaryOp::Div, Type::Interval, n) if n.is_numeric() => {
            Some(Type::Interval)
        }
        (BinaryOp::Mul, n, Type::Interval) if n.is_numeric() => Some(Type::Interval),
        _ => None,
    };
    match ty {
        Some(Type::Double) if op == BinaryOp::Mod => {
            diags.error(span, "modulo requires integral operands");
            Type::Error
        }
        Some(t) => t,
        None => {
            diags.error(span, format!("requires arithmetic operands ({} {} {})", a, op.symbol(), b));
            Type::Error
        }
    }
}

fn eval_unary(op: UnaryOp, v: Val) -> Result<Val, RuntimeError> {
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Val::Bool(v.is_zero())),
        (UnaryOp::Negate, Val::Int(i)) => Ok(Val::Int(i.wrapping_neg())),
        (UnaryOp::Negate, Val::Count(c)) => Ok(Val::Int((c as i64).wrapping_neg())),
        (UnaryOp::Negate, Val::Double(d)) => Ok(Val::Double(-d)),
        (UnaryOp::Negate, Val::Interval(d)) => Ok(Val::Interval(-d)),
        (UnaryOp::Positive, Val::Count(c)) => Ok(Val::Int(c as i64)),
        (UnaryOp::Positive, v @ (Val::Int(_) | Val::Double(_) | Val::Interval(_))) => Ok(v),
        (op, v) => Err(RuntimeError::TypeMismatch(format!(
            "unary {:?} on {}",
            op,
            v.ty()
        ))),
    }
}

fn as_f64(v: &Val) -> Option<f64> {
    match v {
        Val::Int(i) => Some(*i as f64),
        Val::Count(c) => Some(*c as f64),
        Val::Double(d) => Some(*d),
        _ => None,
    }
}

fn as_i64(v: &Val) -> Option<i64> {
    match v {
        Val::Int(i) => Some(*i),
        Val::Count(c) => Some(*c as i64),
        _ => None,
    }
}

fn interval_from_secs(secs: f64) -> Duration {
    Duration::nanoseconds((secs * 1e9) as i64)
}

fn interval_secs(d: &Duration) -> f64 {
    d.num_nanoseconds()
        .map(|n| n as f64 / 1e9)
        .unwrap_or_else(|| d.num_seconds() as f64)
}

fn compare(op: BinaryOp, ord: Option<Ordering>) -> Result<Val, RuntimeError> {
    let ord = ord.ok_or_else(|| RuntimeError::TypeMismatch("unordered comparison".to_string()))?;
    let b = match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::Ne => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Ge => ord != Ordering::Less,
        _ => return Err(RuntimeError::TypeMismatch(format!("{} is not a comparison", op.symbol()))),
    };
    Ok(Val::Bool(b))
}

fn eval_binary(op: BinaryOp, a: Val, b: Val) -> Result<Val, RuntimeError> {
    use BinaryOp::*;

    if op.is_comparison() {
        let ord = match (&a, &b) {
            (Val::Count(x), Val::Count(y)) => x.partial_cmp(y),
            (Val::Double(_), _) | (_, Val::Double(_)) => match (as_f64(&a), as_f64(&b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
            (Val::Str(x), Val::Str(y)) => x.partial_cmp(y),
            (Val::Time(x), Val::Time(y)) => x.partial_cmp(y),
            (Val::Interval(x), Val::Interval(y)) => x.partial_cmp(y),
            (Val::Bool(x), Val::Bool(y)) => x.partial_cmp(y),
            _ => match (as_i64(&a), as_i64(&b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        };
        return compare(op, ord);
    }

    match (&a, &b) {
        (Val::Count(x), Val::Count(y)) => {
            let (x, y) = (*x, *y);
            Ok(Val::Count(match op {
                Add => x.wrapping_add(y),
                Sub => x.wrapping_sub(y),
                Mul => x.wrapping_mul(y),
                Div => x.checked_div(y).ok_or(RuntimeError::DivisionByZero)?,
                Mod => x.checked_rem(y).ok_or(RuntimeError::DivisionByZero)?,
                _ => return Err(bad_operands(op, &a, &b)),
            }))
        }
        (Val::Double(_), _) | (_, Val::Double(_)) if as_f64(&a).is_some() && as_f64(&b).is_some() => {
            let (x, y) = (as_f64(&a).unwrap_or_default(), as_f64(&b).unwrap_or_default());
            Ok(Val::Double(match op {
                Add => x + y,
                Sub => x - y,
                Mul => x * y,
                Div if y == 0.0 => return Err(RuntimeError::DivisionByZero),
                Div => x / y,
                _ => return Err(bad_operands(op, &a, &b)),
            }))
        }
        (Val::Int(_) | Val::Count(_), Val::Int(_) | Val::Count(_)) => {
            let (x, y) = (as_i64(&a).unwrap_or_default(), as_i64(&b).unwrap_or_default());
            Ok(Val::Int(match op {
                Add => x.wrapping_add(y),
                Sub => x.wrapping_sub(y),
                Mul => x.wrapping_mul(y),
                Div if y == 0 => return Err(RuntimeError::DivisionByZero),
                Div => x.wrapping_div(y),
                Mod if y == 0 => return Err(RuntimeError::DivisionByZero),
                Mod => x.wrapping_rem(y),
                _ => return Err(bad_operands(op, &a, &b)),
            }))
        }
        (Val::Time(t), Val::Interval(d)) if op == Add => Ok(Val::Time(*t + *d)),
        (Val::Time(t), Val::Interval(d)) if op == Sub => Ok(Val::Time(*t - *d)),
        (Val::Interval(d), Val::Time(t)) if op == Add => Ok(Val::Time(*t + *d)),
        (Val::Time(x), Val::Time(y)) if op == Sub => Ok(Val::Interval(*x - *y)),
        (Val::Interval(x), Val::Interval(y)) => match op {
            Add => Ok(Val::Interval(*x + *y)),
            Sub => Ok(Val::Interval(*x - *y)),
            Div if y.is_zero() => Err(RuntimeError::DivisionByZero),
            Div => Ok(Val::Double(interval_secs(x) / interval_secs(y))),
            _ => Err(bad_operands(op, &a, &b)),
        },
        (Val::Interval(d), n) | (n, Val::Interval(d)) if as_f64(n).is_some() => {
            let k = as_f64(n).unwrap_or_default();
            match op {
                Mul => Ok(Val::Interval(interval_from_secs(interval_secs(d) * k))),
                Div if matches!(a, Val::Interval(_)) => {
                    if k == 0.0 {
                        Err(RuntimeError::DivisionByZero)
                    } else {
                        Ok(Val::Interval(interval_from_secs(interval_secs(d) / k)))
                    }
                }
                _ => Err(bad_operands(op, &a, &b)),
            }
        }
        _ => Err(bad_operands(op, &a, &b)),
    }
}

fn bad_operands(op: BinaryOp, a: &Val, b: &Val) -> RuntimeError {
    RuntimeError::TypeMismatch(format!("{} {} {}", a.ty(), op.symbol(), b.ty()))
}

/* ---------- rendering ---------- */

fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    match e.kind {
        ExprKind::Binary { .. } | ExprKind::Assign { .. } => write!(f, "({})", e),
        _ => write!(f, "{}", e),
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, list: &[Expr]) -> fmt::Result {
    for (i, e) in list.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", e)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Const(Val::Str(s)) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            ExprKind::Const(v) => write!(f, "{}", v),
            ExprKind::Name(id) => f.write_str(&id.name),
            ExprKind::Unary { op, operand } => {
                f.write_str(match op {
                    UnaryOp::Negate => "-",
                    UnaryOp::Positive => "+",
                    UnaryOp::Not => "!",
                })?;
                write_operand(f, operand)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                write_operand(f, lhs)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs)
            }
            ExprKind::Assign { target, value } => write!(f, "{} = {}", target, value),
            ExprKind::Index { target, index } => {
                write_operand(f, target)?;
                f.write_str("[")?;
                write_list(f, index)?;
                f.write_str("]")
            }
            ExprKind::In { elem, target } => {
                if elem.len() == 1 {
                    write_operand(f, &elem[0])?;
                } else {
                    f.write_str("[")?;
                    write_list(f, elem)?;
                    f.write_str("]")?;
                }
                f.write_str(" in ")?;
                write_operand(f, target)
            }
            ExprKind::Size(operand) => write!(f, "|{}|", operand),
            ExprKind::Error => f.write_str("<error>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::host::{EngineSettings, Host};

    fn frame(size: usize) -> Frame {
        Frame::new(size, Rc::new(Host::new(EngineSettings::default())))
    }

    fn count(c: u64) -> Expr {
        Expr::constant(Val::Count(c), Span::default())
    }

    #[test]
    fn test_fold_negated_constant() {
        let mut diags = Diagnostics::new();
        let e = Expr::unary(UnaryOp::Negate, count(5), Span::default(), &mut diags);
        assert_eq!(e.fold_constant(), Some(Val::Int(-5)));
        assert!(!e.is_const());

        let id = Rc::new(Id::constant("PORT", 0, Val::Count(80)));
        let e = Expr::name(id, Span::default());
        assert_eq!(e.fold_constant(), Some(Val::Count(80)));
    }

    #[test]
    fn test_count_arithmetic() {
        let f = frame(0);
        let mut diags = Diagnostics::new();
        let e = Expr::binary(BinaryOp::Add, count(2), count(3), Span::default(), &mut diags);
        assert_eq!(e.ty, Type::Count);
        assert_eq!(e.eval(&f), Ok(Val::Count(5)));

        let e = Expr::binary(BinaryOp::Div, count(2), count(0), Span::default(), &mut diags);
        assert_eq!(e.eval(&f), Err(RuntimeError::DivisionByZero));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_logical_operands_must_be_bool() {
        let mut diags = Diagnostics::new();
        let e = Expr::binary(BinaryOp::And, count(1), count(0), Span::default(), &mut diags);
        assert!(e.is_error());
        assert!(diags.contains("requires boolean operands"));
    }

    #[test]
    fn test_assign_then_read() {
        let f = frame(1);
        let mut diags = Diagnostics::new();
        let x = Rc::new(Id::new("x", 0, Type::Double));
        let e = Expr::assign(
            Expr::name(x.clone(), Span::default()),
            count(4),
            Span::default(),
            &mut diags,
        );
        assert!(!e.is_pure());
        assert_eq!(e.eval(&f), Ok(Val::Double(4.0)));
        assert_eq!(Expr::name(x, Span::default()).eval(&f), Ok(Val::Double(4.0)));
    }

    #[test]
    fn test_add_and_delete_on_set() {
        let f = frame(1);
        let mut diags = Diagnostics::new();
        let ty = Type::set(vec![Type::String]);
        f.set(0, Val::empty_aggregate(&ty).unwrap());
        let s = Rc::new(Id::new("s", 0, ty));
        let elem = || Expr::constant(Val::from("a"), Span::default());

        let target = Expr::index(Expr::name(s.clone(), Span::default()), vec![elem()], Span::default(), &mut diags);
        assert!(target.can_add());
        assert!(target.can_del());
        target.add(&f).unwrap();

        let member = Expr::in_expr(vec![elem()], Expr::name(s.clone(), Span::default()), Span::default(), &mut diags);
        assert_eq!(member.eval(&f), Ok(Val::Bool(true)));

        target.delete(&f).unwrap();
        assert_eq!(member.eval(&f), Ok(Val::Bool(false)));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_display() {
        let mut diags = Diagnostics::new();
        let x = Rc::new(Id::new("x", 0, Type::Count));
        let sum = Expr::binary(
            BinaryOp::Add,
            Expr::name(x, Span::default()),
            count(1),
            Span::default(),
            &mut diags,
        );
        let cmp = Expr::binary(BinaryOp::Gt, sum, count(3), Span::default(), &mut diags);
        assert_eq!(cmp.to_string(), "(x + 1) > 3");
    }
}
