//! Statement construction
//!
//! Lowers an input [`ast::Unit`] into executable statements: resolves names
//! to frame slots, declares implicit locals (loop variables, case bindings),
//! and runs every construction-time check. Problems accumulate in the unit's
//! [`Diagnostics`]; building never stops early.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::rc::Rc;

use super::debug;
use super::diagnostics::Diagnostics;
use super::errors::{LoadError, RuntimeError};
use super::expressions::{Expr, Id};
use super::frame::Frame;
use super::host::{Host, SessionId};
use super::statements::{ForStmt, Stmt, StmtKind};
use super::switch::{Case, CaseLabels, SwitchStmt, TypeCase};
use super::types::ast::{self, Lit, LoopVar, UnitKind};
use super::types::ty::{can_assign, same_type};
use super::types::values::coerce_to;
use super::types::{Flow, Span, Type, Val};

/// A constructed script unit
#[derive(Debug)]
pub struct Unit {
    pub name: String,
    pub kind: UnitKind,
    pub body: Stmt,
    /// Declared, inferred or resolved yield type (functions only)
    pub yield_type: Option<Type>,
    pub diagnostics: Diagnostics,
    frame_size: usize,
    names: HashMap<String, Rc<Id>>,
}

impl Unit {
    /// Identifier a name resolved to at the end of the unit
    pub fn lookup(&self, name: &str) -> Option<&Rc<Id>> {
        self.names.get(name)
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn new_frame(&self, host: Rc<Host>) -> Frame {
        Frame::new(self.frame_size, host)
    }

    pub fn new_session_frame(&self, host: Rc<Host>, session: SessionId) -> Frame {
        Frame::with_session(self.frame_size, host, session)
    }

    /// Execute the body once against `f`
    pub fn run(&self, f: &Frame) -> Result<(Option<Val>, Flow), RuntimeError> {
        let mut flow = Flow::Next;
        let result = self.body.exec(f, &mut flow)?;
        tracing::debug!(unit = %self.name, flow = flow.name(), "unit executed");
        Ok((result, flow))
    }
}

#[derive(Default)]
struct Scope {
    names: HashMap<String, Rc<Id>>,
    next_slot: usize,
}

impl Scope {
    fn lookup(&self, name: &str) -> Option<Rc<Id>> {
        self.names.get(name).cloned()
    }

    fn declare(&mut self, name: &str, ty: Type) -> Rc<Id> {
        let id = Rc::new(Id::new(name, self.next_slot, ty));
        self.next_slot += 1;
        self.names.insert(name.to_string(), Rc::clone(&id));
        id
    }

    fn declare_const(&mut self, name: &str, value: Val) -> Rc<Id> {
        let id = Rc::new(Id::constant(name, self.next_slot, value));
        self.next_slot += 1;
        self.names.insert(name.to_string(), Rc::clone(&id));
        id
    }
}

/// How `return` statements are checked in the unit being built
enum YieldState {
    Illegal,
    Inferring,
    Fixed { ty: Option<Type>, is_hook: bool },
}

pub struct Builder {
    diags: Diagnostics,
    scope: Scope,
    yield_state: YieldState,
    file: Option<String>,
}

impl Builder {
    pub fn new(kind: &UnitKind, file: Option<String>) -> Self {
        let yield_state = match kind {
            UnitKind::Toplevel => YieldState::Illegal,
            UnitKind::Function { yield_type: None } => YieldState::Inferring,
            UnitKind::Function { yield_type: Some(ty) } => YieldState::Fixed {
                ty: Some(ty.clone()),
                is_hook: false,
            },
            UnitKind::Event => YieldState::Fixed {
                ty: None,
                is_hook: false,
            },
            UnitKind::Hook => YieldState::Fixed {
                ty: Some(Type::Bool),
                is_hook: true,
            },
        };
        if let Some(file) = &file {
            debug::add_file(file);
        }
        Self {
            diags: Diagnostics::new(),
            scope: Scope::default(),
            yield_state,
            file,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    /// Declare the unit's locals and constants. Returns the aggregate locals,
    /// which need a fresh empty value before the body runs.
    pub fn declare_locals(&mut self, locals: &[ast::LocalDecl]) -> Vec<Rc<Id>> {
        let mut aggregates = Vec::new();
        for decl in locals {
            if self.scope.names.contains_key(&decl.name) {
                self.diags
                    .error(decl.span, format!("'{}' redeclared", decl.name));
                continue;
            }
            match &decl.konst {
                Some(lit) => match lit_value(lit) {
                    Some(v) if can_assign(&v.ty(), &decl.ty) => {
                        let v = coerce_to(v, &decl.ty);
                        self.scope.declare_const(&decl.name, v);
                    }
                    Some(v) => {
                        self.diags.error(
                            decl.span,
                            format!("type clash in constant '{}' ({} vs. {})", decl.name, v.ty(), decl.ty),
                        );
                        self.scope.declare(&decl.name, Type::Error);
                    }
                    None => {
                        self.diags.error(decl.span, "invalid literal");
                        self.scope.declare(&decl.name, Type::Error);
                    }
                },
                None => {
                    let id = self.scope.declare(&decl.name, decl.ty.clone());
                    if matches!(decl.ty, Type::Table { .. } | Type::Vector { .. }) {
                        aggregates.push(id);
                    }
                }
            }
        }
        aggregates
    }

    fn finish(&mut self, s: Stmt) -> Stmt {
        if let Some(file) = &self.file {
            debug::register(file, s.span, s.id());
        }
        s
    }

    /* ---------- expressions ---------- */

    pub fn expr(&mut self, e: &ast::Expr) -> Expr {
        match e {
            ast::Expr::Const { value, span } => match lit_value(value) {
                Some(v) => Expr::constant(v, *span),
                None => {
                    self.diags.error(*span, "invalid literal");
                    Expr::error(*span)
                }
            },
            ast::Expr::Name { name, span } => match self.scope.lookup(name) {
                Some(id) => Expr::name(id, *span),
                None => {
                    self.diags
                        .error(*span, format!("unknown identifier '{}'", name));
                    Expr::error(*span)
                }
            },
            ast::Expr::Unary { op, operand, span } => {
                let operand = self.expr(operand);
                Expr::unary(*op, operand, *span, &mut self.diags)
            }
            ast::Expr::Binary { op, lhs, rhs, span } => {
                let lhs = self.expr(lhs);
                let rhs = self.expr(rhs);
                Expr::binary(*op, lhs, rhs, *span, &mut self.diags)
            }
            ast::Expr::Assign {
                target,
                value,
                span,
            } => {
                let target = self.expr(target);
                let value = self.expr(value);
                Expr::assign(target, value, *span, &mut self.diags)
            }
            ast::Expr::Index {
                target,
                index,
                span,
            } => {
                let target = self.expr(target);
                let index = self.exprs(index);
                Expr::index(target, index, *span, &mut self.diags)
            }
            ast::Expr::In { elem, target, span } => {
                let elem = self.exprs(elem);
                let target = self.expr(target);
                Expr::in_expr(elem, target, *span, &mut self.diags)
            }
            ast::Expr::Size { operand, span } => {
                let operand = self.expr(operand);
                Expr::size(operand, *span, &mut self.diags)
            }
        }
    }

    fn exprs(&mut self, list: &[ast::Expr]) -> Vec<Expr> {
        list.iter().map(|e| self.expr(e)).collect()
    }

    /* ---------- statements ---------- */

    pub fn stmt(&mut self, s: &ast::Stmt) -> Stmt {
        let built = match s {
            ast::Stmt::List { body, span } => {
                let stmts = body.iter().map(|s| self.stmt(s)).collect();
                Stmt::new(StmtKind::List(stmts), *span)
            }
            ast::Stmt::BodyList { body, span } => {
                let stmts = body.iter().map(|s| self.stmt(s)).collect();
                Stmt::new(StmtKind::EventBodyList(stmts), *span)
            }
            ast::Stmt::Expr { expr, span } => {
                let e = self.expr(expr);
                Stmt::expr_stmt(e, *span, &mut self.diags)
            }
            ast::Stmt::Print { args, span } => {
                let args = self.exprs(args);
                Stmt::print(args, *span, &mut self.diags)
            }
            ast::Stmt::Event { name, args, span } => {
                let args = self.exprs(args);
                Stmt::event(name.clone(), args, *span, &mut self.diags)
            }
            ast::Stmt::If {
                test,
                then_s,
                else_s,
                span,
            } => {
                let cond = self.expr(test);
                let then_s = self.stmt(then_s);
                let else_s = else_s.as_ref().map(|s| self.stmt(s));
                Stmt::if_stmt(cond, then_s, else_s, *span, &mut self.diags)
            }
            ast::Stmt::While { test, body, span } => {
                let cond = self.expr(test);
                let body = self.stmt(body);
                Stmt::while_stmt(cond, body, *span, &mut self.diags)
            }
            ast::Stmt::For {
                vars,
                value_var,
                iterable,
                body,
                span,
            } => self.build_for(vars, value_var.as_ref(), iterable, body, *span),
            ast::Stmt::Switch { expr, cases, span } => {
                let expr = self.expr(expr);
                let cases = cases.iter().map(|c| self.build_case(c)).collect();
                let sw = SwitchStmt::new(expr, cases, &mut self.diags);
                Stmt::new(StmtKind::Switch(sw), *span)
            }
            ast::Stmt::Add { target, span } => {
                let e = self.expr(target);
                Stmt::add(e, *span, &mut self.diags)
            }
            ast::Stmt::Delete { target, span } => {
                let e = self.expr(target);
                Stmt::delete(e, *span, &mut self.diags)
            }
            ast::Stmt::Next { span } => Stmt::new(StmtKind::Next, *span),
            ast::Stmt::Break { span } => Stmt::new(StmtKind::Break, *span),
            ast::Stmt::Fallthrough { span } => Stmt::new(StmtKind::Fallthrough, *span),
            ast::Stmt::Return { value, span } => self.build_return(value.as_ref(), *span),
            ast::Stmt::Init { names, span } => {
                let mut ids = Vec::new();
                for name in names {
                    match self.scope.lookup(name) {
                        Some(id) if matches!(id.ty, Type::Table { .. } | Type::Vector { .. }) => {
                            ids.push(id)
                        }
                        Some(id) => self.diags.error(
                            *span,
                            format!("'{}' of type {} cannot be initialized as an aggregate", name, id.ty),
                        ),
                        None => self
                            .diags
                            .error(*span, format!("unknown identifier '{}'", name)),
                    }
                }
                Stmt::new(StmtKind::Init(ids), *span)
            }
            ast::Stmt::Null { span } => Stmt::new(StmtKind::Null, *span),
            ast::Stmt::When {
                cond,
                body,
                timeout,
                is_return,
                span,
            } => {
                let cond = self.expr(cond);
                let body = self.stmt(body);
                let timeout = timeout.as_ref().map(|t| {
                    let e = self.expr(&t.expr);
                    let b = t.body.as_ref().map(|b| self.stmt(b));
                    (e, b)
                });
                Stmt::when(cond, body, timeout, *is_return, *span, &mut self.diags)
            }
        };
        self.finish(built)
    }

    fn build_return(&mut self, value: Option<&ast::Expr>, span: Span) -> Stmt {
        let e = value.map(|v| self.expr(v));

        match &self.yield_state {
            YieldState::Illegal => {
                self.diags
                    .error(span, "return statement outside of function/event");
            }
            YieldState::Inferring => {
                if let Some(e) = &e {
                    self.yield_state = YieldState::Fixed {
                        ty: Some(e.ty.clone()),
                        is_hook: false,
                    };
                }
            }
            YieldState::Fixed { ty, is_hook } => match (ty.as_ref(), &e) {
                (None | Some(Type::Void), Some(_)) => {
                    self.diags
                        .error(span, "return statement cannot have an expression");
                }
                (None | Some(Type::Void), None) => {}
                (Some(_), None) => {
                    if !*is_hook {
                        self.diags.error(span, "return statement needs expression");
                    }
                }
                (Some(yt), Some(e)) => {
                    if !can_assign(&e.ty, yt) {
                        self.diags.error(
                            e.span,
                            format!("type clash in return ({} vs. {})", e.ty, yt),
                        );
                    }
                }
            },
        }

        Stmt::new(StmtKind::Return(e), span)
    }

    fn build_for(
        &mut self,
        vars: &[LoopVar],
        value_var: Option<&LoopVar>,
        iterable: &ast::Expr,
        body: &ast::Stmt,
        span: Span,
    ) -> Stmt {
        let target = self.expr(iterable);
        let mut loop_vars = Vec::new();

        match target.ty.clone() {
            Type::Error => {}
            Type::Table { index, .. } => {
                if index.len() != vars.len() {
                    self.diags.error(target.span, "wrong index size");
                } else {
                    for (var, ity) in vars.iter().zip(&index) {
                        let id = self.loop_var(var, ity);
                        loop_vars.push(id);
                    }
                }
            }
            Type::Vector { .. } => {
                if vars.len() != 1 {
                    self.diags.error(
                        target.span,
                        "iterating over a vector requires only a single index type",
                    );
                } else {
                    let declared = self.declared_type(&vars[0]);
                    match declared {
                        Some(t) if !t.is_integral() && !t.is_error() => {
                            self.diags.error(
                                target.span,
                                "vector index in \"for\" loop must be integral",
                            );
                        }
                        Some(t) => loop_vars.push(self.loop_var(&vars[0], &t)),
                        None => loop_vars.push(self.loop_var(&vars[0], &Type::Count)),
                    }
                }
            }
            Type::String => {
                if vars.len() != 1 {
                    self.diags.error(
                        target.span,
                        "iterating over a string requires only a single index type",
                    );
                } else {
                    match self.declared_type(&vars[0]) {
                        Some(t) if !matches!(t, Type::String | Type::Error) => {
                            self.diags.error(
                                target.span,
                                "string index in \"for\" loop must be string",
                            );
                        }
                        _ => loop_vars.push(self.loop_var(&vars[0], &Type::String)),
                    }
                }
            }
            _ => {
                self.diags.error(
                    target.span,
                    "target to iterate over must be a table, set, vector, or string",
                );
            }
        }

        // Keep the arity the loop executes with consistent even after errors
        if loop_vars.len() != vars.len() {
            loop_vars = vars
                .iter()
                .map(|v| self.scope.declare(&v.name, Type::Error))
                .collect();
        }

        let value_var = value_var.map(|vv| match target.ty.clone() {
            Type::Table {
                yield_type: Some(yt),
                ..
            } => self.loop_var(vv, &yt),
            Type::Error => self.scope.declare(&vv.name, Type::Error),
            _ => {
                self.diags.error(
                    target.span,
                    "key value for loops only support iteration over tables",
                );
                self.scope.declare(&vv.name, Type::Error)
            }
        });

        let body = self.stmt(body);
        Stmt::new(
            StmtKind::For(ForStmt {
                loop_vars,
                value_var,
                target,
                body: Box::new(body),
            }),
            span,
        )
    }

    /// Type a loop variable already has, from its annotation or an earlier
    /// declaration of the same name
    fn declared_type(&self, var: &LoopVar) -> Option<Type> {
        var.ty
            .clone()
            .or_else(|| self.scope.lookup(&var.name).map(|id| id.ty.clone()))
    }

    fn loop_var(&mut self, var: &LoopVar, inferred: &Type) -> Rc<Id> {
        let existing = self.scope.lookup(&var.name);
        if let Some(id) = &existing {
            if id.is_const() {
                self.diags.error(
                    var.span,
                    format!("cannot use constant '{}' as a loop variable", var.name),
                );
                return self.scope.declare(&var.name, Type::Error);
            }
        }

        match self.declared_type(var) {
            Some(t) => {
                if !same_type(&t, inferred) {
                    self.diags.error(
                        var.span,
                        format!("type clash in iteration ({} vs. {})", t, inferred),
                    );
                }
                match existing {
                    Some(id) if same_type(&id.ty, &t) => id,
                    _ => self.scope.declare(&var.name, t),
                }
            }
            None => self.scope.declare(&var.name, inferred.clone()),
        }
    }

    fn build_case(&mut self, c: &ast::Case) -> Case {
        let labels = match (&c.values, &c.types) {
            (Some(values), types) => {
                if types.is_some() {
                    self.diags
                        .error(c.span, "cannot mix cases with expressions and types");
                }
                CaseLabels::Values(self.exprs(values))
            }
            (None, Some(types)) => CaseLabels::Types(
                types
                    .iter()
                    .map(|t| TypeCase {
                        ty: t.ty.clone(),
                        binding: t
                            .binding
                            .as_ref()
                            .map(|name| self.scope.declare(name, t.ty.clone())),
                        span: t.span,
                    })
                    .collect(),
            ),
            (None, None) => CaseLabels::Default,
        };
        let body = self.stmt(&c.body);
        Case::new(labels, body, c.span, &mut self.diags)
    }

    /// Lower a whole unit
    pub fn build_unit(unit: &ast::Unit) -> Unit {
        let mut b = Builder::new(&unit.kind, unit.file.clone());
        let aggregates = b.declare_locals(&unit.locals);
        let mut body = b.stmt(&unit.body);

        if !aggregates.is_empty() {
            let span = unit.body.span();
            let init = Stmt::new(StmtKind::Init(aggregates), span);
            body = Stmt::new(StmtKind::List(vec![init, body]), span);
        }

        let yield_type = match b.yield_state {
            YieldState::Fixed { ty, .. } => ty,
            YieldState::Inferring | YieldState::Illegal => None,
        };

        tracing::debug!(
            unit = %unit.name,
            slots = b.scope.next_slot,
            errors = b.diags.error_count(),
            warnings = b.diags.len() - b.diags.error_count(),
            "unit built"
        );

        Unit {
            name: unit.name.clone(),
            kind: unit.kind.clone(),
            body,
            yield_type,
            diagnostics: b.diags,
            frame_size: b.scope.next_slot,
            names: b.scope.names,
        }
    }
}

/// Build a unit, refusing it when construction reported errors
pub fn load_unit(unit: &ast::Unit) -> Result<Unit, LoadError> {
    let built = Builder::build_unit(unit);
    if built.diagnostics.has_errors() {
        return Err(LoadError::Construction {
            name: built.name,
            diagnostics: built.diagnostics,
        });
    }
    Ok(built)
}

/// Parse a JSON unit document and load it
pub fn load_unit_json(json: &str) -> Result<Unit, LoadError> {
    let unit: ast::Unit = serde_json::from_str(json)?;
    load_unit(&unit)
}

fn lit_value(lit: &Lit) -> Option<Val> {
    Some(match lit {
        Lit::Bool { v } => Val::Bool(*v),
        Lit::Int { v } => Val::Int(*v),
        Lit::Count { v } => Val::Count(*v),
        Lit::Double { v } => Val::Double(*v),
        Lit::Str { v } => Val::from(v.as_str()),
        Lit::Interval { v } => Val::Interval(Duration::nanoseconds((*v * 1e9) as i64)),
        Lit::Time { v } => {
            let secs = v.floor();
            let nanos = ((*v - secs) * 1e9) as u32;
            Val::Time(DateTime::<Utc>::from_timestamp(secs as i64, nanos)?)
        }
    })
}
