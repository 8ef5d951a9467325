//! Statements
//!
//! A [`Stmt`] is an immutable tree node apart from its access counters. The
//! single entry point is [`Stmt::exec`], which runs the node against a frame
//! and reports how control continues through a [`Flow`] out-parameter:
//!
//! - sequences stop at the first child that reports anything but `Next`,
//!   produces a value, or defers the frame's result through `return when`
//! - loops absorb `Loop` (from `next`) and turn `Break` back into `Next` once
//!   they stop, so neither escapes past the loop that owns it
//! - `Return` passes through every enclosing loop, switch and sequence
//!
//! Construction checks live in the constructors and report to a
//! [`Diagnostics`] sink; a statement that failed a check is still built.

use chrono::{DateTime, Utc};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::describe::Desc;
use super::diagnostics::Diagnostics;
use super::errors::{internal_error, RuntimeError};
use super::expressions::{Expr, Id};
use super::frame::Frame;
use super::switch::SwitchStmt;
use super::traverse::{TraversalCallback, TraversalCode};
use super::trigger::Trigger;
use super::types::values::coerce_to;
use super::types::{Flow, Span, Type, Val};
use crate::{handle_tc_stmt_post, handle_tc_stmt_pre};

static NEXT_STMT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique statement identity, used by the debugger line map and the
/// frame's next-statement tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(u64);

impl StmtId {
    fn next() -> Self {
        StmtId(NEXT_STMT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt#{}", self.0)
    }
}

/// Statement kind tag. The discriminant is the code used by the compact
/// description; code 0 is retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StmtTag {
    Print = 1,
    Event = 2,
    Expr = 3,
    If = 4,
    When = 5,
    Switch = 6,
    For = 7,
    Next = 8,
    Break = 9,
    Return = 10,
    Add = 11,
    Delete = 12,
    List = 13,
    EventBodyList = 14,
    Init = 15,
    Fallthrough = 16,
    While = 17,
    Null = 18,
}

impl StmtTag {
    pub fn name(self) -> &'static str {
        match self {
            StmtTag::Print => "print",
            StmtTag::Event => "event",
            StmtTag::Expr => "expr",
            StmtTag::If => "if",
            StmtTag::When => "when",
            StmtTag::Switch => "switch",
            StmtTag::For => "for",
            StmtTag::Next => "next",
            StmtTag::Break => "break",
            StmtTag::Return => "return",
            StmtTag::Add => "add",
            StmtTag::Delete => "delete",
            StmtTag::List => "list",
            StmtTag::EventBodyList => "bodylist",
            StmtTag::Init => "<init>",
            StmtTag::Fallthrough => "fallthrough",
            StmtTag::While => "while",
            StmtTag::Null => "null",
        }
    }

    pub fn code(self) -> u64 {
        self as u64
    }
}

/// Per-statement coverage counters
#[derive(Debug, Default)]
pub struct AccessStats {
    last_access: Cell<Option<DateTime<Utc>>>,
    count: Cell<u64>,
}

impl AccessStats {
    fn register(&self, now: DateTime<Utc>) {
        self.last_access.set(Some(now));
        self.count.set(self.count.get() + 1);
    }

    pub fn last_access(&self) -> Option<DateTime<Utc>> {
        self.last_access.get()
    }

    pub fn count(&self) -> u64 {
        self.count.get()
    }
}

#[derive(Debug)]
pub struct ForStmt {
    pub loop_vars: Vec<Rc<Id>>,
    /// Bound to the entry's value in `for ([k], v in t)`
    pub value_var: Option<Rc<Id>>,
    pub target: Expr,
    pub body: Box<Stmt>,
}

#[derive(Debug)]
pub struct WhenStmt {
    pub cond: Rc<Expr>,
    pub body: Rc<Stmt>,
    pub timeout_body: Option<Rc<Stmt>>,
    pub timeout: Option<Expr>,
    /// `return when`: the trigger's result becomes the frame's result
    pub is_return: bool,
}

#[derive(Debug)]
pub enum StmtKind {
    List(Vec<Stmt>),
    EventBodyList(Vec<Stmt>),
    Expr(Expr),
    Print(Vec<Expr>),
    Event {
        name: String,
        args: Vec<Expr>,
    },
    If {
        cond: Expr,
        then_s: Box<Stmt>,
        else_s: Box<Stmt>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For(ForStmt),
    Switch(SwitchStmt),
    Add(Expr),
    Delete(Expr),
    Next,
    Break,
    Fallthrough,
    Return(Option<Expr>),
    Init(Vec<Rc<Id>>),
    Null,
    When(WhenStmt),
}

#[derive(Debug)]
pub struct Stmt {
    id: StmtId,
    pub kind: StmtKind,
    pub span: Span,
    stats: AccessStats,
}

fn check_no_void(exprs: &[Expr], diags: &mut Diagnostics) {
    for e in exprs {
        if matches!(e.ty, Type::Void) {
            diags.error(e.span, "value of type void illegal");
        }
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self {
            id: StmtId::next(),
            kind,
            span,
            stats: AccessStats::default(),
        }
    }

    /* ---------- checked construction ---------- */

    pub fn expr_stmt(e: Expr, span: Span, diags: &mut Diagnostics) -> Self {
        if !e.is_error() && e.is_pure() {
            diags.warning(span, "expression value ignored");
        }
        Self::new(StmtKind::Expr(e), span)
    }

    pub fn print(args: Vec<Expr>, span: Span, diags: &mut Diagnostics) -> Self {
        check_no_void(&args, diags);
        Self::new(StmtKind::Print(args), span)
    }

    pub fn event(name: String, args: Vec<Expr>, span: Span, diags: &mut Diagnostics) -> Self {
        check_no_void(&args, diags);
        Self::new(StmtKind::Event { name, args }, span)
    }

    pub fn if_stmt(cond: Expr, then_s: Stmt, else_s: Option<Stmt>, span: Span, diags: &mut Diagnostics) -> Self {
        if !cond.is_error() && !cond.ty.is_bool() {
            diags.error(cond.span, "conditional in test must be boolean");
        }
        let else_s = else_s.unwrap_or_else(|| Stmt::new(StmtKind::Null, span));
        Self::new(
            StmtKind::If {
                cond,
                then_s: Box::new(then_s),
                else_s: Box::new(else_s),
            },
            span,
        )
    }

    pub fn while_stmt(cond: Expr, body: Stmt, span: Span, diags: &mut Diagnostics) -> Self {
        if !cond.is_error() && !cond.ty.is_bool() {
            diags.error(cond.span, "while conditional must be boolean");
        }
        Self::new(
            StmtKind::While {
                cond,
                body: Box::new(body),
            },
            span,
        )
    }

    pub fn add(e: Expr, span: Span, diags: &mut Diagnostics) -> Self {
        if !e.can_add() {
            diags.error(span, "illegal add statement");
        }
        Self::new(StmtKind::Add(e), span)
    }

    pub fn delete(e: Expr, span: Span, diags: &mut Diagnostics) -> Self {
        if !e.is_error() && !e.can_del() {
            diags.error(span, "illegal delete statement");
        }
        Self::new(StmtKind::Delete(e), span)
    }

    pub fn when(
        cond: Expr,
        body: Stmt,
        timeout: Option<(Expr, Option<Stmt>)>,
        is_return: bool,
        span: Span,
        diags: &mut Diagnostics,
    ) -> Self {
        if !cond.is_error() && !cond.ty.is_bool() {
            diags.error(cond.span, "conditional in test must be boolean");
        }
        let (timeout, timeout_body) = match timeout {
            Some((t, body)) => {
                if !t.is_error() && !matches!(t.ty, Type::Time | Type::Interval) {
                    diags.error(t.span, "when timeout requires a time or time interval");
                }
                (Some(t), body.map(Rc::new))
            }
            None => (None, None),
        };
        Self::new(
            StmtKind::When(WhenStmt {
                cond: Rc::new(cond),
                body: Rc::new(body),
                timeout_body,
                timeout,
                is_return,
            }),
            span,
        )
    }

    /* ---------- accessors ---------- */

    pub fn id(&self) -> StmtId {
        self.id
    }

    pub fn tag(&self) -> StmtTag {
        match &self.kind {
            StmtKind::List(_) => StmtTag::List,
            StmtKind::EventBodyList(_) => StmtTag::EventBodyList,
            StmtKind::Expr(_) => StmtTag::Expr,
            StmtKind::Print(_) => StmtTag::Print,
            StmtKind::Event { .. } => StmtTag::Event,
            StmtKind::If { .. } => StmtTag::If,
            StmtKind::While { .. } => StmtTag::While,
            StmtKind::For(_) => StmtTag::For,
            StmtKind::Switch(_) => StmtTag::Switch,
            StmtKind::Add(_) => StmtTag::Add,
            StmtKind::Delete(_) => StmtTag::Delete,
            StmtKind::Next => StmtTag::Next,
            StmtKind::Break => StmtTag::Break,
            StmtKind::Fallthrough => StmtTag::Fallthrough,
            StmtKind::Return(_) => StmtTag::Return,
            StmtKind::Init(_) => StmtTag::Init,
            StmtKind::Null => StmtTag::Null,
            StmtKind::When(_) => StmtTag::When,
        }
    }

    pub fn stats(&self) -> &AccessStats {
        &self.stats
    }

    /// Tag of the statement that ends this one, looking through nested
    /// lists. An empty list reports `List`.
    pub fn last_tag(&self) -> StmtTag {
        match &self.kind {
            StmtKind::List(stmts) => match stmts.last() {
                Some(last) => last.last_tag(),
                None => StmtTag::List,
            },
            _ => self.tag(),
        }
    }

    /// Whether executing this has no side effects
    pub fn is_pure(&self) -> bool {
        match &self.kind {
            StmtKind::List(stmts) | StmtKind::EventBodyList(stmts) => stmts.iter().all(Stmt::is_pure),
            StmtKind::Expr(e) => e.is_pure(),
            StmtKind::Print(_) | StmtKind::Event { .. } | StmtKind::Init(_) => false,
            StmtKind::If { cond, then_s, else_s } => {
                cond.is_pure() && then_s.is_pure() && else_s.is_pure()
            }
            StmtKind::While { cond, body } => cond.is_pure() && body.is_pure(),
            StmtKind::For(fs) => fs.target.is_pure() && fs.body.is_pure(),
            StmtKind::Switch(sw) => sw.is_pure(),
            StmtKind::Add(_) | StmtKind::Delete(_) => false,
            StmtKind::Next | StmtKind::Break | StmtKind::Fallthrough | StmtKind::Null => true,
            StmtKind::Return(e) => e.as_ref().map_or(true, Expr::is_pure),
            StmtKind::When(w) => {
                w.cond.is_pure()
                    && w.body.is_pure()
                    && w.timeout_body.as_ref().map_or(true, |s| s.is_pure())
            }
        }
    }

    /* ---------- execution ---------- */

    /// Execute against `f`. Sets `flow` before returning and yields the value
    /// of a `return` (or of whatever child produced one).
    pub fn exec(&self, f: &Frame, flow: &mut Flow) -> Result<Option<Val>, RuntimeError> {
        self.stats.register(f.host().now());
        *flow = Flow::Next;

        match &self.kind {
            StmtKind::List(stmts) => {
                for s in stmts {
                    f.set_next_stmt(Some(s.id));
                    let result = s.exec(f, flow)?;
                    if *flow != Flow::Next || result.is_some() || f.has_delayed() {
                        return Ok(result);
                    }
                }
                Ok(None)
            }

            StmtKind::EventBodyList(bodies) => {
                // Every handler body runs whatever the others did
                for s in bodies {
                    f.set_next_stmt(Some(s.id));
                    let mut body_flow = Flow::Next;
                    if let Err(e) = s.exec(f, &mut body_flow) {
                        tracing::warn!(line = s.span.start_line, error = %e, "event handler body aborted");
                    }
                }
                *flow = Flow::Next;
                Ok(None)
            }

            StmtKind::Expr(e) => {
                e.eval(f)?;
                Ok(None)
            }

            StmtKind::Print(args) => {
                let vals = eval_list(args, f)?;
                let line: Vec<String> = vals.iter().map(|v| v.to_string()).collect();
                f.host().print(line.join(", "));
                Ok(None)
            }

            StmtKind::Event { name, args } => {
                let vals = eval_list(args, f)?;
                f.host().queue_event(name, vals);
                Ok(None)
            }

            StmtKind::If { cond, then_s, else_s } => {
                let branch = if cond.eval(f)?.is_zero() { else_s } else { then_s };
                f.set_next_stmt(Some(branch.id));
                branch.exec(f, flow)
            }

            StmtKind::While { cond, body } => self.exec_while(cond, body, f, flow),

            StmtKind::For(fs) => fs.exec(f, flow),

            StmtKind::Switch(sw) => sw.exec(f, flow),

            StmtKind::Add(e) => {
                e.add(f)?;
                Ok(None)
            }

            StmtKind::Delete(e) => {
                e.delete(f)?;
                Ok(None)
            }

            StmtKind::Next => {
                *flow = Flow::Loop;
                Ok(None)
            }

            StmtKind::Break => {
                *flow = Flow::Break;
                Ok(None)
            }

            StmtKind::Fallthrough => {
                *flow = Flow::Fallthrough;
                Ok(None)
            }

            StmtKind::Return(e) => {
                *flow = Flow::Return;
                match e {
                    Some(e) => Ok(Some(e.eval(f)?)),
                    None => Ok(None),
                }
            }

            StmtKind::Init(ids) => {
                for id in ids {
                    match Val::empty_aggregate(&id.ty) {
                        Some(v) => f.set(id.slot, v),
                        None => f.clear(id.slot),
                    }
                }
                Ok(None)
            }

            StmtKind::Null => Ok(None),

            StmtKind::When(w) => {
                w.install(f, self.span);
                Ok(None)
            }
        }
    }

    fn exec_while(&self, cond: &Expr, body: &Stmt, f: &Frame, flow: &mut Flow) -> Result<Option<Val>, RuntimeError> {
        let limit = f.host().settings().max_loop_iterations;
        let mut iterations: u64 = 0;
        let mut rval = None;

        loop {
            if cond.eval(f)?.is_zero() {
                break;
            }
            if let Some(max) = limit {
                if iterations >= max {
                    tracing::warn!(line = self.span.start_line, max, "while loop iteration limit reached");
                    return Err(RuntimeError::IterationLimit(max));
                }
            }
            iterations += 1;

            *flow = Flow::Next;
            rval = body.exec(f, flow)?;
            if flow.stops_loop() {
                break;
            }
        }

        if matches!(*flow, Flow::Loop | Flow::Break) {
            *flow = Flow::Next;
        }
        Ok(rval)
    }

    /* ---------- traversal ---------- */

    pub fn traverse(&self, cb: &mut dyn TraversalCallback) -> TraversalCode {
        let tc = cb.pre_stmt(self);
        handle_tc_stmt_pre!(tc);

        match &self.kind {
            StmtKind::List(stmts) | StmtKind::EventBodyList(stmts) => {
                for s in stmts {
                    let tc = s.traverse(cb);
                    handle_tc_stmt_pre!(tc);
                }
            }
            StmtKind::Expr(e) | StmtKind::Add(e) | StmtKind::Delete(e) | StmtKind::Return(Some(e)) => {
                let tc = e.traverse(cb);
                handle_tc_stmt_pre!(tc);
            }
            StmtKind::Print(args) | StmtKind::Event { args, .. } => {
                for e in args {
                    let tc = e.traverse(cb);
                    handle_tc_stmt_pre!(tc);
                }
            }
            StmtKind::If { cond, then_s, else_s } => {
                let tc = cond.traverse(cb);
                handle_tc_stmt_pre!(tc);
                let tc = then_s.traverse(cb);
                handle_tc_stmt_pre!(tc);
                let tc = else_s.traverse(cb);
                handle_tc_stmt_pre!(tc);
            }
            StmtKind::While { cond, body } => {
                let tc = cond.traverse(cb);
                handle_tc_stmt_pre!(tc);
                let tc = body.traverse(cb);
                handle_tc_stmt_pre!(tc);
            }
            StmtKind::For(fs) => {
                let tc = fs.target.traverse(cb);
                handle_tc_stmt_pre!(tc);
                let tc = fs.body.traverse(cb);
                handle_tc_stmt_pre!(tc);
            }
            StmtKind::Switch(sw) => {
                let tc = sw.traverse(cb);
                handle_tc_stmt_pre!(tc);
            }
            StmtKind::When(w) => {
                let tc = w.cond.traverse(cb);
                handle_tc_stmt_pre!(tc);
                let tc = w.body.traverse(cb);
                handle_tc_stmt_pre!(tc);
                if let Some(t) = &w.timeout {
                    let tc = t.traverse(cb);
                    handle_tc_stmt_pre!(tc);
                }
                if let Some(s) = &w.timeout_body {
                    let tc = s.traverse(cb);
                    handle_tc_stmt_pre!(tc);
                }
            }
            StmtKind::Next
            | StmtKind::Break
            | StmtKind::Fallthrough
            | StmtKind::Return(None)
            | StmtKind::Init(_)
            | StmtKind::Null => {}
        }

        let tc = cb.post_stmt(self);
        handle_tc_stmt_post!(tc)
    }

    /* ---------- description ---------- */

    pub(crate) fn add_tag(&self, d: &mut Desc) {
        if d.is_readable() {
            d.add(self.tag().name());
        } else {
            d.add_count(self.tag().code());
        }
        d.sp();
    }

    fn describe_done(d: &mut Desc) {
        if d.is_readable() {
            d.add_tight(";");
        }
    }

    /// `(@<time> #<count>)` line when the writer asks for stats
    pub fn access_stats(&self, d: &mut Desc) {
        if d.include_stats() {
            d.add("(@");
            match self.stats.last_access() {
                Some(t) => d.add(&t.format("%d/%m %H:%M:%S").to_string()),
                None => d.add("<never>"),
            }
            d.add(" #");
            d.add(&self.stats.count().to_string());
            d.add(")");
            d.nl();
        }
    }

    /// Body of a compound statement, indented one level
    pub(crate) fn describe_nested(&self, d: &mut Desc) {
        d.push_indent();
        self.access_stats(d);
        self.describe(d);
        d.pop_indent();
    }

    pub fn describe(&self, d: &mut Desc) {
        match &self.kind {
            StmtKind::List(stmts) => {
                if !d.is_readable() {
                    self.add_tag(d);
                    d.add_count(stmts.len() as u64);
                }
                if stmts.is_empty() {
                    Self::describe_done(d);
                } else {
                    if d.is_readable() {
                        d.add("{");
                        d.nl();
                    }
                    for s in stmts {
                        s.describe(d);
                        d.nl();
                    }
                    if d.is_readable() {
                        d.add("}");
                    }
                }
            }

            StmtKind::EventBodyList(bodies) => {
                if d.is_readable() {
                    for s in bodies {
                        d.add("{");
                        s.describe_nested(d);
                        d.add("}");
                        d.nl();
                    }
                } else {
                    self.add_tag(d);
                    d.add_count(bodies.len() as u64);
                    for s in bodies {
                        s.describe(d);
                    }
                }
            }

            StmtKind::Expr(e) => {
                if !d.is_readable() {
                    self.add_tag(d);
                }
                d.add(&e.to_string());
                Self::describe_done(d);
            }

            StmtKind::Print(args) => {
                self.add_tag(d);
                describe_list(args, d);
                Self::describe_done(d);
            }

            StmtKind::Event { name, args } => {
                self.add_tag(d);
                d.add(name);
                if d.is_readable() {
                    d.add("(");
                }
                describe_list(args, d);
                if d.is_readable() {
                    d.add(")");
                }
                Self::describe_done(d);
            }

            StmtKind::If { cond, then_s, else_s } => {
                self.add_tag(d);
                describe_paren(cond, d);
                then_s.describe_nested(d);
                if d.is_readable() {
                    if !matches!(else_s.kind, StmtKind::Null) {
                        d.add("else");
                        else_s.describe_nested(d);
                    }
                } else {
                    else_s.describe(d);
                }
            }

            StmtKind::While { cond, body } => {
                self.add_tag(d);
                describe_paren(cond, d);
                body.describe_nested(d);
            }

            StmtKind::For(fs) => {
                self.add_tag(d);
                if d.is_readable() {
                    d.add("(");
                }
                let names: Vec<&str> = fs.loop_vars.iter().map(|v| v.name.as_str()).collect();
                if fs.value_var.is_some() || names.len() > 1 {
                    d.add(&format!("[{}]", names.join(", ")));
                } else {
                    d.add(&names.join(", "));
                }
                if let Some(v) = &fs.value_var {
                    d.add(&format!(", {}", v.name));
                }
                if d.is_readable() {
                    d.add(" in ");
                }
                d.add(&fs.target.to_string());
                if d.is_readable() {
                    d.add(")");
                }
                fs.body.describe_nested(d);
            }

            StmtKind::Switch(sw) => sw.describe(self, d),

            StmtKind::Add(e) | StmtKind::Delete(e) => {
                self.add_tag(d);
                d.add(&e.to_string());
                Self::describe_done(d);
            }

            StmtKind::Next | StmtKind::Break | StmtKind::Fallthrough => {
                self.add_tag(d);
                Self::describe_done(d);
            }

            StmtKind::Return(e) => {
                self.add_tag(d);
                if !d.is_readable() {
                    d.add_count(u64::from(e.is_some()));
                }
                if let Some(e) = e {
                    describe_paren(e, d);
                }
                Self::describe_done(d);
            }

            StmtKind::Init(ids) => {
                self.add_tag(d);
                d.add_count(ids.len() as u64);
                let names: Vec<&str> = ids.iter().map(|i| i.name.as_str()).collect();
                if d.is_readable() {
                    d.add(&names.join(", "));
                } else {
                    for n in names {
                        d.add(n);
                    }
                }
                Self::describe_done(d);
            }

            StmtKind::Null => {
                if d.is_readable() {
                    Self::describe_done(d);
                } else {
                    self.add_tag(d);
                }
            }

            StmtKind::When(w) => {
                if w.is_return && d.is_readable() {
                    d.add("return");
                    d.sp();
                }
                self.add_tag(d);
                describe_paren(&w.cond, d);
                w.body.describe_nested(d);
                if let Some(t) = &w.timeout {
                    if d.is_readable() {
                        d.add("timeout");
                        d.sp();
                        d.add(&t.to_string());
                        match &w.timeout_body {
                            Some(s) => s.describe_nested(d),
                            None => Self::describe_done(d),
                        }
                    } else {
                        d.add(&t.to_string());
                        if let Some(s) = &w.timeout_body {
                            s.describe(d);
                        }
                    }
                }
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = Desc::readable();
        self.describe(&mut d);
        f.write_str(d.as_str())
    }
}

fn describe_paren(e: &Expr, d: &mut Desc) {
    if d.is_readable() {
        d.add(&format!("({})", e));
    } else {
        d.add(&e.to_string());
    }
}

fn describe_list(exprs: &[Expr], d: &mut Desc) {
    if d.is_readable() {
        let parts: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
        d.add(&parts.join(", "));
    } else {
        d.add_count(exprs.len() as u64);
        for e in exprs {
            d.add(&e.to_string());
        }
    }
}

fn eval_list(exprs: &[Expr], f: &Frame) -> Result<Vec<Val>, RuntimeError> {
    exprs.iter().map(|e| e.eval(f)).collect()
}

impl ForStmt {
    fn single_loop_var(&self) -> &Rc<Id> {
        match self.loop_vars.as_slice() {
            [var] => var,
            vars => internal_error(&format!(
                "sequential for loop built with {} loop variables",
                vars.len()
            )),
        }
    }

    fn exec(&self, f: &Frame, flow: &mut Flow) -> Result<Option<Val>, RuntimeError> {
        let mut ret = None;

        match self.target.eval(f)? {
            Val::Table(t) => {
                if t.borrow().is_empty() {
                    return Ok(None);
                }

                let mut cookie = t.borrow_mut().init_for_iteration();
                loop {
                    let next = t.borrow_mut().next_entry(&mut cookie);
                    let Some((key, value)) = next else {
                        break;
                    };
                    let index = t.borrow().recover_index(&key);

                    if let (Some(var), Some(value)) = (&self.value_var, value) {
                        f.set(var.slot, value);
                    }
                    for (var, v) in self.loop_vars.iter().zip(index) {
                        f.set(var.slot, v);
                    }

                    *flow = Flow::Next;
                    ret = match self.body.exec(f, flow) {
                        Ok(r) => r,
                        Err(e) => {
                            t.borrow_mut().stop_iteration(&mut cookie);
                            return Err(e);
                        }
                    };

                    if flow.stops_loop() {
                        // abandoned before exhaustion: hand the cookie back
                        t.borrow_mut().stop_iteration(&mut cookie);
                        break;
                    }
                }
            }

            Val::Vector(v) => {
                let var = self.single_loop_var();
                let mut i = 0usize;
                while i <= v.borrow().size() {
                    let populated = v.borrow().lookup(i).is_some();
                    if populated {
                        f.set(var.slot, coerce_to(Val::Count(i as u64), &var.ty));
                        *flow = Flow::Next;
                        ret = self.body.exec(f, flow)?;
                        if flow.stops_loop() {
                            break;
                        }
                    }
                    i += 1;
                }
            }

            Val::Str(s) => {
                let var = self.single_loop_var();
                for &b in s.iter() {
                    f.set(var.slot, Val::Str(vec![b]));
                    *flow = Flow::Next;
                    ret = self.body.exec(f, flow)?;
                    if flow.stops_loop() {
                        break;
                    }
                }
            }

            other => return Err(RuntimeError::NotIterable(other.ty().to_string())),
        }

        if matches!(*flow, Flow::Loop | Flow::Break) {
            *flow = Flow::Next;
        }
        Ok(ret)
    }
}

impl WhenStmt {
    /// Package the condition and bodies with the frame and hand them to the
    /// scheduler. Never evaluates the condition itself.
    fn install(&self, f: &Frame, span: Span) {
        let now = f.host().now();
        let deadline = match &self.timeout {
            None => None,
            Some(t) => match t.eval(f) {
                Ok(Val::Interval(d)) => Some(now + d),
                Ok(Val::Time(at)) => Some(at),
                Ok(other) => {
                    tracing::warn!(line = span.start_line, ty = %other.ty(), "when timeout is not a time or interval; waiting without one");
                    None
                }
                Err(e) => {
                    tracing::warn!(line = span.start_line, error = %e, "when timeout failed to evaluate; waiting without one");
                    None
                }
            },
        };

        let trigger = Trigger::new(
            Rc::clone(&self.cond),
            Rc::clone(&self.body),
            self.timeout_body.clone(),
            deadline,
            f.clone(),
            self.is_return,
            span,
        );
        if self.is_return {
            f.set_delayed(Rc::clone(&trigger));
        }
        f.host().triggers().register(trigger);
    }
}
