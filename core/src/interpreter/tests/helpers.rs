//! Test helpers for engine tests
//!
//! Programs are written as JSON AST fixtures. The shorthand constructors here
//! keep them readable; `unit` assembles a full unit document that goes
//! through serde exactly like a unit file would.

use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::TimeDelta;
use serde_json::{json, Value};

use crate::interpreter::builder::{Builder, Unit};
use crate::interpreter::diagnostics::Diagnostics;
use crate::interpreter::frame::Frame;
use crate::interpreter::host::{EngineSettings, Host};
use crate::interpreter::types::{ast, Flow, Val};
use crate::interpreter::{load_unit_json, LoadError};

/* ---------- types ---------- */

pub fn ty(name: &str) -> Value {
    json!({"t": name})
}

pub fn vector_of(elem: Value) -> Value {
    json!({"t": "Vector", "elem": elem})
}

pub fn set_of(index: Vec<Value>) -> Value {
    json!({"t": "Table", "index": index})
}

pub fn table_of(index: Vec<Value>, yield_type: Value) -> Value {
    json!({"t": "Table", "index": index, "yield_type": yield_type})
}

/* ---------- expressions ---------- */

pub fn count(v: u64) -> Value {
    json!({"t": "Const", "value": {"t": "Count", "v": v}})
}

pub fn int(v: i64) -> Value {
    json!({"t": "Const", "value": {"t": "Int", "v": v}})
}

pub fn string(v: &str) -> Value {
    json!({"t": "Const", "value": {"t": "Str", "v": v}})
}

pub fn boolean(v: bool) -> Value {
    json!({"t": "Const", "value": {"t": "Bool", "v": v}})
}

pub fn interval(secs: f64) -> Value {
    json!({"t": "Const", "value": {"t": "Interval", "v": secs}})
}

pub fn name(n: &str) -> Value {
    json!({"t": "Name", "name": n})
}

pub fn neg(operand: Value) -> Value {
    json!({"t": "Unary", "op": "Negate", "operand": operand})
}

/// `op` is a `BinaryOp` variant name, e.g. "Add" or "Lt"
pub fn bin(op: &str, lhs: Value, rhs: Value) -> Value {
    json!({"t": "Binary", "op": op, "lhs": lhs, "rhs": rhs})
}

pub fn index(target: Value, idx: Vec<Value>) -> Value {
    json!({"t": "Index", "target": target, "index": idx})
}

/* ---------- statements ---------- */

pub fn assign(target: Value, value: Value) -> Value {
    json!({"t": "Expr", "expr": {"t": "Assign", "target": target, "value": value}})
}

/// `n = n + 1` on a count local
pub fn incr(n: &str) -> Value {
    assign(name(n), bin("Add", name(n), count(1)))
}

pub fn print(args: Vec<Value>) -> Value {
    json!({"t": "Print", "args": args})
}

pub fn event(n: &str, args: Vec<Value>) -> Value {
    json!({"t": "Event", "name": n, "args": args})
}

pub fn list(body: Vec<Value>) -> Value {
    json!({"t": "List", "body": body})
}

pub fn if_else(test: Value, then_s: Value, else_s: Option<Value>) -> Value {
    match else_s {
        Some(e) => json!({"t": "If", "test": test, "then_s": then_s, "else_s": e}),
        None => json!({"t": "If", "test": test, "then_s": then_s}),
    }
}

pub fn while_loop(test: Value, body: Value) -> Value {
    json!({"t": "While", "test": test, "body": body})
}

pub fn for_loop(vars: &[&str], iterable: Value, body: Value) -> Value {
    let vars: Vec<Value> = vars.iter().map(|v| json!({"name": v})).collect();
    json!({"t": "For", "vars": vars, "iterable": iterable, "body": body})
}

pub fn case(values: Vec<Value>, body: Value) -> Value {
    json!({"values": values, "body": body})
}

pub fn default_case(body: Value) -> Value {
    json!({"body": body})
}

pub fn switch(expr: Value, cases: Vec<Value>) -> Value {
    json!({"t": "Switch", "expr": expr, "cases": cases})
}

pub fn brk() -> Value {
    json!({"t": "Break"})
}

pub fn next() -> Value {
    json!({"t": "Next"})
}

pub fn fallthrough() -> Value {
    json!({"t": "Fallthrough"})
}

pub fn ret(value: Option<Value>) -> Value {
    match value {
        Some(v) => json!({"t": "Return", "value": v}),
        None => json!({"t": "Return"}),
    }
}

pub fn when(cond: Value, body: Value, timeout: Option<(Value, Option<Value>)>) -> Value {
    let mut w = json!({"t": "When", "cond": cond, "body": body});
    if let Some((expr, tbody)) = timeout {
        w["timeout"] = match tbody {
            Some(b) => json!({"expr": expr, "body": b}),
            None => json!({"expr": expr}),
        };
    }
    w
}

/// Attach a single-line span to a statement or expression fixture
pub fn at(mut node: Value, line: usize) -> Value {
    node["span"] = json!({"start_line": line, "start_col": 0, "end_line": line, "end_col": 0});
    node
}

/* ---------- units ---------- */

pub fn toplevel() -> Value {
    json!({"t": "Toplevel"})
}

pub fn function(yield_type: Option<Value>) -> Value {
    match yield_type {
        Some(t) => json!({"t": "Function", "yield_type": t}),
        None => json!({"t": "Function"}),
    }
}

pub fn unit(kind: Value, locals: BTreeMap<&str, Value>, body: Value) -> Value {
    let locals: Vec<Value> = locals
        .into_iter()
        .map(|(n, t)| json!({"name": n, "type": t}))
        .collect();
    json!({"name": "test", "kind": kind, "locals": locals, "body": body})
}

/// Build a unit that must construct cleanly
pub fn build(doc: &Value) -> Unit {
    match load_unit_json(&doc.to_string()) {
        Ok(u) => u,
        Err(LoadError::Construction { diagnostics, .. }) => {
            let msgs: Vec<String> = diagnostics.iter().map(|d| d.to_string()).collect();
            panic!("unit failed to build:\n{}", msgs.join("\n"))
        }
        Err(e) => panic!("unit failed to load: {}", e),
    }
}

/// Diagnostics of a unit, whether or not it built
pub fn diagnostics(doc: &Value) -> Diagnostics {
    let parsed: ast::Unit = serde_json::from_value(doc.clone()).expect("fixture should parse");
    Builder::build_unit(&parsed).diagnostics
}

/// Diagnostics of a unit that must fail to build
pub fn build_err(doc: &Value) -> Diagnostics {
    let diags = diagnostics(doc);
    assert!(diags.has_errors(), "expected construction errors");
    diags
}

/* ---------- execution ---------- */

/// A unit executed once against a fresh frame
pub struct Run {
    pub unit: Unit,
    pub host: Rc<Host>,
    pub frame: Frame,
    pub result: Option<Val>,
    pub flow: Flow,
}

impl Run {
    pub fn output(&self) -> Vec<String> {
        self.host.drain_output()
    }

    pub fn get(&self, n: &str) -> Val {
        let id = self.unit.lookup(n).expect("unknown local");
        self.frame.get(id.slot, n).expect("local not bound")
    }

    pub fn set(&self, n: &str, v: Val) {
        let id = self.unit.lookup(n).expect("unknown local");
        self.frame.set(id.slot, v);
    }

    /// One trigger re-evaluation pass at the current network time
    pub fn check_triggers(&self) {
        self.host.triggers().check_all(self.host.now());
    }

    pub fn advance(&self, secs: i64) {
        self.host
            .advance_time(self.host.now() + TimeDelta::seconds(secs));
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        // Pending triggers hold the frame, which holds the host
        self.host.shutdown();
    }
}

pub fn run(doc: &Value) -> Run {
    run_with(doc, EngineSettings::default())
}

pub fn run_with(doc: &Value, settings: EngineSettings) -> Run {
    let unit = build(doc);
    let host = Rc::new(Host::new(settings));
    let frame = unit.new_frame(Rc::clone(&host));
    let (result, flow) = unit.run(&frame).expect("unit should run");
    Run {
        unit,
        host,
        frame,
        result,
        flow,
    }
}

/// Frame with preset locals, for units whose inputs are not literals
pub fn run_preset(doc: &Value, preset: BTreeMap<&str, Val>) -> Run {
    let unit = build(doc);
    let host = Rc::new(Host::new(EngineSettings::default()));
    let frame = unit.new_frame(Rc::clone(&host));
    for (n, v) in preset {
        let id = unit.lookup(n).expect("unknown local");
        frame.set(id.slot, v);
    }
    let (result, flow) = unit.run(&frame).expect("unit should run");
    Run {
        unit,
        host,
        frame,
        result,
        flow,
    }
}
