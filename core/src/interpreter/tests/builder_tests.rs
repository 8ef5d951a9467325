//! Tests for unit construction and the simple statements

use std::rc::Rc;

use super::helpers::*;
use crate::interpreter::diagnostics::Severity;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::host::{EngineSettings, Host};
use crate::interpreter::statements::{StmtKind, StmtTag};
use crate::interpreter::types::{Flow, Type, Val};
use maplit::btreemap;
use serde_json::json;

fn table_locals() -> std::collections::BTreeMap<&'static str, serde_json::Value> {
    btreemap! { "t" => table_of(vec![ty("Count")], ty("String")) }
}

/* ---------- return ---------- */

#[test]
fn test_return_outside_function() {
    let doc = unit(toplevel(), btreemap! {}, ret(None));
    assert!(build_err(&doc).contains("return statement outside of function/event"));
}

#[test]
fn test_event_return_cannot_carry_value() {
    let doc = unit(json!({"t": "Event"}), btreemap! {}, ret(Some(count(1))));
    assert!(build_err(&doc).contains("return statement cannot have an expression"));
}

#[test]
fn test_event_bare_return() {
    let doc = unit(json!({"t": "Event"}), btreemap! {}, ret(None));
    let r = run(&doc);
    assert_eq!(r.flow, Flow::Return);
    assert!(r.result.is_none());
}

#[test]
fn test_function_return_needs_value() {
    let doc = unit(function(Some(ty("Count"))), btreemap! {}, ret(None));
    assert!(build_err(&doc).contains("return statement needs expression"));
}

#[test]
fn test_hook_bare_return_allowed() {
    let doc = unit(json!({"t": "Hook"}), btreemap! {}, ret(None));
    build(&doc);
}

#[test]
fn test_return_type_clash() {
    let doc = unit(function(Some(ty("Count"))), btreemap! {}, ret(Some(string("nope"))));
    assert!(build_err(&doc).contains("type clash in return"));
}

#[test]
fn test_return_promotes_to_declared_type() {
    let doc = unit(function(Some(ty("Double"))), btreemap! {}, ret(Some(count(2))));
    build(&doc);
}

#[test]
fn test_inferred_yield_type() {
    let doc = unit(
        function(None),
        btreemap! {},
        list(vec![
            if_else(boolean(true), ret(Some(string("first"))), None),
            ret(Some(string("second"))),
        ]),
    );
    let u = build(&doc);
    assert_eq!(u.yield_type, Some(Type::String));
}

#[test]
fn test_inferred_yield_type_checks_later_returns() {
    let doc = unit(
        function(None),
        btreemap! {},
        list(vec![
            if_else(boolean(true), ret(Some(string("first"))), None),
            ret(Some(count(2))),
        ]),
    );
    assert!(build_err(&doc).contains("type clash in return"));
}

/* ---------- names and locals ---------- */

#[test]
fn test_unknown_identifier() {
    let doc = unit(toplevel(), btreemap! {}, print(vec![name("missing")]));
    assert!(build_err(&doc).contains("unknown identifier 'missing'"));
}

#[test]
fn test_redeclared_local() {
    let doc = json!({
        "name": "dup",
        "locals": [
            {"name": "x", "type": {"t": "Count"}},
            {"name": "x", "type": {"t": "String"}}
        ],
        "body": {"t": "Null"}
    });
    assert!(build_err(&doc).contains("'x' redeclared"));
}

#[test]
fn test_constant_type_clash() {
    let doc = json!({
        "name": "consts",
        "locals": [
            {"name": "PORT", "type": {"t": "Count"}, "const": {"t": "Str", "v": "eighty"}}
        ],
        "body": {"t": "Null"}
    });
    assert!(build_err(&doc).contains("type clash in constant"));
}

#[test]
fn test_assign_to_constant() {
    let doc = json!({
        "name": "consts",
        "locals": [
            {"name": "PORT", "type": {"t": "Count"}, "const": {"t": "Count", "v": 80}}
        ],
        "body": assign(name("PORT"), count(81))
    });
    assert!(build_err(&doc).contains("cannot assign to constant 'PORT'"));
}

#[test]
fn test_unbound_local_aborts_chain() {
    let doc = unit(
        toplevel(),
        btreemap! { "y" => ty("Count") },
        list(vec![print(vec![name("y")]), print(vec![string("after")])]),
    );
    let u = build(&doc);
    let host = Rc::new(Host::new(EngineSettings::default()));
    let frame = u.new_frame(Rc::clone(&host));
    assert_eq!(u.run(&frame).unwrap_err(), RuntimeError::Unbound("y".to_string()));
    assert!(host.drain_output().is_empty());
}

/* ---------- aggregates ---------- */

#[test]
fn test_aggregates_initialized_before_body() {
    let doc = unit(
        toplevel(),
        table_locals(),
        print(vec![bin("Eq", json!({"t": "Size", "operand": name("t")}), count(0))]),
    );
    let r = run(&doc);
    assert_eq!(r.output(), vec!["T"]);
    match &r.unit.body.kind {
        StmtKind::List(stmts) => assert_eq!(stmts[0].tag(), StmtTag::Init),
        other => panic!("expected init prelude, got {:?}", other),
    }
}

#[test]
fn test_init_statement_resets_aggregate() {
    let doc = unit(
        toplevel(),
        table_locals(),
        list(vec![
            assign(index(name("t"), vec![count(1)]), string("one")),
            json!({"t": "Init", "names": ["t"]}),
        ]),
    );
    let r = run(&doc);
    let t = r.get("t");
    assert!(t.as_table().unwrap().borrow().is_empty());
}

#[test]
fn test_init_rejects_atomic_local() {
    let doc = unit(
        toplevel(),
        btreemap! { "n" => ty("Count") },
        json!({"t": "Init", "names": ["n"]}),
    );
    assert!(build_err(&doc).contains("cannot be initialized as an aggregate"));
}

#[test]
fn test_add_and_delete() {
    let doc = unit(
        toplevel(),
        btreemap! { "s" => set_of(vec![ty("Count")]) },
        list(vec![
            json!({"t": "Add", "target": index(name("s"), vec![count(1)])}),
            json!({"t": "Add", "target": index(name("s"), vec![count(2)])}),
            json!({"t": "Delete", "target": index(name("s"), vec![count(1)])}),
            print(vec![
                json!({"t": "In", "elem": [count(1)], "target": name("s")}),
                json!({"t": "In", "elem": [count(2)], "target": name("s")}),
            ]),
        ]),
    );
    let r = run(&doc);
    assert_eq!(r.output(), vec!["F, T"]);
    assert!(!r.unit.body.is_pure());
}

#[test]
fn test_count_index_promoted_to_int_set() {
    let doc = unit(
        toplevel(),
        btreemap! { "s" => set_of(vec![ty("Int")]) },
        list(vec![
            json!({"t": "Add", "target": index(name("s"), vec![count(5)])}),
            json!({"t": "Add", "target": index(name("s"), vec![int(-3)])}),
            print(vec![
                json!({"t": "In", "elem": [count(5)], "target": name("s")}),
                json!({"t": "In", "elem": [int(5)], "target": name("s")}),
                json!({"t": "In", "elem": [int(-3)], "target": name("s")}),
            ]),
            json!({"t": "Delete", "target": index(name("s"), vec![count(5)])}),
            print(vec![json!({"t": "In", "elem": [int(5)], "target": name("s")})]),
        ]),
    );
    let r = run(&doc);
    assert_eq!(r.output(), vec!["T, T, T", "F"]);
}

#[test]
fn test_count_index_promoted_to_double_table() {
    let doc = unit(
        toplevel(),
        btreemap! { "t" => table_of(vec![ty("Double")], ty("String")) },
        list(vec![
            assign(index(name("t"), vec![count(2)]), string("two")),
            print(vec![index(name("t"), vec![count(2)])]),
        ]),
    );
    let r = run(&doc);
    assert_eq!(r.output(), vec!["two"]);
}

#[test]
fn test_delete_table_entry() {
    let doc = unit(
        toplevel(),
        table_locals(),
        list(vec![
            assign(index(name("t"), vec![count(1)]), string("one")),
            json!({"t": "Delete", "target": index(name("t"), vec![count(1)])}),
        ]),
    );
    let r = run(&doc);
    assert!(r.get("t").as_table().unwrap().borrow().is_empty());
}

#[test]
fn test_illegal_add() {
    let doc = unit(
        toplevel(),
        table_locals(),
        json!({"t": "Add", "target": index(name("t"), vec![count(1)])}),
    );
    assert!(build_err(&doc).contains("illegal add statement"));
}

#[test]
fn test_illegal_delete() {
    let doc = unit(
        toplevel(),
        btreemap! { "n" => ty("Count") },
        json!({"t": "Delete", "target": name("n")}),
    );
    assert!(build_err(&doc).contains("illegal delete statement"));
}

/* ---------- expression lists ---------- */

#[test]
fn test_print_joins_values() {
    let doc = unit(
        toplevel(),
        btreemap! {},
        print(vec![string("a"), count(1), boolean(false)]),
    );
    assert_eq!(run(&doc).output(), vec!["a, 1, F"]);
}

#[test]
fn test_void_value_rejected() {
    // a set lookup has no value
    let doc = unit(
        toplevel(),
        btreemap! { "s" => set_of(vec![ty("Count")]) },
        print(vec![index(name("s"), vec![count(1)])]),
    );
    assert!(build_err(&doc).contains("value of type void illegal"));
}

#[test]
fn test_event_is_queued() {
    let doc = unit(
        toplevel(),
        btreemap! {},
        event("conn_seen", vec![count(80), string("tcp")]),
    );
    let r = run(&doc);
    let events = r.host.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "conn_seen");
    assert_eq!(events[0].args, vec![Val::Count(80), Val::from("tcp")]);
    assert_eq!(events[0].to_string(), "conn_seen(80, tcp)");
}

#[test]
fn test_failed_event_queues_nothing() {
    let doc = unit(
        toplevel(),
        btreemap! { "y" => ty("Count") },
        event("never", vec![name("y")]),
    );
    let u = build(&doc);
    let host = Rc::new(Host::new(EngineSettings::default()));
    let frame = u.new_frame(Rc::clone(&host));
    assert!(u.run(&frame).is_err());
    assert!(host.drain_events().is_empty());
}

#[test]
fn test_pure_expression_statement_warns() {
    let doc = unit(
        toplevel(),
        btreemap! { "x" => ty("Count") },
        json!({"t": "Expr", "expr": bin("Gt", name("x"), count(1))}),
    );
    let u = build(&doc);
    let warning = u.diagnostics.iter().next().expect("one warning");
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.message, "expression value ignored");
}

#[test]
fn test_body_list_runs_every_handler() {
    let doc = unit(
        json!({"t": "Event"}),
        btreemap! { "y" => ty("Count") },
        json!({"t": "BodyList", "body": [
            list(vec![print(vec![string("first")]), ret(None)]),
            print(vec![name("y")]),
            print(vec![string("third")]),
        ]}),
    );
    let r = run(&doc);
    assert_eq!(r.flow, Flow::Next);
    assert!(r.result.is_none());
    assert_eq!(r.output(), vec!["first", "third"]);
}

#[test]
fn test_access_stats_recorded() {
    let doc = unit(
        toplevel(),
        btreemap! {},
        list(vec![print(vec![string("a")]), if_else(boolean(false), brk(), None)]),
    );
    let u = build(&doc);
    let host = Rc::new(Host::new(EngineSettings::default()));
    let frame = u.new_frame(Rc::clone(&host));
    u.run(&frame).unwrap();
    u.run(&frame).unwrap();

    assert_eq!(u.body.stats().count(), 2);
    match &u.body.kind {
        StmtKind::List(stmts) => match &stmts[1].kind {
            StmtKind::If { then_s, else_s, .. } => {
                assert_eq!(then_s.stats().count(), 0);
                assert_eq!(else_s.stats().count(), 2);
                assert!(then_s.stats().last_access().is_none());
            }
            other => panic!("expected if, got {:?}", other),
        },
        other => panic!("expected list, got {:?}", other),
    }
}

#[test]
fn test_loads_from_json_text() {
    let text = r#"{
        "name": "conn",
        "kind": {"t": "Function", "yield_type": {"t": "Bool"}},
        "locals": [{"name": "port", "type": {"t": "Count"}}],
        "body": {"t": "List", "body": [
            {"t": "Expr", "expr": {"t": "Assign",
                "target": {"t": "Name", "name": "port"},
                "value": {"t": "Const", "value": {"t": "Count", "v": 443}}}},
            {"t": "Return", "value": {"t": "Binary", "op": "Eq",
                "lhs": {"t": "Name", "name": "port"},
                "rhs": {"t": "Const", "value": {"t": "Count", "v": 443}}}}
        ]}
    }"#;
    let u = crate::interpreter::load_unit_json(text).unwrap();
    assert_eq!(u.name, "conn");
    let host = Rc::new(Host::new(EngineSettings::default()));
    let frame = u.new_frame(host);
    let (result, flow) = u.run(&frame).unwrap();
    assert_eq!(flow, Flow::Return);
    assert_eq!(result, Some(Val::Bool(true)));
}

#[test]
fn test_malformed_json_is_format_error() {
    let err = crate::interpreter::load_unit_json("{\"name\": 1}").unwrap_err();
    assert!(matches!(err, crate::interpreter::LoadError::Format(_)));
}
