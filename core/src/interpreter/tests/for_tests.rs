//! Tests for for loops over tables, sets, vectors and strings

use super::helpers::*;
use crate::interpreter::types::{Flow, Val};
use maplit::btreemap;
use serde_json::{json, Value};

fn add(target: Value) -> Value {
    json!({"t": "Add", "target": target})
}

fn table_setup() -> Vec<Value> {
    vec![
        assign(index(name("t"), vec![count(1)]), string("one")),
        assign(index(name("t"), vec![count(2)]), string("two")),
        assign(index(name("t"), vec![count(3)]), string("three")),
    ]
}

fn table_locals() -> std::collections::BTreeMap<&'static str, Value> {
    btreemap! { "t" => table_of(vec![ty("Count")], ty("String")) }
}

fn active_iterations(r: &Run, n: &str) -> usize {
    let t = r.get(n);
    let table = t.as_table().expect("table local");
    let active = table.borrow().active_iterations();
    active
}

fn sorted(mut lines: Vec<String>) -> Vec<String> {
    lines.sort();
    lines
}

#[test]
fn test_sparse_vector_visits_populated_slots() {
    let doc = unit(
        toplevel(),
        btreemap! { "v" => vector_of(ty("Count")) },
        list(vec![
            assign(index(name("v"), vec![count(0)]), count(10)),
            assign(index(name("v"), vec![count(2)]), count(12)),
            assign(index(name("v"), vec![count(4)]), count(14)),
            for_loop(&["i"], name("v"), print(vec![name("i")])),
        ]),
    );
    let r = run(&doc);
    assert_eq!(r.output(), vec!["0", "2", "4"]);
    assert_eq!(r.flow, Flow::Next);
}

#[test]
fn test_empty_vector_never_runs_body() {
    let doc = unit(
        toplevel(),
        btreemap! { "v" => vector_of(ty("Count")) },
        for_loop(&["i"], name("v"), print(vec![name("i")])),
    );
    let r = run(&doc);
    assert!(r.output().is_empty());
}

#[test]
fn test_string_iterates_bytes() {
    let doc = unit(
        toplevel(),
        btreemap! {},
        for_loop(&["c"], string("abc"), print(vec![name("c")])),
    );
    let r = run(&doc);
    assert_eq!(r.output(), vec!["a", "b", "c"]);
}

#[test]
fn test_string_loop_splits_multibyte_chars_into_bytes() {
    let doc = unit(
        toplevel(),
        btreemap! { "v" => vector_of(ty("String")), "n" => ty("Count") },
        list(vec![
            assign(name("n"), count(0)),
            for_loop(
                &["c"],
                string("é!"),
                list(vec![
                    assign(index(name("v"), vec![name("n")]), name("c")),
                    print(vec![json!({"t": "Size", "operand": name("c")})]),
                    incr("n"),
                ]),
            ),
        ]),
    );
    let r = run(&doc);
    assert_eq!(r.output(), vec!["1", "1", "1"]);

    let v = r.get("v");
    let v = v.as_vector().expect("vector local");
    let bytes: Vec<u8> = (0..3)
        .flat_map(|i| v.borrow().lookup(i).and_then(Val::as_bytes).map(<[u8]>::to_vec))
        .flatten()
        .collect();
    assert_eq!(bytes, "é!".as_bytes());
}

#[test]
fn test_table_binds_index() {
    let mut body = table_setup();
    body.push(for_loop(
        &["k"],
        name("t"),
        print(vec![name("k"), index(name("t"), vec![name("k")])]),
    ));
    let doc = unit(toplevel(), table_locals(), list(body));
    let r = run(&doc);
    assert_eq!(sorted(r.output()), vec!["1, one", "2, two", "3, three"]);
    assert_eq!(active_iterations(&r, "t"), 0);
}

#[test]
fn test_table_key_value_loop() {
    let mut body = table_setup();
    body.push(json!({
        "t": "For",
        "vars": [{"name": "k"}],
        "value_var": {"name": "val"},
        "iterable": name("t"),
        "body": print(vec![name("val")])
    }));
    let doc = unit(toplevel(), table_locals(), list(body));
    let r = run(&doc);
    assert_eq!(sorted(r.output()), vec!["one", "three", "two"]);
}

#[test]
fn test_composite_set_index() {
    let doc = unit(
        toplevel(),
        btreemap! { "s" => set_of(vec![ty("Count"), ty("String")]) },
        list(vec![
            add(index(name("s"), vec![count(1), string("a")])),
            add(index(name("s"), vec![count(2), string("b")])),
            for_loop(&["n", "label"], name("s"), print(vec![name("label"), name("n")])),
        ]),
    );
    let r = run(&doc);
    assert_eq!(sorted(r.output()), vec!["a, 1", "b, 2"]);
}

#[test]
fn test_break_releases_cookie() {
    let mut body = table_setup();
    body.push(for_loop(&["k"], name("t"), brk()));
    body.push(print(vec![string("after")]));
    let doc = unit(toplevel(), table_locals(), list(body));
    let r = run(&doc);
    assert_eq!(r.flow, Flow::Next);
    assert_eq!(r.output(), vec!["after"]);
    assert_eq!(active_iterations(&r, "t"), 0);
}

#[test]
fn test_return_releases_cookie_and_propagates() {
    let mut body = table_setup();
    body.push(for_loop(&["k"], name("t"), ret(Some(name("k")))));
    body.push(ret(Some(count(0))));
    let doc = unit(function(Some(ty("Count"))), table_locals(), list(body));
    let r = run(&doc);
    assert_eq!(r.flow, Flow::Return);
    assert!(matches!(r.result, Some(Val::Count(k)) if (1..=3).contains(&k)));
    assert_eq!(active_iterations(&r, "t"), 0);
}

#[test]
fn test_return_through_vector_loop_in_while() {
    let doc = unit(
        function(Some(ty("Count"))),
        btreemap! { "v" => vector_of(ty("Count")) },
        list(vec![
            assign(index(name("v"), vec![count(3)]), count(7)),
            while_loop(
                boolean(true),
                for_loop(&["i"], name("v"), ret(Some(index(name("v"), vec![name("i")])))),
            ),
            ret(Some(count(0))),
        ]),
    );
    let r = run(&doc);
    assert_eq!(r.flow, Flow::Return);
    assert_eq!(r.result, Some(Val::Count(7)));
}

#[test]
fn test_next_continues_with_following_entry() {
    let doc = unit(
        toplevel(),
        btreemap! { "v" => vector_of(ty("Count")) },
        list(vec![
            assign(index(name("v"), vec![count(0)]), count(1)),
            assign(index(name("v"), vec![count(1)]), count(2)),
            assign(index(name("v"), vec![count(2)]), count(3)),
            for_loop(
                &["i"],
                name("v"),
                list(vec![
                    if_else(bin("Eq", name("i"), count(1)), next(), None),
                    print(vec![name("i")]),
                ]),
            ),
        ]),
    );
    let r = run(&doc);
    assert_eq!(r.flow, Flow::Next);
    assert_eq!(r.output(), vec!["0", "2"]);
}

#[test]
fn test_vector_growing_during_loop_is_seen() {
    // The size is re-read every iteration
    let doc = unit(
        toplevel(),
        btreemap! { "v" => vector_of(ty("Count")) },
        list(vec![
            assign(index(name("v"), vec![count(0)]), count(0)),
            for_loop(
                &["i"],
                name("v"),
                list(vec![
                    print(vec![name("i")]),
                    if_else(
                        bin("Lt", name("i"), count(2)),
                        assign(index(name("v"), vec![bin("Add", name("i"), count(1))]), count(0)),
                        None,
                    ),
                ]),
            ),
        ]),
    );
    let r = run(&doc);
    assert_eq!(r.output(), vec!["0", "1", "2"]);
}

/* ---------- construction ---------- */

#[test]
fn test_wrong_index_arity() {
    let doc = unit(
        toplevel(),
        table_locals(),
        for_loop(&["a", "b"], name("t"), brk()),
    );
    assert!(build_err(&doc).contains("wrong index size"));
}

#[test]
fn test_vector_needs_single_variable() {
    let doc = unit(
        toplevel(),
        btreemap! { "v" => vector_of(ty("Count")) },
        for_loop(&["a", "b"], name("v"), brk()),
    );
    assert!(build_err(&doc).contains("iterating over a vector requires only a single index type"));
}

#[test]
fn test_vector_index_must_be_integral() {
    let doc = unit(
        toplevel(),
        btreemap! { "v" => vector_of(ty("Count")), "s" => ty("String") },
        for_loop(&["s"], name("v"), brk()),
    );
    assert!(build_err(&doc).contains("vector index in \"for\" loop must be integral"));
}

#[test]
fn test_string_index_must_be_string() {
    let doc = unit(
        toplevel(),
        btreemap! { "n" => ty("Count") },
        for_loop(&["n"], string("abc"), brk()),
    );
    assert!(build_err(&doc).contains("string index in \"for\" loop must be string"));
}

#[test]
fn test_non_iterable_target() {
    let doc = unit(toplevel(), btreemap! {}, for_loop(&["i"], count(5), brk()));
    assert!(build_err(&doc)
        .contains("target to iterate over must be a table, set, vector, or string"));
}

#[test]
fn test_key_value_only_over_tables() {
    let doc = unit(
        toplevel(),
        btreemap! { "v" => vector_of(ty("Count")) },
        json!({
            "t": "For",
            "vars": [{"name": "i"}],
            "value_var": {"name": "x"},
            "iterable": name("v"),
            "body": brk()
        }),
    );
    assert!(build_err(&doc).contains("key value for loops only support iteration over tables"));
}

#[test]
fn test_loop_variable_type_clash() {
    let doc = unit(
        toplevel(),
        table_locals(),
        json!({
            "t": "For",
            "vars": [{"name": "k", "type": {"t": "String"}}],
            "iterable": name("t"),
            "body": brk()
        }),
    );
    assert!(build_err(&doc).contains("type clash in iteration"));
}

#[test]
fn test_errors_accumulate() {
    let doc = unit(
        toplevel(),
        table_locals(),
        list(vec![
            for_loop(&["a", "b"], name("t"), brk()),
            for_loop(&["i"], count(5), brk()),
        ]),
    );
    assert_eq!(build_err(&doc).error_count(), 2);
}
