use super::*;
use crate::interpreter::builder::load_unit_json;

// ============================================================================
// Helpers
// ============================================================================

fn validate(json: &str) -> Vec<ValidationError> {
    let unit = load_unit_json(json).expect("unit should build");
    validate_unit(&unit)
}

fn for_rule<'a>(errors: &'a [ValidationError], rule_id: &str) -> Vec<&'a ValidationError> {
    errors.iter().filter(|e| e.rule_id == rule_id).collect()
}

fn has_rule(errors: &[ValidationError], rule_id: &str) -> bool {
    errors.iter().any(|e| e.rule_id == rule_id)
}

fn vector_loop(var: &str, body: &str) -> String {
    format!(
        r#"{{
            "name": "loop",
            "locals": [
                {{"name": "v", "type": {{"t": "Vector", "elem": {{"t": "Count"}}}}}},
                {{"name": "n", "type": {{"t": "Count"}}}}
            ],
            "body": {{
                "t": "For",
                "vars": [{{"name": "{}"}}],
                "iterable": {{"t": "Name", "name": "v"}},
                "body": {},
                "span": {{"start_line": 3, "start_col": 4, "end_line": 5, "end_col": 1}}
            }}
        }}"#,
        var, body
    )
}

// ============================================================================
// Unused variable
// ============================================================================

#[test]
fn test_unused_loop_variable() {
    let errors = validate(&vector_loop("i", r#"{"t": "Next"}"#));
    let unused = for_rule(&errors, "unused-variable");
    assert_eq!(unused.len(), 1);
    assert!(unused[0].message.contains("'i'"));
    assert_eq!(unused[0].severity, Severity::Warning);
    assert_eq!(unused[0].span.start_line, 3);
}

#[test]
fn test_used_loop_variable() {
    let body = r#"{"t": "Expr", "expr": {
        "t": "Assign",
        "target": {"t": "Name", "name": "n"},
        "value": {"t": "Name", "name": "i"}
    }}"#;
    let errors = validate(&vector_loop("i", body));
    assert!(!has_rule(&errors, "unused-variable"));
}

#[test]
fn test_underscore_loop_variable_is_exempt() {
    let errors = validate(&vector_loop("_i", r#"{"t": "Next"}"#));
    assert!(!has_rule(&errors, "unused-variable"));
}

#[test]
fn test_unused_type_case_binding() {
    let json = r#"{
        "name": "types",
        "locals": [{"name": "a", "type": {"t": "Any"}}],
        "body": {
            "t": "Switch",
            "expr": {"t": "Name", "name": "a"},
            "cases": [{
                "types": [{"type": {"t": "Count"}, "binding": "c",
                           "span": {"start_line": 7, "start_col": 9, "end_line": 7, "end_col": 20}}],
                "body": {"t": "Break"}
            }]
        }
    }"#;
    let errors = validate(json);
    let unused = for_rule(&errors, "unused-variable");
    assert_eq!(unused.len(), 1);
    assert!(unused[0].message.contains("'c'"));
    assert_eq!(unused[0].span.start_line, 7);
}

// ============================================================================
// Unreachable code
// ============================================================================

#[test]
fn test_statement_after_break_is_unreachable() {
    let body = r#"{"t": "List", "body": [
        {"t": "Break"},
        {"t": "Print", "args": [{"t": "Name", "name": "i"}],
         "span": {"start_line": 4, "start_col": 8, "end_line": 4, "end_col": 16}}
    ]}"#;
    let errors = validate(&vector_loop("i", body));
    let unreachable = for_rule(&errors, "unreachable-code");
    assert_eq!(unreachable.len(), 1);
    assert_eq!(unreachable[0].span.start_line, 4);
    assert!(unreachable[0].message.contains("break"));
}

#[test]
fn test_terminator_at_end_is_fine() {
    let body = r#"{"t": "List", "body": [
        {"t": "Print", "args": [{"t": "Name", "name": "i"}]},
        {"t": "Next"}
    ]}"#;
    let errors = validate(&vector_loop("i", body));
    assert!(errors.is_empty(), "unexpected: {:?}", errors);
}

#[test]
fn test_only_first_unreachable_statement_reported() {
    let json = r#"{
        "name": "f",
        "kind": {"t": "Function", "yield_type": {"t": "Count"}},
        "body": {"t": "List", "body": [
            {"t": "Return", "value": {"t": "Const", "value": {"t": "Count", "v": 1}}},
            {"t": "Print", "args": [{"t": "Const", "value": {"t": "Str", "v": "a"}}]},
            {"t": "Print", "args": [{"t": "Const", "value": {"t": "Str", "v": "b"}}]}
        ]}
    }"#;
    let errors = validate(json);
    assert_eq!(for_rule(&errors, "unreachable-code").len(), 1);
}

// ============================================================================
// Validator
// ============================================================================

#[test]
fn test_warnings_are_not_errors() {
    let unit = load_unit_json(&vector_loop("i", r#"{"t": "Next"}"#)).unwrap();
    assert!(!validate_unit(&unit).is_empty());
    assert!(!has_errors(&unit));
}

#[test]
fn test_rules_listed() {
    let ids: Vec<_> = Validator::new().rules().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["unreachable-code", "unused-variable"]);
}

#[test]
fn test_display() {
    let err = ValidationError::warning(Span::new(2, 4, 2, 9), "oops", "unused-variable");
    assert_eq!(
        err.to_string(),
        "warning at line 2, col 4: oops [unused-variable]"
    );
}
