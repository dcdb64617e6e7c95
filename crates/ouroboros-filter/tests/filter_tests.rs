//! Query filtering tests
//!
//! Every test passes its own error handling so nothing here depends on the
//! process-wide default.

use std::sync::Arc;

use ouroboros_filter::{
    process_query, ConfigOverride, ErrorHandling, FieldSpec, FilterError, ViolationKind,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

fn silent() -> ConfigOverride {
    ConfigOverride::new().error_handling(ErrorHandling::silent())
}

fn raising() -> ConfigOverride {
    ConfigOverride::new().error_handling(ErrorHandling::raise())
}

fn clean(query: Value, policy: ConfigOverride) -> Value {
    process_query(&query, &policy).unwrap()
}

// ============================================================================
// Basic Filtering
// ============================================================================

#[test]
fn test_simple_field() {
    let result = clean(json!({"age": 18}), silent().allowed_fields(["age"]));
    assert_eq!(result, json!({"age": 18}));
}

#[test]
fn test_explicit_operator() {
    let result = clean(json!({"age": {"$gt": 18}}), silent().allowed_fields(["age"]));
    assert_eq!(result, json!({"age": {"$gt": 18}}));
}

#[test]
fn test_multiple_operators() {
    let query = json!({"age": {"$gt": 18, "$lt": 50}});
    let result = clean(query.clone(), silent().allowed_fields(["age"]));
    assert_eq!(result, query);
}

#[test]
fn test_removes_forbidden_field() {
    let result = clean(json!({"age": 18}), silent().allowed_fields(Vec::<FieldSpec>::new()));
    assert_eq!(result, json!({}));
}

#[test]
fn test_logical_and() {
    let result = clean(json!({"$and": [{"age": 18}]}), silent().allowed_fields(["age"]));
    assert_eq!(result, json!({"$and": [{"age": 18}]}));
}

#[test]
fn test_nested_logical_operators() {
    let query = json!({
        "$or": [
            {"$and": [{"age": {"$gte": 18}}, {"ssn": "123"}]},
            {"name": "K"}
        ]
    });
    let result = clean(query, silent().allowed_fields(["age", "name"]));
    assert_eq!(
        result,
        json!({"$or": [{"$and": [{"age": {"$gte": 18}}, {}]}, {"name": "K"}]})
    );
}

#[test]
fn test_values_kept_verbatim() {
    let query = json!({"tags": {"$in": ["a", {"$gt": 1}, null]}});
    let result = clean(query.clone(), silent().allowed_fields(["tags"]));
    assert_eq!(result, query);
}

// ============================================================================
// Explicit Operator Permissions
// ============================================================================

#[test]
fn test_eq_allowed() {
    let policy = silent().allowed_fields([FieldSpec::with_operators("age", [("$eq", true)])]);
    assert_eq!(clean(json!({"age": 18}), policy), json!({"age": 18}));
}

#[test]
fn test_eq_forbidden() {
    let policy = silent().allowed_fields([FieldSpec::with_operators("age", [("$eq", false)])]);
    assert_eq!(clean(json!({"age": 18}), policy), json!({}));
}

#[test]
fn test_not_with_eq_allowed() {
    let query = json!({"age": {"$not": {"$eq": 18}}});
    let policy = silent().allowed_fields([FieldSpec::with_operators(
        "age",
        [("$not", true), ("$eq", true)],
    )]);
    assert_eq!(clean(query.clone(), policy), query);
}

#[test]
fn test_not_with_eq_forbidden() {
    let policy = silent().allowed_fields([FieldSpec::with_operators(
        "age",
        [("$not", true), ("$eq", false)],
    )]);
    assert_eq!(clean(json!({"age": {"$not": {"$eq": 18}}}), policy), json!({}));
}

#[test]
fn test_not_forbidden_with_eq_allowed() {
    let policy = silent().allowed_fields([FieldSpec::with_operators(
        "age",
        [("$not", false), ("$eq", true)],
    )]);
    assert_eq!(clean(json!({"age": {"$not": {"$eq": 18}}}), policy), json!({}));
}

#[test]
fn test_not_with_plain_operand() {
    let policy = silent().allowed_fields([FieldSpec::with_operators(
        "name",
        [("$not", true), ("$eq", true)],
    )]);
    let query = json!({"name": {"$not": "K"}});
    assert_eq!(clean(query.clone(), policy), query);
}

// ============================================================================
// $elemMatch
// ============================================================================

#[test]
fn test_elem_match_forbidden() {
    let policy =
        silent().allowed_fields([FieldSpec::with_operators("results", [("$elemMatch", false)])]);
    let query = json!({"results": {"$elemMatch": {"$gt": 30, "$lt": 50}}});
    assert_eq!(clean(query, policy), json!({}));
}

#[test]
fn test_elem_match_without_inner_operators() {
    let policy =
        silent().allowed_fields([FieldSpec::with_operators("results", [("$elemMatch", true)])]);
    let query = json!({"results": {"$elemMatch": {"$gt": 30, "$lt": 50}}});
    assert_eq!(clean(query, policy), json!({}));
}

#[test]
fn test_elem_match_allowed() {
    let policy = silent().allowed_fields([FieldSpec::with_operators(
        "results",
        [("$elemMatch", true), ("$gt", true), ("$lt", true)],
    )]);
    let query = json!({"results": {"$elemMatch": {"$gt": 30, "$lt": 50}}});
    assert_eq!(clean(query.clone(), policy), query);
}

#[test]
fn test_nested_elem_match_without_nested_field() {
    let policy =
        silent().allowed_fields([FieldSpec::with_operators("results", [("$elemMatch", true)])]);
    let query = json!({"results": {"$elemMatch": {"rate": 1}}});
    assert_eq!(clean(query, policy), json!({}));
}

#[test]
fn test_nested_elem_match_with_nested_field() {
    let policy = silent().allowed_fields([
        FieldSpec::with_operators("results", [("$elemMatch", true)]),
        FieldSpec::with_operators("results.rate", [("$eq", true)]),
    ]);
    let query = json!({"results": {"$elemMatch": {"rate": 1}}});
    assert_eq!(clean(query.clone(), policy), query);
}

#[test]
fn test_nested_elem_match_every_member_must_pass() {
    let policy = silent().allowed_fields([
        FieldSpec::with_operators("results", [("$elemMatch", true)]),
        FieldSpec::with_operators("results.rate", [("$eq", true)]),
    ]);
    let query = json!({"results": {"$elemMatch": {"rate": 1, "secret": 2}}});
    assert_eq!(clean(query, policy), json!({}));
}

#[test]
fn test_nested_elem_match_recurses() {
    let policy = silent().allowed_fields([
        FieldSpec::with_operators("orders", [("$elemMatch", true)]),
        FieldSpec::with_operators("orders.items", [("$elemMatch", true)]),
        FieldSpec::with_operators("orders.items.sku", [("$eq", true)]),
    ]);
    let query = json!({"orders": {"$elemMatch": {"items": {"$elemMatch": {"sku": "A1"}}}}});
    assert_eq!(clean(query.clone(), policy), query);
}

// ============================================================================
// Nested Fields
// ============================================================================

#[test]
fn test_dotted_field_operator_forbidden() {
    let policy =
        silent().allowed_fields([FieldSpec::with_operators("emails.sent", [("$eq", true)])]);
    let query = json!({"emails.sent": {"$gt": "2024-01-01T00:00:00Z"}});
    assert_eq!(clean(query, policy), json!({}));
}

#[test]
fn test_dotted_field_operator_allowed() {
    let policy =
        silent().allowed_fields([FieldSpec::with_operators("emails.sent", [("$gt", true)])]);
    let query = json!({"emails.sent": {"$gt": "2024-01-01T00:00:00Z"}});
    assert_eq!(clean(query.clone(), policy), query);
}

// ============================================================================
// Top-Level Operators
// ============================================================================

#[test]
fn test_expr_forbidden() {
    let query = json!({"$expr": {"$lt": ["$spent", "$received"]}});
    let policy = silent()
        .allowed_fields(Vec::<FieldSpec>::new())
        .top_level_operator("$expr", false);
    assert_eq!(clean(query, policy), json!({}));
}

#[test]
fn test_expr_omitted_is_forbidden() {
    let query = json!({"$expr": {"$lt": ["$spent", "$received"]}});
    assert_eq!(clean(query, silent()), json!({}));
}

#[test]
fn test_expr_allowed() {
    let query = json!({"$expr": {"$lt": ["$spent", "$received"]}});
    let policy = silent()
        .allowed_fields(Vec::<FieldSpec>::new())
        .top_level_operator("$expr", true);
    assert_eq!(clean(query.clone(), policy), query);
}

// ============================================================================
// Multiple Fields
// ============================================================================

fn multiple_fields_query() -> Value {
    json!({"age": 18, "name": {"$gt": "K"}})
}

fn multiple_fields_with_text() -> Value {
    json!({"age": 18, "name": {"$gt": "K"}, "$text": {"$gt": ["$a", "$b"]}})
}

#[test]
fn test_multiple_fields() {
    let policy = silent().allowed_fields([
        FieldSpec::with_operators("age", [("$eq", true)]),
        FieldSpec::name("name"),
    ]);
    assert_eq!(clean(multiple_fields_query(), policy), multiple_fields_query());
}

#[test]
fn test_multiple_fields_partial() {
    let policy = silent().allowed_fields([FieldSpec::with_operators("age", [("$eq", true)])]);
    assert_eq!(clean(multiple_fields_query(), policy), json!({"age": 18}));
}

#[test]
fn test_multiple_fields_all_filtered() {
    let policy = silent().allowed_fields([FieldSpec::with_operators("name", [("$eq", true)])]);
    assert_eq!(clean(multiple_fields_query(), policy), json!({}));
}

#[test]
fn test_text_allowed() {
    let policy = silent()
        .allowed_fields([
            FieldSpec::with_operators("age", [("$eq", true)]),
            FieldSpec::name("name"),
        ])
        .top_level_operator("$text", true);
    assert_eq!(clean(multiple_fields_with_text(), policy), multiple_fields_with_text());
}

#[test]
fn test_text_forbidden() {
    let policy = silent()
        .allowed_fields([
            FieldSpec::with_operators("age", [("$eq", true)]),
            FieldSpec::name("name"),
        ])
        .top_level_operator("$text", false);
    assert_eq!(clean(multiple_fields_with_text(), policy), multiple_fields_query());
}

// ============================================================================
// Raise Mode
// ============================================================================

fn raise_message(query: Value, policy: ConfigOverride) -> String {
    match process_query(&query, &policy) {
        Err(err) => err.to_string(),
        Ok(value) => panic!("expected an error, got {value}"),
    }
}

#[test]
fn test_throws_on_forbidden_field() {
    let message = raise_message(json!({"age": 18}), raising());
    assert_eq!(message, "Field age not allowed by schema.");
}

#[test]
fn test_throws_on_forbidden_operator() {
    let policy = raising().allowed_fields([FieldSpec::with_operators("age", [("$eq", false)])]);
    let message = raise_message(json!({"age": 18}), policy);
    assert_eq!(message, "Operator(s) $eq for field age are not allowed.");
}

#[test]
fn test_throws_on_elem_match_nested_field() {
    let policy =
        raising().allowed_fields([FieldSpec::with_operators("results", [("$elemMatch", true)])]);
    let message = raise_message(json!({"results": {"$elemMatch": {"age": 18}}}), policy);
    assert_eq!(message, "Field results.age not allowed by schema.");
}

#[test]
fn test_throws_on_top_level_operator() {
    let policy =
        raising().allowed_fields([FieldSpec::with_operators("results", [("$elemMatch", true)])]);
    let message = raise_message(json!({"$expr": {}}), policy);
    assert_eq!(message, "Operator $expr not allowed.");
}

#[test]
fn test_throws_inside_array_operator_names_field() {
    let message = raise_message(json!({"$or": [{"age": {"$gt": 18}}]}), raising());
    assert!(message.contains("Field age"));
    assert!(!message.contains("$or"));
}

#[test]
fn test_raised_error_carries_violation() {
    let err = process_query(&json!({"age": 18}), &raising()).unwrap_err();
    let violation = err.violation().unwrap();
    assert_eq!(violation.context.kind, ViolationKind::Field);
    assert_eq!(violation.context.value, json!(18));
    assert!(!err.is_structural());
}

// ============================================================================
// Structural Errors
// ============================================================================

#[test]
fn test_query_must_be_object() {
    for query in [json!(null), json!(3), json!("age"), json!([{"age": 1}])] {
        let err = process_query(&query, &silent()).unwrap_err();
        assert!(matches!(err, FilterError::NotAnObject));
    }
}

#[test]
fn test_logical_operator_requires_array_in_every_mode() {
    let calls = Arc::new(Mutex::new(0usize));
    let counter = calls.clone();
    let callback = ConfigOverride::new()
        .error_handling(ErrorHandling::callback(move |_| *counter.lock() += 1));

    for policy in [silent(), raising(), callback] {
        let err = process_query(&json!({"$or": {"age": 1}}), &policy).unwrap_err();
        assert!(err.is_structural());
    }
    assert_eq!(*calls.lock(), 0);
}

// ============================================================================
// Callback Mode
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Seen {
    message: String,
    field: String,
    value: Value,
    kind: ViolationKind,
}

fn recording() -> (ConfigOverride, Arc<Mutex<Vec<Seen>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let policy = ConfigOverride::new().error_handling(ErrorHandling::callback(move |event| {
        assert!(event.config.error_handling.on_error.is_some());
        sink.lock().push(Seen {
            message: event.message.to_string(),
            field: event.context.field_name.clone(),
            value: event.context.value.clone(),
            kind: event.context.kind,
        });
    }));
    (policy, seen)
}

#[test]
fn test_callback_on_forbidden_field() {
    let (policy, seen) = recording();
    let result = clean(json!({"age": 18}), policy.allowed_fields(Vec::<FieldSpec>::new()));

    assert_eq!(result, json!({}));
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].message, "Field age not allowed by schema.");
    assert_eq!(seen[0].field, "age");
    assert_eq!(seen[0].value, json!(18));
}

#[test]
fn test_callback_reports_each_clause_once() {
    let (policy, seen) = recording();
    let policy = policy.allowed_fields([
        FieldSpec::with_operators("age", [("$not", true), ("$eq", false)]),
        FieldSpec::with_operators("results", [("$elemMatch", false)]),
        FieldSpec::name("name"),
    ]);
    let query = json!({
        "age": {"$not": {"$eq": 18}},
        "results": {"$elemMatch": {"rate": 1}},
        "name": "K",
        "$where": "true",
        "$and": [{"ssn": 1}]
    });

    let result = clean(query, policy);
    assert_eq!(result, json!({"name": "K", "$and": [{}]}));

    let seen = seen.lock();
    let fields: Vec<_> = seen.iter().map(|s| s.field.as_str()).collect();
    assert_eq!(fields, vec!["age", "results", "$where", "ssn"]);
    assert_eq!(seen[1].kind, ViolationKind::Operator);
    assert_eq!(
        seen[1].message,
        "Operator(s) $elemMatch for field results are not allowed."
    );
    assert_eq!(seen[2].message, "Operator $where not allowed.");
}

#[test]
fn test_callback_not_called_when_everything_allowed() {
    let (policy, seen) = recording();
    let result = clean(json!({"age": 18}), policy.allowed_fields(["age"]));
    assert_eq!(result, json!({"age": 18}));
    assert!(seen.lock().is_empty());
}
