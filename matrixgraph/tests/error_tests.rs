//! Error message and error kind tests
//!
//! Clients match on the leading words of these messages, so each test pins
//! the text a failing query reports.

#[path = "testutils/mod.rs"]
mod testutils;

use matrixgraph::{ErrorKind, QueryMode, QueryOptions};
use testutils::test_fixture::TestFixture;

#[test]
fn test_parse_errors() {
    let fixture = TestFixture::new();

    let err = fixture.assert_query_fails("MATCH (n RETURN n", "Invalid input");
    assert_eq!(err.kind(), ErrorKind::Parse);

    let err = fixture.assert_query_fails("RETURN 12abc", "Invalid numeric value");
    assert_eq!(err.kind(), ErrorKind::Parse);

    let err = fixture.assert_query_fails("   ", "empty query");
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn test_unknown_identifiers_and_functions() {
    let fixture = TestFixture::new();

    let err = fixture.assert_query_fails("MATCH (n) RETURN m", "not defined");
    assert_eq!(err.kind(), ErrorKind::UnknownIdentifier);

    let err = fixture.assert_query_fails("RETURN noSuchFunction(1)", "Unknown function");
    assert_eq!(err.kind(), ErrorKind::UnknownFunction);

    let err = fixture.assert_query_fails("CALL db.nothing()", "is not registered");
    assert_eq!(err.kind(), ErrorKind::UnknownFunction);
}

#[test]
fn test_type_mismatch() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:T {v: 1})");

    let err = fixture.assert_query_fails("MATCH (n:T) RETURN n + 1", "Type mismatch");
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);

    fixture.assert_query_fails("UNWIND [1, 2] AS x RETURN x LIMIT 'a'", "expected Integer");
}

#[test]
fn test_integer_division_by_zero() {
    let fixture = TestFixture::new();
    let err = fixture.assert_query_fails("RETURN 1 / 0", "Division by zero");
    assert_eq!(err.kind(), ErrorKind::DivisionByZero);

    let rows = fixture.rows("RETURN 1.0 / 0 AS v");
    assert_eq!(rows[0][0].as_f64(), Some(f64::INFINITY));
}

#[test]
fn test_projection_errors() {
    let fixture = TestFixture::new();

    fixture.assert_query_fails("UNWIND [1] AS x WITH x + 1 RETURN x", "must be aliased");
    fixture.assert_query_fails(
        "UNWIND [1] AS x RETURN x UNION UNWIND [1] AS y RETURN y",
        "must have the same column names",
    );
    fixture.assert_query_fails(
        "RETURN 1 AS a UNION RETURN 1 AS a UNION ALL RETURN 1 AS a",
        "Invalid combination",
    );
    fixture.assert_query_fails(
        "UNWIND [1] AS x RETURN sum(count(x))",
        "Can't use aggregate functions inside of aggregate functions",
    );
    fixture.assert_query_fails(
        "MATCH (n) WHERE count(n) > 1 RETURN n",
        "Invalid use of aggregating function",
    );
    fixture.assert_query_fails("RETURN 1 AS a RETURN 2 AS b", "RETURN can only be used at the end");
}

#[test]
fn test_pattern_errors() {
    let fixture = TestFixture::new();

    fixture.assert_query_fails(
        "MATCH (a)-[r]->(b), (c)-[r]->(d) RETURN a",
        "may not be referenced in multiple patterns",
    );
    fixture.assert_query_fails(
        "MATCH (a) CREATE (a:Other)",
        "can't be redeclared",
    );
    fixture.assert_query_fails("CREATE (a)-[:R]-(b)", "Only directed relationships");
    fixture.assert_query_fails(
        "MATCH (a), (b) WHERE shortestPath((a)-[*]->(b)) IS NOT NULL RETURN a",
        "RedisGraph currently only supports shortestPath in WITH or RETURN clauses",
    );
}

#[test]
fn test_set_requires_map() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:S)");
    fixture.assert_query_fails("MATCH (n:S) SET n = 1", "expected a map");
}

#[test]
fn test_empty_key_and_read_only() {
    let fixture = TestFixture::new();
    let server = fixture.server();

    let err = server
        .query("missing_key", "MATCH (n) RETURN n", QueryMode::ReadOnly, QueryOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyKey);
    assert_eq!(err.to_string(), "Invalid graph operation on empty key");

    let err = fixture.ro_query("CREATE (:X)").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnlyViolation);
}

#[test]
fn test_failed_query_leaves_graph_unchanged() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:R {v: 1})");

    fixture.assert_query_fails("MATCH (n:R) CREATE (:R {v: 2}) WITH n RETURN 1 / 0", "Division by zero");

    let rows = fixture.rows("MATCH (n:R) RETURN count(n)");
    assert_eq!(rows[0][0], matrixgraph::Value::Integer(1));
}
