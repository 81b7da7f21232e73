//! End-to-end query scenarios
//!
//! Each test builds a small graph through the public server API and checks
//! exact result rows.

#[path = "testutils/mod.rs"]
mod testutils;

use matrixgraph::{ErrorKind, Value};
use testutils::test_fixture::{column, ints, TestFixture};

#[test]
fn test_single_hop_traversal() {
    let fixture = TestFixture::new();
    let created = fixture.assert_query_succeeds("CREATE (:L {v:1})-[:R]->(:L {v:2})");
    assert_eq!(created.stats.nodes_created, 2);
    assert_eq!(created.stats.relationships_created, 1);
    assert_eq!(created.stats.properties_set, 2);

    let rows = fixture.rows("MATCH (a)-[]->(b) RETURN a.v, b.v");
    assert_eq!(rows, ints(&[&[1, 2]]));
}

#[test]
fn test_union_all_keeps_branch_order_and_limits() {
    let fixture = TestFixture::new();
    let rows = fixture.rows(
        "UNWIND [1,2,3] AS i RETURN i LIMIT 1 \
         UNION ALL \
         UNWIND [1,2,3] AS i RETURN i ORDER BY i DESC",
    );
    assert_eq!(rows, ints(&[&[1], &[3], &[2], &[1]]));
}

#[test]
fn test_union_removes_duplicates() {
    let fixture = TestFixture::new();
    let rows = fixture.rows("UNWIND [1,2,2] AS x RETURN x UNION UNWIND [2,3] AS x RETURN x");
    assert_eq!(rows, ints(&[&[1], &[2], &[3]]));
}

#[test]
fn test_all_shortest_paths() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (v1 {v:1}), (v2 {v:2}), (v3 {v:3}), (v4 {v:4}), (v5 {v:5}), \
         (v1)-[:E]->(v2), (v2)-[:E]->(v3), (v3)-[:E]->(v4), \
         (v1)-[:E]->(v5), (v5)-[:E]->(v4), \
         (v2)-[:E]->(v4)",
    );

    let rows = fixture.rows(
        "MATCH p = allShortestPaths((a {v:1})-[*]->(b {v:4})) \
         RETURN [n IN nodes(p) | n.v] AS vs ORDER BY nodes(p)",
    );
    assert_eq!(
        rows,
        vec![
            vec![Value::from(vec![1i64, 2, 4])],
            vec![Value::from(vec![1i64, 5, 4])],
        ]
    );
}

#[test]
fn test_co_actors_filtered_by_age() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (c:person {name:'Cameron Diaz', age:40}), \
                (x:person {name:'X', age:35}), \
                (y:person {name:'Y', age:45}), \
                (z:person {name:'Z', age:20}), \
                (m:movie {title:'M'}), \
                (other:movie {title:'Other'}), \
                (c)-[:act]->(m), (x)-[:act]->(m), (y)-[:act]->(m), \
                (z)-[:act]->(other)",
    );

    let result = fixture.assert_query_succeeds(
        "MATCH (c:person {name:'Cameron Diaz'})-[:act]->(m)<-[:act]-(a) \
         WHERE a.age < c.age RETURN a.name",
    );
    assert_eq!(column(&result, "a.name"), vec![Value::from("X")]);
}

#[test]
fn test_nan_never_equals_itself() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE ()");

    let equal = fixture.rows("MATCH (n) WHERE 0.0/0.0 = 0.0/0.0 RETURN n");
    assert!(equal.is_empty());

    let not_equal = fixture.rows("MATCH (n) WHERE 0.0/0.0 <> 0.0/0.0 RETURN 1");
    assert_eq!(not_equal, ints(&[&[1]]));
}

#[test]
fn test_return_star_without_variables() {
    let fixture = TestFixture::new();
    let err = fixture.query("RETURN *").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoVariablesInScope);

    let rows = fixture.rows("UNWIND [1, 2] AS x RETURN * ORDER BY x");
    assert_eq!(rows, ints(&[&[1], &[2]]));
}

#[test]
fn test_aggregate_defaults_on_empty_input() {
    let fixture = TestFixture::new();
    let result = fixture.assert_query_succeeds(
        "MATCH (n:Missing) RETURN count(n) AS c, min(n.v) AS mn, max(n.v) AS mx, \
         sum(n.v) AS s, avg(n.v) AS a, stDev(n.v) AS sd, stDevP(n.v) AS sdp, \
         collect(n.v) AS col, percentileDisc(n.v, 0.5) AS pd, percentileCont(n.v, 0.5) AS pc",
    );
    assert_eq!(result.rows.len(), 1);
    let row = &result.rows[0];
    assert_eq!(row[0], Value::Integer(0));
    assert!(row[1].is_null());
    assert!(row[2].is_null());
    assert_eq!(row[3], Value::Integer(0));
    assert!(row[4].is_null());
    assert_eq!(row[5].as_f64(), Some(0.0));
    assert_eq!(row[6].as_f64(), Some(0.0));
    assert_eq!(row[7], Value::List(Vec::new()));
    assert!(row[8].is_null());
    assert!(row[9].is_null());
}

#[test]
fn test_grouped_aggregation() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "UNWIND range(1, 6) AS i CREATE (:N {group: i % 2, v: i})",
    );
    let rows = fixture.rows(
        "MATCH (n:N) RETURN n.group AS g, count(*) AS c, sum(n.v) AS s, collect(n.v) AS vs \
         ORDER BY g",
    );
    assert_eq!(
        rows,
        vec![
            vec![
                Value::Integer(0),
                Value::Integer(3),
                Value::Integer(12),
                Value::from(vec![2i64, 4, 6])
            ],
            vec![
                Value::Integer(1),
                Value::Integer(3),
                Value::Integer(9),
                Value::from(vec![1i64, 3, 5])
            ],
        ]
    );
}

#[test]
fn test_with_pipeline_and_pagination() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("UNWIND range(1, 10) AS i CREATE (:N {v: i})");
    let rows = fixture.rows(
        "MATCH (n:N) WITH n.v AS v WHERE v % 2 = 0 \
         RETURN v ORDER BY v DESC SKIP 1 LIMIT 2",
    );
    assert_eq!(rows, ints(&[&[8], &[6]]));

    fixture.assert_first_value(
        "MATCH (n:N) WITH count(n) AS total RETURN total * 2 AS doubled",
        "doubled",
        Value::Integer(20),
    );
}

#[test]
fn test_optional_match_null_extends() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:P {name: 'a'})-[:K]->(:P {name: 'b'}), (:P {name: 'c'})");
    let rows = fixture.rows(
        "MATCH (p:P) OPTIONAL MATCH (p)-[:K]->(q) RETURN p.name, q.name ORDER BY p.name",
    );
    assert_eq!(
        rows,
        vec![
            vec![Value::from("a"), Value::from("b")],
            vec![Value::from("b"), Value::Null],
            vec![Value::from("c"), Value::Null],
        ]
    );
}

#[test]
fn test_variable_length_traversal() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (:S {v: 0})-[:E]->({v: 1})-[:E]->({v: 2})-[:E]->({v: 3})",
    );
    let rows = fixture.rows("MATCH (:S)-[:E*2..3]->(x) RETURN x.v ORDER BY x.v");
    assert_eq!(rows, ints(&[&[2], &[3]]));

    let rows = fixture.rows("MATCH p = (:S)-[:E*]->(x {v: 3}) RETURN length(p)");
    assert_eq!(rows, ints(&[&[3]]));

    // without a type list every relationship is walked
    let rows = fixture.rows("MATCH (:S)-[*]->(x) RETURN x.v ORDER BY x.v");
    assert_eq!(rows, ints(&[&[1], &[2], &[3]]));
    let rows = fixture.rows("MATCH (a:S)-[*0..]->(b) RETURN count(b)");
    assert_eq!(rows, ints(&[&[4]]));

    // an unknown type still matches the zero-hop walk
    let rows = fixture.rows("MATCH (:S)-[:MISSING*0..2]->(x) RETURN x.v");
    assert_eq!(rows, ints(&[&[0]]));
}

#[test]
fn test_shortest_path_in_return() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (a:A {v: 1})-[:E]->(b {v: 2})-[:E]->(c:C {v: 3}), (a)-[:E]->(c)",
    );
    let rows = fixture.rows(
        "MATCH (a:A), (c:C) RETURN length(shortestPath((a)-[:E*]->(c))) AS hops",
    );
    assert_eq!(rows, ints(&[&[1]]));
}

#[test]
fn test_pattern_predicate_and_comprehension() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:P {n: 1})-[:K]->(:P {n: 2}), (:P {n: 3})");
    let rows = fixture.rows("MATCH (p:P) WHERE (p)-[:K]->() RETURN p.n");
    assert_eq!(rows, ints(&[&[1]]));

    let rows = fixture.rows("RETURN [x IN range(1, 5) WHERE x % 2 = 1 | x * 10] AS xs");
    assert_eq!(rows, vec![vec![Value::from(vec![10i64, 30, 50])]]);

    let rows = fixture.rows("MATCH (p:P) RETURN p.n, [(p)-[:K]->(q) | q.n] AS next ORDER BY p.n");
    assert_eq!(
        rows,
        vec![
            vec![Value::Integer(1), Value::from(vec![2i64])],
            vec![Value::Integer(2), Value::List(vec![])],
            vec![Value::Integer(3), Value::List(vec![])],
        ]
    );

    let rows = fixture.rows(
        "MATCH (p:P {n: 1}) RETURN [w = (p)-[:K]->(q) WHERE q.n > 1 | length(w)] AS lens, \
                [(p)-[:K]->(q) WHERE q.n > 5 | q.n] AS missing",
    );
    assert_eq!(rows, vec![vec![Value::from(vec![1i64]), Value::List(vec![])]]);
}

#[test]
fn test_case_and_string_predicates() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (:W {w: 'apple'}), (:W {w: 'banana'}), (:W {w: 'cherry'})",
    );
    let rows = fixture.rows(
        "MATCH (n:W) WHERE n.w STARTS WITH 'b' OR n.w ENDS WITH 'y' OR n.w =~ 'ap.*' \
         RETURN CASE WHEN n.w CONTAINS 'an' THEN 'has-an' ELSE n.w END AS r ORDER BY r",
    );
    assert_eq!(
        rows,
        vec![
            vec![Value::from("apple")],
            vec![Value::from("cherry")],
            vec![Value::from("has-an")],
        ]
    );
}

#[test]
fn test_cypher_parameters() {
    let fixture = TestFixture::new();
    fixture.assert_first_value("CYPHER x=40 RETURN $x + 2 AS v", "v", Value::Integer(42));

    let options = matrixgraph::QueryOptions::default().with_parameter("name", "ann");
    let result = fixture
        .query_with("RETURN toUpper($name) AS n", options)
        .unwrap();
    assert_eq!(result.rows, vec![vec![Value::from("ANN")]]);
}
