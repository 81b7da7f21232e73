//! Read query tests: expressions, functions, ordering and procedures

#[path = "testutils/mod.rs"]
mod testutils;

use matrixgraph::Value;
use testutils::test_fixture::{column, ints, TestFixture};

fn strings(values: &[&str]) -> Vec<Vec<Value>> {
    values.iter().map(|v| vec![Value::from(*v)]).collect()
}

#[test]
fn test_three_valued_logic() {
    let fixture = TestFixture::new();
    let rows = fixture.rows(
        "RETURN null AND false, null AND true, null OR true, null OR false, \
                null XOR true, NOT null, true XOR false",
    );
    assert_eq!(
        rows,
        vec![vec![
            Value::Boolean(false),
            Value::Null,
            Value::Boolean(true),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Boolean(true),
        ]]
    );
}

#[test]
fn test_list_arithmetic_and_slicing() {
    let fixture = TestFixture::new();
    let rows = fixture.rows(
        "WITH [1, 2, 3, 4, 5] AS l \
         RETURN l + 6 AS appended, 0 + [1] AS prepended, [1] + [2, 3] AS joined, \
                l[-1] AS last, l[1..3] AS middle, l[-2..] AS tail, l[10] AS missing",
    );
    assert_eq!(
        rows,
        vec![vec![
            Value::from(vec![1i64, 2, 3, 4, 5, 6]),
            Value::from(vec![0i64, 1]),
            Value::from(vec![1i64, 2, 3]),
            Value::Integer(5),
            Value::from(vec![2i64, 3]),
            Value::from(vec![4i64, 5]),
            Value::Null,
        ]]
    );
}

#[test]
fn test_mixed_type_ordering() {
    let fixture = TestFixture::new();
    let result = fixture.assert_query_succeeds(
        "UNWIND [null, 2, 'b', true, [1], 1.5, {k: 1}, 'a'] AS v RETURN v ORDER BY v",
    );
    assert_eq!(
        column(&result, "v"),
        vec![
            Value::from("a"),
            Value::from("b"),
            Value::Boolean(true),
            Value::Float(1.5),
            Value::Integer(2),
            Value::from(vec![1i64]),
            Value::Map(vec![("k".to_string(), Value::Integer(1))]),
            Value::Null,
        ]
    );
}

#[test]
fn test_distinct_and_count_distinct() {
    let fixture = TestFixture::new();
    let rows = fixture.rows("UNWIND [1, 1, 2, null, 2, 3] AS x RETURN DISTINCT x ORDER BY x");
    assert_eq!(rows, vec![vec![Value::Integer(1)], vec![Value::Integer(2)], vec![Value::Integer(3)], vec![Value::Null]]);

    let rows = fixture.rows("UNWIND [3, null, 1] AS x RETURN DISTINCT x AS y ORDER BY y DESC");
    assert_eq!(rows, vec![vec![Value::Null], vec![Value::Integer(3)], vec![Value::Integer(1)]]);

    let rows = fixture.rows("UNWIND [2, 1, 2, 3] AS x WITH DISTINCT x ORDER BY x LIMIT 2 RETURN x");
    assert_eq!(rows, ints(&[&[1], &[2]]));

    let rows = fixture.rows(
        "UNWIND [1, 1, 2, null, 2, 3] AS x RETURN count(DISTINCT x) AS d, count(x) AS n, count(*) AS total",
    );
    assert_eq!(rows, ints(&[&[3, 5, 6]]));
}

#[test]
fn test_string_functions() {
    let fixture = TestFixture::new();
    let rows = fixture.rows(
        "RETURN toUpper('ab'), toLower('AB'), trim('  x  '), left('hello', 2), right('hello', 3), \
                substring('hello', 1, 3), replace('aXbX', 'X', '-'), split('a,b,c', ','), \
                reverse('abc'), toString(12), size('four')",
    );
    assert_eq!(
        rows,
        vec![vec![
            Value::from("AB"),
            Value::from("ab"),
            Value::from("x"),
            Value::from("he"),
            Value::from("llo"),
            Value::from("ell"),
            Value::from("a-b-"),
            Value::from(vec!["a", "b", "c"]),
            Value::from("cba"),
            Value::from("12"),
            Value::Integer(4),
        ]]
    );
}

#[test]
fn test_integer_overflow_wraps() {
    let fixture = TestFixture::new();
    let rows = fixture.rows(
        "RETURN abs(-9223372036854775808), 9223372036854775807 + 1, -9223372036854775808 - 1",
    );
    assert_eq!(rows, ints(&[&[i64::MIN, i64::MIN, i64::MAX]]));
}

#[test]
fn test_numeric_functions() {
    let fixture = TestFixture::new();
    let rows = fixture.rows(
        "RETURN abs(-3), ceil(1.2), floor(1.8), round(2.5), sign(-7), sqrt(16), \
                toInteger('42'), toFloat('1.5'), toInteger(3.9), 7 % 3, 2 ^ 3",
    );
    assert_eq!(
        rows,
        vec![vec![
            Value::Integer(3),
            Value::Float(2.0),
            Value::Float(1.0),
            Value::Float(3.0),
            Value::Integer(-1),
            Value::Float(4.0),
            Value::Integer(42),
            Value::Float(1.5),
            Value::Integer(3),
            Value::Integer(1),
            Value::Float(8.0),
        ]]
    );
}

#[test]
fn test_list_functions_and_quantifiers() {
    let fixture = TestFixture::new();
    let rows = fixture.rows(
        "WITH [3, 1, 2] AS l \
         RETURN head(l), last(l), tail(l), size(l), range(0, 10, 5), \
                any(x IN l WHERE x > 2), all(x IN l WHERE x > 0), \
                none(x IN l WHERE x > 5), single(x IN l WHERE x = 1), \
                coalesce(null, l[5], 'fallback'), 2 IN l",
    );
    assert_eq!(
        rows,
        vec![vec![
            Value::Integer(3),
            Value::Integer(2),
            Value::from(vec![1i64, 2]),
            Value::Integer(3),
            Value::from(vec![0i64, 5, 10]),
            Value::Boolean(true),
            Value::Boolean(true),
            Value::Boolean(true),
            Value::Boolean(true),
            Value::from("fallback"),
            Value::Boolean(true),
        ]]
    );
}

#[test]
fn test_graph_functions() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:A:B {x: 1})-[:R {w: 2}]->(:C)");
    let rows = fixture.rows(
        "MATCH (a:A)-[r]->(c) \
         RETURN labels(a), type(r), properties(r), startNode(r) = a, endNode(r) = c, \
                hasLabels(a, ['A', 'B']), outdegree(a), indegree(c), indegree(a)",
    );
    assert_eq!(
        rows,
        vec![vec![
            Value::from(vec!["A", "B"]),
            Value::from("R"),
            Value::Map(vec![("w".to_string(), Value::Integer(2))]),
            Value::Boolean(true),
            Value::Boolean(true),
            Value::Boolean(true),
            Value::Integer(1),
            Value::Integer(1),
            Value::Integer(0),
        ]]
    );
}

#[test]
fn test_simple_and_generic_case() {
    let fixture = TestFixture::new();
    let rows = fixture.rows(
        "UNWIND [1, 2, 3] AS x \
         RETURN CASE x WHEN 1 THEN 'one' WHEN 2 THEN 'two' ELSE 'many' END AS simple, \
                CASE WHEN x > 1 THEN 'big' END AS generic",
    );
    assert_eq!(
        rows,
        vec![
            vec![Value::from("one"), Value::Null],
            vec![Value::from("two"), Value::from("big")],
            vec![Value::from("many"), Value::from("big")],
        ]
    );
}

#[test]
fn test_map_literals_and_access() {
    let fixture = TestFixture::new();
    let rows = fixture.rows("WITH {a: 1, b: {c: 'deep'}} AS m RETURN m.a, m.b.c, m.missing, keys(m)");
    assert_eq!(
        rows,
        vec![vec![
            Value::Integer(1),
            Value::from("deep"),
            Value::Null,
            Value::from(vec!["a", "b"]),
        ]]
    );
}

#[test]
fn test_undirected_and_multi_type_traversal() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (a:N {v: 1})-[:X]->(b:N {v: 2}), (b)-[:Y]->(c:N {v: 3}), (c)-[:Z]->(a)",
    );
    let rows = fixture.rows("MATCH (n:N {v: 2})-[:X|Y]-(m) RETURN m.v ORDER BY m.v");
    assert_eq!(rows, ints(&[&[1], &[3]]));

    let rows = fixture.rows("MATCH (n:N {v: 1})<-[]-(m) RETURN m.v");
    assert_eq!(rows, ints(&[&[3]]));
}

#[test]
fn test_fixed_length_hops_may_reuse_relationships() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (a:U)-[:R]->(b:U)");
    // a-b-a and b-a-b, both over the single edge
    let rows = fixture.rows("MATCH (x)-[r1]-(y)-[r2]-(z) RETURN count(*)");
    assert_eq!(rows, ints(&[&[2]]));

    // variable-length walks never repeat an edge
    let rows = fixture.rows("MATCH (x)-[*2]-(z) RETURN count(*)");
    assert_eq!(rows, ints(&[&[0]]));
}

#[test]
fn test_expand_into_bound_endpoints() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (a:P {n: 'a'})-[:F]->(b:P {n: 'b'}), (a)-[:F]->(c:P {n: 'c'}), (b)-[:F]->(c)",
    );
    let query = "MATCH (x:P)-[:F]->(y:P)-[:F]->(z:P), (x)-[:F]->(z) RETURN x.n, y.n, z.n";
    let plan = fixture.explain(query);
    assert!(plan.iter().any(|l| l.trim_start().starts_with("Expand Into")), "{:?}", plan);
    assert_eq!(
        fixture.rows(query),
        vec![vec![Value::from("a"), Value::from("b"), Value::from("c")]]
    );
}

#[test]
fn test_cartesian_product() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:L {v: 1}), (:L {v: 2}), (:R {v: 10}), (:R {v: 20})");
    let rows = fixture.rows("MATCH (l:L), (r:R) RETURN l.v + r.v AS s ORDER BY s");
    assert_eq!(rows, ints(&[&[11], &[12], &[21], &[22]]));
}

#[test]
fn test_pattern_comprehension_size() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (h:Hub {name: 'h'}), (h)-[:E]->(:Leaf), (h)-[:E]->(:Leaf), (:Hub {name: 'lonely'})",
    );
    let rows = fixture.rows(
        "MATCH (h:Hub) RETURN h.name, size((h)-[:E]->()) AS degree ORDER BY h.name",
    );
    assert_eq!(
        rows,
        vec![
            vec![Value::from("h"), Value::Integer(2)],
            vec![Value::from("lonely"), Value::Integer(0)],
        ]
    );
}

#[test]
fn test_schema_procedures() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:Person {name: 'a'})-[:KNOWS {since: 1}]->(:City)");

    let rows = fixture.rows("CALL db.labels() YIELD label RETURN label ORDER BY label");
    assert_eq!(rows, strings(&["City", "Person"]));

    let rows = fixture.rows("CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType");
    assert_eq!(rows, strings(&["KNOWS"]));

    let rows = fixture.rows("CALL db.propertyKeys() YIELD propertyKey RETURN propertyKey ORDER BY propertyKey");
    assert_eq!(rows, strings(&["name", "since"]));
}

#[test]
fn test_page_rank() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (a:Page {n: 'a'}), (b:Page {n: 'b'}), (c:Page {n: 'c'}), \
                (a)-[:LINKS]->(c), (b)-[:LINKS]->(c), (c)-[:LINKS]->(a)",
    );
    let result = fixture.assert_query_succeeds(
        "CALL algo.pageRank('Page', 'LINKS') YIELD node, score \
         RETURN node.n AS n, score ORDER BY score DESC",
    );
    assert_eq!(column(&result, "n")[0], Value::from("c"));
    let total: f64 = column(&result, "score").iter().filter_map(Value::as_f64).sum();
    assert!((total - 1.0).abs() < 1e-3, "scores sum to {}", total);
}

#[test]
fn test_weighted_shortest_path_procedure() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (a:S {n: 'a'})-[:R {cost: 1}]->(b:S {n: 'b'})-[:R {cost: 1}]->(c:S {n: 'c'}), \
                (a)-[:R {cost: 5}]->(c)",
    );
    let rows = fixture.rows(
        "MATCH (a:S {n: 'a'}), (c:S {n: 'c'}) \
         CALL algo.shortestPath(a, c, {relTypes: ['R'], weightProp: 'cost'}) YIELD path, pathWeight \
         RETURN [n IN nodes(path) | n.n] AS hops, pathWeight",
    );
    assert_eq!(
        rows,
        vec![vec![Value::from(vec!["a", "b", "c"]), Value::Float(2.0)]]
    );

    let rows = fixture.rows(
        "MATCH (a:S {n: 'a'}), (c:S {n: 'c'}) \
         CALL algo.shortestPath(a, c) YIELD path RETURN length(path)",
    );
    assert_eq!(rows, ints(&[&[1]]));
}

#[test]
fn test_bfs_procedure() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (r:Root)-[:T]->(:Lvl {d: 1})-[:T]->(:Lvl {d: 2})-[:T]->(:Lvl {d: 3})",
    );
    let rows = fixture.rows(
        "MATCH (r:Root) CALL algo.BFS(r, 2, 'T') YIELD nodes, edges \
         RETURN [n IN nodes | n.d] AS depths, size(edges) AS hops",
    );
    assert_eq!(
        rows,
        vec![vec![Value::from(vec![1i64, 2]), Value::Integer(2)]]
    );
}
