//! Exact-match and full-text index tests

#[path = "testutils/mod.rs"]
mod testutils;

use matrixgraph::{ErrorKind, Value};
use testutils::test_fixture::{column, ints, TestFixture};

fn uses(plan: &[String], operator: &str) -> bool {
    plan.iter().any(|line| line.trim_start().starts_with(operator))
}

#[test]
fn test_index_changes_access_path() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("UNWIND range(1, 50) AS i CREATE (:Person {age: i})");

    let query = "MATCH (p:Person) WHERE p.age = 30 RETURN p.age";
    assert!(uses(&fixture.explain(query), "Node By Label Scan"));

    let created = fixture.assert_query_succeeds("CREATE INDEX ON :Person(age)");
    assert_eq!(created.stats.indices_created, 1);

    let plan = fixture.explain(query);
    assert!(uses(&plan, "Node By Index Scan"), "plan: {:?}", plan);
    assert!(!uses(&plan, "Node By Label Scan"));
    assert_eq!(fixture.rows(query), ints(&[&[30]]));

    let dropped = fixture.assert_query_succeeds("DROP INDEX ON :Person(age)");
    assert_eq!(dropped.stats.indices_deleted, 1);
    let plan = fixture.explain(query);
    assert!(uses(&plan, "Node By Label Scan"), "plan: {:?}", plan);
    assert_eq!(fixture.rows(query), ints(&[&[30]]));
}

#[test]
fn test_index_answers_range_and_in_predicates() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE INDEX FOR (n:Item) ON (n.rank)");
    fixture.assert_query_succeeds("UNWIND range(1, 20) AS i CREATE (:Item {rank: i})");

    let range = "MATCH (n:Item) WHERE n.rank > 17 RETURN n.rank ORDER BY n.rank";
    assert!(uses(&fixture.explain(range), "Node By Index Scan"));
    assert_eq!(fixture.rows(range), ints(&[&[18], &[19], &[20]]));

    let membership = "MATCH (n:Item) WHERE n.rank IN [2, 4, 99] RETURN n.rank ORDER BY n.rank";
    assert_eq!(fixture.rows(membership), ints(&[&[2], &[4]]));
}

#[test]
fn test_index_sees_later_writes() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE INDEX ON :City(name)");
    fixture.assert_query_succeeds("CREATE (:City {name: 'Lyon'}), (:City {name: 'Oslo'})");
    fixture.assert_query_succeeds("MATCH (c:City {name: 'Oslo'}) SET c.name = 'Bergen'");
    fixture.assert_query_succeeds("MATCH (c:City {name: 'Lyon'}) DELETE c");

    let query = "MATCH (c:City) WHERE c.name = $name RETURN count(c) AS n";
    for (name, expected) in [("Lyon", 0), ("Oslo", 0), ("Bergen", 1)] {
        let options = matrixgraph::QueryOptions::default().with_parameter("name", name);
        let result = fixture.query_with(query, options).unwrap();
        assert_eq!(column(&result, "n"), vec![Value::Integer(expected)], "{}", name);
    }
}

#[test]
fn test_duplicate_and_missing_index() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE INDEX ON :L(p)");

    let err = fixture.query("CREATE INDEX ON :L(p)").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexExists);

    let err = fixture.query("DROP INDEX ON :L(q)").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexNotFound);
}

#[test]
fn test_relationship_index() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE INDEX FOR ()-[r:PAID]-() ON (r.amount)");
    fixture.assert_query_succeeds(
        "CREATE (:A {v: 1})-[:PAID {amount: 5}]->(:B {v: 2}), (:A {v: 3})-[:PAID {amount: 9}]->(:B {v: 4})",
    );
    let rows = fixture.rows("MATCH (a)-[r:PAID]->(b) WHERE r.amount = 9 RETURN a.v, b.v");
    assert_eq!(rows, ints(&[&[3, 4]]));
}

#[test]
fn test_db_indexes_lists_definitions() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE INDEX ON :Person(first, last)");

    let result = fixture.assert_query_succeeds(
        "CALL db.indexes() YIELD label, properties, types, entitytype, status \
         RETURN label, properties, types, entitytype, status",
    );
    assert_eq!(result.rows.len(), 1);
    let row = &result.rows[0];
    assert_eq!(row[0], Value::from("Person"));
    assert_eq!(row[1], Value::from(vec!["first", "last"]));
    assert_eq!(row[3], Value::from("NODE"));
    assert_eq!(row[4], Value::from("OPERATIONAL"));
}

#[test]
fn test_fulltext_index_lifecycle() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (:Movie {title: 'The Matrix'}), \
                (:Movie {title: 'The Matrix Reloaded'}), \
                (:Movie {title: 'Heat'})",
    );

    let created = fixture.assert_query_succeeds("CALL db.idx.fulltext.createNodeIndex('Movie', 'title')");
    assert_eq!(created.stats.indices_created, 1);

    let rows = fixture.rows(
        "CALL db.idx.fulltext.queryNodes('Movie', 'matrix') YIELD node \
         RETURN node.title ORDER BY node.title",
    );
    assert_eq!(
        rows,
        vec![
            vec![Value::from("The Matrix")],
            vec![Value::from("The Matrix Reloaded")],
        ]
    );

    let rows = fixture.rows(
        "CALL db.idx.fulltext.queryNodes('Movie', 'reload*') YIELD node, score \
         RETURN node.title, score > 0",
    );
    assert_eq!(rows, vec![vec![Value::from("The Matrix Reloaded"), Value::Boolean(true)]]);

    // "the" is a default stopword
    let rows = fixture.rows("CALL db.idx.fulltext.queryNodes('Movie', 'the') YIELD node RETURN node");
    assert!(rows.is_empty());

    fixture.assert_query_succeeds("CREATE (:Movie {title: 'Heat Wave'})");
    let rows = fixture.rows(
        "CALL db.idx.fulltext.queryNodes('Movie', 'heat') YIELD node RETURN count(node)",
    );
    assert_eq!(rows, ints(&[&[2]]));

    let dropped = fixture.assert_query_succeeds("CALL db.idx.fulltext.drop('Movie')");
    assert_eq!(dropped.stats.indices_deleted, 1);
    fixture.assert_query_fails(
        "CALL db.idx.fulltext.queryNodes('Movie', 'heat') YIELD node RETURN node",
        "no full-text index",
    );
}

#[test]
fn test_fulltext_custom_stopwords() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:Doc {body: 'alpha beta'}), (:Doc {body: 'gamma'})");
    fixture.assert_query_succeeds(
        "CALL db.idx.fulltext.createNodeIndex({label: 'Doc', stopwords: ['alpha']}, 'body')",
    );

    let rows = fixture.rows("CALL db.idx.fulltext.queryNodes('Doc', 'alpha') YIELD node RETURN node");
    assert!(rows.is_empty());
    let rows = fixture.rows("CALL db.idx.fulltext.queryNodes('Doc', 'beta') YIELD node RETURN node.body");
    assert_eq!(rows, vec![vec![Value::from("alpha beta")]]);
}
