//! Mutation tests: CREATE, MERGE, SET, REMOVE, DELETE and constraints

#[path = "testutils/mod.rs"]
mod testutils;

use matrixgraph::storage::{ConstraintDefinition, ConstraintKind, ConstraintStatus, EntityKind};
use matrixgraph::{ErrorKind, Value};
use testutils::test_fixture::{column, ints, TestFixture};

#[test]
fn test_merge_is_idempotent() {
    let fixture = TestFixture::new();

    let first = fixture.assert_query_succeeds("MERGE (n:Person {name: 'Ann'}) RETURN n.name");
    assert_eq!(first.stats.nodes_created, 1);
    assert_eq!(first.stats.labels_added, 1);

    let second = fixture.assert_query_succeeds("MERGE (n:Person {name: 'Ann'}) RETURN n.name");
    assert_eq!(second.stats.nodes_created, 0);
    assert_eq!(column(&second, "n.name"), vec![Value::from("Ann")]);

    fixture.assert_first_value("MATCH (n:Person) RETURN count(n) AS c", "c", Value::Integer(1));
}

#[test]
fn test_merge_on_create_and_on_match() {
    let fixture = TestFixture::new();
    let query = "MERGE (n:Counter {id: 1}) \
                 ON CREATE SET n.hits = 1 \
                 ON MATCH SET n.hits = n.hits + 1 \
                 RETURN n.hits AS hits";

    fixture.assert_first_value(query, "hits", Value::Integer(1));
    fixture.assert_first_value(query, "hits", Value::Integer(2));
    fixture.assert_first_value(query, "hits", Value::Integer(3));
}

#[test]
fn test_merge_relationship_between_bound_nodes() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:A {id: 1}), (:B {id: 2})");

    let query = "MATCH (a:A), (b:B) MERGE (a)-[r:LINK]->(b) RETURN type(r) AS t";
    let first = fixture.assert_query_succeeds(query);
    assert_eq!(first.stats.relationships_created, 1);
    let second = fixture.assert_query_succeeds(query);
    assert_eq!(second.stats.relationships_created, 0);
    assert_eq!(column(&second, "t"), vec![Value::from("LINK")]);
}

#[test]
fn test_set_and_remove_properties() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:P {a: 1, b: 2})");

    let result = fixture.assert_query_succeeds("MATCH (n:P) SET n.c = n.a + n.b, n.a = null");
    assert_eq!(result.stats.properties_set, 1);
    assert_eq!(result.stats.properties_removed, 1);

    let rows = fixture.rows("MATCH (n:P) RETURN n.a, n.b, n.c");
    assert_eq!(rows, vec![vec![Value::Null, Value::Integer(2), Value::Integer(3)]]);

    fixture.assert_query_succeeds("MATCH (n:P) REMOVE n.b");
    let rows = fixture.rows("MATCH (n:P) RETURN keys(n) AS k");
    assert_eq!(rows, vec![vec![Value::from(vec!["c"])]]);
}

#[test]
fn test_set_whole_map_and_merge_map() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:M {a: 1, b: 2})");

    fixture.assert_query_succeeds("MATCH (n:M) SET n += {b: 20, c: 30}");
    let rows = fixture.rows("MATCH (n:M) RETURN n.a, n.b, n.c");
    assert_eq!(rows, ints(&[&[1, 20, 30]]));

    fixture.assert_query_succeeds("MATCH (n:M) SET n = {z: 9}");
    let rows = fixture.rows("MATCH (n:M) RETURN n.a, n.z");
    assert_eq!(rows, vec![vec![Value::Null, Value::Integer(9)]]);
}

#[test]
fn test_set_label() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:First {v: 1})");

    let result = fixture.assert_query_succeeds("MATCH (n:First) SET n:Second");
    assert_eq!(result.stats.labels_added, 1);

    fixture.assert_first_value("MATCH (n:Second) RETURN n.v AS v", "v", Value::Integer(1));
    let rows = fixture.rows("MATCH (n:First) RETURN labels(n) AS l");
    assert_eq!(rows, vec![vec![Value::from(vec!["First", "Second"])]]);
}

#[test]
fn test_delete_node_cascades_to_edges() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds(
        "CREATE (a:D {v: 1})-[:R]->(b:D {v: 2}), (b)-[:R]->(c:D {v: 3}), (a)-[:R]->(c)",
    );

    let result = fixture.assert_query_succeeds("MATCH (n:D {v: 2}) DELETE n");
    assert_eq!(result.stats.nodes_deleted, 1);
    assert_eq!(result.stats.relationships_deleted, 2);

    let rows = fixture.rows("MATCH (a)-[:R]->(b) RETURN a.v, b.v");
    assert_eq!(rows, ints(&[&[1, 3]]));

    fixture.assert_query_succeeds("MATCH (n:D) DETACH DELETE n");
    fixture.assert_first_value("MATCH (n) RETURN count(n) AS c", "c", Value::Integer(0));
}

#[test]
fn test_delete_relationship_only() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE (:E {v: 1})-[:R]->(:E {v: 2})");
    let result = fixture.assert_query_succeeds("MATCH ()-[r:R]->() DELETE r");
    assert_eq!(result.stats.relationships_deleted, 1);
    assert_eq!(result.stats.nodes_deleted, 0);
    fixture.assert_first_value("MATCH (n:E) RETURN count(n) AS c", "c", Value::Integer(2));
}

#[test]
fn test_writes_visible_later_in_same_query() {
    let fixture = TestFixture::new();
    let rows = fixture.rows(
        "CREATE (:V {v: 1}) WITH 1 AS ignored MATCH (n:V) RETURN count(n) AS c",
    );
    assert_eq!(rows, ints(&[&[1]]));
}

#[test]
fn test_unwind_create_batch() {
    let fixture = TestFixture::new();
    let result = fixture.assert_query_succeeds(
        "UNWIND range(1, 100) AS i CREATE (:B {v: i})",
    );
    assert_eq!(result.stats.nodes_created, 100);
    assert_eq!(result.stats.properties_set, 100);
    fixture.assert_first_value("MATCH (n:B) RETURN sum(n.v) AS s", "s", Value::Integer(5050));
}

#[test]
fn test_graph_version_tracks_schema() {
    let fixture = TestFixture::new();
    let before = fixture.assert_query_succeeds("RETURN 1").graph_version;
    let after = fixture
        .assert_query_succeeds("CREATE (:NewLabel {newKey: 1})")
        .graph_version;
    assert!(after > before);
    let unchanged = fixture.assert_query_succeeds("MATCH (n:NewLabel) RETURN n").graph_version;
    assert_eq!(unchanged, after);
}

fn unique_person_name() -> ConstraintDefinition {
    ConstraintDefinition {
        kind: ConstraintKind::Unique,
        entity: EntityKind::Node,
        label: "Person".to_string(),
        properties: vec!["name".to_string()],
    }
}

#[test]
fn test_unique_constraint_rejects_duplicates() {
    let fixture = TestFixture::new();
    fixture.assert_query_succeeds("CREATE INDEX ON :Person(name)");
    fixture.assert_query_succeeds("CREATE (:Person {name: 'Ann'})");

    let status = fixture
        .server()
        .create_constraint(fixture.graph_name(), unique_person_name())
        .unwrap();
    assert_eq!(status, ConstraintStatus::Operational);

    let err = fixture.assert_query_fails(
        "CREATE (:Person {name: 'Ann'})",
        "unique constraint violation",
    );
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    fixture.assert_first_value("MATCH (n:Person) RETURN count(n) AS c", "c", Value::Integer(1));

    fixture.assert_query_succeeds("CREATE (:Person {name: 'Bob'})");

    let rows = fixture.rows("CALL db.constraints() YIELD type, label, status RETURN type, label, status");
    assert_eq!(
        rows,
        vec![vec![
            Value::from("UNIQUE"),
            Value::from("Person"),
            Value::from("OPERATIONAL"),
        ]]
    );

    fixture
        .server()
        .drop_constraint(fixture.graph_name(), &unique_person_name())
        .unwrap();
    fixture.assert_query_succeeds("CREATE (:Person {name: 'Ann'})");
}

#[test]
fn test_unique_constraint_requires_index() {
    let fixture = TestFixture::new();
    let err = fixture
        .server()
        .create_constraint(fixture.graph_name(), unique_person_name())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}

#[test]
fn test_mandatory_constraint() {
    let fixture = TestFixture::new();
    let definition = ConstraintDefinition {
        kind: ConstraintKind::Mandatory,
        entity: EntityKind::Node,
        label: "Doc".to_string(),
        properties: vec!["title".to_string()],
    };
    let status = fixture
        .server()
        .create_constraint(fixture.graph_name(), definition)
        .unwrap();
    assert_eq!(status, ConstraintStatus::Operational);

    let err = fixture.assert_query_fails("CREATE (:Doc {body: 'x'})", "mandatory constraint violation");
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    fixture.assert_query_succeeds("CREATE (:Doc {title: 't'})");
    fixture.assert_query_fails("MATCH (d:Doc) REMOVE d.title", "mandatory constraint violation");
    fixture.assert_first_value("MATCH (d:Doc) RETURN d.title AS t", "t", Value::from("t"));
}
