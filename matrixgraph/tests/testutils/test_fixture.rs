//! Test fixture for MatrixGraph integration tests
//!
//! Uses only the public server API.

use matrixgraph::{
    Config, ExecutionError, GraphServer, QueryMode, QueryOptions, QueryResult, Value,
};

/// Server plus one graph key to run queries against
pub struct TestFixture {
    server: GraphServer,
    graph: String,
}

impl TestFixture {
    /// Fixture with an empty graph
    pub fn new() -> Self {
        Self::with_config(&[])
    }

    pub fn empty() -> Self {
        Self::new()
    }

    /// Fixture whose server starts with the given `KEY value` arguments
    pub fn with_config(args: &[&str]) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut all = vec!["THREAD_COUNT", "2"];
        all.extend_from_slice(args);
        let config = Config::from_args(&all).expect("valid test configuration");
        let server = GraphServer::new(config).expect("server starts");
        let graph = format!("test_graph_{}", fastrand::u64(..));
        server.ensure_graph(&graph);
        TestFixture { server, graph }
    }

    pub fn server(&self) -> &GraphServer {
        &self.server
    }

    pub fn graph_name(&self) -> &str {
        &self.graph
    }

    /// Run a query; index populations it started finish before returning.
    pub fn query(&self, query: &str) -> Result<QueryResult, ExecutionError> {
        self.query_with(query, QueryOptions::default())
    }

    pub fn query_with(&self, query: &str, options: QueryOptions) -> Result<QueryResult, ExecutionError> {
        let response = self
            .server
            .query(&self.graph, query, QueryMode::Query, options)?;
        self.server.wait_for_indexes(&self.graph);
        Ok(response.result)
    }

    pub fn ro_query(&self, query: &str) -> Result<QueryResult, ExecutionError> {
        self.server
            .query(&self.graph, query, QueryMode::ReadOnly, QueryOptions::default())
            .map(|r| r.result)
    }

    pub fn explain(&self, query: &str) -> Vec<String> {
        self.server
            .explain(&self.graph, query)
            .unwrap_or_else(|e| panic!("EXPLAIN failed: {}\nError: {}", query, e))
    }

    pub fn profile(&self, query: &str) -> Vec<String> {
        self.server
            .query(&self.graph, query, QueryMode::Profile, QueryOptions::default())
            .map(|r| r.plan)
            .unwrap_or_else(|e| panic!("PROFILE failed: {}\nError: {}", query, e))
    }

    /// Execute query and assert success
    pub fn assert_query_succeeds(&self, query: &str) -> QueryResult {
        self.query(query)
            .unwrap_or_else(|e| panic!("Query failed: {}\nError: {}", query, e))
    }

    /// Execute query and assert failure with a message containing `expected_error`
    pub fn assert_query_fails(&self, query: &str, expected_error: &str) -> ExecutionError {
        match self.query(query) {
            Ok(_) => panic!("Query should have failed: {}", query),
            Err(e) => {
                assert!(
                    e.to_string().contains(expected_error),
                    "Expected error containing '{}', got: {}",
                    expected_error,
                    e
                );
                e
            }
        }
    }

    /// Assert the value of `column` in the first row
    pub fn assert_first_value(&self, query: &str, column: &str, expected: Value) {
        let result = self.assert_query_succeeds(query);
        assert!(!result.rows.is_empty(), "Query returned no rows: {}", query);
        let index = result
            .columns
            .iter()
            .position(|c| c == column)
            .unwrap_or_else(|| panic!("Column '{}' not found in {:?}", column, result.columns));
        let actual = &result.rows[0][index];
        assert_eq!(
            actual, &expected,
            "Column '{}': expected {:?}, got {:?}",
            column, expected, actual
        );
    }

    /// All rows of a successful query
    pub fn rows(&self, query: &str) -> Vec<Vec<Value>> {
        self.assert_query_succeeds(query).rows
    }
}

/// Values of one column by name
pub fn column(result: &QueryResult, name: &str) -> Vec<Value> {
    result
        .column(name)
        .unwrap_or_else(|| panic!("Column '{}' not found in {:?}", name, result.columns))
        .into_iter()
        .cloned()
        .collect()
}

/// Shorthand for integer rows
pub fn ints(rows: &[&[i64]]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|row| row.iter().map(|v| Value::Integer(*v)).collect())
        .collect()
}
