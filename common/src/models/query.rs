//! SQL query models.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// One result row keyed by column name.
pub type Row = Map<String, Value>;

/// Outcome of one query execution.
///
/// Every row holds exactly one entry per column; duplicate column names are
/// disambiguated when the result is built.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Row>,
    execution_time: Duration,
}

impl QueryResult {
    /// Builds a result from driver-reported column names and decoded rows.
    ///
    /// `rows` holds one value per column, in column order.
    pub fn from_values<I>(columns: I, rows: Vec<Vec<Value>>, execution_time: Duration) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let columns = unique_column_names(columns);
        let rows = rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect::<Row>())
            .collect();
        Self {
            columns,
            rows,
            execution_time,
        }
    }

    /// Creates a result with no columns and no rows.
    pub fn empty(execution_time: Duration) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            execution_time,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }
}

/// Makes column names unique so every row map keeps one key per column.
///
/// The first occurrence keeps its name, later ones get `_1`, `_2`, ...
fn unique_column_names<I>(names: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(names.len());
    let mut unique = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{name}_{suffix}");
            suffix += 1;
        }
        unique.push(candidate);
    }
    unique
}

/// Query result for API responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueryResultResponse {
    /// Column names in driver order.
    pub columns: Vec<String>,

    /// Rows keyed by column name.
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Row>,

    /// Number of rows returned.
    pub row_count: usize,

    /// Query execution time in milliseconds.
    pub execution_time_ms: u64,
}

impl From<QueryResult> for QueryResultResponse {
    fn from(result: QueryResult) -> Self {
        Self {
            row_count: result.rows.len(),
            execution_time_ms: result.execution_time.as_millis() as u64,
            columns: result.columns,
            rows: result.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_are_keyed_by_column() {
        let result = QueryResult::from_values(
            ["id", "name"],
            vec![vec![json!(1), json!("a")], vec![json!(2), json!(null)]],
            Duration::from_millis(3),
        );
        assert_eq!(result.columns(), ["id", "name"]);
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.rows()[0]["id"], json!(1));
        assert_eq!(result.rows()[1]["name"], Value::Null);
    }

    #[test]
    fn test_duplicate_columns_keep_one_key_per_column() {
        let result = QueryResult::from_values(
            ["a", "a", "a_1"],
            vec![vec![json!(1), json!(2), json!(3)]],
            Duration::ZERO,
        );
        assert_eq!(result.columns(), ["a", "a_1", "a_1_1"]);
        for row in result.rows() {
            assert_eq!(row.len(), result.columns().len());
        }
    }

    #[test]
    fn test_response_conversion() {
        let result = QueryResult::from_values(
            ["?column?"],
            vec![vec![json!(1)]],
            Duration::from_millis(15),
        );
        let response = QueryResultResponse::from(result);
        assert_eq!(response.row_count, 1);
        assert_eq!(response.execution_time_ms, 15);
        assert_eq!(response.rows[0]["?column?"], json!(1));
    }
}
