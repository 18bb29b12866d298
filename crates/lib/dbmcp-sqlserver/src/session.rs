//! Operation surface of a live SQL Server handle.

use std::future::Future;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::SqlServerError;

/// One result row keyed by column name.
pub type JsonRow = Map<String, Value>;

pub(crate) const LIST_TABLES_SQL: &str = "
    SELECT
        TABLE_SCHEMA,
        TABLE_NAME,
        TABLE_TYPE
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_SCHEMA, TABLE_NAME
";

pub(crate) const DESCRIBE_TABLE_SQL: &str = "
    SELECT
        COLUMN_NAME,
        DATA_TYPE,
        CHARACTER_MAXIMUM_LENGTH,
        IS_NULLABLE,
        COLUMN_DEFAULT,
        ORDINAL_POSITION
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_NAME = @P1
    ORDER BY ORDINAL_POSITION
";

pub(crate) const ROW_COUNT_SQL: &str = "SELECT @@ROWCOUNT";

/// Outcome of an arbitrary statement batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSummary {
    /// Row count reported for the batch's final statement.
    pub rows_affected: Vec<u64>,
    /// First result set the batch produced, empty when it produced none.
    pub recordset: Vec<JsonRow>,
}

/// Statements the SQL tools run against one backend.
pub trait SqlSession: Send + Sync + 'static {
    /// Runs a statement and returns its first result set.
    fn select(&self, sql: &str) -> impl Future<Output = Result<Vec<JsonRow>, SqlServerError>> + Send;

    /// Runs any statement batch and reports affected rows and the first
    /// result set.
    fn execute(&self, sql: &str) -> impl Future<Output = Result<ExecuteSummary, SqlServerError>> + Send;

    /// Lists base tables ordered by schema and name.
    fn list_tables(&self) -> impl Future<Output = Result<Vec<JsonRow>, SqlServerError>> + Send;

    /// Lists the columns of `table` in ordinal order; unknown tables yield
    /// no rows.
    fn describe_table(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<JsonRow>, SqlServerError>> + Send;
}

/// Read-only guard for the query tool: the trimmed, lowercased statement
/// must start with `select`.
#[must_use]
pub fn is_read_query(sql: &str) -> bool {
    sql.trim().to_lowercase().starts_with("select")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_statements_pass() {
        assert!(is_read_query("SELECT * FROM t"));
        assert!(is_read_query("  SELECT * FROM t"));
        assert!(is_read_query("\n\tselect id from users"));
        assert!(is_read_query("Select 1"));
    }

    #[test]
    fn other_statements_are_rejected() {
        assert!(!is_read_query("insert into t values (1)"));
        assert!(!is_read_query("DROP TABLE t"));
        assert!(!is_read_query("WITH cte AS (SELECT 1) SELECT * FROM cte"));
        assert!(!is_read_query("   "));
        assert!(!is_read_query(""));
    }

    #[test]
    fn only_the_leading_keyword_is_checked() {
        assert!(is_read_query("selectivity_report"));
        assert!(is_read_query("SELECT 1; DROP TABLE t"));
    }
}
