//! Relational tool set served by `sqlserver-mcpd`.

use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use dbmcp_core::envelope::{parse_args, render};
use dbmcp_core::{BackendInventory, Connector, Gateway, GatewayError};
use dbmcp_sqlserver::{JsonRow, SqlServerConfig, SqlSession, is_read_query};
use rmcp::model::{
    CallToolRequestParams,
    CallToolResult,
    JsonObject,
    ListToolsResult,
    PaginatedRequestParams,
    ServerCapabilities,
    ServerInfo,
    Tool,
};
use rmcp::schemars;
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData, ServerHandler};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{NoParams, TargetParams, input_schema, text_result};

const SERVER_INSTRUCTIONS: &str = r"sqlserver-mcpd exposes the SQL Server databases listed in its configuration file.

Every tool accepts an optional `database` naming a configured entry; without it the default database is used.
Call `sql_databases` to see the configured names and the default.

- `sql_query` runs SELECT statements only.
- `sql_execute` runs any other statement (INSERT, UPDATE, DELETE, DDL, EXEC) and returns any rows it produces.
- `sql_tables` and `sql_describe` inspect the schema.
- `sql_connection_info` reports connection parameters without connecting.

Results are JSON text. Failures are returned as text starting with `Error: `.";

/// Parameters for `sql_query` and `sql_execute`.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct StatementParams {
    /// SQL text to run.
    pub query: String,
    /// Configured database name; the default database is used when omitted.
    pub database: Option<String>,
}

/// Parameters for `sql_describe`.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct DescribeParams {
    /// Table name to describe.
    pub table: String,
    /// Configured database name; the default database is used when omitted.
    pub database: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryOutput {
    database: String,
    row_count: usize,
    data: Vec<JsonRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteOutput {
    database: String,
    rows_affected: Vec<u64>,
    output: JsonRow,
    recordset: Vec<JsonRow>,
}

#[derive(Debug, Serialize)]
struct TablesOutput {
    database: String,
    tables: Vec<JsonRow>,
}

#[derive(Debug, Serialize)]
struct DescribeOutput {
    database: String,
    table: String,
    columns: Vec<JsonRow>,
}

#[derive(Debug, Serialize)]
struct ConnectionInfo {
    database: String,
    server: String,
    port: u16,
    user: String,
    connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SqlTool {
    Query,
    Execute,
    Tables,
    Describe,
    ConnectionInfo,
    Databases,
}

impl SqlTool {
    const ALL: [Self; 6] = [
        Self::Query,
        Self::Execute,
        Self::Tables,
        Self::Describe,
        Self::ConnectionInfo,
        Self::Databases,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::Query => "sql_query",
            Self::Execute => "sql_execute",
            Self::Tables => "sql_tables",
            Self::Describe => "sql_describe",
            Self::ConnectionInfo => "sql_connection_info",
            Self::Databases => "sql_databases",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::Query => "Run a SQL SELECT query against the selected database.",
            Self::Execute => {
                "Run a SQL command (INSERT, UPDATE, DELETE, CREATE, etc.) against the selected database."
            }
            Self::Tables => "List all base tables in the selected database.",
            Self::Describe => "Describe the columns of a table in the selected database.",
            Self::ConnectionInfo => "Show connection information for the selected database.",
            Self::Databases => "List every configured database and the default one.",
        }
    }

    fn schema(self) -> Arc<JsonObject> {
        match self {
            Self::Query | Self::Execute => input_schema::<StatementParams>(),
            Self::Tables | Self::ConnectionInfo => input_schema::<TargetParams>(),
            Self::Describe => input_schema::<DescribeParams>(),
            Self::Databases => input_schema::<NoParams>(),
        }
    }
}

impl FromStr for SqlTool {
    type Err = GatewayError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| GatewayError::UnknownTool(name.to_string()))
    }
}

static CATALOGUE: LazyLock<Vec<Tool>> = LazyLock::new(|| {
    SqlTool::ALL
        .into_iter()
        .map(|tool| Tool::new(tool.name(), tool.description(), tool.schema()))
        .collect()
});

/// MCP server for the SQL Server backend family.
pub struct SqlServerMcp<K: Connector> {
    gateway: Arc<Gateway<K>>,
}

impl<K: Connector> Clone for SqlServerMcp<K> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
        }
    }
}

impl<K> SqlServerMcp<K>
where
    K: Connector<Config = SqlServerConfig>,
    K::Handle: SqlSession,
{
    #[must_use]
    pub const fn new(gateway: Arc<Gateway<K>>) -> Self {
        Self { gateway }
    }

    #[must_use]
    pub const fn gateway(&self) -> &Arc<Gateway<K>> {
        &self.gateway
    }

    /// Runs one tool invocation and returns its envelope text.
    pub async fn invoke(&self, name: &str, arguments: Option<JsonObject>) -> String {
        if self.gateway.is_closing() {
            return render::<()>(Err(GatewayError::ShuttingDown));
        }
        let tool = match name.parse::<SqlTool>() {
            Ok(tool) => tool,
            Err(err) => return render::<()>(Err(err)),
        };
        debug!(tool = name, "tool invoked");
        match tool {
            SqlTool::Query => render(self.query(arguments).await),
            SqlTool::Execute => render(self.execute(arguments).await),
            SqlTool::Tables => render(self.tables(arguments).await),
            SqlTool::Describe => render(self.describe(arguments).await),
            SqlTool::ConnectionInfo => render(self.connection_info(arguments).await),
            SqlTool::Databases => render(self.databases(arguments)),
        }
    }

    async fn query(&self, arguments: Option<JsonObject>) -> Result<QueryOutput, GatewayError> {
        let params: StatementParams = parse_args(SqlTool::Query.name(), arguments)?;
        if !is_read_query(&params.query) {
            return Err(GatewayError::NotAReadQuery {
                tool: SqlTool::Query.name(),
                fallback: SqlTool::Execute.name(),
            });
        }
        let (database, session) = self.gateway.connect(params.database.as_deref()).await?;
        let data = session
            .select(&params.query)
            .await
            .map_err(GatewayError::backend)?;
        Ok(QueryOutput {
            database,
            row_count: data.len(),
            data,
        })
    }

    async fn execute(&self, arguments: Option<JsonObject>) -> Result<ExecuteOutput, GatewayError> {
        let params: StatementParams = parse_args(SqlTool::Execute.name(), arguments)?;
        let (database, session) = self.gateway.connect(params.database.as_deref()).await?;
        let summary = session
            .execute(&params.query)
            .await
            .map_err(GatewayError::backend)?;
        Ok(ExecuteOutput {
            database,
            rows_affected: summary.rows_affected,
            output: JsonRow::new(),
            recordset: summary.recordset,
        })
    }

    async fn tables(&self, arguments: Option<JsonObject>) -> Result<TablesOutput, GatewayError> {
        let params: TargetParams = parse_args(SqlTool::Tables.name(), arguments)?;
        let (database, session) = self.gateway.connect(params.database.as_deref()).await?;
        let tables = session.list_tables().await.map_err(GatewayError::backend)?;
        Ok(TablesOutput { database, tables })
    }

    async fn describe(&self, arguments: Option<JsonObject>) -> Result<DescribeOutput, GatewayError> {
        let params: DescribeParams = parse_args(SqlTool::Describe.name(), arguments)?;
        let (database, session) = self.gateway.connect(params.database.as_deref()).await?;
        let columns = session
            .describe_table(&params.table)
            .await
            .map_err(GatewayError::backend)?;
        Ok(DescribeOutput {
            database,
            table: params.table,
            columns,
        })
    }

    async fn connection_info(
        &self,
        arguments: Option<JsonObject>,
    ) -> Result<ConnectionInfo, GatewayError> {
        let params: TargetParams = parse_args(SqlTool::ConnectionInfo.name(), arguments)?;
        let (database, config, connected) = self.gateway.describe(params.database.as_deref()).await?;
        Ok(ConnectionInfo {
            database,
            server: config.server.clone(),
            port: config.port,
            user: config.user.clone(),
            connected,
        })
    }

    fn databases(&self, arguments: Option<JsonObject>) -> Result<BackendInventory, GatewayError> {
        let NoParams {} = parse_args(SqlTool::Databases.name(), arguments)?;
        Ok(self.gateway.inventory())
    }
}

impl<K> ServerHandler for SqlServerMcp<K>
where
    K: Connector<Config = SqlServerConfig>,
    K::Handle: SqlSession,
{
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: CATALOGUE.clone(),
            next_cursor: None,
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(text_result(self.invoke(&request.name, request.arguments).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_round_trip() {
        for tool in SqlTool::ALL {
            assert_eq!(tool.name().parse::<SqlTool>().unwrap(), tool);
        }
        assert!(matches!(
            "sql_drop".parse::<SqlTool>(),
            Err(GatewayError::UnknownTool(name)) if name == "sql_drop"
        ));
    }

    #[test]
    fn catalogue_marks_required_arguments() {
        let describe = CATALOGUE
            .iter()
            .find(|tool| tool.name == "sql_describe")
            .unwrap();
        let required = describe.input_schema["required"].as_array().unwrap();
        assert_eq!(required, &[serde_json::Value::String("table".to_string())]);
        assert_eq!(CATALOGUE.len(), 6);
    }
}
