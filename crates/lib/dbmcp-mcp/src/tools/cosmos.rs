//! Document tool set served by `cosmosdb-mcpd`.

use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use dbmcp_core::envelope::{parse_args, render};
use dbmcp_core::{BackendInventory, Connector, Gateway, GatewayError};
use dbmcp_cosmos::{ContainerSummary, CosmosApi, CosmosConfig, DocumentSession};
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
use serde_json::Value;
use tracing::debug;

use super::{NoParams, TargetParams, input_schema, text_result};

const SERVER_INSTRUCTIONS: &str = r"cosmosdb-mcpd exposes the Azure Cosmos DB databases listed in its configuration file.

Every tool accepts an optional `database` naming a configured entry; without it the default database is used.
Call `cosmos_databases` to see the configured names and the default.

- `cosmos_query` runs a SQL-API query against a container and returns every page of results.
- `cosmos_get_item` reads one document by id and partition key.
- `cosmos_containers` lists containers with their partition key definitions.
- `cosmos_database_info` reports the account endpoint and API type without connecting.

Results are JSON text. Failures are returned as text starting with `Error: `.";

/// Parameters for `cosmos_query`.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct QueryParams {
    /// Cosmos DB SQL query, for example `SELECT * FROM c WHERE c.status = 'open'`.
    pub query: String,
    /// Container to query.
    pub container: String,
    /// Configured database name; the default database is used when omitted.
    pub database: Option<String>,
}

/// Parameters for `cosmos_get_item`.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetItemParams {
    /// Document id.
    pub item_id: String,
    /// Partition key value of the document.
    pub partition_key: String,
    /// Container holding the document.
    pub container: String,
    /// Configured database name; the default database is used when omitted.
    pub database: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryOutput {
    database: String,
    container: String,
    query: String,
    result_count: usize,
    results: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemOutput {
    database: String,
    container: String,
    item_id: String,
    partition_key: String,
    item: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ContainersOutput {
    database: String,
    containers: Vec<ContainerSummary>,
}

#[derive(Debug, Serialize)]
struct DatabaseInfo {
    name: String,
    endpoint: String,
    database: String,
    #[serde(rename = "type")]
    api: CosmosApi,
    connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CosmosTool {
    Query,
    GetItem,
    Containers,
    DatabaseInfo,
    Databases,
}

impl CosmosTool {
    const ALL: [Self; 5] = [
        Self::Query,
        Self::GetItem,
        Self::Containers,
        Self::DatabaseInfo,
        Self::Databases,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::Query => "cosmos_query",
            Self::GetItem => "cosmos_get_item",
            Self::Containers => "cosmos_containers",
            Self::DatabaseInfo => "cosmos_database_info",
            Self::Databases => "cosmos_databases",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::Query => "Run a query against a container of the selected Cosmos DB database.",
            Self::GetItem => "Read a single document by id and partition key.",
            Self::Containers => "List the containers of the selected Cosmos DB database.",
            Self::DatabaseInfo => "Show connection information for the selected Cosmos DB database.",
            Self::Databases => "List every configured Cosmos DB database and the default one.",
        }
    }

    fn schema(self) -> Arc<JsonObject> {
        match self {
            Self::Query => input_schema::<QueryParams>(),
            Self::GetItem => input_schema::<GetItemParams>(),
            Self::Containers | Self::DatabaseInfo => input_schema::<TargetParams>(),
            Self::Databases => input_schema::<NoParams>(),
        }
    }
}

impl FromStr for CosmosTool {
    type Err = GatewayError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| GatewayError::UnknownTool(name.to_string()))
    }
}

static CATALOGUE: LazyLock<Vec<Tool>> = LazyLock::new(|| {
    CosmosTool::ALL
        .into_iter()
        .map(|tool| Tool::new(tool.name(), tool.description(), tool.schema()))
        .collect()
});

/// MCP server for the Cosmos DB backend family.
pub struct CosmosMcp<K: Connector> {
    gateway: Arc<Gateway<K>>,
}

impl<K: Connector> Clone for CosmosMcp<K> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
        }
    }
}

impl<K> CosmosMcp<K>
where
    K: Connector<Config = CosmosConfig>,
    K::Handle: DocumentSession,
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
        let tool = match name.parse::<CosmosTool>() {
            Ok(tool) => tool,
            Err(err) => return render::<()>(Err(err)),
        };
        debug!(tool = name, "tool invoked");
        match tool {
            CosmosTool::Query => render(self.query(arguments).await),
            CosmosTool::GetItem => render(self.get_item(arguments).await),
            CosmosTool::Containers => render(self.containers(arguments).await),
            CosmosTool::DatabaseInfo => render(self.database_info(arguments).await),
            CosmosTool::Databases => render(self.databases(arguments)),
        }
    }

    async fn query(&self, arguments: Option<JsonObject>) -> Result<QueryOutput, GatewayError> {
        let params: QueryParams = parse_args(CosmosTool::Query.name(), arguments)?;
        let (database, session) = self.gateway.connect(params.database.as_deref()).await?;
        let results = session
            .query_items(&params.container, &params.query)
            .await
            .map_err(GatewayError::backend)?;
        Ok(QueryOutput {
            database,
            container: params.container,
            query: params.query,
            result_count: results.len(),
            results,
        })
    }

    async fn get_item(&self, arguments: Option<JsonObject>) -> Result<ItemOutput, GatewayError> {
        let params: GetItemParams = parse_args(CosmosTool::GetItem.name(), arguments)?;
        let (database, session) = self.gateway.connect(params.database.as_deref()).await?;
        let item = session
            .read_item(&params.container, &params.item_id, &params.partition_key)
            .await
            .map_err(GatewayError::backend)?;
        Ok(ItemOutput {
            database,
            container: params.container,
            item_id: params.item_id,
            partition_key: params.partition_key,
            item,
        })
    }

    async fn containers(&self, arguments: Option<JsonObject>) -> Result<ContainersOutput, GatewayError> {
        let params: TargetParams = parse_args(CosmosTool::Containers.name(), arguments)?;
        let (database, session) = self.gateway.connect(params.database.as_deref()).await?;
        let containers = session.list_containers().await.map_err(GatewayError::backend)?;
        Ok(ContainersOutput {
            database,
            containers,
        })
    }

    async fn database_info(&self, arguments: Option<JsonObject>) -> Result<DatabaseInfo, GatewayError> {
        let params: TargetParams = parse_args(CosmosTool::DatabaseInfo.name(), arguments)?;
        let (name, config, connected) = self.gateway.describe(params.database.as_deref()).await?;
        Ok(DatabaseInfo {
            name,
            endpoint: config.endpoint.clone(),
            database: config.database.clone(),
            api: config.api,
            connected,
        })
    }

    fn databases(&self, arguments: Option<JsonObject>) -> Result<BackendInventory, GatewayError> {
        let NoParams {} = parse_args(CosmosTool::Databases.name(), arguments)?;
        Ok(self.gateway.inventory())
    }
}

impl<K> ServerHandler for CosmosMcp<K>
where
    K: Connector<Config = CosmosConfig>,
    K::Handle: DocumentSession,
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
