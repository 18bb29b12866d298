use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dbmcp_core::envelope::is_error;
use dbmcp_core::{Connector, Gateway, GatewayConfig};
use dbmcp_cosmos::{ContainerSummary, CosmosConfig, CosmosError, DocumentSession};
use dbmcp_mcp::CosmosMcp;
use rmcp::model::JsonObject;
use serde_json::{Value, json};

#[derive(Default)]
struct StubConnector {
    opens: Arc<AtomicUsize>,
}

struct StubSession {
    database: String,
}

impl Connector for StubConnector {
    type Config = CosmosConfig;
    type Handle = StubSession;
    type Error = CosmosError;

    async fn open(&self, _name: &str, config: &CosmosConfig) -> Result<StubSession, CosmosError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(StubSession {
            database: config.database.clone(),
        })
    }

    async fn close(&self, _handle: &StubSession) -> Result<(), CosmosError> {
        Ok(())
    }
}

impl DocumentSession for StubSession {
    async fn query_items(&self, container: &str, query: &str) -> Result<Vec<Value>, CosmosError> {
        if query.contains("GROUP BY") {
            return Err(CosmosError::UnsupportedQuery { feature: "GROUP BY" });
        }
        Ok(vec![
            json!({"id": "1", "container": container}),
            json!({"id": "2", "container": container}),
            json!({"id": "3", "container": container}),
        ])
    }

    async fn read_item(
        &self,
        _container: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<Option<Value>, CosmosError> {
        match id {
            "missing" => Ok(None),
            "forbidden" => Err(CosmosError::Status {
                status: 403,
                code: Some("Forbidden".to_string()),
                message: "Request blocked by network firewall.".to_string(),
            }),
            _ => Ok(Some(json!({"id": id, "customerId": partition_key, "db": self.database}))),
        }
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, CosmosError> {
        Ok(vec![ContainerSummary {
            id: "orders".to_string(),
            partition_key: Some(json!({"paths": ["/customerId"], "kind": "Hash"})),
        }])
    }
}

const ACCOUNTS: &str = r#"{
    "databases": [
        {"name": "A", "endpoint": "https://a.documents.azure.com:443/", "key": "a2V5", "database": "shop"},
        {"name": "B", "endpoint": "https://b.documents.azure.com:443/", "key": "a2V5", "database": "graph", "type": "gremlin"}
    ]
}"#;

fn server() -> (CosmosMcp<StubConnector>, Arc<AtomicUsize>) {
    let connector = StubConnector::default();
    let opens = connector.opens.clone();
    let config = GatewayConfig::parse(ACCOUNTS).unwrap();
    let gateway = Arc::new(Gateway::from_config(config, connector));
    (CosmosMcp::new(gateway), opens)
}

fn args(value: Value) -> Option<JsonObject> {
    value.as_object().cloned()
}

fn parse(text: &str) -> Value {
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn databases_lists_registry() {
    let (server, opens) = server();

    let text = server.invoke("cosmos_databases", None).await;

    assert_eq!(
        parse(&text),
        json!({
            "defaultDatabase": "A",
            "availableDatabases": ["A", "B"],
            "totalCount": 2
        })
    );
    assert_eq!(opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn query_returns_every_result() {
    let (server, opens) = server();
    let query = "SELECT * FROM c WHERE c.status = 'open'";

    let text = server
        .invoke("cosmos_query", args(json!({"query": query, "container": "orders"})))
        .await;

    let body = parse(&text);
    assert_eq!(body["database"], "A");
    assert_eq!(body["container"], "orders");
    assert_eq!(body["query"], query);
    assert_eq!(body["resultCount"], 3);
    assert_eq!(body["results"].as_array().unwrap().len(), 3);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsupported_cross_partition_query_names_the_feature() {
    let (server, _opens) = server();

    let text = server
        .invoke(
            "cosmos_query",
            args(json!({
                "query": "SELECT c.status, COUNT(1) AS n FROM c GROUP BY c.status",
                "container": "orders"
            })),
        )
        .await;

    assert!(is_error(&text));
    assert!(text.starts_with("Error: cross-partition queries using GROUP BY are not supported"));
}

#[tokio::test]
async fn get_item_echoes_identity() {
    let (server, _opens) = server();

    let text = server
        .invoke(
            "cosmos_get_item",
            args(json!({"itemId": "42", "partitionKey": "c-7", "container": "orders", "database": "B"})),
        )
        .await;

    assert_eq!(
        parse(&text),
        json!({
            "database": "B",
            "container": "orders",
            "itemId": "42",
            "partitionKey": "c-7",
            "item": {"id": "42", "customerId": "c-7", "db": "graph"}
        })
    );
}

#[tokio::test]
async fn missing_item_reports_null() {
    let (server, _opens) = server();

    let text = server
        .invoke(
            "cosmos_get_item",
            args(json!({"itemId": "missing", "partitionKey": "c-7", "container": "orders"})),
        )
        .await;

    assert!(!is_error(&text), "{text}");
    assert_eq!(
        parse(&text),
        json!({
            "database": "A",
            "container": "orders",
            "itemId": "missing",
            "partitionKey": "c-7",
            "item": null
        })
    );
}

#[tokio::test]
async fn failed_read_is_an_error_envelope() {
    let (server, _opens) = server();

    let text = server
        .invoke(
            "cosmos_get_item",
            args(json!({"itemId": "forbidden", "partitionKey": "c-7", "container": "orders"})),
        )
        .await;

    assert!(is_error(&text));
    assert!(text.contains("403"));
    assert!(text.contains("Forbidden"));
}

#[tokio::test]
async fn containers_include_partition_keys() {
    let (server, _opens) = server();

    let text = server.invoke("cosmos_containers", None).await;

    assert_eq!(
        parse(&text),
        json!({
            "database": "A",
            "containers": [
                {"id": "orders", "partitionKey": {"paths": ["/customerId"], "kind": "Hash"}}
            ]
        })
    );
}

#[tokio::test]
async fn database_info_does_not_connect() {
    let (server, opens) = server();

    let text = server
        .invoke("cosmos_database_info", args(json!({"database": "B"})))
        .await;

    assert_eq!(
        parse(&text),
        json!({
            "name": "B",
            "endpoint": "https://b.documents.azure.com:443/",
            "database": "graph",
            "type": "gremlin",
            "connected": false
        })
    );
    assert_eq!(opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn snake_case_arguments_are_rejected() {
    let (server, opens) = server();

    let text = server
        .invoke(
            "cosmos_get_item",
            args(json!({"item_id": "42", "partition_key": "c-7", "container": "orders"})),
        )
        .await;

    assert!(text.starts_with("Error: invalid arguments for cosmos_get_item"));
    assert_eq!(opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn relational_tool_names_are_unknown_here() {
    let (server, _opens) = server();

    let text = server
        .invoke("sql_query", args(json!({"query": "SELECT 1"})))
        .await;

    assert_eq!(text, "Error: unknown tool: sql_query");
}
