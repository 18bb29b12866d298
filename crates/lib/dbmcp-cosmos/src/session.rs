//! Operation surface of a live Cosmos DB handle.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::CosmosError;

/// Container id and partition key definition as listed by the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub partition_key: Option<Value>,
}

/// Document operations the Cosmos tools run against one database.
pub trait DocumentSession: Send + Sync + 'static {
    /// Runs a query across all partitions of `container` and returns every
    /// matching document.
    fn query_items(
        &self,
        container: &str,
        query: &str,
    ) -> impl Future<Output = Result<Vec<Value>, CosmosError>> + Send;

    /// Point read by id and partition key; `None` when no such document
    /// exists.
    fn read_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> impl Future<Output = Result<Option<Value>, CosmosError>> + Send;

    fn list_containers(&self) -> impl Future<Output = Result<Vec<ContainerSummary>, CosmosError>> + Send;
}
