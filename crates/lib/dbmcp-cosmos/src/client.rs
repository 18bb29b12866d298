//! REST connector and handle for Cosmos DB.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use dbmcp_core::Connector;
use futures::future::try_join_all;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::auth::{MasterKey, http_date};
use crate::config::CosmosConfig;
use crate::plan::{QUERY_VERSION, QueryPlan, SUPPORTED_QUERY_FEATURES};
use crate::session::{ContainerSummary, DocumentSession};

const API_VERSION: &str = "2018-12-31";
const CONTINUATION: &str = "x-ms-continuation";
const PARTITION_KEY_RANGE_ID: &str = "x-ms-documentdb-partitionkeyrangeid";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub enum CosmosError {
    InvalidEndpoint { endpoint: String, message: String },
    InvalidKey(base64::DecodeError),
    Http(reqwest::Error),
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    UnsupportedQuery { feature: &'static str },
}

impl fmt::Display for CosmosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEndpoint { endpoint, message } => {
                write!(f, "invalid Cosmos DB endpoint {endpoint}: {message}")
            }
            Self::InvalidKey(err) => write!(f, "invalid Cosmos DB key: {err}"),
            Self::Http(err) => write!(f, "Cosmos DB request failed: {err}"),
            Self::Status {
                status,
                code: Some(code),
                message,
            } => write!(f, "Cosmos DB returned {status} ({code}): {message}"),
            Self::Status {
                status,
                code: None,
                message,
            } => write!(f, "Cosmos DB returned {status}: {message}"),
            Self::UnsupportedQuery { feature } => write!(
                f,
                "cross-partition queries using {feature} are not supported; filter on the partition key to run it on a single partition"
            ),
        }
    }
}

impl Error for CosmosError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidKey(err) => Some(err),
            Self::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CosmosError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

/// Builds REST handles; no request is sent until a tool needs one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosmosConnector;

impl Connector for CosmosConnector {
    type Config = CosmosConfig;
    type Handle = CosmosClient;
    type Error = CosmosError;

    async fn open(&self, name: &str, config: &CosmosConfig) -> Result<CosmosClient, CosmosError> {
        let client = CosmosClient::new(config)?;
        debug!(backend = name, endpoint = %client.endpoint, api = %config.api, "Cosmos DB client created");
        Ok(client)
    }

    async fn close(&self, _handle: &CosmosClient) -> Result<(), CosmosError> {
        Ok(())
    }
}

/// Client bound to one database of a Cosmos DB account.
pub struct CosmosClient {
    http: reqwest::Client,
    endpoint: Url,
    key: MasterKey,
    database: String,
}

/// One page of a feed response; the array name depends on the resource.
#[derive(Deserialize)]
struct FeedPage<T> {
    #[serde(
        alias = "Documents",
        alias = "DocumentCollections",
        alias = "PartitionKeyRanges",
        default = "Vec::new"
    )]
    items: Vec<T>,
}

#[derive(Deserialize)]
struct PartitionKeyRange {
    id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl CosmosClient {
    /// Validates the endpoint and key of `config`.
    ///
    /// # Errors
    /// Returns `CosmosError::InvalidEndpoint` for non-http(s) endpoints and
    /// `CosmosError::InvalidKey` when the key is not base64.
    pub fn new(config: &CosmosConfig) -> Result<Self, CosmosError> {
        let endpoint = parse_endpoint(&config.endpoint)?;
        let key = MasterKey::decode(&config.key).map_err(CosmosError::InvalidKey)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("dbmcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            key,
            database: config.database.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Starts a signed request. `resource_link` is the unencoded id path the
    /// signature covers.
    fn request(
        &self,
        method: Method,
        segments: &[&str],
        resource_type: &str,
        resource_link: &str,
    ) -> RequestBuilder {
        let date = http_date(Utc::now());
        let authorization = self
            .key
            .authorization(method.as_str(), resource_type, resource_link, &date);
        self.http
            .request(method, self.url(segments))
            .header("authorization", authorization)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
    }

    async fn send(request: RequestBuilder) -> Result<Response, CosmosError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    /// Reads every page of a feed, following `x-ms-continuation`.
    async fn read_feed<T>(
        &self,
        build: impl Fn() -> RequestBuilder + Send + Sync,
    ) -> Result<Vec<T>, CosmosError>
    where
        T: DeserializeOwned + Send,
    {
        let mut items = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = build();
            if let Some(token) = &continuation {
                request = request.header(CONTINUATION, token.as_str());
            }

            let response = Self::send(request).await?;
            continuation = response
                .headers()
                .get(CONTINUATION)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .map(str::to_string);
            let page: FeedPage<T> = response.json().await?;
            debug!(fetched = page.items.len(), more = continuation.is_some(), "feed page received");
            items.extend(page.items);

            if continuation.is_none() {
                return Ok(items);
            }
        }
    }

    fn container_link(&self, container: &str) -> String {
        format!("dbs/{}/colls/{container}", self.database)
    }

    fn query_request(&self, container: &str, body: &str) -> RequestBuilder {
        self.request(
            Method::POST,
            &["dbs", self.database.as_str(), "colls", container, "docs"],
            "docs",
            &self.container_link(container),
        )
        .header("content-type", "application/query+json")
        .header("x-ms-documentdb-isquery", "True")
        .header("x-ms-documentdb-query-enablecrosspartition", "True")
        .body(body.to_string())
    }

    async fn query_plan(&self, container: &str, body: &str) -> Result<QueryPlan, CosmosError> {
        let request = self
            .query_request(container, body)
            .header("x-ms-cosmos-is-query-plan-request", "True")
            .header("x-ms-cosmos-supported-query-features", SUPPORTED_QUERY_FEATURES)
            .header("x-ms-cosmos-query-version", QUERY_VERSION);
        Ok(Self::send(request).await?.json().await?)
    }

    async fn partition_key_ranges(&self, container: &str) -> Result<Vec<PartitionKeyRange>, CosmosError> {
        let link = self.container_link(container);
        self.read_feed(|| {
            self.request(
                Method::GET,
                &["dbs", self.database.as_str(), "colls", container, "pkranges"],
                "pkranges",
                &link,
            )
        })
        .await
    }
}

fn query_body(query: &str) -> String {
    json!({"query": query, "parameters": []}).to_string()
}

impl DocumentSession for CosmosClient {
    async fn query_items(&self, container: &str, query: &str) -> Result<Vec<Value>, CosmosError> {
        let body = query_body(query);
        let plan = self.query_plan(container, &body).await?;
        if !plan.needs_pipeline() {
            return self.read_feed(|| self.query_request(container, &body)).await;
        }
        plan.check_supported()?;

        let partition_body = query_body(&plan.partition_query(query));
        let partition_body = partition_body.as_str();
        let ranges = self.partition_key_ranges(container).await?;
        debug!(container, ranges = ranges.len(), "running query on each partition key range");
        let partitions = try_join_all(ranges.iter().map(|range| {
            self.read_feed(move || {
                self.query_request(container, partition_body)
                    .header(PARTITION_KEY_RANGE_ID, range.id.as_str())
            })
        }))
        .await?;
        Ok(plan.merge(partitions))
    }

    async fn read_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<Option<Value>, CosmosError> {
        let link = format!("{}/docs/{id}", self.container_link(container));
        let request = self
            .request(
                Method::GET,
                &["dbs", self.database.as_str(), "colls", container, "docs", id],
                "docs",
                &link,
            )
            .header("x-ms-documentdb-partitionkey", json!([partition_key]).to_string());
        match Self::send(request).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(CosmosError::Status { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, CosmosError> {
        let link = format!("dbs/{}", self.database);
        self.read_feed(|| {
            self.request(Method::GET, &["dbs", self.database.as_str(), "colls"], "colls", &link)
        })
        .await
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, CosmosError> {
    let invalid = |message: String| CosmosError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message,
    };
    let url = Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(invalid("expected an http(s) URL".to_string()));
    }
    Ok(url)
}

/// Maps a non-success response to an error, keeping the service's own code
/// and message when the body carries them.
fn status_error(status: StatusCode, body: &str) -> CosmosError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = match parsed {
        Some(ErrorBody { code, message }) => (code, message),
        None => (None, None),
    };
    let message = message
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    CosmosError::Status {
        status: status.as_u16(),
        code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use dbmcp_core::Connector;

    use super::*;
    use crate::config::CosmosApi;

    fn config(endpoint: &str, key: &str) -> CosmosConfig {
        CosmosConfig {
            name: "orders".to_string(),
            endpoint: endpoint.to_string(),
            key: key.to_string(),
            database: "shop".to_string(),
            api: CosmosApi::Sql,
        }
    }

    #[test]
    fn urls_are_built_from_segments() {
        let client = CosmosClient::new(&config("https://acct.documents.azure.com:443/", "a2V5")).unwrap();
        let url = client.url(&["dbs", "shop", "colls", "orders", "docs", "a b"]);
        assert_eq!(
            url.as_str(),
            "https://acct.documents.azure.com/dbs/shop/colls/orders/docs/a%20b"
        );
    }

    #[test]
    fn endpoint_without_trailing_slash() {
        let client = CosmosClient::new(&config("http://localhost:8081", "a2V5")).unwrap();
        assert_eq!(
            client.url(&["dbs", "shop", "colls"]).as_str(),
            "http://localhost:8081/dbs/shop/colls"
        );
    }

    #[tokio::test]
    async fn open_rejects_bad_endpoint() {
        let err = CosmosConnector
            .open("orders", &config("mailto:ops@example.com", "a2V5"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CosmosError::InvalidEndpoint { .. }));
    }

    #[tokio::test]
    async fn open_rejects_bad_key() {
        let err = CosmosConnector
            .open("orders", &config("https://acct.documents.azure.com/", "%%%"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CosmosError::InvalidKey(_)));
        assert!(err.to_string().starts_with("invalid Cosmos DB key"));
    }

    #[test]
    fn service_error_body_is_kept() {
        let err = status_error(
            StatusCode::NOT_FOUND,
            r#"{"code":"NotFound","message":"Entity with the specified id does not exist in the system."}"#,
        );
        assert_eq!(
            err.to_string(),
            "Cosmos DB returned 404 (NotFound): Entity with the specified id does not exist in the system."
        );
    }

    #[test]
    fn feed_pages_accept_each_resource_array() {
        let documents: FeedPage<Value> =
            serde_json::from_str(r#"{"_rid": "x", "Documents": [{"id": "1"}], "_count": 1}"#).unwrap();
        assert_eq!(documents.items, vec![json!({"id": "1"})]);

        let containers: FeedPage<ContainerSummary> = serde_json::from_str(
            r#"{"DocumentCollections": [{"id": "orders", "partitionKey": {"paths": ["/customerId"]}}]}"#,
        )
        .unwrap();
        assert_eq!(containers.items[0].id, "orders");

        let ranges: FeedPage<PartitionKeyRange> = serde_json::from_str(
            r#"{"PartitionKeyRanges": [{"id": "0", "minInclusive": "", "maxExclusive": "FF"}]}"#,
        )
        .unwrap();
        assert_eq!(ranges.items[0].id, "0");

        let empty: FeedPage<Value> = serde_json::from_str(r#"{"_rid": "x"}"#).unwrap();
        assert!(empty.items.is_empty());
    }

    #[test]
    fn empty_error_body_uses_reason() {
        let err = status_error(StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.to_string(), "Cosmos DB returned 401: Unauthorized");
    }
}
