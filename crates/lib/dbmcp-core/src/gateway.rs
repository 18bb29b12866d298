//! Gateway state shared by every tool handler of one backend family.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info};

use crate::backend::Connector;
use crate::cache::{ConnectionCache, DisconnectSummary};
use crate::config::{BackendEntry, GatewayConfig};
use crate::error::GatewayError;
use crate::registry::BackendRegistry;

/// Registry listing returned by the `*_databases` tools.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendInventory {
    pub default_database: Option<String>,
    pub available_databases: Vec<String>,
    pub total_count: usize,
}

/// Registry, connection cache, and default backend for one server process.
pub struct Gateway<K: Connector> {
    registry: Arc<BackendRegistry<K::Config>>,
    cache: ConnectionCache<K>,
    default_backend: Option<String>,
    closing: AtomicBool,
}

impl<K: Connector> Gateway<K> {
    /// Builds a gateway over `registry`, choosing the default backend once.
    pub fn new(
        registry: BackendRegistry<K::Config>,
        configured_default: Option<&str>,
        connector: K,
    ) -> Self {
        let default_backend = registry.default_backend(configured_default);
        let registry = Arc::new(registry);
        let cache = ConnectionCache::new(registry.clone(), connector);
        Self {
            registry,
            cache,
            default_backend,
            closing: AtomicBool::new(false),
        }
    }

    /// Builds a gateway from a validated configuration document.
    pub fn from_config(config: GatewayConfig<K::Config>, connector: K) -> Self
    where
        K::Config: BackendEntry,
    {
        let GatewayConfig {
            entries,
            default_backend,
        } = config;
        let registry = BackendRegistry::from_entries(entries);
        let gateway = Self::new(registry, default_backend.as_deref(), connector);
        debug!(
            default = gateway.default_backend.as_deref().unwrap_or("<none>"),
            count = gateway.registry.len(),
            "gateway ready"
        );
        gateway
    }

    #[must_use]
    pub fn registry(&self) -> &BackendRegistry<K::Config> {
        &self.registry
    }

    #[must_use]
    pub const fn cache(&self) -> &ConnectionCache<K> {
        &self.cache
    }

    #[must_use]
    pub fn default_backend(&self) -> Option<&str> {
        self.default_backend.as_deref()
    }

    /// Picks the backend an invocation targets: the explicit argument when
    /// non-empty, else the default.
    ///
    /// # Errors
    /// Returns `GatewayError::ShuttingDown` once shutdown has begun, or
    /// `GatewayError::NoBackendsConfigured` when there is no default.
    pub fn backend_name<'a>(&'a self, requested: Option<&'a str>) -> Result<&'a str, GatewayError> {
        if self.is_closing() {
            return Err(GatewayError::ShuttingDown);
        }
        requested
            .filter(|name| !name.is_empty())
            .or(self.default_backend.as_deref())
            .ok_or(GatewayError::NoBackendsConfigured)
    }

    /// Resolves the target backend and returns its name with a live handle.
    ///
    /// # Errors
    /// Propagates backend selection and connection errors.
    pub async fn connect(
        &self,
        requested: Option<&str>,
    ) -> Result<(String, Arc<K::Handle>), GatewayError> {
        let name = self.backend_name(requested)?;
        let handle = self.cache.resolve(name).await?;
        Ok((name.to_string(), handle))
    }

    /// Returns the target backend's config and whether it is connected,
    /// without opening a connection.
    ///
    /// # Errors
    /// Returns `GatewayError::UnknownBackend` for unregistered names.
    pub async fn describe(
        &self,
        requested: Option<&str>,
    ) -> Result<(String, Arc<K::Config>, bool), GatewayError> {
        let name = self.backend_name(requested)?;
        let config = self.registry.get(name)?;
        let connected = self.cache.is_connected(name).await;
        Ok((name.to_string(), config, connected))
    }

    #[must_use]
    pub fn inventory(&self) -> BackendInventory {
        let available_databases = self.registry.names().to_vec();
        BackendInventory {
            default_database: self.default_backend.clone(),
            total_count: available_databases.len(),
            available_databases,
        }
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Stops accepting invocations and closes every cached handle.
    pub async fn shutdown(&self) -> DisconnectSummary {
        self.closing.store(true, Ordering::Release);
        let summary = self.cache.shutdown().await;
        info!(
            closed = summary.closed.len(),
            failed = summary.failed.len(),
            "connections closed"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Default)]
    struct CountingConnector {
        opens: Arc<AtomicUsize>,
    }

    impl Connector for CountingConnector {
        type Config = &'static str;
        type Handle = ();
        type Error = Infallible;

        async fn open(&self, _name: &str, _config: &&'static str) -> Result<(), Infallible> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self, _handle: &()) -> Result<(), Infallible> {
            Ok(())
        }
    }

    fn gateway(names: &[&'static str], default: Option<&str>) -> Gateway<CountingConnector> {
        gateway_with(names, default, CountingConnector::default())
    }

    fn gateway_with(
        names: &[&'static str],
        default: Option<&str>,
        connector: CountingConnector,
    ) -> Gateway<CountingConnector> {
        let mut registry = BackendRegistry::new();
        for name in names {
            registry.register(*name, *name);
        }
        Gateway::new(registry, default, connector)
    }

    #[test]
    fn inventory_reports_default_and_names() {
        let gateway = gateway(&["A", "B"], None);
        assert_eq!(
            gateway.inventory(),
            BackendInventory {
                default_database: Some("A".to_string()),
                available_databases: vec!["A".to_string(), "B".to_string()],
                total_count: 2,
            }
        );
    }

    #[test]
    fn explicit_name_beats_default_and_empty_falls_back() {
        let gateway = gateway(&["A", "B"], Some("B"));
        assert_eq!(gateway.backend_name(Some("A")).unwrap(), "A");
        assert_eq!(gateway.backend_name(Some("")).unwrap(), "B");
        assert_eq!(gateway.backend_name(None).unwrap(), "B");
    }

    #[test]
    fn empty_registry_has_no_backend() {
        let gateway = gateway(&[], Some("A"));
        let err = gateway.backend_name(None).unwrap_err();
        assert!(matches!(err, GatewayError::NoBackendsConfigured));
    }

    #[tokio::test]
    async fn describe_never_connects() {
        let connector = CountingConnector::default();
        let opens = connector.opens.clone();
        let gateway = gateway_with(&["A"], None, connector);

        let (name, config, connected) = gateway.describe(None).await.unwrap();
        assert_eq!(name, "A");
        assert_eq!(*config, "A");
        assert!(!connected);
        assert_eq!(opens.load(Ordering::SeqCst), 0);

        gateway.connect(None).await.unwrap();
        let (_, _, connected) = gateway.describe(Some("A")).await.unwrap();
        assert!(connected);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_invocations() {
        let gateway = gateway(&["A"], None);
        gateway.connect(None).await.unwrap();

        let summary = gateway.shutdown().await;

        assert_eq!(summary.closed, ["A"]);
        assert!(!gateway.cache.is_connected("A").await);
        let err = gateway.connect(None).await.err().unwrap();
        assert!(matches!(err, GatewayError::ShuttingDown));
    }
}
