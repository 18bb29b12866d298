//! Lazily populated cache of live backend handles.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, warn};

use crate::backend::Connector;
use crate::error::GatewayError;
use crate::registry::BackendRegistry;

/// Cache slot for one backend name.
///
/// The `OnceCell` makes concurrent first resolutions of the same name share a
/// single `open` call. `closed` is claimed by whichever side closes the
/// handle, so a slot evicted mid-open is closed exactly once.
struct CacheEntry<H> {
    handle: OnceCell<Arc<H>>,
    closed: AtomicBool,
}

impl<H> CacheEntry<H> {
    fn new() -> Self {
        Self {
            handle: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the handle if it is open and the caller won the right to
    /// close it.
    fn claim_close(&self) -> Option<&Arc<H>> {
        let handle = self.handle.get()?;
        (!self.closed.swap(true, Ordering::AcqRel)).then_some(handle)
    }
}

/// Outcome of [`ConnectionCache::disconnect_all`].
///
/// Slots whose open was still in flight appear in neither list; the opener
/// closes those itself once it finishes.
#[derive(Debug, Default)]
pub struct DisconnectSummary {
    pub closed: Vec<String>,
    pub failed: Vec<(String, GatewayError)>,
}

/// Mapping from backend name to its live handle.
pub struct ConnectionCache<K: Connector> {
    registry: Arc<BackendRegistry<K::Config>>,
    connector: K,
    entries: RwLock<HashMap<String, Arc<CacheEntry<K::Handle>>>>,
    sealed: AtomicBool,
}

impl<K: Connector> ConnectionCache<K> {
    pub fn new(registry: Arc<BackendRegistry<K::Config>>, connector: K) -> Self {
        Self {
            registry,
            connector,
            entries: RwLock::new(HashMap::new()),
            sealed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &BackendRegistry<K::Config> {
        &self.registry
    }

    /// Returns the live handle for `name`, opening it on first use.
    ///
    /// A cached handle is returned as-is; broken connections surface on the
    /// caller's next operation.
    ///
    /// # Errors
    /// Returns `GatewayError::UnknownBackend` for unregistered names (without
    /// touching the connector), `GatewayError::Backend` if opening fails,
    /// `GatewayError::ShuttingDown` once [`ConnectionCache::shutdown`] has run,
    /// or `GatewayError::Disconnected` when the name was disconnected while
    /// its open was in flight.
    pub async fn resolve(&self, name: &str) -> Result<Arc<K::Handle>, GatewayError> {
        let config = self.registry.get(name)?;
        if self.is_sealed() {
            return Err(GatewayError::ShuttingDown);
        }

        let entry = {
            let map = self.entries.read().await;
            map.get(name).cloned()
        };
        let entry = match entry {
            Some(entry) => entry,
            None => {
                let mut map = self.entries.write().await;
                if self.is_sealed() {
                    return Err(GatewayError::ShuttingDown);
                }
                map.entry(name.to_string())
                    .or_insert_with(|| Arc::new(CacheEntry::new()))
                    .clone()
            }
        };

        let opened = entry
            .handle
            .get_or_try_init(|| async {
                debug!(backend = name, "opening connection");
                self.connector
                    .open(name, &config)
                    .await
                    .map(Arc::new)
                    .map_err(GatewayError::backend)
            })
            .await;

        match opened {
            Ok(handle) => {
                let handle = handle.clone();
                if self.is_current(name, &entry).await {
                    return Ok(handle);
                }
                Err(self.discard_evicted(name, &entry).await)
            }
            Err(err) => {
                warn!(backend = name, error = %err, "failed to open connection");
                self.forget_failed(name, &entry).await;
                Err(err)
            }
        }
    }

    fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    async fn is_current(&self, name: &str, entry: &Arc<CacheEntry<K::Handle>>) -> bool {
        let map = self.entries.read().await;
        map.get(name).is_some_and(|current| Arc::ptr_eq(current, entry))
    }

    /// Closes a handle whose slot was removed before its open finished.
    async fn discard_evicted(&self, name: &str, entry: &CacheEntry<K::Handle>) -> GatewayError {
        if let Some(handle) = entry.claim_close() {
            debug!(backend = name, "closing connection opened after disconnect");
            if let Err(err) = self.connector.close(handle).await {
                warn!(backend = name, error = %err, "failed to close connection");
            }
        }
        if self.is_sealed() {
            GatewayError::ShuttingDown
        } else {
            GatewayError::Disconnected(name.to_string())
        }
    }

    /// Drops a slot whose open failed so membership stays truthful.
    async fn forget_failed(&self, name: &str, entry: &Arc<CacheEntry<K::Handle>>) {
        let mut map = self.entries.write().await;
        let stale = map
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, entry) && !current.handle.initialized());
        if stale {
            map.remove(name);
        }
    }

    /// Closes and forgets the handle for `name`, if any.
    ///
    /// # Errors
    /// Returns `GatewayError::Backend` if the connector fails to close the
    /// handle. The entry is removed either way.
    pub async fn disconnect(&self, name: &str) -> Result<(), GatewayError> {
        let entry = {
            let mut map = self.entries.write().await;
            map.remove(name)
        };
        match entry {
            Some(entry) => self.close_entry(name, &entry).await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Disconnects every cached handle concurrently.
    ///
    /// Individual failures are collected and never stop the remaining closes.
    /// The cache stays usable afterwards.
    pub async fn disconnect_all(&self) -> DisconnectSummary {
        self.drain_and_close(false).await
    }

    /// Refuses further resolutions, then disconnects every cached handle.
    pub async fn shutdown(&self) -> DisconnectSummary {
        self.drain_and_close(true).await
    }

    async fn drain_and_close(&self, seal: bool) -> DisconnectSummary {
        let drained: Vec<(String, Arc<CacheEntry<K::Handle>>)> = {
            let mut map = self.entries.write().await;
            if seal {
                self.sealed.store(true, Ordering::Release);
            }
            map.drain().collect()
        };

        let closes = drained.iter().map(|(name, entry)| async move {
            (name.clone(), self.close_entry(name, entry).await)
        });

        let mut summary = DisconnectSummary::default();
        for (name, outcome) in join_all(closes).await {
            match outcome {
                Ok(true) => summary.closed.push(name),
                Ok(false) => debug!(backend = %name, "open still in flight; opener will close it"),
                Err(err) => {
                    warn!(backend = %name, error = %err, "failed to close connection");
                    summary.failed.push((name, err));
                }
            }
        }
        summary
    }

    /// Closes the entry's handle. `Ok(false)` means there was nothing to
    /// close yet.
    async fn close_entry(
        &self,
        name: &str,
        entry: &CacheEntry<K::Handle>,
    ) -> Result<bool, GatewayError> {
        let Some(handle) = entry.claim_close() else {
            return Ok(false);
        };
        debug!(backend = name, "closing connection");
        self.connector
            .close(handle)
            .await
            .map(|()| true)
            .map_err(GatewayError::backend)
    }

    /// Reports whether `name` currently holds a live handle. Never connects.
    pub async fn is_connected(&self, name: &str) -> bool {
        let map = self.entries.read().await;
        map.get(name)
            .is_some_and(|entry| entry.handle.initialized())
    }

    /// Names with a live handle, in registry order.
    pub async fn connected_names(&self) -> Vec<String> {
        let map = self.entries.read().await;
        self.registry
            .names()
            .iter()
            .filter(|name| {
                map.get(name.as_str())
                    .is_some_and(|entry| entry.handle.initialized())
            })
            .cloned()
            .collect()
    }
}
