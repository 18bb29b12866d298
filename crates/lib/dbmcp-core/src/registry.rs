use std::collections::HashMap;
use std::sync::Arc;

use crate::config::BackendEntry;
use crate::error::GatewayError;

/// Named backend configurations, in registration order.
pub struct BackendRegistry<C> {
    order: Vec<String>,
    entries: HashMap<String, Arc<C>>,
}

impl<C> Default for BackendRegistry<C> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }
}

impl<C> BackendRegistry<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from loaded configuration entries.
    #[must_use]
    pub fn from_entries(entries: Vec<C>) -> Self
    where
        C: BackendEntry,
    {
        let mut registry = Self::new();
        for entry in entries {
            let name = entry.name().to_string();
            registry.register(name, entry);
        }
        registry
    }

    /// Stores `config` under `name`. A repeated name replaces the earlier
    /// config but keeps its original position.
    pub fn register(&mut self, name: impl Into<String>, config: C) {
        let name = name.into();
        if !self.entries.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.entries.insert(name, Arc::new(config));
    }

    /// Looks up the config registered for `name`.
    ///
    /// # Errors
    /// Returns `GatewayError::UnknownBackend` if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<C>, GatewayError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownBackend(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Picks the default backend: `configured` when it names a registered
    /// backend, otherwise the first registered one.
    #[must_use]
    pub fn default_backend(&self, configured: Option<&str>) -> Option<String> {
        configured
            .filter(|name| self.contains(name))
            .map(str::to_string)
            .or_else(|| self.order.first().cloned())
    }
}
