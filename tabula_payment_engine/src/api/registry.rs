use std::{collections::HashMap, sync::Arc};

use crate::{db_types::ProviderId, traits::ProviderAdapter};

/// The set of provider adapters this deployment can drive, keyed by provider name.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.name().clone(), adapter);
        self
    }

    pub fn get(&self, provider: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).cloned()
    }

    pub fn contains(&self, provider: &ProviderId) -> bool {
        self.adapters.contains_key(provider)
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.adapters.keys().cloned().collect()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.adapters.keys().map(|p| p.as_str()).collect::<Vec<_>>().join(", ");
        write!(f, "AdapterRegistry({names})")
    }
}
