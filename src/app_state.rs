use std::sync::Arc;

use crate::{
    config::Config,
    infrastructure::{
        inflight::InFlightGuard,
        memory_store::MemoryStore,
        monitoring::MetricsCollector,
        store::DocumentStore,
        store_decorators::layered_store,
    },
};

/// Shared handles every manager is built from
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub metrics: MetricsCollector,
    pub config: Config,
    pub toggles: InFlightGuard,
}

impl AppState {
    pub fn new<S: DocumentStore + 'static>(raw_store: S, config: Config) -> Self {
        let metrics = MetricsCollector::new();
        let store = layered_store(raw_store, &config, metrics.clone());
        Self {
            store,
            metrics,
            config,
            toggles: InFlightGuard::new(),
        }
    }

    /// State over a fresh in-memory store; the raw store handle is returned
    /// for seeding and fault injection.
    pub fn in_memory(config: Config) -> (Self, Arc<MemoryStore>) {
        let raw = Arc::new(MemoryStore::new().with_latency(config.store_latency()));
        (Self::new(Arc::clone(&raw), config), raw)
    }
}
