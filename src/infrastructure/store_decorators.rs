// Store Decorators - pluggable concerns layered around any DocumentStore

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, debug_span, warn, Instrument};

use crate::config::Config;
use crate::core::strong_types::DocumentId;
use crate::error::{AppError, AppResult};
use crate::infrastructure::monitoring::MetricsCollector;
use crate::infrastructure::store::{
    CollectionPath, Document, DocumentStore, FieldOps, Fields, Query, SnapshotStream,
};

// Every DocumentStore method is routed through one wrapper method of the
// decorator, which receives the operation name, the collection and the
// inner store's future.
macro_rules! impl_document_store_wrapped {
    ($decorator:ident, $wrap:ident) => {
        #[async_trait]
        impl<S: DocumentStore> DocumentStore for $decorator<S> {
            async fn get(
                &self,
                collection: &CollectionPath,
                id: &DocumentId,
            ) -> AppResult<Option<Document>> {
                self.$wrap("get", collection, self.inner.get(collection, id))
                    .await
            }

            async fn set(
                &self,
                collection: &CollectionPath,
                id: &DocumentId,
                fields: Fields,
            ) -> AppResult<()> {
                self.$wrap("set", collection, self.inner.set(collection, id, fields))
                    .await
            }

            async fn update(
                &self,
                collection: &CollectionPath,
                id: &DocumentId,
                ops: FieldOps,
            ) -> AppResult<()> {
                self.$wrap("update", collection, self.inner.update(collection, id, ops))
                    .await
            }

            async fn add(
                &self,
                collection: &CollectionPath,
                fields: Fields,
            ) -> AppResult<DocumentId> {
                self.$wrap("add", collection, self.inner.add(collection, fields))
                    .await
            }

            async fn fetch(&self, query: &Query) -> AppResult<Vec<Document>> {
                self.$wrap("fetch", &query.collection, self.inner.fetch(query))
                    .await
            }

            async fn subscribe(&self, query: &Query) -> AppResult<SnapshotStream> {
                self.$wrap("subscribe", &query.collection, self.inner.subscribe(query))
                    .await
            }
        }
    };
}

/// Tracing span and metrics around every store call
pub struct InstrumentedStore<S> {
    inner: S,
    metrics: MetricsCollector,
}

impl<S: DocumentStore> InstrumentedStore<S> {
    pub fn new(inner: S, metrics: MetricsCollector) -> Self {
        Self { inner, metrics }
    }

    async fn observe<T, F>(&self, op: &'static str, collection: &CollectionPath, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>> + Send,
    {
        let start = Instant::now();
        let span = debug_span!("store", op, collection = %collection);
        let result = fut.instrument(span).await;
        let elapsed = start.elapsed();

        self.metrics
            .record_operation(op, elapsed, result.is_ok())
            .await;
        match &result {
            Ok(_) => debug!("{} {} ok in {:?}", op, collection, elapsed),
            Err(e) => warn!("{} {} failed in {:?}: {}", op, collection, elapsed, e),
        }
        result
    }
}

impl_document_store_wrapped!(InstrumentedStore, observe);

/// Fails any store call that does not resolve within the deadline
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: DocumentStore> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn deadline<T, F>(&self, op: &'static str, collection: &CollectionPath, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{} on {} timed out after {:?}", op, collection, self.timeout);
                Err(AppError::TimeoutError(format!(
                    "{} on {} exceeded {:?}",
                    op, collection, self.timeout
                )))
            }
        }
    }
}

impl_document_store_wrapped!(TimeoutStore, deadline);

/// Wrap a raw store with the configured timeout and instrumentation layers
pub fn layered_store<S>(inner: S, config: &Config, metrics: MetricsCollector) -> Arc<dyn DocumentStore>
where
    S: DocumentStore + 'static,
{
    let timed = TimeoutStore::new(inner, config.op_timeout());
    Arc::new(InstrumentedStore::new(timed, metrics))
}
