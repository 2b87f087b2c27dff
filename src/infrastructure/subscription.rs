// Live Collection Subscription - one active live query per slot.
//
// Re-subscribing bumps the slot generation and aborts the previous
// delivery task before the new stream is opened. Every commit re-checks
// the generation under the same lock the bump takes, so a delivery that
// belongs to a retired query can never overwrite newer state. Subscribe and
// unsubscribe calls on one slot run one at a time, so the stream attached
// last is always the one opened for the newest generation.

use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::monitoring::{BusinessEvent, MetricsCollector};
use crate::infrastructure::store::{DocumentStore, Query, QuerySnapshot, SnapshotStream};

pub type Generation = u64;

pub struct SubscriptionSlot {
    name: &'static str,
    gate: Arc<Mutex<Generation>>,
    subscribing: Mutex<()>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
    metrics: MetricsCollector,
}

impl SubscriptionSlot {
    pub fn new(name: &'static str, metrics: MetricsCollector) -> Self {
        Self {
            name,
            gate: Arc::new(Mutex::new(0)),
            subscribing: Mutex::new(()),
            task: std::sync::Mutex::new(None),
            metrics,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().map_or(false, |h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Invalidate the current generation and stop its delivery task
    async fn retire(&self) -> Generation {
        let mut generation = self.gate.lock().await;
        *generation += 1;
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
                debug!("{}: retired subscription task", self.name);
            }
        }
        *generation
    }

    pub async fn unsubscribe(&self) {
        let _serial = self.subscribing.lock().await;
        self.retire().await;
        info!("{}: unsubscribed", self.name);
    }

    /// Replace the active subscription with a live query on `store`.
    ///
    /// On failure to open the query the slot is left empty and nothing is
    /// committed, so the owner keeps its last known state.
    pub async fn subscribe<T, P, Fut, C>(
        &self,
        store: &dyn DocumentStore,
        query: &Query,
        prepare: P,
        commit: C,
    ) -> AppResult<Generation>
    where
        T: Send + 'static,
        P: Fn(QuerySnapshot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        C: Fn(T) + Send + Sync + 'static,
    {
        let _serial = self.subscribing.lock().await;
        let generation = self.retire().await;
        let stream = match store.subscribe(query).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("{}: could not open live query on {}: {}", self.name, query.collection, e);
                return Err(e);
            }
        };
        info!(
            "{}: live query on {} active (generation {})",
            self.name, query.collection, generation
        );
        self.attach(generation, stream, prepare, commit);
        Ok(generation)
    }

    /// Drive an already opened snapshot stream under a fresh generation
    pub async fn subscribe_stream<T, P, Fut, C>(
        &self,
        stream: SnapshotStream,
        prepare: P,
        commit: C,
    ) -> Generation
    where
        T: Send + 'static,
        P: Fn(QuerySnapshot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        C: Fn(T) + Send + Sync + 'static,
    {
        let _serial = self.subscribing.lock().await;
        let generation = self.retire().await;
        self.attach(generation, stream, prepare, commit);
        generation
    }

    /// Run `commit` only if `generation` is still the slot's current one
    pub async fn commit_if_current<F: FnOnce()>(&self, generation: Generation, commit: F) -> bool {
        commit_gated(self.name, &self.gate, &self.metrics, generation, commit).await
    }

    fn attach<T, P, Fut, C>(&self, generation: Generation, mut stream: SnapshotStream, prepare: P, commit: C)
    where
        T: Send + 'static,
        P: Fn(QuerySnapshot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        C: Fn(T) + Send + Sync + 'static,
    {
        let name = self.name;
        let gate = Arc::clone(&self.gate);
        let metrics = self.metrics.clone();

        let handle = tokio::spawn(async move {
            // Snapshots are prepared and committed one at a time, in arrival order
            while let Some(delivery) = stream.next().await {
                match delivery {
                    Ok(snapshot) => {
                        let count = snapshot.documents.len();
                        let value = prepare(snapshot).await;
                        let applied =
                            commit_gated(name, &gate, &metrics, generation, || commit(value)).await;
                        if applied {
                            debug!("{}: applied snapshot of {} document(s)", name, count);
                        }
                    }
                    Err(e) => {
                        warn!("{}: delivery failed, keeping last snapshot: {}", name, e);
                    }
                }
            }
            debug!("{}: stream for generation {} ended", name, generation);
        });

        if let Ok(mut task) = self.task.lock() {
            if let Some(previous) = task.replace(handle) {
                previous.abort();
            }
        }
    }
}

async fn commit_gated<F: FnOnce()>(
    name: &str,
    gate: &Mutex<Generation>,
    metrics: &MetricsCollector,
    generation: Generation,
    commit: F,
) -> bool {
    let current = gate.lock().await;
    if *current != generation {
        drop(current);
        debug!(
            "{}: discarded stale delivery from generation {}",
            name, generation
        );
        metrics
            .record_business_event(BusinessEvent::StaleDeliveryDiscarded)
            .await;
        return false;
    }
    commit();
    true
}

impl Drop for SubscriptionSlot {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::published::Published;
    use crate::core::strong_types::DocumentId;
    use crate::error::AppError;
    use crate::infrastructure::memory_store::MemoryStore;
    use crate::infrastructure::store::{CollectionPath, Document, FieldOps, Fields};
    use async_trait::async_trait;
    use chrono::Utc;
    use futures::channel::mpsc;
    use std::time::Duration;
    use tokio::sync::watch;

    fn snapshot(ids: &[&str]) -> QuerySnapshot {
        QuerySnapshot {
            documents: ids
                .iter()
                .map(|id| Document::new(DocumentId::new(*id), Fields::new()))
                .collect(),
            read_time: Utc::now(),
        }
    }

    fn ids(snapshot: QuerySnapshot) -> Vec<String> {
        snapshot
            .documents
            .into_iter()
            .map(|d| d.id.as_str().to_string())
            .collect()
    }

    async fn wait_until<T>(mut rx: watch::Receiver<T>, ready: impl FnMut(&T) -> bool) {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(ready))
            .await
            .expect("state did not settle in time")
            .expect("publisher dropped");
    }

    /// Opening an unfiltered live query is slow; everything else is immediate
    struct SlowFullScanStore(MemoryStore);

    #[async_trait]
    impl DocumentStore for SlowFullScanStore {
        async fn get(
            &self,
            collection: &CollectionPath,
            id: &DocumentId,
        ) -> AppResult<Option<Document>> {
            self.0.get(collection, id).await
        }

        async fn set(&self, collection: &CollectionPath, id: &DocumentId, fields: Fields) -> AppResult<()> {
            self.0.set(collection, id, fields).await
        }

        async fn update(&self, collection: &CollectionPath, id: &DocumentId, ops: FieldOps) -> AppResult<()> {
            self.0.update(collection, id, ops).await
        }

        async fn add(&self, collection: &CollectionPath, fields: Fields) -> AppResult<DocumentId> {
            self.0.add(collection, fields).await
        }

        async fn fetch(&self, query: &Query) -> AppResult<Vec<Document>> {
            self.0.fetch(query).await
        }

        async fn subscribe(&self, query: &Query) -> AppResult<SnapshotStream> {
            if query.filters.is_empty() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.0.subscribe(query).await
        }
    }

    async fn seed_post(store: &SlowFullScanStore, id: &str, author: &str) {
        let mut fields = Fields::new();
        fields.insert("authorID".into(), author.into());
        store
            .set(&CollectionPath::posts(), &DocumentId::new(id), fields)
            .await
            .unwrap();
    }

    fn sorted_ids(snapshot: QuerySnapshot) -> Vec<String> {
        let mut out = ids(snapshot);
        out.sort();
        out
    }

    #[tokio::test]
    async fn test_snapshots_replace_state_in_order() {
        let slot = SubscriptionSlot::new("test", MetricsCollector::new());
        let state = Arc::new(Published::new(Vec::<String>::new()));
        let (tx, rx) = mpsc::unbounded();

        let sink = Arc::clone(&state);
        slot.subscribe_stream(
            rx.boxed(),
            |snap| async move { ids(snap) },
            move |value| sink.publish(value),
        )
        .await;

        tx.unbounded_send(Ok(snapshot(&["a"]))).unwrap();
        tx.unbounded_send(Ok(snapshot(&["b", "a"]))).unwrap();
        wait_until(state.watch(), |ids| ids.len() == 2).await;
        assert_eq!(state.current(), vec!["b", "a"]);
        assert!(slot.is_active());
    }

    #[tokio::test]
    async fn test_delivery_error_keeps_last_snapshot() {
        let slot = SubscriptionSlot::new("test", MetricsCollector::new());
        let state = Arc::new(Published::new(Vec::<String>::new()));
        let (tx, rx) = mpsc::unbounded();

        let sink = Arc::clone(&state);
        slot.subscribe_stream(
            rx.boxed(),
            |snap| async move { ids(snap) },
            move |value| sink.publish(value),
        )
        .await;

        tx.unbounded_send(Ok(snapshot(&["a"]))).unwrap();
        tx.unbounded_send(Err(AppError::Store("offline".into()))).unwrap();
        tx.unbounded_send(Ok(snapshot(&["b", "a"]))).unwrap();
        wait_until(state.watch(), |ids| ids.len() == 2).await;
        assert_eq!(state.current(), vec!["b", "a"]);
        assert!(slot.is_active());
    }

    #[tokio::test]
    async fn test_late_delivery_from_retired_query_is_discarded() {
        let metrics = MetricsCollector::new();
        let slot = SubscriptionSlot::new("test", metrics.clone());
        let state = Arc::new(Published::new(Vec::<String>::new()));

        let (old_tx, old_rx) = mpsc::unbounded();
        let sink = Arc::clone(&state);
        let old_generation = slot
            .subscribe_stream(
                old_rx.boxed(),
                |snap| async move { ids(snap) },
                move |value| sink.publish(value),
            )
            .await;
        old_tx.unbounded_send(Ok(snapshot(&["all-1", "all-2"]))).unwrap();
        wait_until(state.watch(), |ids| ids.len() == 2).await;

        let (new_tx, new_rx) = mpsc::unbounded();
        let sink = Arc::clone(&state);
        slot.subscribe_stream(
            new_rx.boxed(),
            |snap| async move { ids(snap) },
            move |value| sink.publish(value),
        )
        .await;
        new_tx.unbounded_send(Ok(snapshot(&["mine"]))).unwrap();
        wait_until(state.watch(), |ids| ids == &["mine"]).await;

        // The old stream is still open on the producer side and fires late;
        // its task was aborted, so the state holds
        let _ = old_tx.unbounded_send(Ok(snapshot(&["all-1", "all-2", "all-3"])));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state.current(), vec!["mine"]);

        // A delivery already prepared under the old generation is refused
        let sink = Arc::clone(&state);
        let applied = slot
            .commit_if_current(old_generation, move || sink.publish(vec!["stale".into()]))
            .await;
        assert!(!applied);
        assert_eq!(state.current(), vec!["mine"]);
        assert_eq!(metrics.business().await.stale_deliveries_discarded, 1);
    }

    #[tokio::test]
    async fn test_slow_prepare_is_cancelled_by_resubscribe() {
        let slot = SubscriptionSlot::new("test", MetricsCollector::new());
        let state = Arc::new(Published::new(Vec::<String>::new()));
        let (started_tx, mut started_rx) = mpsc::unbounded();

        let (old_tx, old_rx) = mpsc::unbounded();
        let sink = Arc::clone(&state);
        slot.subscribe_stream(
            old_rx.boxed(),
            move |snap| {
                let _ = started_tx.unbounded_send(());
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    ids(snap)
                }
            },
            move |value| sink.publish(value),
        )
        .await;
        old_tx.unbounded_send(Ok(snapshot(&["slow"]))).unwrap();
        tokio::time::timeout(Duration::from_secs(2), started_rx.next())
            .await
            .expect("slow prepare never started");

        let (new_tx, new_rx) = mpsc::unbounded();
        let sink = Arc::clone(&state);
        slot.subscribe_stream(
            new_rx.boxed(),
            |snap| async move { ids(snap) },
            move |value| sink.publish(value),
        )
        .await;
        new_tx.unbounded_send(Ok(snapshot(&["fresh"]))).unwrap();
        wait_until(state.watch(), |ids| ids == &["fresh"]).await;

        // Outlast the cancelled prepare before checking it never landed
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(state.current(), vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_overlapping_subscribes_keep_the_newest_query_live() {
        let store = SlowFullScanStore(MemoryStore::new());
        seed_post(&store, "a1", "a").await;
        seed_post(&store, "b1", "b").await;

        let slot = SubscriptionSlot::new("test", MetricsCollector::new());
        let state = Arc::new(Published::new(Vec::<String>::new()));
        let everyone = Query::collection(CollectionPath::posts());
        let by_a = Query::collection(CollectionPath::posts()).where_eq("authorID", "a");

        let (sink_all, sink_a) = (Arc::clone(&state), Arc::clone(&state));
        let (all_generation, a_generation) = tokio::join!(
            slot.subscribe(
                &store,
                &everyone,
                |snap| async move { sorted_ids(snap) },
                move |value| sink_all.publish(value),
            ),
            slot.subscribe(
                &store,
                &by_a,
                |snap| async move { sorted_ids(snap) },
                move |value| sink_a.publish(value),
            ),
        );
        let (all_generation, a_generation) = (all_generation.unwrap(), a_generation.unwrap());
        assert_ne!(all_generation, a_generation);
        assert!(slot.is_active());

        // Whichever call took the newer generation owns the slot and keeps updating
        let expected: Vec<String> = if a_generation > all_generation {
            vec!["a1".into(), "a2".into()]
        } else {
            vec!["a1".into(), "a2".into(), "b1".into()]
        };
        seed_post(&store, "a2", "a").await;
        wait_until(state.watch(), |ids| ids == &expected).await;
        assert!(slot.is_active());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_deliveries() {
        let slot = SubscriptionSlot::new("test", MetricsCollector::new());
        let state = Arc::new(Published::new(Vec::<String>::new()));
        let (tx, rx) = mpsc::unbounded();

        let sink = Arc::clone(&state);
        slot.subscribe_stream(
            rx.boxed(),
            |snap| async move { ids(snap) },
            move |value| sink.publish(value),
        )
        .await;
        slot.unsubscribe().await;

        let _ = tx.unbounded_send(Ok(snapshot(&["late"])));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(state.current().is_empty());
        assert!(!slot.is_active());
    }
}
