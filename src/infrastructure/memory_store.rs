// In-memory document store with live queries, atomic field operations,
// a monotonic server clock, artificial latency and fault injection.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, warn};

use crate::core::strong_types::DocumentId;
use crate::error::{AppError, AppResult};
use crate::infrastructure::store::{
    CollectionPath, Document, DocumentStore, FieldOp, FieldOps, FieldValue, Fields, Query,
    QuerySnapshot, SnapshotStream,
};

/// Store operation kinds, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Set,
    Update,
    Add,
    Fetch,
    Subscribe,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Get => "get",
            StoreOp::Set => "set",
            StoreOp::Update => "update",
            StoreOp::Add => "add",
            StoreOp::Fetch => "fetch",
            StoreOp::Subscribe => "subscribe",
        }
    }
}

#[derive(Debug, Clone)]
struct FaultRule {
    op: StoreOp,
    /// Matches the last segment of the collection path
    collection: String,
    document: Option<DocumentId>,
    /// `None` fails forever
    remaining: Option<u32>,
}

#[derive(Debug, Clone)]
enum StoreEvent {
    Changed(CollectionPath),
    ListenerError(String, String),
}

#[derive(Debug, Default)]
struct StoreState {
    /// Documents per collection, in insertion order
    collections: HashMap<CollectionPath, Vec<Document>>,
    last_server_time: Option<DateTime<Utc>>,
}

impl StoreState {
    /// Strictly increasing server clock so write order is total
    fn server_now(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_server_time {
            Some(last) if now <= last => last + ChronoDuration::microseconds(1),
            _ => now,
        };
        self.last_server_time = Some(next);
        next
    }

    fn resolve(&mut self, value: FieldValue) -> FieldValue {
        match value {
            FieldValue::ServerTimestamp => FieldValue::Timestamp(self.server_now()),
            other => other,
        }
    }

    fn resolve_fields(&mut self, fields: Fields) -> Fields {
        fields
            .into_iter()
            .map(|(name, value)| {
                let value = self.resolve(value);
                (name, value)
            })
            .collect()
    }

    fn snapshot(&self, query: &Query) -> Vec<Document> {
        match self.collections.get(&query.collection) {
            Some(docs) => query.apply(docs),
            None => Vec::new(),
        }
    }
}

fn apply_op(current: Option<&FieldValue>, op: FieldOp) -> FieldValue {
    match op {
        FieldOp::Set(value) => value,
        FieldOp::Increment(delta) => {
            let base = current.and_then(FieldValue::as_i64).unwrap_or(0);
            FieldValue::Integer(base + delta)
        }
        FieldOp::ArrayUnion(values) => {
            let mut array = current
                .and_then(FieldValue::as_string_array)
                .map(<[String]>::to_vec)
                .unwrap_or_default();
            for value in values {
                if !array.contains(&value) {
                    array.push(value);
                }
            }
            FieldValue::StringArray(array)
        }
        FieldOp::ArrayRemove(values) => {
            let mut array = current
                .and_then(FieldValue::as_string_array)
                .map(<[String]>::to_vec)
                .unwrap_or_default();
            array.retain(|v| !values.contains(v));
            FieldValue::StringArray(array)
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
    faults: Arc<Mutex<Vec<FaultRule>>>,
    events: broadcast::Sender<StoreEvent>,
    latency: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(1024);
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            faults: Arc::new(Mutex::new(Vec::new())),
            events,
            latency: None,
        }
    }

    /// Every operation sleeps this long before touching state
    pub fn with_latency(mut self, latency: Option<Duration>) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `op` against `collection` once
    pub async fn fail_next(&self, op: StoreOp, collection: &str) {
        self.faults.lock().await.push(FaultRule {
            op,
            collection: collection.to_string(),
            document: None,
            remaining: Some(1),
        });
    }

    /// Fail every `op` against one document until cleared
    pub async fn fail_document(&self, op: StoreOp, collection: &str, id: &DocumentId) {
        self.faults.lock().await.push(FaultRule {
            op,
            collection: collection.to_string(),
            document: Some(id.clone()),
            remaining: None,
        });
    }

    pub async fn clear_faults(&self) {
        self.faults.lock().await.clear();
    }

    /// Push a delivery error into every live query on `collection`
    pub fn inject_listener_error(&self, collection: &str, message: &str) {
        let _ = self.events.send(StoreEvent::ListenerError(
            collection.to_string(),
            message.to_string(),
        ));
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn check_fault(
        &self,
        op: StoreOp,
        collection: &CollectionPath,
        id: Option<&DocumentId>,
    ) -> AppResult<()> {
        let mut faults = self.faults.lock().await;
        let position = faults.iter().position(|rule| {
            rule.op == op
                && rule.collection == collection.name()
                && match (&rule.document, id) {
                    (None, _) => true,
                    (Some(target), Some(id)) => target == id,
                    (Some(_), None) => false,
                }
        });

        let Some(index) = position else {
            return Ok(());
        };
        let exhausted = match faults[index].remaining.as_mut() {
            Some(remaining) => {
                *remaining -= 1;
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            faults.remove(index);
        }
        warn!("Injected {} failure on {}", op.as_str(), collection);
        Err(AppError::Store(format!(
            "injected {} failure on {}",
            op.as_str(),
            collection
        )))
    }

    async fn before(
        &self,
        op: StoreOp,
        collection: &CollectionPath,
        id: Option<&DocumentId>,
    ) -> AppResult<()> {
        self.simulate_latency().await;
        self.check_fault(op, collection, id).await
    }

    fn notify_changed(&self, collection: &CollectionPath) {
        // No receivers simply means nobody is listening
        let _ = self.events.send(StoreEvent::Changed(collection.clone()));
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
    ) -> AppResult<Option<Document>> {
        self.before(StoreOp::Get, collection, Some(id)).await?;
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| &doc.id == id))
            .cloned())
    }

    async fn set(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
        fields: Fields,
    ) -> AppResult<()> {
        self.before(StoreOp::Set, collection, Some(id)).await?;
        {
            let mut state = self.state.write().await;
            let fields = state.resolve_fields(fields);
            let docs = state.collections.entry(collection.clone()).or_default();
            match docs.iter_mut().find(|doc| &doc.id == id) {
                Some(existing) => existing.fields = fields,
                None => docs.push(Document::new(id.clone(), fields)),
            }
        }
        debug!("set {}/{}", collection, id);
        self.notify_changed(collection);
        Ok(())
    }

    async fn update(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
        ops: FieldOps,
    ) -> AppResult<()> {
        self.before(StoreOp::Update, collection, Some(id)).await?;
        {
            let mut state = self.state.write().await;
            let resolved: Vec<(String, FieldOp)> = ops
                .into_iter()
                .map(|(field, op)| match op {
                    FieldOp::Set(value) => (field, FieldOp::Set(state.resolve(value))),
                    other => (field, other),
                })
                .collect();

            let doc = state
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|doc| &doc.id == id))
                .ok_or_else(|| AppError::NotFound(format!("{}/{}", collection, id)))?;

            for (field, op) in resolved {
                let value = apply_op(doc.fields.get(&field), op);
                doc.fields.insert(field, value);
            }
        }
        debug!("update {}/{}", collection, id);
        self.notify_changed(collection);
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> AppResult<DocumentId> {
        self.before(StoreOp::Add, collection, None).await?;
        let id = DocumentId::generate();
        {
            let mut state = self.state.write().await;
            let fields = state.resolve_fields(fields);
            state
                .collections
                .entry(collection.clone())
                .or_default()
                .push(Document::new(id.clone(), fields));
        }
        debug!("add {}/{}", collection, id);
        self.notify_changed(collection);
        Ok(id)
    }

    async fn fetch(&self, query: &Query) -> AppResult<Vec<Document>> {
        self.before(StoreOp::Fetch, &query.collection, None).await?;
        Ok(self.state.read().await.snapshot(query))
    }

    async fn subscribe(&self, query: &Query) -> AppResult<SnapshotStream> {
        self.before(StoreOp::Subscribe, &query.collection, None).await?;

        // Subscribe to the change feed while holding the read lock so no
        // write can land between the initial snapshot and the feed.
        let (initial, rx) = {
            let state = self.state.read().await;
            let rx = self.events.subscribe();
            (state.snapshot(query), rx)
        };

        let first = stream::once(async move {
            Ok(QuerySnapshot {
                documents: initial,
                read_time: Utc::now(),
            })
        });

        let state = Arc::clone(&self.state);
        let query = query.clone();
        let updates = stream::unfold((rx, state, query), |(mut rx, state, query)| async move {
            loop {
                let item = match rx.recv().await {
                    Ok(StoreEvent::Changed(collection)) if collection == query.collection => {
                        Ok(state.read().await.snapshot(&query))
                    }
                    Ok(StoreEvent::ListenerError(collection, message))
                        if collection == query.collection.name() =>
                    {
                        Err(AppError::Store(message))
                    }
                    Ok(_) => continue,
                    // Missed events are covered by re-reading the full result set
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        Ok(state.read().await.snapshot(&query))
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                };
                let item = item.map(|documents| QuerySnapshot {
                    documents,
                    read_time: Utc::now(),
                });
                return Some((item, (rx, state, query)));
            }
        });

        Ok(first.chain(updates).boxed())
    }
}
