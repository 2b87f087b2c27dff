// Infrastructure - the document store seam and everything layered on it
pub mod store;                 // Store interface, documents, queries
pub mod memory_store;          // In-process store with live queries
pub mod codec;                 // Entity <-> document mapping
pub mod store_decorators;      // Timeout and instrumentation layers
pub mod subscription;          // Live query slots
pub mod inflight;              // Toggle serialization
pub mod monitoring;            // Metrics

pub use store::{
    CollectionPath, Direction, Document, DocumentStore, FieldOp, FieldOps, FieldValue, Fields,
    Query, QuerySnapshot, SnapshotStream,
};
pub use memory_store::{MemoryStore, StoreOp};
pub use codec::DocumentCodec;
pub use store_decorators::{layered_store, InstrumentedStore, TimeoutStore};
pub use subscription::{Generation, SubscriptionSlot};
pub use inflight::InFlightGuard;
pub use monitoring::{BusinessEvent, MetricsCollector, MetricsSnapshot};
