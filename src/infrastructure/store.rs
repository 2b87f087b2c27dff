// Document Store Interface - the operations the synchronization engine needs
// from the remote document database: point reads, whole-document writes,
// atomic field operations, appends, and live full-snapshot queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::strong_types::DocumentId;
use crate::error::AppResult;

pub const POSTS: &str = "posts";
pub const COMMENTS: &str = "comments";
pub const PROFILES: &str = "profiles";
pub const NOTIFICATIONS: &str = "notifications";

/// A single field value as exchanged with the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    StringArray(Vec<String>),
    Timestamp(DateTime<Utc>),
    /// Write-only sentinel replaced by the store's clock when applied
    ServerTimestamp,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            FieldValue::StringArray(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Boolean(_) => 0,
            FieldValue::Integer(_) => 1,
            FieldValue::Timestamp(_) | FieldValue::ServerTimestamp => 2,
            FieldValue::String(_) => 3,
            FieldValue::StringArray(_) => 4,
        }
    }

    /// Total order used by query sorting; values of different kinds order by kind
    pub fn order(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a.cmp(b),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.cmp(b),
            (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
            (FieldValue::StringArray(a), FieldValue::StringArray(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        FieldValue::StringArray(values)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

pub type Fields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: DocumentId, fields: Fields) -> Self {
        Self { id, fields }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}

/// Field-level mutation applied atomically by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldOp {
    Set(FieldValue),
    Increment(i64),
    /// Append each value not already present
    ArrayUnion(Vec<String>),
    /// Remove every occurrence of each value
    ArrayRemove(Vec<String>),
}

pub type FieldOps = Vec<(String, FieldOp)>;

/// Address of a collection; sub-collections nest as `parent/id/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn sub(&self, id: &DocumentId, name: &str) -> Self {
        Self(format!("{}/{}/{}", self.0, id, name))
    }

    pub fn posts() -> Self {
        Self::root(POSTS)
    }

    pub fn profiles() -> Self {
        Self::root(PROFILES)
    }

    pub fn notifications() -> Self {
        Self::root(NOTIFICATIONS)
    }

    pub fn comments(post_id: &DocumentId) -> Self {
        Self::posts().sub(post_id, COMMENTS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, e.g. `comments` for `posts/p1/comments`
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq(String, FieldValue),
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(field, value) => doc.get(field) == Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn collection(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filter and sort `docs`, which must be in insertion order.
    /// The sort is stable so equal keys keep insertion order.
    pub fn apply<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let mut result: Vec<Document> = docs
            .into_iter()
            .filter(|doc| self.matches(doc))
            .cloned()
            .collect();

        if let Some(order) = &self.order_by {
            result.sort_by(|a, b| {
                let ordering = match (a.get(&order.field), b.get(&order.field)) {
                    (Some(x), Some(y)) => x.order(y),
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }
        result
    }
}

/// The full result set of a query at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub documents: Vec<Document>,
    pub read_time: DateTime<Utc>,
}

pub type SnapshotStream = BoxStream<'static, AppResult<QuerySnapshot>>;

/// Document database interface.
///
/// `subscribe` yields the current result set first and then a fresh full
/// result set whenever the collection changes. Errors on the stream are
/// delivery failures; the stream stays open after them.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &CollectionPath, id: &DocumentId)
        -> AppResult<Option<Document>>;
    async fn set(&self, collection: &CollectionPath, id: &DocumentId, fields: Fields)
        -> AppResult<()>;
    async fn update(&self, collection: &CollectionPath, id: &DocumentId, ops: FieldOps)
        -> AppResult<()>;
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> AppResult<DocumentId>;
    async fn fetch(&self, query: &Query) -> AppResult<Vec<Document>>;
    async fn subscribe(&self, query: &Query) -> AppResult<SnapshotStream>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn get(
        &self,
        collection: &CollectionPath,
        id: &DocumentId,
    ) -> AppResult<Option<Document>> {
        (**self).get(collection, id).await
    }

    async fn set(&self, collection: &CollectionPath, id: &DocumentId, fields: Fields) -> AppResult<()> {
        (**self).set(collection, id, fields).await
    }

    async fn update(&self, collection: &CollectionPath, id: &DocumentId, ops: FieldOps) -> AppResult<()> {
        (**self).update(collection, id, ops).await
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> AppResult<DocumentId> {
        (**self).add(collection, fields).await
    }

    async fn fetch(&self, query: &Query) -> AppResult<Vec<Document>> {
        (**self).fetch(query).await
    }

    async fn subscribe(&self, query: &Query) -> AppResult<SnapshotStream> {
        (**self).subscribe(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(id: &str, author: &str, secs: i64) -> Document {
        let mut fields = Fields::new();
        fields.insert("authorID".into(), author.into());
        fields.insert(
            "timestamp".into(),
            Utc.timestamp_opt(secs, 0).unwrap().into(),
        );
        Document::new(DocumentId::new(id), fields)
    }

    #[test]
    fn test_collection_paths() {
        let comments = CollectionPath::comments(&DocumentId::new("p1"));
        assert_eq!(comments.as_str(), "posts/p1/comments");
        assert_eq!(comments.name(), "comments");
        assert_eq!(CollectionPath::profiles().name(), "profiles");
    }

    #[test]
    fn test_query_filters_and_sorts_descending() {
        let docs = vec![doc("a", "x", 10), doc("b", "y", 30), doc("c", "x", 20)];
        let query = Query::collection(CollectionPath::posts())
            .where_eq("authorID", "x")
            .order_by("timestamp", Direction::Descending);

        let ids: Vec<_> = query.apply(&docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![DocumentId::new("c"), DocumentId::new("a")]);
    }

    #[test]
    fn test_query_sort_is_stable_for_equal_keys() {
        let docs = vec![doc("first", "x", 5), doc("second", "x", 5), doc("third", "x", 1)];
        let query =
            Query::collection(CollectionPath::posts()).order_by("timestamp", Direction::Ascending);

        let ids: Vec<_> = query.apply(&docs).into_iter().map(|d| d.id).collect();
        assert_eq!(
            ids,
            vec![
                DocumentId::new("third"),
                DocumentId::new("first"),
                DocumentId::new("second")
            ]
        );
    }
}
