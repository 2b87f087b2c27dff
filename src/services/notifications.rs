// Notification Fan-Out & Aggregator
//
// Fan-out appends one notification document per interaction and never
// fails the interaction that caused it. The aggregator keeps the live list
// addressed to one recipient, with sender names resolved for the whole
// batch before it is published.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, instrument};

use crate::app_state::AppState;
use crate::core::published::Published;
use crate::core::strong_types::{DocumentId, UserId};
use crate::error::AppResult;
use crate::infrastructure::codec::{fields, new_notification_fields, DocumentCodec};
use crate::infrastructure::monitoring::{BusinessEvent, MetricsCollector};
use crate::infrastructure::store::{CollectionPath, Direction, DocumentStore, Query, QuerySnapshot};
use crate::infrastructure::subscription::{Generation, SubscriptionSlot};
use crate::models::{NotificationItem, NotificationKind};
use crate::services::names::NameResolver;

#[derive(Clone)]
pub struct NotificationFanOut {
    store: Arc<dyn DocumentStore>,
    metrics: MetricsCollector,
}

impl NotificationFanOut {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            metrics: state.metrics.clone(),
        }
    }

    /// Append a notification. Failures are logged and counted, never returned.
    #[instrument(skip(self))]
    pub async fn emit(
        &self,
        kind: NotificationKind,
        post_id: Option<&DocumentId>,
        sender: &UserId,
        recipient: &UserId,
    ) -> Option<DocumentId> {
        let record = new_notification_fields(&kind, post_id, sender, recipient);
        match self
            .store
            .add(&CollectionPath::notifications(), record)
            .await
        {
            Ok(id) => {
                info!("Emitted {} notification {} for {}", kind, id, recipient);
                self.metrics
                    .record_business_event(BusinessEvent::NotificationEmitted)
                    .await;
                Some(id)
            }
            Err(e) => {
                error!(
                    "Dropped {} notification from {} to {}: {}",
                    kind, sender, recipient, e
                );
                self.metrics
                    .record_business_event(BusinessEvent::NotificationDropped)
                    .await;
                None
            }
        }
    }
}

pub struct NotificationAggregator {
    store: Arc<dyn DocumentStore>,
    resolver: NameResolver,
    notifications: Arc<Published<Vec<NotificationItem>>>,
    slot: SubscriptionSlot,
}

impl NotificationAggregator {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            resolver: NameResolver::new(
                Arc::clone(&state.store),
                state.metrics.clone(),
                state.config.fallbacks.unknown_user.clone(),
            ),
            notifications: Arc::new(Published::default()),
            slot: SubscriptionSlot::new("notifications", state.metrics.clone()),
        }
    }

    /// Live list of notifications addressed to `recipient`, newest first.
    /// Replaces any earlier subscription of this aggregator.
    pub async fn subscribe(&self, recipient: &UserId) -> AppResult<Generation> {
        let query = Query::collection(CollectionPath::notifications())
            .where_eq(fields::RECIPIENT_USER_ID, recipient.as_str())
            .order_by(fields::TIMESTAMP, Direction::Descending);

        let resolver = self.resolver.clone();
        let sink = Arc::clone(&self.notifications);
        self.slot
            .subscribe(
                self.store.as_ref(),
                &query,
                move |snapshot| resolve_senders(resolver.clone(), snapshot),
                move |items| sink.publish(items),
            )
            .await
    }

    pub async fn unsubscribe(&self) {
        self.slot.unsubscribe().await;
    }

    pub fn notifications(&self) -> Vec<NotificationItem> {
        self.notifications.current()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<NotificationItem>> {
        self.notifications.watch()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notifications
            .current()
            .iter()
            .map(NotificationItem::message)
            .collect()
    }
}

async fn resolve_senders(resolver: NameResolver, snapshot: QuerySnapshot) -> Vec<NotificationItem> {
    let mut items = NotificationItem::decode_all(&snapshot.documents);
    let senders: Vec<UserId> = items.iter().map(|n| n.sender_user_id.clone()).collect();
    let names = resolver.resolve_all(&senders).await;
    for (item, name) in items.iter_mut().zip(names) {
        item.sender_name = name;
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::infrastructure::memory_store::{MemoryStore, StoreOp};
    use crate::infrastructure::store::{Fields, NOTIFICATIONS};
    use std::time::Duration;

    async fn seed_profile(raw: &MemoryStore, id: &str, name: &str) {
        let mut record = Fields::new();
        record.insert(fields::NAME.into(), name.into());
        raw.set(&CollectionPath::profiles(), &DocumentId::new(id), record)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_emit_failure_is_swallowed() {
        let (state, raw) = AppState::in_memory(Config::default());
        let fan_out = NotificationFanOut::new(&state);
        raw.fail_next(StoreOp::Add, NOTIFICATIONS).await;

        let id = fan_out
            .emit(
                NotificationKind::Like,
                Some(&DocumentId::new("p1")),
                &UserId::new("bob"),
                &UserId::new("ada"),
            )
            .await;
        assert!(id.is_none());
        assert_eq!(state.metrics.business().await.notifications_dropped, 1);
    }

    #[tokio::test]
    async fn test_aggregator_publishes_resolved_batch_for_recipient() {
        let (state, raw) = AppState::in_memory(Config::default());
        seed_profile(&raw, "bob", "Bob").await;
        let fan_out = NotificationFanOut::new(&state);
        let ada = UserId::new("ada");
        let post = DocumentId::new("p1");

        fan_out
            .emit(NotificationKind::Like, Some(&post), &UserId::new("bob"), &ada)
            .await;
        fan_out
            .emit(NotificationKind::Follow, None, &UserId::new("ghost"), &ada)
            .await;
        fan_out
            .emit(NotificationKind::Like, Some(&post), &ada, &UserId::new("bob"))
            .await;

        let aggregator = NotificationAggregator::new(&state);
        aggregator.subscribe(&ada).await.unwrap();
        let mut rx = aggregator.watch();
        let items = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|items| items.len() == 2),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();

        // Newest first, every sender resolved
        assert_eq!(items[0].kind, NotificationKind::Follow);
        assert_eq!(items[0].sender_name, "Unknown User");
        assert_eq!(items[1].sender_name, "Bob");
        assert_eq!(
            aggregator.messages(),
            vec!["Unknown User started following you.", "Bob liked your post."]
        );
    }

    #[tokio::test]
    async fn test_listener_error_keeps_last_list() {
        let (state, raw) = AppState::in_memory(Config::default());
        let fan_out = NotificationFanOut::new(&state);
        let ada = UserId::new("ada");
        fan_out
            .emit(NotificationKind::Comment, None, &UserId::new("bob"), &ada)
            .await;

        let aggregator = NotificationAggregator::new(&state);
        aggregator.subscribe(&ada).await.unwrap();
        let mut rx = aggregator.watch();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|items| items.len() == 1))
            .await
            .unwrap()
            .unwrap();

        raw.inject_listener_error(NOTIFICATIONS, "connection reset");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(aggregator.notifications().len(), 1);
    }
}
