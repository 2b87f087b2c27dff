// Metrics for store traffic and synchronization side effects

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_time_ms: f64,
    pub max_time_ms: f64,
}

impl OperationMetrics {
    pub fn avg_time_ms(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_time_ms / self.total_calls as f64
        }
    }
}

/// Business-level counters for the synchronization engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessMetrics {
    pub posts_created: u64,
    pub likes_given: u64,
    pub likes_removed: u64,
    pub comments_made: u64,
    pub follows: u64,
    pub unfollows: u64,
    pub notifications_emitted: u64,
    pub notifications_dropped: u64,
    pub stale_deliveries_discarded: u64,
    pub name_fallbacks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessEvent {
    PostCreated,
    LikeGiven,
    LikeRemoved,
    CommentMade,
    Followed,
    Unfollowed,
    NotificationEmitted,
    NotificationDropped,
    StaleDeliveryDiscarded,
    NameFallback,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub operations: HashMap<String, OperationMetrics>,
    pub business: BusinessMetrics,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    operations: Arc<RwLock<HashMap<String, OperationMetrics>>>,
    business: Arc<RwLock<BusinessMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_operation(&self, operation: &str, duration: Duration, success: bool) {
        let mut operations = self.operations.write().await;
        let entry = operations.entry(operation.to_string()).or_default();
        let elapsed_ms = duration.as_secs_f64() * 1000.0;
        entry.total_calls += 1;
        if success {
            entry.success_count += 1;
        } else {
            entry.error_count += 1;
        }
        entry.total_time_ms += elapsed_ms;
        entry.max_time_ms = entry.max_time_ms.max(elapsed_ms);
    }

    pub async fn record_business_event(&self, event: BusinessEvent) {
        let mut business = self.business.write().await;
        match event {
            BusinessEvent::PostCreated => business.posts_created += 1,
            BusinessEvent::LikeGiven => business.likes_given += 1,
            BusinessEvent::LikeRemoved => business.likes_removed += 1,
            BusinessEvent::CommentMade => business.comments_made += 1,
            BusinessEvent::Followed => business.follows += 1,
            BusinessEvent::Unfollowed => business.unfollows += 1,
            BusinessEvent::NotificationEmitted => business.notifications_emitted += 1,
            BusinessEvent::NotificationDropped => business.notifications_dropped += 1,
            BusinessEvent::StaleDeliveryDiscarded => business.stale_deliveries_discarded += 1,
            BusinessEvent::NameFallback => business.name_fallbacks += 1,
        }
    }

    pub async fn business(&self) -> BusinessMetrics {
        self.business.read().await.clone()
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations: self.operations.read().await.clone(),
            business: self.business.read().await.clone(),
        }
    }

    pub async fn snapshot_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot().await).unwrap_or(serde_json::Value::Null)
    }
}
