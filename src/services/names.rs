// Display-name resolution for denormalized sender and follower names

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::core::strong_types::{DocumentId, UserId};
use crate::infrastructure::codec::display_name;
use crate::infrastructure::monitoring::{BusinessEvent, MetricsCollector};
use crate::infrastructure::store::{CollectionPath, DocumentStore};

#[derive(Clone)]
pub struct NameResolver {
    store: Arc<dyn DocumentStore>,
    metrics: MetricsCollector,
    unknown_user: String,
}

impl NameResolver {
    pub fn new(store: Arc<dyn DocumentStore>, metrics: MetricsCollector, unknown_user: String) -> Self {
        Self {
            store,
            metrics,
            unknown_user,
        }
    }

    /// Name on the user's profile; the fallback when the lookup fails,
    /// the profile is missing or its name is blank.
    pub async fn resolve(&self, user: &UserId) -> String {
        let lookup = self
            .store
            .get(&CollectionPath::profiles(), &DocumentId::from(user))
            .await;

        let name = match lookup {
            Ok(Some(doc)) => display_name(&doc),
            Ok(None) => None,
            Err(e) => {
                warn!("Could not resolve name for {}: {}", user, e);
                None
            }
        };

        match name {
            Some(name) => name,
            None => {
                self.metrics
                    .record_business_event(BusinessEvent::NameFallback)
                    .await;
                self.unknown_user.clone()
            }
        }
    }

    /// Resolve every user concurrently; the result lines up with `users`.
    /// Each distinct user is looked up once.
    pub async fn resolve_all(&self, users: &[UserId]) -> Vec<String> {
        let mut unique: Vec<&UserId> = Vec::new();
        for user in users {
            if !unique.contains(&user) {
                unique.push(user);
            }
        }

        let names = join_all(unique.iter().map(|user| self.resolve(user))).await;
        let by_user: HashMap<&UserId, String> = unique.into_iter().zip(names).collect();

        users
            .iter()
            .map(|user| {
                by_user
                    .get(user)
                    .cloned()
                    .unwrap_or_else(|| self.unknown_user.clone())
            })
            .collect()
    }
}
