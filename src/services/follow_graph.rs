// Profile & Follow-Graph Manager
//
// Owns one profile record (the viewer's own unless another target is
// given), the resolved names of its followers and a one-shot directory of
// every profile for search. The followers array is only ever written by
// `toggle_follow`; profile edits never touch it.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument};

use crate::app_state::AppState;
use crate::core::published::Published;
use crate::core::strong_types::{DocumentId, UserId};
use crate::core::viewer::ViewerContext;
use crate::error::{AppError, AppResult};
use crate::infrastructure::codec::{
    fields, followers_value, profile_entry, profile_fields_without_followers, DocumentCodec,
};
use crate::infrastructure::inflight::{follow_key, InFlightGuard};
use crate::infrastructure::monitoring::{BusinessEvent, MetricsCollector};
use crate::infrastructure::store::{CollectionPath, DocumentStore, FieldOp, FieldOps, Query};
use crate::models::{NotificationKind, Profile, ProfileEntry};
use crate::services::feed;
use crate::services::names::NameResolver;
use crate::services::notifications::NotificationFanOut;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowTransition {
    Followed,
    Unfollowed,
}

pub struct ProfileManager {
    viewer: ViewerContext,
    target: UserId,
    store: Arc<dyn DocumentStore>,
    metrics: MetricsCollector,
    toggles: InFlightGuard,
    fan_out: NotificationFanOut,
    resolver: NameResolver,
    profile: Published<Profile>,
    follower_names: Published<Vec<String>>,
    directory: Published<Vec<ProfileEntry>>,
    // Serializes updates of the profile and follower-name cells
    refresh: Mutex<()>,
}

impl ProfileManager {
    /// Manager for `target`'s profile, or the viewer's own when `None`
    pub fn new(state: &AppState, viewer: ViewerContext, target: Option<UserId>) -> Self {
        let target = target.unwrap_or_else(|| viewer.user_id.clone());
        Self {
            viewer,
            target,
            store: Arc::clone(&state.store),
            metrics: state.metrics.clone(),
            toggles: state.toggles.clone(),
            fan_out: NotificationFanOut::new(state),
            resolver: NameResolver::new(
                Arc::clone(&state.store),
                state.metrics.clone(),
                state.config.fallbacks.unknown_user.clone(),
            ),
            profile: Published::default(),
            follower_names: Published::default(),
            directory: Published::default(),
            refresh: Mutex::new(()),
        }
    }

    pub fn target(&self) -> &UserId {
        &self.target
    }

    pub fn is_own_profile(&self) -> bool {
        self.viewer.user_id == self.target
    }

    fn profile_id(&self) -> DocumentId {
        DocumentId::from(&self.target)
    }

    /// Load the owned profile and the names of its followers, publishing
    /// both once every name is resolved. A missing profile leaves the
    /// current state untouched.
    #[instrument(skip(self), fields(profile = %self.target))]
    pub async fn fetch_profile(&self) -> AppResult<Profile> {
        let _serial = self.refresh.lock().await;
        let doc = self
            .store
            .get(&CollectionPath::profiles(), &self.profile_id())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {}", self.target)))?;

        let profile = Profile::from_document(&doc);
        let names = self.resolver.resolve_all(&profile.followers).await;
        self.profile.publish(profile.clone());
        self.follower_names.publish(names);
        debug!(
            "Loaded profile {} with {} follower(s)",
            self.target,
            profile.followers.len()
        );
        Ok(profile)
    }

    /// Write every editable field of the owned profile. Followers are
    /// kept as stored; a profile that does not exist yet is created with
    /// the locally known followers.
    ///
    /// Creation is not atomic: when two first saves of the same profile
    /// race, both fall back to a whole-document `set` and the last writer
    /// wins.
    #[instrument(skip(self, profile), fields(profile = %self.target))]
    pub async fn save_profile(&self, profile: Profile) -> AppResult<()> {
        if !self.is_own_profile() {
            return Err(AppError::Validation(format!(
                "{} cannot edit the profile of {}",
                self.viewer.user_id, self.target
            )));
        }

        let profiles = CollectionPath::profiles();
        let id = self.profile_id();
        let editable = profile_fields_without_followers(&profile);
        let ops: FieldOps = editable
            .iter()
            .map(|(field, value)| (field.clone(), FieldOp::Set(value.clone())))
            .collect();

        match self.store.update(&profiles, &id, ops).await {
            Ok(()) => info!("Saved profile {}", self.target),
            Err(AppError::NotFound(_)) => {
                let mut record = editable;
                record.insert(
                    fields::FOLLOWERS.into(),
                    followers_value(&self.profile.current().followers),
                );
                self.store.set(&profiles, &id, record).await?;
                info!("Created profile {}", self.target);
            }
            Err(e) => return Err(e),
        }

        let _serial = self.refresh.lock().await;
        self.profile.modify(|current| {
            let followers = std::mem::take(&mut current.followers);
            *current = Profile {
                followers,
                ..profile
            };
        });
        Ok(())
    }

    /// Follow or unfollow `target` as `actor` by rewriting the target's
    /// whole followers array. Only the follow transition notifies.
    #[instrument(skip(self))]
    pub async fn toggle_follow(
        &self,
        target: &UserId,
        actor: &UserId,
    ) -> AppResult<FollowTransition> {
        if target == actor {
            return Err(AppError::Validation(format!("{} cannot follow themselves", actor)));
        }
        let _ticket = self
            .toggles
            .try_acquire(follow_key(actor.as_str(), target.as_str()))?;

        let profiles = CollectionPath::profiles();
        let target_id = DocumentId::from(target);
        let doc = self
            .store
            .get(&profiles, &target_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {}", target)))?;

        let mut followers = Profile::from_document(&doc).followers;
        let transition = if followers.contains(actor) {
            followers.retain(|follower| follower != actor);
            FollowTransition::Unfollowed
        } else {
            followers.push(actor.clone());
            FollowTransition::Followed
        };

        let ops = vec![(
            fields::FOLLOWERS.to_string(),
            FieldOp::Set(followers_value(&followers)),
        )];
        self.store.update(&profiles, &target_id, ops).await?;
        info!("{} {:?} {}", actor, transition, target);

        match transition {
            FollowTransition::Followed => {
                self.metrics
                    .record_business_event(BusinessEvent::Followed)
                    .await;
                self.fan_out
                    .emit(NotificationKind::Follow, None, actor, target)
                    .await;
            }
            FollowTransition::Unfollowed => {
                self.metrics
                    .record_business_event(BusinessEvent::Unfollowed)
                    .await;
            }
        }

        if target == &self.target {
            self.apply_followers(followers).await;
        }
        Ok(transition)
    }

    async fn apply_followers(&self, followers: Vec<UserId>) {
        let _serial = self.refresh.lock().await;
        let names = self.resolver.resolve_all(&followers).await;
        self.profile.modify(|profile| profile.followers = followers);
        self.follower_names.publish(names);
    }

    /// Names of the owned profile's followers, in follower order. Lookups
    /// that fail resolve to the unknown-user fallback.
    pub async fn fetch_follower_names(&self) -> Vec<String> {
        let _serial = self.refresh.lock().await;
        let followers = self.profile.current().followers;
        let names = self.resolver.resolve_all(&followers).await;
        self.follower_names.publish(names.clone());
        names
    }

    /// One-shot load of every profile for directory search
    pub async fn fetch_all_profiles(&self) -> AppResult<Vec<ProfileEntry>> {
        let docs = self
            .store
            .fetch(&Query::collection(CollectionPath::profiles()))
            .await?;
        let entries: Vec<ProfileEntry> = docs.iter().map(profile_entry).collect();
        debug!("Loaded directory of {} profile(s)", entries.len());
        self.directory.publish(entries.clone());
        Ok(entries)
    }

    pub fn search(&self, query: &str) -> Vec<ProfileEntry> {
        feed::search_profiles(&self.directory.current(), query)
    }

    pub fn is_viewer_following(&self) -> bool {
        self.profile.current().has_follower(&self.viewer.user_id)
    }

    pub fn profile(&self) -> Profile {
        self.profile.current()
    }

    pub fn follower_names(&self) -> Vec<String> {
        self.follower_names.current()
    }

    pub fn directory(&self) -> Vec<ProfileEntry> {
        self.directory.current()
    }

    pub fn watch_profile(&self) -> watch::Receiver<Profile> {
        self.profile.watch()
    }

    pub fn watch_follower_names(&self) -> watch::Receiver<Vec<String>> {
        self.follower_names.watch()
    }
}
