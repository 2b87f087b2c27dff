// Post Synchronizer - canonical post and comment lists plus the writes that
// change them. Writes go to the store first; local lists only ever change
// through a live-query delivery.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::app_state::AppState;
use crate::config::FallbackConfig;
use crate::core::published::Published;
use crate::core::strong_types::{DocumentId, UserId};
use crate::core::viewer::ViewerContext;
use crate::error::{AppError, AppResult};
use crate::infrastructure::codec::{fields, new_comment_fields, new_post_fields, DocumentCodec};
use crate::infrastructure::inflight::{like_key, InFlightGuard};
use crate::infrastructure::monitoring::{BusinessEvent, MetricsCollector};
use crate::infrastructure::store::{CollectionPath, Direction, DocumentStore, FieldOp, Query};
use crate::infrastructure::subscription::{Generation, SubscriptionSlot};
use crate::models::{Comment, NotificationKind, Post, Profile};
use crate::services::feed;
use crate::services::notifications::NotificationFanOut;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTransition {
    Liked,
    Unliked,
}

pub struct PostSynchronizer {
    viewer: ViewerContext,
    store: Arc<dyn DocumentStore>,
    metrics: MetricsCollector,
    toggles: InFlightGuard,
    fallbacks: FallbackConfig,
    fan_out: NotificationFanOut,
    posts: Arc<Published<Vec<Post>>>,
    comments: Arc<Published<Vec<Comment>>>,
    posts_slot: SubscriptionSlot,
    comments_slot: SubscriptionSlot,
}

fn reject_blank(content: &str, what: &str) -> AppResult<()> {
    if content.trim().is_empty() {
        warn!("Rejected {} with empty content", what);
        return Err(AppError::Validation(format!("{} content is empty", what)));
    }
    Ok(())
}

fn first_non_blank<'a>(candidates: [Option<&'a str>; 2], fallback: &'a str) -> String {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or(fallback)
        .to_string()
}

impl PostSynchronizer {
    pub fn new(state: &AppState, viewer: ViewerContext) -> Self {
        Self {
            viewer,
            store: Arc::clone(&state.store),
            metrics: state.metrics.clone(),
            toggles: state.toggles.clone(),
            fallbacks: state.config.fallbacks.clone(),
            fan_out: NotificationFanOut::new(state),
            posts: Arc::new(Published::default()),
            comments: Arc::new(Published::default()),
            posts_slot: SubscriptionSlot::new("posts", state.metrics.clone()),
            comments_slot: SubscriptionSlot::new("comments", state.metrics.clone()),
        }
    }

    pub fn viewer(&self) -> &ViewerContext {
        &self.viewer
    }

    /// Live feed of every post, newest first
    pub async fn fetch_all(&self) -> AppResult<Generation> {
        let query = Query::collection(CollectionPath::posts())
            .order_by(fields::TIMESTAMP, Direction::Descending);
        self.subscribe_posts(query).await
    }

    /// Live feed of one author's posts, newest first. Shares the slot with
    /// `fetch_all`, so whichever was called last owns the post list.
    pub async fn fetch_by_author(&self, author: &UserId) -> AppResult<Generation> {
        let query = Query::collection(CollectionPath::posts())
            .where_eq(fields::AUTHOR_ID, author.as_str())
            .order_by(fields::TIMESTAMP, Direction::Descending);
        self.subscribe_posts(query).await
    }

    async fn subscribe_posts(&self, query: Query) -> AppResult<Generation> {
        let sink = Arc::clone(&self.posts);
        self.posts_slot
            .subscribe(
                self.store.as_ref(),
                &query,
                |snapshot| async move { Post::decode_all(&snapshot.documents) },
                move |posts| sink.publish(posts),
            )
            .await
    }

    /// Live comment thread of `post`, oldest first
    pub async fn fetch_comments(&self, post: &Post) -> AppResult<Generation> {
        let query = Query::collection(CollectionPath::comments(&post.id))
            .order_by(fields::TIMESTAMP, Direction::Ascending);
        let sink = Arc::clone(&self.comments);
        self.comments_slot
            .subscribe(
                self.store.as_ref(),
                &query,
                |snapshot| async move { Comment::decode_all(&snapshot.documents) },
                move |comments| sink.publish(comments),
            )
            .await
    }

    pub async fn unsubscribe(&self) {
        self.posts_slot.unsubscribe().await;
        self.comments_slot.unsubscribe().await;
    }

    /// Publish a new post authored by the viewer. `author` is copied into
    /// the post, so later profile edits leave it unchanged.
    #[instrument(skip(self, content, author), fields(viewer = %self.viewer.user_id))]
    pub async fn create(&self, content: &str, author: &Profile) -> AppResult<DocumentId> {
        reject_blank(content, "post")?;

        let record = new_post_fields(content, &self.viewer.user_id, author);
        let id = self.store.add(&CollectionPath::posts(), record).await?;
        info!("Created post {}", id);
        self.metrics
            .record_business_event(BusinessEvent::PostCreated)
            .await;
        Ok(id)
    }

    /// Like or unlike `post` as `actor`, decided from the stored document.
    /// Only the like transition notifies the author.
    #[instrument(skip(self, post), fields(post = %post.id))]
    pub async fn toggle_like(&self, post: &Post, actor: &UserId) -> AppResult<LikeTransition> {
        let _ticket = self
            .toggles
            .try_acquire(like_key(actor.as_str(), post.id.as_str()))?;

        let posts = CollectionPath::posts();
        let current = self
            .store
            .get(&posts, &post.id)
            .await?
            .map(|doc| Post::from_document(&doc))
            .ok_or_else(|| AppError::NotFound(format!("post {}", post.id)))?;

        let member = vec![actor.as_str().to_string()];
        let (transition, ops) = if current.is_liked_by(actor) {
            (
                LikeTransition::Unliked,
                vec![
                    (fields::LIKED_BY.to_string(), FieldOp::ArrayRemove(member)),
                    (fields::LIKE_COUNT.to_string(), FieldOp::Increment(-1)),
                ],
            )
        } else {
            (
                LikeTransition::Liked,
                vec![
                    (fields::LIKED_BY.to_string(), FieldOp::ArrayUnion(member)),
                    (fields::LIKE_COUNT.to_string(), FieldOp::Increment(1)),
                ],
            )
        };
        self.store.update(&posts, &post.id, ops).await?;
        info!("{} {:?} post {}", actor, transition, post.id);

        match transition {
            LikeTransition::Liked => {
                self.metrics
                    .record_business_event(BusinessEvent::LikeGiven)
                    .await;
                if current.author_id.is_valid() {
                    self.fan_out
                        .emit(NotificationKind::Like, Some(&post.id), actor, &current.author_id)
                        .await;
                } else {
                    warn!("Post {} has no author, like notification skipped", post.id);
                }
            }
            LikeTransition::Unliked => {
                self.metrics
                    .record_business_event(BusinessEvent::LikeRemoved)
                    .await;
            }
        }
        Ok(transition)
    }

    /// Comment on `post` as the viewer. Author name and picture come from a
    /// fresh read of the viewer's profile, then from `author`, then from the
    /// configured fallbacks.
    #[instrument(skip(self, post, content, author), fields(post = %post.id))]
    pub async fn add_comment(
        &self,
        post: &Post,
        content: &str,
        author: &Profile,
    ) -> AppResult<DocumentId> {
        reject_blank(content, "comment")?;

        let fresh = match self
            .store
            .get(&CollectionPath::profiles(), &DocumentId::from(&self.viewer.user_id))
            .await
        {
            Ok(Some(doc)) => Some(Profile::from_document(&doc)),
            Ok(None) => None,
            Err(e) => {
                warn!("Using cached profile for comment author: {}", e);
                None
            }
        };
        let author_name = first_non_blank(
            [fresh.as_ref().map(|p| p.name.as_str()), Some(author.name.as_str())],
            &self.fallbacks.unknown_user,
        );
        let profile_pic = first_non_blank(
            [
                fresh.as_ref().map(|p| p.profile_pic_name.as_str()),
                Some(author.profile_pic_name.as_str()),
            ],
            &self.fallbacks.default_profile_pic,
        );

        let record = new_comment_fields(content, &author_name, &profile_pic);
        let id = self
            .store
            .add(&CollectionPath::comments(&post.id), record)
            .await?;
        info!("Added comment {} to post {}", id, post.id);
        self.metrics
            .record_business_event(BusinessEvent::CommentMade)
            .await;

        if post.author_id.is_valid() {
            self.fan_out
                .emit(
                    NotificationKind::Comment,
                    Some(&post.id),
                    &self.viewer.user_id,
                    &post.author_id,
                )
                .await;
        }
        Ok(id)
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.current()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.comments.current()
    }

    pub fn watch_posts(&self) -> watch::Receiver<Vec<Post>> {
        self.posts.watch()
    }

    pub fn watch_comments(&self) -> watch::Receiver<Vec<Comment>> {
        self.comments.watch()
    }

    pub fn search(&self, query: &str) -> Vec<Post> {
        feed::filter_by_text(&self.posts.current(), query)
    }

    pub fn for_you(&self, viewer_profile: &Profile) -> Vec<Post> {
        feed::for_you(&self.posts.current(), viewer_profile)
    }
}
