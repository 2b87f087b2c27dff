// Synchronization services - the managers that own canonical state

pub mod feed;
pub mod names;
pub mod notifications;
pub mod post_sync;
pub mod follow_graph;

pub use follow_graph::{FollowTransition, ProfileManager};
pub use names::NameResolver;
pub use notifications::{NotificationAggregator, NotificationFanOut};
pub use post_sync::{LikeTransition, PostSynchronizer};
