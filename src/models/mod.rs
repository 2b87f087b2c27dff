// Entity models - value records with identity, decoded from store documents

pub mod post;
pub mod comment;
pub mod profile;
pub mod notification;

pub use post::Post;
pub use comment::Comment;
pub use profile::{Profile, ProfileEntry};
pub use notification::{NotificationItem, NotificationKind};
