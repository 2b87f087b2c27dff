use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::strong_types::{DocumentId, UserId};

/// A post in the shared feed. Author fields are a snapshot taken at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: DocumentId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub author_name: String,
    pub author_subtitle: String,
    pub author_id: UserId,
    pub profile_pic_name: String,
    /// Always equal to `liked_by.len()` once a toggle has settled
    pub like_count: i64,
    pub liked_by: Vec<UserId>,
}

impl Post {
    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.liked_by.contains(user)
    }

    pub fn author_first_name(&self) -> &str {
        self.author_name.split_whitespace().next().unwrap_or("")
    }

    pub fn like_count_consistent(&self) -> bool {
        self.like_count >= 0 && self.like_count as usize == self.liked_by.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Post {
        Post {
            id: DocumentId::new("p1"),
            content: "Hello".to_string(),
            timestamp: Utc::now(),
            author_name: "Ada Lovelace".to_string(),
            author_subtitle: "Engineer".to_string(),
            author_id: UserId::new("ada"),
            profile_pic_name: "ada.png".to_string(),
            like_count: 1,
            liked_by: vec![UserId::new("bob")],
        }
    }

    #[test]
    fn test_author_first_name() {
        let mut post = sample();
        assert_eq!(post.author_first_name(), "Ada");
        post.author_name = String::new();
        assert_eq!(post.author_first_name(), "");
    }

    #[test]
    fn test_like_membership() {
        let post = sample();
        assert!(post.is_liked_by(&UserId::new("bob")));
        assert!(!post.is_liked_by(&UserId::new("ada")));
        assert!(post.like_count_consistent());
    }
}
