use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::strong_types::{DocumentId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    /// A type string this client does not recognize; kept verbatim
    Unknown(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
            NotificationKind::Unknown(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "like" => NotificationKind::Like,
            "comment" => NotificationKind::Comment,
            "follow" => NotificationKind::Follow,
            _ => NotificationKind::Unknown(raw.to_string()),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationItem {
    pub id: DocumentId,
    pub kind: NotificationKind,
    /// Empty for follow notifications
    pub post_id: String,
    pub sender_user_id: UserId,
    pub recipient_user_id: UserId,
    pub timestamp: DateTime<Utc>,
    /// Resolved from the sender's profile after each fetch, never stored
    pub sender_name: String,
}

impl NotificationItem {
    /// Human readable sentence shown in the notification list
    pub fn message(&self) -> String {
        let name = &self.sender_name;
        match self.kind {
            NotificationKind::Like => format!("{} liked your post.", name),
            NotificationKind::Comment => format!("{} commented on your post.", name),
            NotificationKind::Follow => format!("{} started following you.", name),
            NotificationKind::Unknown(_) => format!("{} interacted with you.", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: NotificationKind) -> NotificationItem {
        NotificationItem {
            id: DocumentId::new("n1"),
            kind,
            post_id: String::new(),
            sender_user_id: UserId::new("bob"),
            recipient_user_id: UserId::new("ada"),
            timestamp: Utc::now(),
            sender_name: "Bob".to_string(),
        }
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(NotificationKind::parse("like"), NotificationKind::Like);
        assert_eq!(NotificationKind::parse("Comment"), NotificationKind::Comment);
        assert_eq!(NotificationKind::parse("follow"), NotificationKind::Follow);
        assert_eq!(
            NotificationKind::parse("poke"),
            NotificationKind::Unknown("poke".to_string())
        );
        assert_eq!(NotificationKind::Unknown("poke".into()).as_str(), "poke");
    }

    #[test]
    fn test_messages() {
        assert_eq!(item(NotificationKind::Like).message(), "Bob liked your post.");
        assert_eq!(
            item(NotificationKind::Comment).message(),
            "Bob commented on your post."
        );
        assert_eq!(
            item(NotificationKind::Follow).message(),
            "Bob started following you."
        );
        assert_eq!(
            item(NotificationKind::Unknown("poke".into())).message(),
            "Bob interacted with you."
        );
    }
}
