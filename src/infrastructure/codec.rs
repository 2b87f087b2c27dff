// Document Codec - maps entity records to and from store documents.
// Decoding never fails: absent or wrong-typed fields fall back to
// empty string, 0, empty array or the Unix epoch.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::strong_types::{DocumentId, UserId};
use crate::infrastructure::store::{Document, FieldValue, Fields};
use crate::models::{Comment, NotificationItem, NotificationKind, Post, Profile, ProfileEntry};

pub mod fields {
    pub const CONTENT: &str = "content";
    pub const TIMESTAMP: &str = "timestamp";
    pub const AUTHOR_NAME: &str = "authorName";
    pub const AUTHOR_SUBTITLE: &str = "authorSubtitle";
    pub const AUTHOR_ID: &str = "authorID";
    pub const PROFILE_PIC_NAME: &str = "profilePicName";
    pub const LIKE_COUNT: &str = "likeCount";
    pub const LIKED_BY: &str = "likedBy";

    pub const NAME: &str = "name";
    pub const SUBTITLE: &str = "subtitle";
    pub const ABOUT: &str = "about";
    pub const EXPERIENCE: &str = "experience";
    pub const YEARS_IN_FRATERNITY: &str = "yearsInFraternity";
    pub const FOLLOWERS: &str = "followers";
    pub const LOOKING_FOR_WORK_TITLE: &str = "lookingForWorkTitle";

    pub const TYPE: &str = "type";
    pub const POST_ID: &str = "postID";
    pub const SENDER_USER_ID: &str = "senderUserID";
    pub const RECIPIENT_USER_ID: &str = "recipientUserID";
}

/// Entity types that live in a store collection
pub trait DocumentCodec: Sized {
    fn to_fields(&self) -> Fields;
    fn from_document(doc: &Document) -> Self;

    fn decode_all(docs: &[Document]) -> Vec<Self> {
        docs.iter().map(Self::from_document).collect()
    }
}

/// Tolerant field access over one document
struct FieldReader<'a> {
    doc: &'a Document,
    defaulted: usize,
}

impl<'a> FieldReader<'a> {
    fn new(doc: &'a Document) -> Self {
        Self { doc, defaulted: 0 }
    }

    fn string(&mut self, name: &str) -> String {
        match self.doc.get(name).and_then(FieldValue::as_str) {
            Some(s) => s.to_string(),
            None => {
                self.defaulted += 1;
                String::new()
            }
        }
    }

    fn integer(&mut self, name: &str) -> i64 {
        match self.doc.get(name).and_then(FieldValue::as_i64) {
            Some(i) => i,
            None => {
                self.defaulted += 1;
                0
            }
        }
    }

    /// Array fields are sets; duplicates are dropped keeping first occurrence
    fn user_set(&mut self, name: &str) -> Vec<UserId> {
        match self.doc.get(name).and_then(FieldValue::as_string_array) {
            Some(values) => {
                let mut users: Vec<UserId> = Vec::with_capacity(values.len());
                for value in values {
                    let user = UserId::new(value.as_str());
                    if !users.contains(&user) {
                        users.push(user);
                    }
                }
                users
            }
            None => {
                self.defaulted += 1;
                Vec::new()
            }
        }
    }

    fn timestamp(&mut self, name: &str) -> DateTime<Utc> {
        match self.doc.get(name).and_then(FieldValue::as_timestamp) {
            Some(ts) => ts,
            None => {
                self.defaulted += 1;
                DateTime::<Utc>::default()
            }
        }
    }

    fn finish(self, kind: &str) {
        if self.defaulted > 0 {
            debug!(
                "Decoded {} {} with {} defaulted field(s)",
                kind, self.doc.id, self.defaulted
            );
        }
    }
}

fn user_array(users: &[UserId]) -> FieldValue {
    FieldValue::StringArray(users.iter().map(|u| u.as_str().to_string()).collect())
}

impl DocumentCodec for Post {
    fn to_fields(&self) -> Fields {
        let mut out = Fields::new();
        out.insert(fields::CONTENT.into(), self.content.clone().into());
        out.insert(fields::TIMESTAMP.into(), self.timestamp.into());
        out.insert(fields::AUTHOR_NAME.into(), self.author_name.clone().into());
        out.insert(fields::AUTHOR_SUBTITLE.into(), self.author_subtitle.clone().into());
        out.insert(fields::AUTHOR_ID.into(), self.author_id.as_str().into());
        out.insert(fields::PROFILE_PIC_NAME.into(), self.profile_pic_name.clone().into());
        out.insert(fields::LIKE_COUNT.into(), self.like_count.into());
        out.insert(fields::LIKED_BY.into(), user_array(&self.liked_by));
        out
    }

    fn from_document(doc: &Document) -> Self {
        let mut r = FieldReader::new(doc);
        let post = Post {
            id: doc.id.clone(),
            content: r.string(fields::CONTENT),
            timestamp: r.timestamp(fields::TIMESTAMP),
            author_name: r.string(fields::AUTHOR_NAME),
            author_subtitle: r.string(fields::AUTHOR_SUBTITLE),
            author_id: UserId::new(r.string(fields::AUTHOR_ID)),
            profile_pic_name: r.string(fields::PROFILE_PIC_NAME),
            like_count: r.integer(fields::LIKE_COUNT).max(0),
            liked_by: r.user_set(fields::LIKED_BY),
        };
        r.finish("post");
        post
    }
}

impl DocumentCodec for Comment {
    fn to_fields(&self) -> Fields {
        let mut out = Fields::new();
        out.insert(fields::CONTENT.into(), self.content.clone().into());
        out.insert(fields::TIMESTAMP.into(), self.timestamp.into());
        out.insert(fields::AUTHOR_NAME.into(), self.author_name.clone().into());
        out.insert(fields::PROFILE_PIC_NAME.into(), self.profile_pic_name.clone().into());
        out
    }

    fn from_document(doc: &Document) -> Self {
        let mut r = FieldReader::new(doc);
        let comment = Comment {
            id: doc.id.clone(),
            content: r.string(fields::CONTENT),
            timestamp: r.timestamp(fields::TIMESTAMP),
            author_name: r.string(fields::AUTHOR_NAME),
            profile_pic_name: r.string(fields::PROFILE_PIC_NAME),
        };
        r.finish("comment");
        comment
    }
}

impl DocumentCodec for Profile {
    fn to_fields(&self) -> Fields {
        let mut out = profile_fields_without_followers(self);
        out.insert(fields::FOLLOWERS.into(), user_array(&self.followers));
        out
    }

    fn from_document(doc: &Document) -> Self {
        let mut r = FieldReader::new(doc);
        let profile = Profile {
            name: r.string(fields::NAME),
            subtitle: r.string(fields::SUBTITLE),
            about: r.string(fields::ABOUT),
            experience: r.string(fields::EXPERIENCE),
            years_in_fraternity: r.integer(fields::YEARS_IN_FRATERNITY).max(0),
            profile_pic_name: r.string(fields::PROFILE_PIC_NAME),
            followers: r.user_set(fields::FOLLOWERS),
            looking_for_work_title: r.string(fields::LOOKING_FOR_WORK_TITLE),
        };
        r.finish("profile");
        profile
    }
}

impl DocumentCodec for NotificationItem {
    fn to_fields(&self) -> Fields {
        let mut out = Fields::new();
        out.insert(fields::TYPE.into(), self.kind.as_str().into());
        out.insert(fields::POST_ID.into(), self.post_id.clone().into());
        out.insert(fields::SENDER_USER_ID.into(), self.sender_user_id.as_str().into());
        out.insert(fields::RECIPIENT_USER_ID.into(), self.recipient_user_id.as_str().into());
        out.insert(fields::TIMESTAMP.into(), self.timestamp.into());
        out
    }

    fn from_document(doc: &Document) -> Self {
        let mut r = FieldReader::new(doc);
        let item = NotificationItem {
            id: doc.id.clone(),
            kind: NotificationKind::parse(&r.string(fields::TYPE)),
            post_id: r.string(fields::POST_ID),
            sender_user_id: UserId::new(r.string(fields::SENDER_USER_ID)),
            recipient_user_id: UserId::new(r.string(fields::RECIPIENT_USER_ID)),
            timestamp: r.timestamp(fields::TIMESTAMP),
            sender_name: String::new(),
        };
        r.finish("notification");
        item
    }
}

/// Every profile field the owner edits; `followers` is written only by follow toggles
pub fn profile_fields_without_followers(profile: &Profile) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::NAME.into(), profile.name.clone().into());
    out.insert(fields::SUBTITLE.into(), profile.subtitle.clone().into());
    out.insert(fields::ABOUT.into(), profile.about.clone().into());
    out.insert(fields::EXPERIENCE.into(), profile.experience.clone().into());
    out.insert(
        fields::YEARS_IN_FRATERNITY.into(),
        profile.years_in_fraternity.into(),
    );
    out.insert(fields::PROFILE_PIC_NAME.into(), profile.profile_pic_name.clone().into());
    out.insert(
        fields::LOOKING_FOR_WORK_TITLE.into(),
        profile.looking_for_work_title.clone().into(),
    );
    out
}

pub fn followers_value(followers: &[UserId]) -> FieldValue {
    user_array(followers)
}

/// Fields of a brand-new post; the store stamps the creation time
pub fn new_post_fields(content: &str, author_id: &UserId, author: &Profile) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::CONTENT.into(), content.into());
    out.insert(fields::TIMESTAMP.into(), FieldValue::ServerTimestamp);
    out.insert(fields::AUTHOR_NAME.into(), author.name.clone().into());
    out.insert(fields::AUTHOR_SUBTITLE.into(), author.subtitle.clone().into());
    out.insert(fields::AUTHOR_ID.into(), author_id.as_str().into());
    out.insert(fields::PROFILE_PIC_NAME.into(), author.profile_pic_name.clone().into());
    out.insert(fields::LIKE_COUNT.into(), 0i64.into());
    out.insert(fields::LIKED_BY.into(), FieldValue::StringArray(Vec::new()));
    out
}

pub fn new_comment_fields(content: &str, author_name: &str, profile_pic_name: &str) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::CONTENT.into(), content.into());
    out.insert(fields::TIMESTAMP.into(), FieldValue::ServerTimestamp);
    out.insert(fields::AUTHOR_NAME.into(), author_name.into());
    out.insert(fields::PROFILE_PIC_NAME.into(), profile_pic_name.into());
    out
}

/// `post_id` is empty for follow notifications
pub fn new_notification_fields(
    kind: &NotificationKind,
    post_id: Option<&DocumentId>,
    sender: &UserId,
    recipient: &UserId,
) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::TYPE.into(), kind.as_str().into());
    out.insert(
        fields::POST_ID.into(),
        post_id.map(|id| id.as_str()).unwrap_or("").into(),
    );
    out.insert(fields::SENDER_USER_ID.into(), sender.as_str().into());
    out.insert(fields::RECIPIENT_USER_ID.into(), recipient.as_str().into());
    out.insert(fields::TIMESTAMP.into(), FieldValue::ServerTimestamp);
    out
}

pub fn profile_entry(doc: &Document) -> ProfileEntry {
    ProfileEntry {
        id: UserId::new(doc.id.as_str()),
        profile: Profile::from_document(doc),
    }
}

/// Display name stored on a profile document, if present and non-blank
pub fn display_name(doc: &Document) -> Option<String> {
    doc.get(fields::NAME)
        .and_then(FieldValue::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_post_decodes_with_defaults() {
        let mut raw = Fields::new();
        raw.insert(fields::CONTENT.into(), "hello".into());
        raw.insert(fields::LIKE_COUNT.into(), "not a number".into());
        raw.insert(
            fields::LIKED_BY.into(),
            FieldValue::StringArray(vec!["b".into(), "b".into(), "c".into()]),
        );
        let post = Post::from_document(&Document::new(DocumentId::new("p1"), raw));

        assert_eq!(post.id.as_str(), "p1");
        assert_eq!(post.content, "hello");
        assert_eq!(post.author_name, "");
        assert_eq!(post.like_count, 0);
        assert_eq!(post.liked_by, vec![UserId::new("b"), UserId::new("c")]);
        assert_eq!(post.timestamp, DateTime::<Utc>::default());
    }

    #[test]
    fn test_profile_encode_decode() {
        let profile = Profile {
            name: "Ada".into(),
            subtitle: "Engineer at Analytical".into(),
            about: "About".into(),
            experience: "Lots".into(),
            years_in_fraternity: 3,
            profile_pic_name: "ada".into(),
            followers: vec![UserId::new("bob")],
            looking_for_work_title: String::new(),
        };
        let doc = Document::new(DocumentId::new("ada"), profile.to_fields());
        assert_eq!(Profile::from_document(&doc), profile);

        let entry = profile_entry(&doc);
        assert_eq!(entry.id, UserId::new("ada"));
        assert_eq!(display_name(&doc), Some("Ada".to_string()));
    }

    #[test]
    fn test_profile_fields_skip_followers() {
        let written = profile_fields_without_followers(&Profile::default());
        assert!(!written.contains_key(fields::FOLLOWERS));
        assert!(written.contains_key(fields::LOOKING_FOR_WORK_TITLE));
    }

    #[test]
    fn test_notification_decoding() {
        let mut raw = new_notification_fields(
            &NotificationKind::Follow,
            None,
            &UserId::new("a"),
            &UserId::new("c"),
        );
        assert_eq!(raw.get(fields::POST_ID), Some(&FieldValue::from("")));
        raw.insert(
            fields::TIMESTAMP.into(),
            Utc.timestamp_opt(100, 0).unwrap().into(),
        );
        let item = NotificationItem::from_document(&Document::new(DocumentId::new("n"), raw));
        assert_eq!(item.kind, NotificationKind::Follow);
        assert_eq!(item.sender_user_id, UserId::new("a"));
        assert_eq!(item.recipient_user_id, UserId::new("c"));
        assert_eq!(item.sender_name, "");
    }

    #[test]
    fn test_records_survive_encoding() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let post = Post {
            id: DocumentId::new("p1"),
            content: "Hello".into(),
            timestamp: at,
            author_name: "Ada Lovelace".into(),
            author_subtitle: "Engineer".into(),
            author_id: UserId::new("ada"),
            profile_pic_name: "ada".into(),
            like_count: 2,
            liked_by: vec![UserId::new("bob"), UserId::new("carol")],
        };
        let doc = Document::new(post.id.clone(), post.to_fields());
        assert_eq!(Post::from_document(&doc), post);

        let comment = Comment {
            id: DocumentId::new("c1"),
            content: "Nice".into(),
            timestamp: at,
            author_name: "Bob".into(),
            profile_pic_name: "bob".into(),
        };
        let doc = Document::new(comment.id.clone(), comment.to_fields());
        assert_eq!(Comment::from_document(&doc), comment);

        // The sender name is resolved on read and never written
        let item = NotificationItem {
            id: DocumentId::new("n1"),
            kind: NotificationKind::Unknown("poke".into()),
            post_id: "p1".into(),
            sender_user_id: UserId::new("bob"),
            recipient_user_id: UserId::new("ada"),
            timestamp: at,
            sender_name: "Bob".into(),
        };
        let written = item.to_fields();
        assert_eq!(written.get(fields::TYPE), Some(&FieldValue::from("poke")));
        let decoded = NotificationItem::from_document(&Document::new(item.id.clone(), written));
        assert_eq!(decoded.sender_name, "");
        assert_eq!(
            decoded,
            NotificationItem {
                sender_name: String::new(),
                ..item
            }
        );
    }

    #[test]
    fn test_blank_display_name_is_absent() {
        let mut raw = Fields::new();
        raw.insert(fields::NAME.into(), "   ".into());
        assert_eq!(display_name(&Document::new(DocumentId::new("x"), raw)), None);
        assert_eq!(
            display_name(&Document::new(DocumentId::new("y"), Fields::new())),
            None
        );
    }
}
