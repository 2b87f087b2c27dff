use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::strong_types::DocumentId;

/// A comment, stored in the `comments` sub-collection of its post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: DocumentId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub author_name: String,
    pub profile_pic_name: String,
}
