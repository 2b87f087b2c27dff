use serde::{Deserialize, Serialize};

use crate::core::strong_types::UserId;

/// A user's profile; its document id is the owner's identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub subtitle: String,
    pub about: String,
    pub experience: String,
    pub years_in_fraternity: i64,
    pub profile_pic_name: String,
    pub followers: Vec<UserId>,
    /// Empty string means unset
    pub looking_for_work_title: String,
}

impl Profile {
    pub fn has_follower(&self, user: &UserId) -> bool {
        self.followers.contains(user)
    }

    pub fn looking_for_work(&self) -> Option<&str> {
        let title = self.looking_for_work_title.trim();
        (!title.is_empty()).then_some(title)
    }
}

/// A profile paired with its owner, for directory search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub id: UserId,
    pub profile: Profile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looking_for_work_sentinel() {
        let mut profile = Profile::default();
        assert_eq!(profile.looking_for_work(), None);
        profile.looking_for_work_title = "  ".to_string();
        assert_eq!(profile.looking_for_work(), None);
        profile.looking_for_work_title = "Data Analyst".to_string();
        assert_eq!(profile.looking_for_work(), Some("Data Analyst"));
    }
}
