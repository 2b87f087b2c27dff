// Feed Derivation - pure views over the canonical post list and directory

use crate::models::{Post, Profile, ProfileEntry};

/// Posts whose content contains `query`, ignoring case. An empty query keeps everything.
pub fn filter_by_text(posts: &[Post], query: &str) -> Vec<Post> {
    if query.is_empty() {
        return posts.to_vec();
    }
    let needle = query.to_lowercase();
    posts
        .iter()
        .filter(|post| post.content.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// First whitespace-delimited token, lower-cased; empty when there is none
pub fn first_token(text: &str) -> String {
    text.split_whitespace()
        .next()
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// Interest feed: posts mentioning the first word of the viewer's subtitle
/// or of the job they are looking for, oldest first.
pub fn for_you(posts: &[Post], viewer: &Profile) -> Vec<Post> {
    let keywords: Vec<String> = [
        first_token(&viewer.subtitle),
        first_token(&viewer.looking_for_work_title),
    ]
    .into_iter()
    .filter(|token| !token.is_empty())
    .collect();

    if keywords.is_empty() {
        return Vec::new();
    }

    let mut matched: Vec<Post> = posts
        .iter()
        .filter(|post| {
            let content = post.content.to_lowercase();
            keywords.iter().any(|keyword| content.contains(keyword.as_str()))
        })
        .cloned()
        .collect();
    // sort_by_key is stable, so equal timestamps keep input order
    matched.sort_by_key(|post| post.timestamp);
    matched
}

/// Directory search by name. Search only: an empty query returns nothing.
pub fn search_profiles(directory: &[ProfileEntry], query: &str) -> Vec<ProfileEntry> {
    if query.is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    directory
        .iter()
        .filter(|entry| entry.profile.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
