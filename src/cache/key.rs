//! Cache Key Conventions
//!
//! Keys follow `<version>:<domain>:<entity-id>[:<variant>]`, for example
//! `v1:feed:user123:HOME`. The first two segments form the key pattern
//! (`v1:feed:*`) used for statistics grouping and pattern invalidation.

use crate::domain::ports::FeedType;

/// Schema version prefix for every key this crate writes.
pub const KEY_VERSION: &str = "v1";

/// Feed payloads.
pub const FEED_DOMAIN: &str = "feed";

/// Companion metadata stored next to every feed.
pub const FEED_META_DOMAIN: &str = "feed_meta";

/// Per-user preference documents.
pub const PREFERENCES_DOMAIN: &str = "prefs";

/// Per-content popularity scores.
pub const POPULARITY_DOMAIN: &str = "popularity";

pub fn feed_key(user_id: &str, feed_type: FeedType) -> String {
    format!("{}:{}:{}:{}", KEY_VERSION, FEED_DOMAIN, user_id, feed_type)
}

pub fn feed_metadata_key(user_id: &str, feed_type: FeedType) -> String {
    format!("{}:{}:{}:{}", KEY_VERSION, FEED_META_DOMAIN, user_id, feed_type)
}

pub fn preferences_key(user_id: &str) -> String {
    format!("{}:{}:{}", KEY_VERSION, PREFERENCES_DOMAIN, user_id)
}

pub fn popularity_key(content_id: &str) -> String {
    format!("{}:{}:{}", KEY_VERSION, POPULARITY_DOMAIN, content_id)
}

/// Every feed of one user.
pub fn user_feed_pattern(user_id: &str) -> String {
    format!("{}:{}:{}:*", KEY_VERSION, FEED_DOMAIN, user_id)
}

/// Every feed metadata entry of one user.
pub fn user_feed_metadata_pattern(user_id: &str) -> String {
    format!("{}:{}:{}:*", KEY_VERSION, FEED_META_DOMAIN, user_id)
}

/// Trending feeds of all users.
pub fn trending_pattern() -> String {
    format!("{}:{}:*:{}", KEY_VERSION, FEED_DOMAIN, FeedType::Trending)
}

/// Statistics pattern for a key: the first two segments followed by `:*`.
///
/// Keys with fewer than two segments are their own pattern.
pub fn extract_pattern(key: &str) -> String {
    let mut segments = key.splitn(3, ':');
    match (segments.next(), segments.next()) {
        (Some(version), Some(domain)) => format!("{}:{}:*", version, domain),
        _ => key.to_string(),
    }
}

/// Redis-style glob match supporting `*`, `?` and `\` escapes.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();

    let (mut pi, mut ki) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ki));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ki += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() && p[pi + 1] == k[ki] => {
                    pi += 2;
                    ki += 1;
                    continue;
                }
                c if c != '\\' && c == k[ki] => {
                    pi += 1;
                    ki += 1;
                    continue;
                }
                _ => {}
            }
        }

        // Mismatch: backtrack to the last star, letting it absorb one more char
        match star {
            Some((star_pi, star_ki)) => {
                pi = star_pi + 1;
                ki = star_ki + 1;
                star = Some((star_pi, star_ki + 1));
            }
            None => return false,
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        assert_eq!(feed_key("user123", FeedType::Home), "v1:feed:user123:HOME");
        assert_eq!(
            feed_metadata_key("user123", FeedType::Explore),
            "v1:feed_meta:user123:EXPLORE"
        );
        assert_eq!(preferences_key("u1"), "v1:prefs:u1");
        assert_eq!(popularity_key("c9"), "v1:popularity:c9");
        assert_eq!(user_feed_pattern("u1"), "v1:feed:u1:*");
        assert_eq!(trending_pattern(), "v1:feed:*:TRENDING");
    }

    #[test]
    fn test_extract_pattern() {
        assert_eq!(extract_pattern("v1:feed:user123:HOME"), "v1:feed:*");
        assert_eq!(extract_pattern("v1:prefs:u1"), "v1:prefs:*");
        assert_eq!(extract_pattern("v1:feed"), "v1:feed:*");
        assert_eq!(extract_pattern("plain"), "plain");
        // Stable across calls
        assert_eq!(
            extract_pattern("v1:feed:a:HOME"),
            extract_pattern("v1:feed:b:TRENDING")
        );
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("*", ""));
        assert!(glob_match("v1:feed:u1:*", "v1:feed:u1:HOME"));
        assert!(!glob_match("v1:feed:u1:*", "v1:feed:u10"));
        assert!(glob_match("v1:feed:*:TRENDING", "v1:feed:u42:TRENDING"));
        assert!(!glob_match("v1:feed:*:TRENDING", "v1:feed:u42:HOME"));
        assert!(glob_match("k?", "k1"));
        assert!(!glob_match("k?", "k10"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(glob_match("v1\\*", "v1*"));
        assert!(!glob_match("v1\\*", "v1x"));
    }
}
