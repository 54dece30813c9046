//! Domain Events
//!
//! Immutable records of things that happened elsewhere in the feed backend
//! and that make cached data stale, plus the invalidation requests they are
//! translated into.
//!
//! # Example
//!
//! ```ignore
//! let event = DomainEvent::ContentPublished(
//!     ContentPublishedEvent::new("post-1", "creator-9", vec!["rust".into()])
//!         .with_followers(vec!["a".into(), "b".into()]),
//! );
//!
//! event_bus.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ports::{FeedType, PreferenceType};

// =============================================================================
// Domain Events
// =============================================================================

/// A piece of content went live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPublishedEvent {
    pub event_id: Uuid,
    pub content_id: String,
    pub creator_id: String,
    pub topics: Vec<String>,
    /// Users whose feeds should show the content, when the publisher knows them.
    pub follower_ids: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl ContentPublishedEvent {
    pub fn new(
        content_id: impl Into<String>,
        creator_id: impl Into<String>,
        topics: Vec<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            content_id: content_id.into(),
            creator_id: creator_id.into(),
            topics,
            follower_ids: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_followers(mut self, follower_ids: Vec<String>) -> Self {
        self.follower_ids = Some(follower_ids);
        self
    }
}

/// A user edited their feed preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesChangedEvent {
    pub event_id: Uuid,
    pub user_id: String,
    pub changed_preference_types: Vec<PreferenceType>,
    pub timestamp: DateTime<Utc>,
}

impl PreferencesChangedEvent {
    pub fn new(user_id: impl Into<String>, changed_preference_types: Vec<PreferenceType>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id: user_id.into(),
            changed_preference_types,
            timestamp: Utc::now(),
        }
    }
}

/// `follower_id` started following `followee_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFollowedEvent {
    pub event_id: Uuid,
    pub follower_id: String,
    pub followee_id: String,
    pub timestamp: DateTime<Utc>,
}

impl UserFollowedEvent {
    pub fn new(follower_id: impl Into<String>, followee_id: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            follower_id: follower_id.into(),
            followee_id: followee_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Domain event representing a state change that affects cached data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    ContentPublished(ContentPublishedEvent),
    PreferencesChanged(PreferencesChangedEvent),
    UserFollowed(UserFollowedEvent),
}

impl DomainEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::ContentPublished(e) => e.timestamp,
            DomainEvent::PreferencesChanged(e) => e.timestamp,
            DomainEvent::UserFollowed(e) => e.timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::ContentPublished(_) => "ContentPublished",
            DomainEvent::PreferencesChanged(_) => "PreferencesChanged",
            DomainEvent::UserFollowed(_) => "UserFollowed",
        }
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            DomainEvent::ContentPublished(e) => e.event_id,
            DomainEvent::PreferencesChanged(e) => e.event_id,
            DomainEvent::UserFollowed(e) => e.event_id,
        }
    }
}

impl From<ContentPublishedEvent> for DomainEvent {
    fn from(e: ContentPublishedEvent) -> Self {
        DomainEvent::ContentPublished(e)
    }
}

impl From<PreferencesChangedEvent> for DomainEvent {
    fn from(e: PreferencesChangedEvent) -> Self {
        DomainEvent::PreferencesChanged(e)
    }
}

impl From<UserFollowedEvent> for DomainEvent {
    fn from(e: UserFollowedEvent) -> Self {
        DomainEvent::UserFollowed(e)
    }
}

// =============================================================================
// Invalidation Requests
// =============================================================================

/// Work item for the invalidation queue. Each variant maps to exactly one
/// invalidation flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InvalidationEvent {
    UserFeed {
        user_id: String,
        feed_type: FeedType,
    },
    AllUserFeeds {
        user_id: String,
    },
    BatchUsers {
        user_ids: Vec<String>,
        feed_types: Option<Vec<FeedType>>,
    },
    PopularityScores {
        content_ids: Vec<String>,
    },
}

impl InvalidationEvent {
    /// Variant name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InvalidationEvent::UserFeed { .. } => "UserFeed",
            InvalidationEvent::AllUserFeeds { .. } => "AllUserFeeds",
            InvalidationEvent::BatchUsers { .. } => "BatchUsers",
            InvalidationEvent::PopularityScores { .. } => "PopularityScores",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_event_tagging() {
        let event: DomainEvent = UserFollowedEvent::new("alice", "bob").into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "UserFollowed");
        assert_eq!(json["followerId"], "alice");

        let back: DomainEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.event_type(), "UserFollowed");
    }

    #[test]
    fn test_content_published_followers() {
        let event = ContentPublishedEvent::new("c1", "creator", vec![]);
        assert!(event.follower_ids.is_none());

        let event = event.with_followers(vec!["a".into(), "b".into()]);
        assert_eq!(event.follower_ids.as_deref().map(|f| f.len()), Some(2));
    }

    #[test]
    fn test_invalidation_event_kind() {
        let event = InvalidationEvent::UserFeed {
            user_id: "u1".into(),
            feed_type: FeedType::Home,
        };
        assert_eq!(event.kind(), "UserFeed");

        let event = InvalidationEvent::PopularityScores {
            content_ids: vec!["c1".into()],
        };
        assert_eq!(event.kind(), "PopularityScores");
    }
}
