//! Event Publisher Adapters
//!
//! Implements the `EventPublisher` port. [`DomainEventBus`] delivers events
//! to the cache's [`CacheEventListener`]s without making the publisher wait
//! on invalidation work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::events::DomainEvent;
use crate::domain::ports::{CacheEventListener, EventPublisher};
use crate::error::Result;

// =============================================================================
// Domain Event Bus
// =============================================================================

/// Fire-and-forget dispatcher from domain events to cache listeners.
///
/// Listener failures are logged and counted, never returned to the publisher.
#[derive(Default)]
pub struct DomainEventBus {
    listeners: RwLock<Vec<Arc<dyn CacheEventListener>>>,
    failures: Arc<AtomicU64>,
}

impl DomainEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn CacheEventListener>) {
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Listener calls that returned an error.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Deliver `event` to every listener in a background task.
    ///
    /// The handle resolves to the number of failed listener calls.
    pub fn dispatch(&self, event: DomainEvent) -> JoinHandle<usize> {
        let listeners = self.listeners.read().clone();
        let failures = Arc::clone(&self.failures);
        tokio::spawn(async move {
            let failed = deliver(&listeners, &event).await;
            failures.fetch_add(failed as u64, Ordering::Relaxed);
            failed
        })
    }
}

async fn deliver(listeners: &[Arc<dyn CacheEventListener>], event: &DomainEvent) -> usize {
    let mut failed = 0;
    for listener in listeners {
        let result = match event {
            DomainEvent::ContentPublished(e) => listener.on_content_published(e).await,
            DomainEvent::PreferencesChanged(e) => listener.on_preferences_changed(e).await,
            DomainEvent::UserFollowed(e) => listener.on_user_followed(e).await,
        };
        if let Err(e) = result {
            failed += 1;
            warn!(
                event_type = event.event_type(),
                event_id = %event.event_id(),
                error = %e,
                "Cache event listener failed"
            );
        }
    }
    debug!(
        event_type = event.event_type(),
        listeners = listeners.len(),
        failed,
        "Delivered domain event"
    );
    failed
}

impl std::fmt::Debug for DomainEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainEventBus")
            .field("listener_count", &self.listener_count())
            .field("failures", &self.failures())
            .finish()
    }
}

#[async_trait]
impl EventPublisher for DomainEventBus {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        // Dropping the handle detaches delivery from the publisher
        drop(self.dispatch(event));
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{
        ContentPublishedEvent, PreferencesChangedEvent, UserFollowedEvent,
    };
    use crate::domain::ports::PreferenceType;
    use crate::error::Error;

    /// Records which entry point was hit; fails on follows.
    #[derive(Default)]
    struct RecordingListener {
        calls: RwLock<Vec<&'static str>>,
    }

    #[async_trait]
    impl CacheEventListener for RecordingListener {
        async fn on_content_published(&self, _event: &ContentPublishedEvent) -> Result<()> {
            self.calls.write().push("content");
            Ok(())
        }

        async fn on_preferences_changed(&self, _event: &PreferencesChangedEvent) -> Result<()> {
            self.calls.write().push("preferences");
            Ok(())
        }

        async fn on_user_followed(&self, _event: &UserFollowedEvent) -> Result<()> {
            self.calls.write().push("follow");
            Err(Error::Internal("follow graph unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_bus_routes_by_variant() {
        let bus = DomainEventBus::new();
        let listener = Arc::new(RecordingListener::default());
        bus.subscribe(listener.clone());
        assert_eq!(bus.listener_count(), 1);

        let failed = bus
            .dispatch(ContentPublishedEvent::new("c1", "creator", vec![]).into())
            .await
            .unwrap();
        assert_eq!(failed, 0);

        bus.dispatch(PreferencesChangedEvent::new("u1", vec![PreferenceType::Interests]).into())
            .await
            .unwrap();

        assert_eq!(*listener.calls.read(), vec!["content", "preferences"]);
    }

    #[tokio::test]
    async fn test_bus_swallows_listener_errors() {
        let bus = DomainEventBus::new();
        bus.subscribe(Arc::new(RecordingListener::default()));
        bus.subscribe(Arc::new(RecordingListener::default()));

        let failed = bus
            .dispatch(UserFollowedEvent::new("a", "b").into())
            .await
            .unwrap();
        assert_eq!(failed, 2);
        assert_eq!(bus.failures(), 2);

        // The publisher never sees the failure
        bus.publish(UserFollowedEvent::new("a", "b").into())
            .await
            .unwrap();
    }
}
