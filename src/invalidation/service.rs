//! Cache Invalidation Service
//!
//! Turns domain changes into targeted cache deletes. Repeated requests for
//! the same key inside the dedup window are dropped.
//!
//! # Design
//!
//! - Every flow is best-effort: failures are logged by the provider and the
//!   flow reports how many keys it actually removed
//! - Queued events are consumed by a single loop; each event runs in its own
//!   task so a panic is contained and logged
//! - The recently-invalidated map is swept on a timer

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::key::{
    feed_key, feed_metadata_key, popularity_key, preferences_key, trending_pattern,
    user_feed_metadata_pattern, user_feed_pattern,
};
use crate::domain::events::{
    ContentPublishedEvent, InvalidationEvent, PreferencesChangedEvent, UserFollowedEvent,
};
use crate::domain::ports::{CacheEventListener, CacheProvider, FeedType, PreferenceType};
use crate::error::{Error, Result};

/// Feeds that show a creator's new content to their audience
const NEW_CONTENT_FEEDS: [FeedType; 3] =
    [FeedType::Home, FeedType::Following, FeedType::Personalized];

/// Feeds affected when a user follows someone
const FOLLOW_FEEDS: [FeedType; 2] = [FeedType::Following, FeedType::Home];

/// Invalidation configuration
#[derive(Debug, Clone)]
pub struct InvalidationConfig {
    /// Repeat invalidations of a key inside this window are skipped
    pub dedup_window: Duration,
    /// Users per chunk in batch invalidation
    pub batch_size: usize,
    /// Pause between chunks
    pub batch_delay: Duration,
    /// How often the dedup map is swept
    pub cleanup_interval: Duration,
    /// How often trending feeds are dropped
    pub trending_interval: Duration,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(5 * 60),
            batch_size: 50,
            batch_delay: Duration::from_millis(100),
            cleanup_interval: Duration::from_secs(60),
            trending_interval: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Default)]
struct InvalidationCounters {
    invalidated_keys: AtomicU64,
    skipped_duplicates: AtomicU64,
    events_processed: AtomicU64,
    event_failures: AtomicU64,
}

/// Point-in-time invalidation counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidationStats {
    pub invalidated_keys: u64,
    pub skipped_duplicates: u64,
    pub events_processed: u64,
    pub event_failures: u64,
    pub recently_invalidated: usize,
}

/// Invalidation service
pub struct InvalidationService {
    cache: Arc<dyn CacheProvider>,
    config: InvalidationConfig,
    recently_invalidated: DashMap<String, Instant>,
    counters: InvalidationCounters,
    queue: mpsc::UnboundedSender<InvalidationEvent>,
    /// Taken by the consumer loop on start
    receiver: Mutex<Option<mpsc::UnboundedReceiver<InvalidationEvent>>>,
}

impl InvalidationService {
    pub fn new(cache: Arc<dyn CacheProvider>, config: InvalidationConfig) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        Self {
            cache,
            config,
            recently_invalidated: DashMap::new(),
            counters: InvalidationCounters::default(),
            queue,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn config(&self) -> &InvalidationConfig {
        &self.config
    }

    pub fn stats(&self) -> InvalidationStats {
        InvalidationStats {
            invalidated_keys: self.counters.invalidated_keys.load(Ordering::Relaxed),
            skipped_duplicates: self.counters.skipped_duplicates.load(Ordering::Relaxed),
            events_processed: self.counters.events_processed.load(Ordering::Relaxed),
            event_failures: self.counters.event_failures.load(Ordering::Relaxed),
            recently_invalidated: self.recently_invalidated.len(),
        }
    }

    // =========================================================================
    // Dedup Window
    // =========================================================================

    /// Whether `key` was invalidated within the dedup window.
    pub fn is_recently_invalidated(&self, key: &str) -> bool {
        self.recently_invalidated
            .get(key)
            .is_some_and(|at| at.elapsed() < self.config.dedup_window)
    }

    /// Stamp `key` unless it is already inside the dedup window. Returns
    /// true when the caller owns this invalidation.
    fn claim(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.recently_invalidated.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.config.dedup_window {
                    return false;
                }
                entry.insert(now);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    fn mark_invalidated<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let now = Instant::now();
        for key in keys {
            self.recently_invalidated.insert(key.clone(), now);
        }
    }

    fn count_removed(&self, removed: u64) -> u64 {
        self.counters
            .invalidated_keys
            .fetch_add(removed, Ordering::Relaxed);
        removed
    }

    /// Drop dedup entries older than the window. Returns how many were removed.
    pub fn cleanup_recently_invalidated(&self) -> usize {
        let before = self.recently_invalidated.len();
        let window = self.config.dedup_window;
        self.recently_invalidated
            .retain(|_, at| at.elapsed() < window);
        let removed = before.saturating_sub(self.recently_invalidated.len());
        if removed > 0 {
            debug!(removed, "Swept recently-invalidated entries");
        }
        removed
    }

    // =========================================================================
    // Invalidation Flows
    // =========================================================================

    /// Delete one feed and its metadata, unless done within the dedup window.
    pub async fn invalidate_user_feed(&self, user_id: &str, feed_type: FeedType) -> u64 {
        let key = feed_key(user_id, feed_type);
        if !self.claim(&key) {
            self.counters
                .skipped_duplicates
                .fetch_add(1, Ordering::Relaxed);
            debug!(user_id, %feed_type, "Feed invalidated recently, skipping");
            return 0;
        }

        let metadata_key = feed_metadata_key(user_id, feed_type);
        // Primary key first, then metadata
        let mut removed = u64::from(self.cache.delete(&key).await);
        removed += u64::from(self.cache.delete(&metadata_key).await);
        self.mark_invalidated([&metadata_key]);

        debug!(user_id, %feed_type, removed, "Invalidated user feed");
        self.count_removed(removed)
    }

    /// Delete every feed, feed metadata and the preference entry of a user
    /// with one batched delete.
    pub async fn invalidate_all_user_feeds(&self, user_id: &str) -> u64 {
        let feed_pattern = user_feed_pattern(user_id);
        let metadata_pattern = user_feed_metadata_pattern(user_id);
        let (feeds, metadata) = tokio::join!(
            self.cache.find_keys(&feed_pattern),
            self.cache.find_keys(&metadata_pattern),
        );

        let mut keys = feeds;
        keys.extend(metadata);
        keys.push(preferences_key(user_id));

        let removed = self.cache.delete_all(&keys).await;
        self.mark_invalidated(&keys);

        info!(user_id, candidates = keys.len(), removed, "Invalidated all user feeds");
        self.count_removed(removed)
    }

    /// Invalidate feeds for many users, `batch_size` users at a time.
    ///
    /// `None`, or a list naming every feed type, takes the all-feeds path.
    #[instrument(skip(self, user_ids), fields(users = user_ids.len()))]
    pub async fn invalidate_user_feeds(
        &self,
        user_ids: &[String],
        feed_types: Option<&[FeedType]>,
    ) -> u64 {
        let feed_types = feed_types.filter(|types| !FeedType::covers_all(types));
        let chunk_size = self.config.batch_size.max(1);
        let mut removed = 0;

        for (index, chunk) in user_ids.chunks(chunk_size).enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let per_user = chunk.iter().map(|user_id| async move {
                match feed_types {
                    None => self.invalidate_all_user_feeds(user_id).await,
                    Some(types) => {
                        let mut total = 0;
                        for feed_type in types {
                            total += self.invalidate_user_feed(user_id, *feed_type).await;
                        }
                        total
                    }
                }
            });
            removed += join_all(per_user).await.into_iter().sum::<u64>();
        }

        info!(removed, "Batch user feed invalidation complete");
        removed
    }

    /// Delete popularity scores by exact key.
    pub async fn invalidate_popularity_scores(&self, content_ids: &[String]) -> u64 {
        if content_ids.is_empty() {
            return 0;
        }
        let keys: Vec<String> = content_ids.iter().map(|id| popularity_key(id)).collect();
        let removed = self.cache.delete_all(&keys).await;
        debug!(contents = content_ids.len(), removed, "Invalidated popularity scores");
        self.count_removed(removed)
    }

    /// Delete every key matching a glob pattern.
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        let keys = self.cache.find_keys(pattern).await;
        if keys.is_empty() {
            return 0;
        }
        let removed = self.cache.delete_all(&keys).await;
        debug!(pattern, removed, "Invalidated pattern");
        self.count_removed(removed)
    }

    /// Drop all trending feeds.
    pub async fn perform_time_based_invalidation(&self) -> u64 {
        let removed = self.invalidate_pattern(&trending_pattern()).await;
        info!(removed, "Time-based trending invalidation complete");
        removed
    }

    /// Invalidate feeds that may show newly published content.
    ///
    /// Without a known audience this falls back to dropping trending feeds,
    /// which is broader than needed for followers' feeds.
    pub async fn invalidate_for_new_content(
        &self,
        creator_id: &str,
        topics: &[String],
        affected_users: Option<&[String]>,
    ) -> u64 {
        match affected_users.filter(|users| !users.is_empty()) {
            Some(users) => {
                let mut removed = 0;
                for user_id in users {
                    for feed_type in NEW_CONTENT_FEEDS {
                        removed += self.invalidate_user_feed(user_id, feed_type).await;
                    }
                }
                info!(creator_id, users = users.len(), removed, "Invalidated feeds for new content");
                removed
            }
            None => {
                debug!(creator_id, topics = ?topics, "No audience given, invalidating trending feeds");
                self.invalidate_pattern(&trending_pattern()).await
            }
        }
    }

    /// Invalidate the preference entry and every feed that depends on the
    /// changed preferences.
    pub async fn invalidate_for_preference_change(
        &self,
        user_id: &str,
        changed: &[PreferenceType],
    ) -> u64 {
        let mut removed = self.count_removed(u64::from(
            self.cache.delete(&preferences_key(user_id)).await,
        ));

        let affected: BTreeSet<FeedType> = changed
            .iter()
            .flat_map(|p| p.affected_feed_types().iter().copied())
            .collect();
        for feed_type in &affected {
            removed += self.invalidate_user_feed(user_id, *feed_type).await;
        }

        info!(user_id, feeds = affected.len(), removed, "Invalidated feeds for preference change");
        removed
    }

    // =========================================================================
    // Event Queue
    // =========================================================================

    /// Queue an invalidation for the consumer loop.
    pub fn submit(&self, event: InvalidationEvent) -> Result<()> {
        self.queue
            .send(event)
            .map_err(|e| Error::Channel(format!("invalidation queue closed: {}", e)))
    }

    /// Run the flow matching an event.
    pub async fn process_event(&self, event: InvalidationEvent) -> u64 {
        match event {
            InvalidationEvent::UserFeed { user_id, feed_type } => {
                self.invalidate_user_feed(&user_id, feed_type).await
            }
            InvalidationEvent::AllUserFeeds { user_id } => {
                self.invalidate_all_user_feeds(&user_id).await
            }
            InvalidationEvent::BatchUsers {
                user_ids,
                feed_types,
            } => {
                self.invalidate_user_feeds(&user_ids, feed_types.as_deref())
                    .await
            }
            InvalidationEvent::PopularityScores { content_ids } => {
                self.invalidate_popularity_scores(&content_ids).await
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, event: InvalidationEvent) {
        let kind = event.kind();
        let service = Arc::clone(self);
        match tokio::spawn(async move { service.process_event(event).await }).await {
            Ok(removed) => {
                self.counters
                    .events_processed
                    .fetch_add(1, Ordering::Relaxed);
                debug!(kind, removed, "Processed invalidation event");
            }
            Err(e) => {
                self.counters.event_failures.fetch_add(1, Ordering::Relaxed);
                error!(kind, error = %e, "Invalidation event task failed");
            }
        }
    }

    /// Consume queued events and run periodic sweeps until cancelled.
    ///
    /// Only the first call owns the queue; later calls return immediately.
    #[instrument(skip_all, name = "invalidation_loop")]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let Some(mut receiver) = self.receiver.lock().take() else {
            warn!("Invalidation consumer already running");
            return;
        };

        let cleanup_period = self.config.cleanup_interval;
        let trending_period = self.config.trending_interval;
        let mut cleanup = interval_at(Instant::now() + cleanup_period, cleanup_period);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut trending = interval_at(Instant::now() + trending_period, trending_period);
        trending.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            cleanup_secs = cleanup_period.as_secs(),
            trending_secs = trending_period.as_secs(),
            "Starting invalidation consumer"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Invalidation consumer stopped");
                    break;
                }
                event = receiver.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => {
                        warn!("Invalidation queue closed");
                        break;
                    }
                },
                _ = cleanup.tick() => {
                    self.cleanup_recently_invalidated();
                }
                _ = trending.tick() => {
                    self.perform_time_based_invalidation().await;
                }
            }
        }
    }
}

// =============================================================================
// Event Listener
// =============================================================================

#[async_trait]
impl CacheEventListener for InvalidationService {
    async fn on_content_published(&self, event: &ContentPublishedEvent) -> Result<()> {
        self.invalidate_for_new_content(
            &event.creator_id,
            &event.topics,
            event.follower_ids.as_deref(),
        )
        .await;
        Ok(())
    }

    async fn on_preferences_changed(&self, event: &PreferencesChangedEvent) -> Result<()> {
        self.invalidate_for_preference_change(&event.user_id, &event.changed_preference_types)
            .await;
        Ok(())
    }

    async fn on_user_followed(&self, event: &UserFollowedEvent) -> Result<()> {
        for feed_type in FOLLOW_FEEDS {
            self.invalidate_user_feed(&event.follower_id, feed_type)
                .await;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
