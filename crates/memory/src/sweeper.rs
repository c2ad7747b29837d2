//! Background TTL sweep for the coordinator cache.

use crate::cache::TtlCache;
use chrono::Utc;
use inkweave_core::event::{DomainEvent, EventBus};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodically drops expired cache entries until stopped.
pub struct CacheSweeper {
    cache: Arc<TtlCache>,
    interval: Duration,
    events: Option<Arc<EventBus>>,
}

impl CacheSweeper {
    pub fn new(cache: Arc<TtlCache>, interval: Duration) -> Self {
        Self {
            cache,
            interval,
            events: None,
        }
    }

    /// Publish a `CacheSwept` event whenever a sweep removes something.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Spawn the sweep loop. It runs until [`SweeperHandle::stop`] is called
    /// or `parent` is cancelled.
    pub fn start(self, parent: &CancellationToken) -> SweeperHandle {
        let token = parent.child_token();
        let task_token = token.clone();
        let Self {
            cache,
            interval,
            events,
        } = self;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            let remaining = cache.len();
                            debug!(removed, remaining, "Cache sweep");
                            if let Some(bus) = &events {
                                bus.publish(DomainEvent::CacheSwept {
                                    removed,
                                    remaining,
                                    timestamp: Utc::now(),
                                });
                            }
                        }
                    }
                }
            }
            info!("Cache sweeper stopped");
        });

        SweeperHandle { token, handle }
    }
}

/// Owns the running sweep task.
pub struct SweeperHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Cache sweeper task ended abnormally");
        }
    }
}
