//! Domain event system: decoupled observation of the generation pipeline.
//!
//! The orchestrator and memory layer publish events as units move through
//! assembly, evaluation, and persistence. Subscribers (progress reporters,
//! audit logs, tests) react without the pipeline knowing about them.

use crate::context::TruncationStep;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// Context assembly had to drop material to fit the budget
    ContextTruncated {
        unit: String,
        initial_tokens: usize,
        final_tokens: usize,
        steps: Vec<TruncationStep>,
        over_budget: bool,
        timestamp: DateTime<Utc>,
    },

    /// An attempt failed a gate or the generation call errored
    AttemptRejected {
        unit: String,
        attempt: u32,
        reason: String,
        continuity_score: Option<f64>,
        detectability_score: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// A unit passed both gates and was persisted
    UnitAccepted {
        unit: String,
        attempts: u32,
        continuity_score: f64,
        detectability_score: f64,
        word_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A unit exhausted its attempts or hit a non-retryable error
    UnitFailed {
        unit: String,
        attempts: u32,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The cache sweeper removed expired entries
    CacheSwept {
        removed: usize,
        remaining: usize,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// The unit this event concerns, if any.
    pub fn unit(&self) -> Option<&str> {
        match self {
            Self::ContextTruncated { unit, .. }
            | Self::AttemptRejected { unit, .. }
            | Self::UnitAccepted { unit, .. }
            | Self::UnitFailed { unit, .. } => Some(unit),
            Self::CacheSwept { .. } => None,
        }
    }
}

/// Fan-out of [`DomainEvent`]s to any number of subscribers.
///
/// Backed by a `tokio::sync::broadcast` channel; a subscriber that falls
/// more than `capacity` events behind sees `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send to current subscribers. Events published with nobody listening
    /// are dropped.
    pub fn publish(&self, event: DomainEvent) {
        if self.sender.send(Arc::new(event)).is_err() {
            tracing::trace!("Event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_published_units() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(DomainEvent::UnitAccepted {
            unit: "saga/ch1/u1".into(),
            attempts: 2,
            continuity_score: 92.0,
            detectability_score: 4.0,
            word_count: 310,
            timestamp: Utc::now(),
        });

        for rx in [&mut first, &mut second] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.unit(), Some("saga/ch1/u1"));
            assert!(matches!(*event, DomainEvent::UnitAccepted { attempts: 2, .. }));
        }
    }

    #[test]
    fn publishing_without_listeners_is_silent() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(DomainEvent::CacheSwept {
            removed: 3,
            remaining: 0,
            timestamp: Utc::now(),
        });
        assert!(bus.subscribe().try_recv().is_err());
    }
}
