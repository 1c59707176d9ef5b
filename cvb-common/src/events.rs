//! Progress event types for the bundler
//!
//! Provides the BundleEvent enum and the EventBus every stage publishes to.
//! The binary subscribes a reporter that renders events as log lines.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Bundler progress events
///
/// Events never carry raw client identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BundleEvent {
    /// Rows consumed from the source so far
    RowsProcessed { rows: u64 },

    /// One clip finished downloading (or was already on disk)
    ClipDownloaded {
        locale: String,
        filename: String,
        bytes: u64,
        skipped: bool,
        downloaded_total: u64,
    },

    /// A clip failed after all retry attempts
    ClipFailed {
        locale: String,
        filename: String,
        message: String,
    },

    /// Row source paused by backpressure
    SourcePaused { in_flight: usize },

    /// Row source resumed by backpressure
    SourceResumed { in_flight: usize },

    /// Row source ended and all downloads drained
    DownloadsComplete { rows: u64, downloaded: u64, failed: u64 },

    /// Archive bytes uploaded so far for a locale
    UploadProgress { locale: String, bytes: u64 },

    /// Locale archive uploaded; `size` comes from the storage metadata
    UploadFinished { locale: String, size: u64 },

    /// Locale archive upload failed; remaining locales continue
    UploadFailed { locale: String, message: String },

    /// stats.json written
    StatsPublished { location: String },
}

/// Broadcast bus for bundler events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BundleEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BundleEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: BundleEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(BundleEvent::RowsProcessed { rows: 1000 });

        assert_eq!(rx.recv().await.unwrap(), BundleEvent::RowsProcessed { rows: 1000 });
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        bus.emit_lossy(BundleEvent::RowsProcessed { rows: 2 });

        // Late subscribers only see later events
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(BundleEvent::UploadFinished {
            locale: "fr".to_string(),
            size: 42,
        })
        .unwrap();
        assert_eq!(json["type"], "UploadFinished");
        assert_eq!(json["locale"], "fr");
        assert_eq!(json["size"], 42);
    }
}
