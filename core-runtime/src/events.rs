//! # Event Bus
//!
//! Typed notifications published by the scanner and the playlist engine over
//! a `tokio::sync::broadcast` channel.
//!
//! ```text
//! ┌──────────────┐  emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ ScanCoordinator├──────>│ EventBus ├────────────>│ Subscriber │
//! └──────────────┘         │          │             └────────────┘
//! ┌──────────────┐  emit   │          │
//! │PlaylistEngine├────────>│          │
//! └──────────────┘         └──────────┘
//! ```
//!
//! Emitting with no subscribers is not an error for publishers; they ignore
//! the send result. Subscribers that fall behind by more than the buffer
//! size receive `RecvError::Lagged(n)` and can keep reading.
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaylistEvent};
//!
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//! bus.emit(CoreEvent::Playlist(PlaylistEvent::Deleted { playlist_id: 7 })).ok();
//! assert!(rx.try_recv().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default per-subscriber buffer.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Scan(ScanEvent),
    Playlist(PlaylistEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Scan(e) => e.description(),
            CoreEvent::Playlist(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Scan(ScanEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Scan(ScanEvent::FileSkipped { .. }) => EventSeverity::Warning,
            CoreEvent::Scan(ScanEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Playlist(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Scan Events
// ============================================================================

/// Catalog reconciliation lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ScanEvent {
    Started {
        root: String,
        full: bool,
    },
    /// A file could not be read and was left untouched for this pass.
    FileSkipped {
        path: String,
        reason: String,
    },
    Completed {
        root: String,
        files_scanned: u64,
        files_indexed: u64,
        newly_added: u64,
        updated: u64,
        missing_count: u64,
        duration_ms: u64,
    },
    Failed {
        root: String,
        message: String,
    },
    Cancelled {
        root: String,
    },
}

impl ScanEvent {
    fn description(&self) -> &str {
        match self {
            ScanEvent::Started { .. } => "Scan started",
            ScanEvent::FileSkipped { .. } => "File skipped",
            ScanEvent::Completed { .. } => "Scan completed",
            ScanEvent::Failed { .. } => "Scan failed",
            ScanEvent::Cancelled { .. } => "Scan cancelled",
        }
    }
}

// ============================================================================
// Playlist Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaylistEvent {
    Created { playlist_id: i64, name: String },
    Renamed { playlist_id: i64, name: String },
    /// Entries were added, removed, reordered or replaced.
    EntriesChanged { playlist_id: i64, entry_count: i64 },
    Deleted { playlist_id: i64 },
}

impl PlaylistEvent {
    fn description(&self) -> &str {
        match self {
            PlaylistEvent::Created { .. } => "Playlist created",
            PlaylistEvent::Renamed { .. } => "Playlist renamed",
            PlaylistEvent::EntriesChanged { .. } => "Playlist entries changed",
            PlaylistEvent::Deleted { .. } => "Playlist deleted",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event, returning how many subscribers received it.
    ///
    /// # Errors
    ///
    /// Fails only when there are no subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// New receiver for all future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver with an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind, `RecvError::Closed`
    /// once every sender is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_fails_softly() {
        let bus = EventBus::default();
        let result = bus.emit(CoreEvent::Playlist(PlaylistEvent::Deleted { playlist_id: 1 }));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stream_filter_skips_other_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Scan(_)));

        bus.emit(CoreEvent::Playlist(PlaylistEvent::Created {
            playlist_id: 1,
            name: "Mix".to_string(),
        }))
        .unwrap();
        bus.emit(CoreEvent::Scan(ScanEvent::Cancelled {
            root: "/music".to_string(),
        }))
        .unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(
            event,
            CoreEvent::Scan(ScanEvent::Cancelled {
                root: "/music".to_string()
            })
        );
    }

    #[test]
    fn test_severity() {
        let failed = CoreEvent::Scan(ScanEvent::Failed {
            root: "/music".to_string(),
            message: "gone".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(failed.description(), "Scan failed");

        let skipped = CoreEvent::Scan(ScanEvent::FileSkipped {
            path: "/music/a.mp3".to_string(),
            reason: "corrupt".to_string(),
        });
        assert_eq!(skipped.severity(), EventSeverity::Warning);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = CoreEvent::Playlist(PlaylistEvent::EntriesChanged {
            playlist_id: 3,
            entry_count: 12,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Playlist");
        assert_eq!(json["payload"]["event"], "EntriesChanged");
    }
}
