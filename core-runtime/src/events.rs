//! # Event Bus System
//!
//! Provides an event-driven architecture for the podcast session core using
//! `tokio::sync::broadcast`. Every player surface (full player, floating mini
//! player, host notifications) subscribes to the same bus and receives the same
//! notifications, so no surface needs to talk to another.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies per session concern
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   emit    ┌───────────┐
//! │ SessionController├──────────>│           │  subscribe  ┌───────────────┐
//! └──────────────────┘           │           ├────────────>│ Full player   │
//! ┌──────────────────┐   emit    │ EventBus  │             └───────────────┘
//! │ SleepTimer       ├──────────>│ (broadcast│  subscribe  ┌───────────────┐
//! └──────────────────┘           │  channel) ├────────────>│ Floating      │
//! ┌──────────────────┐   emit    │           │             └───────────────┘
//! │ Enrichment jobs  ├──────────>│           │
//! └──────────────────┘           └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, SessionEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Session(SessionEvent::Paused {
//!         media_id: "42".to_string(),
//!         position_ms: 120_000,
//!     }))
//!     .ok();
//!
//! let received = stream.recv().await.unwrap();
//! assert_eq!(received.description(), "Playback paused");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   Non-fatal; surfaces should re-read the latest session snapshot.
//! - **`RecvError::Closed`**: All senders have been dropped (controller disposed).
//!
//! Positions are carried as whole milliseconds so every event stays `Eq`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Session lifecycle and transport state
    Session(SessionEvent),
    /// Sleep timer arming, ticking and expiry
    SleepTimer(SleepTimerEvent),
    /// Bookmark list changes and failures
    Bookmark(BookmarkEvent),
    /// Resume-where-you-left-off negotiation
    Resume(ResumeEvent),
    /// AI enrichment job progress
    Enrichment(EnrichmentEvent),
    /// Primary/floating surface handoff
    Surface(SurfaceEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Session(e) => e.description(),
            CoreEvent::SleepTimer(e) => e.description(),
            CoreEvent::Bookmark(e) => e.description(),
            CoreEvent::Resume(e) => e.description(),
            CoreEvent::Enrichment(e) => e.description(),
            CoreEvent::Surface(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Session(SessionEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Bookmark(BookmarkEvent::Failed { .. })
            | CoreEvent::Enrichment(EnrichmentEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::SleepTimer(SleepTimerEvent::Expired { .. })
            | CoreEvent::Resume(ResumeEvent::Offered { .. })
            | CoreEvent::Session(SessionEvent::Finished { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Returns `true` for events a surface should present as a transient
    /// notification (toast) rather than a silent state refresh.
    pub fn is_notice(&self) -> bool {
        matches!(
            self,
            CoreEvent::Bookmark(BookmarkEvent::Added { .. })
                | CoreEvent::Bookmark(BookmarkEvent::Removed { .. })
                | CoreEvent::Bookmark(BookmarkEvent::Failed { .. })
                | CoreEvent::Enrichment(EnrichmentEvent::Failed { .. })
                | CoreEvent::SleepTimer(SleepTimerEvent::Expired { .. })
                | CoreEvent::Session(SessionEvent::Error { .. })
        )
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Session Events
// ============================================================================

/// Lifecycle of the single live session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// A media item was selected and its transport is loading.
    Opened {
        media_id: String,
        /// Generation number of the new session.
        token: u64,
    },
    /// The transport reported its duration; controls are usable.
    Ready { media_id: String, duration_ms: u64 },
    /// Playback started or resumed.
    Playing { media_id: String, position_ms: u64 },
    /// Playback paused.
    Paused { media_id: String, position_ms: u64 },
    /// The playhead was moved explicitly.
    Seeked { media_id: String, position_ms: u64 },
    /// Volume, mute or rate changed.
    OutputChanged {
        media_id: String,
        /// Volume in percent (0-100).
        volume_percent: u8,
        muted: bool,
        /// Playback rate in percent (100 = normal speed).
        rate_percent: u16,
    },
    /// Playback reached the end of the media.
    Finished { media_id: String },
    /// The listen-completion report was accepted by the server.
    CompletionReported { media_id: String },
    /// The session was torn down (media change or dispose).
    Closed { media_id: String },
    /// The transport failed; the session stays in its error state until the
    /// next load.
    Error {
        media_id: Option<String>,
        message: String,
    },
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::Opened { .. } => "Media opened",
            SessionEvent::Ready { .. } => "Media ready",
            SessionEvent::Playing { .. } => "Playback started",
            SessionEvent::Paused { .. } => "Playback paused",
            SessionEvent::Seeked { .. } => "Playback position changed",
            SessionEvent::OutputChanged { .. } => "Output settings changed",
            SessionEvent::Finished { .. } => "Episode finished",
            SessionEvent::CompletionReported { .. } => "Listen recorded",
            SessionEvent::Closed { .. } => "Session closed",
            SessionEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Sleep Timer Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SleepTimerEvent {
    /// A timer was armed (replacing any previous one).
    Armed {
        minutes: u32,
        /// Wall-clock deadline (Unix epoch milliseconds).
        deadline_unix_ms: i64,
    },
    /// Display refresh with the minutes left, rounded up.
    Tick { remaining_minutes: u32 },
    /// The timer was cleared without firing.
    Cancelled,
    /// The timer fired.
    Expired {
        /// Whether playback was running and got paused.
        paused_playback: bool,
    },
}

impl SleepTimerEvent {
    fn description(&self) -> &str {
        match self {
            SleepTimerEvent::Armed { .. } => "Sleep timer set",
            SleepTimerEvent::Tick { .. } => "Sleep timer running",
            SleepTimerEvent::Cancelled => "Sleep timer cancelled",
            SleepTimerEvent::Expired { .. } => "Sleep timer ended, playback paused",
        }
    }
}

// ============================================================================
// Bookmark Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BookmarkEvent {
    /// The bookmark list was (re)loaded from the server.
    Loaded { media_id: String, count: usize },
    Added {
        media_id: String,
        bookmark_id: String,
        timestamp_secs: u64,
    },
    Removed {
        media_id: String,
        bookmark_id: String,
    },
    /// A bookmark operation failed; local state is unchanged.
    Failed {
        media_id: String,
        operation: String,
        message: String,
    },
}

impl BookmarkEvent {
    fn description(&self) -> &str {
        match self {
            BookmarkEvent::Loaded { .. } => "Bookmarks loaded",
            BookmarkEvent::Added { .. } => "Bookmark added",
            BookmarkEvent::Removed { .. } => "Bookmark deleted",
            BookmarkEvent::Failed { .. } => "Bookmark operation failed",
        }
    }
}

// ============================================================================
// Resume Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ResumeEvent {
    /// A stored position is worth offering; autoplay waits for a decision.
    Offered { media_id: String, position_ms: u64 },
    /// Nothing to offer (no stored position, below threshold, or lookup failed).
    Skipped { media_id: String },
    /// The listener chose to continue from the stored position.
    Resumed { media_id: String, position_ms: u64 },
    /// The listener chose to start from the beginning.
    Restarted { media_id: String },
}

impl ResumeEvent {
    fn description(&self) -> &str {
        match self {
            ResumeEvent::Offered { .. } => "Resume offered",
            ResumeEvent::Skipped { .. } => "Resume not available",
            ResumeEvent::Resumed { .. } => "Resumed from last position",
            ResumeEvent::Restarted { .. } => "Started from the beginning",
        }
    }
}

// ============================================================================
// Enrichment Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum EnrichmentEvent {
    /// A job entered its loading state.
    Started { media_id: String, kind: String },
    /// A job produced a result.
    Ready {
        media_id: String,
        kind: String,
        /// `true` when the result had been generated earlier.
        cached: bool,
    },
    /// A job failed; `message` is safe to display.
    Failed {
        media_id: String,
        kind: String,
        message: String,
    },
}

impl EnrichmentEvent {
    fn description(&self) -> &str {
        match self {
            EnrichmentEvent::Started { .. } => "AI enrichment started",
            EnrichmentEvent::Ready { .. } => "AI enrichment ready",
            EnrichmentEvent::Failed { .. } => "AI enrichment failed",
        }
    }
}

// ============================================================================
// Surface Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SurfaceEvent {
    /// The floating player took over as the active surface.
    FloatingOpened { media_id: String },
    /// The floating player was dismissed (closed or maximized).
    FloatingClosed {
        media_id: Option<String>,
        /// `true` when the listener asked to return to the full player.
        maximized: bool,
    },
}

impl SurfaceEvent {
    fn description(&self) -> &str {
        match self {
            SurfaceEvent::FloatingOpened { .. } => "Floating player opened",
            SurfaceEvent::FloatingClosed { .. } => "Floating player closed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events, it will
    /// receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
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

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let event_bus = EventBus::new(100);
/// let notices = EventStream::new(event_bus.subscribe()).filter(CoreEvent::is_notice);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Drains every event currently buffered and accepted by the filter.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn paused(position_ms: u64) -> CoreEvent {
        CoreEvent::Session(SessionEvent::Paused {
            media_id: "42".to_string(),
            position_ms,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(paused(0)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Surface(SurfaceEvent::FloatingOpened {
            media_id: "42".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe()).filter(CoreEvent::is_notice);

        bus.emit(paused(1_000)).ok();
        let notice = CoreEvent::Bookmark(BookmarkEvent::Failed {
            media_id: "42".to_string(),
            operation: "add".to_string(),
            message: "Failed to add bookmark".to_string(),
        });
        bus.emit(notice.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), notice);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(paused(i)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let error = CoreEvent::Session(SessionEvent::Error {
            media_id: Some("42".to_string()),
            message: "decode failed".to_string(),
        });
        assert_eq!(error.severity(), EventSeverity::Error);

        let expired = CoreEvent::SleepTimer(SleepTimerEvent::Expired {
            paused_playback: true,
        });
        assert_eq!(expired.severity(), EventSeverity::Info);

        let failed = CoreEvent::Enrichment(EnrichmentEvent::Failed {
            media_id: "42".to_string(),
            kind: "summary".to_string(),
            message: "Failed to generate summary".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Warning);

        assert_eq!(paused(5_000).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        let event = CoreEvent::Resume(ResumeEvent::Offered {
            media_id: "42".to_string(),
            position_ms: 120_000,
        });
        assert_eq!(event.description(), "Resume offered");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::SleepTimer(SleepTimerEvent::Armed {
            minutes: 15,
            deadline_unix_ms: 1_714_557_600_000,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"SleepTimer""#));
        assert!(json.contains(r#""event":"Armed""#));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_drain_returns_buffered_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(paused(1)).ok();
        bus.emit(paused(2)).ok();

        assert_eq!(stream.drain(), vec![paused(1), paused(2)]);
        assert!(stream.drain().is_empty());
    }
}
