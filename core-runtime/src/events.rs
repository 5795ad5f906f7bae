//! # Event Bus System
//!
//! Provides an event-driven architecture for the upload core using `tokio::sync::broadcast`.
//! This module enables decoupled communication between core modules through typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ Upload Worker├──────────────>│           │
//! └──────────────┘               │ EventBus  │     subscribe    ┌──────────────────┐
//!                                │ (broadcast├─────────────────>│ Status Publisher │
//! ┌──────────────┐     emit      │  channel) │                  └──────────────────┘
//! │ Scheduler    ├──────────────>│           │     subscribe    ┌──────────────────┐
//! └──────────────┘               └───────────┘─────────────────>│ Host App         │
//!                                                               └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Publishing Events
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, UploadEvent};
//!
//! # let event_bus = EventBus::new(100);
//! let event = CoreEvent::Upload(UploadEvent::SessionStarted {
//!     session_id: "session-123".to_string(),
//!     total_items: 4,
//! });
//!
//! event_bus.emit(event).ok();
//! ```
//!
//! ### Subscribing to Events
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent};
//! use tokio::sync::broadcast::error::RecvError;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! tokio::spawn(async move {
//!     loop {
//!         match stream.recv().await {
//!             Ok(event) => println!("Received: {:?}", event),
//!             Err(RecvError::Lagged(n)) => {
//!                 eprintln!("Missed {} events", n);
//!             }
//!             Err(RecvError::Closed) => break,
//!         }
//!     }
//! });
//! # }
//! ```
//!
//! ## Error Handling
//!
//! The event bus uses `tokio::sync::broadcast`, which can produce two types of errors:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Subscribers should handle `Lagged` gracefully and treat `Closed` as a signal to exit.
//!
//! ## Thread Safety
//!
//! The event bus is fully thread-safe (`Send + Sync`). It can be safely shared across
//! async tasks using `Arc` or by cloning the bus itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// This value balances memory usage with the ability to handle bursts of events.
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
///
/// This is the main event type published and received through the event bus.
/// It wraps domain-specific event types for different modules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Upload session events
    Upload(UploadEvent),
    /// Background scheduling events
    Background(BackgroundEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Upload(e) => e.description(),
            CoreEvent::Background(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Upload(UploadEvent::SessionFailed { .. }) => EventSeverity::Error,
            CoreEvent::Upload(UploadEvent::ItemFailed {
                will_retry: false, ..
            }) => EventSeverity::Warning,
            CoreEvent::Upload(UploadEvent::SessionCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Background(BackgroundEvent::SchedulingEnabled { .. })
            | CoreEvent::Background(BackgroundEvent::SchedulingDisabled) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
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
// Upload Events
// ============================================================================

/// Events emitted over the lifetime of an upload session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    /// A scan admitted a batch and the session began.
    SessionStarted {
        /// Unique identifier for this session.
        session_id: String,
        /// Number of tasks admitted.
        total_items: u64,
    },
    /// One item finished uploading and was recorded in the ledger.
    Progress {
        /// The session ID.
        session_id: String,
        /// Items uploaded so far.
        uploaded: u64,
        /// Total items in the session.
        total: u64,
        /// Progress percentage (0-100).
        percent: u8,
    },
    /// One item's attempt failed.
    ItemFailed {
        /// The session ID.
        session_id: String,
        /// The media item that failed.
        media_id: String,
        /// Human-readable failure reason.
        reason: String,
        /// Whether the worker will retry the item.
        will_retry: bool,
    },
    /// Every task reached a terminal state.
    SessionCompleted {
        /// The session ID.
        session_id: String,
        /// Items uploaded.
        uploaded: u64,
        /// Total items in the session.
        total: u64,
    },
    /// The session aborted before or during processing.
    SessionFailed {
        /// The session ID.
        session_id: String,
        /// Human-readable error message.
        message: String,
        /// Items uploaded before the failure.
        uploaded: u64,
    },
    /// The session was cancelled; completed uploads stay recorded.
    SessionCancelled {
        /// The session ID.
        session_id: String,
        /// Items uploaded before cancellation.
        uploaded: u64,
    },
}

impl UploadEvent {
    fn description(&self) -> &str {
        match self {
            UploadEvent::SessionStarted { .. } => "Upload session started",
            UploadEvent::Progress { .. } => "Upload in progress",
            UploadEvent::ItemFailed { .. } => "Item upload failed",
            UploadEvent::SessionCompleted { .. } => "Upload session completed",
            UploadEvent::SessionFailed { .. } => "Upload session failed",
            UploadEvent::SessionCancelled { .. } => "Upload session cancelled",
        }
    }
}

// ============================================================================
// Background Events
// ============================================================================

/// Events related to background scheduling and cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BackgroundEvent {
    /// A background cycle was triggered by the host.
    CycleStarted,
    /// A background cycle ended; partial progress is kept on expiration.
    CycleFinished {
        /// Items uploaded during this cycle.
        uploaded: u64,
        /// Whether the host deadline expired before the cycle finished.
        expired: bool,
    },
    /// Background upload was enabled and the recurring trigger armed.
    SchedulingEnabled {
        /// Minimum re-arm interval in seconds.
        interval_secs: u64,
    },
    /// Background upload was disabled by the user.
    SchedulingDisabled,
}

impl BackgroundEvent {
    fn description(&self) -> &str {
        match self {
            BackgroundEvent::CycleStarted => "Background cycle started",
            BackgroundEvent::CycleFinished { .. } => "Background cycle finished",
            BackgroundEvent::SchedulingEnabled { .. } => "Background upload enabled",
            BackgroundEvent::SchedulingDisabled => "Background upload disabled",
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
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, CoreEvent, BackgroundEvent};
///
/// # #[tokio::main]
/// # async fn main() {
/// let event_bus = EventBus::new(100);
///
/// // Subscribe to events
/// let mut subscriber = event_bus.subscribe();
///
/// // Emit an event
/// event_bus.emit(CoreEvent::Background(BackgroundEvent::CycleStarted)).ok();
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future events.
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
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
/// This provides a more ergonomic API for consuming events with optional filtering
/// by event type or severity.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// # #[tokio::main]
/// # async fn main() {
/// let event_bus = EventBus::new(100);
/// let stream = EventStream::new(event_bus.subscribe());
///
/// // Filter for upload events only
/// let mut upload_stream = stream.filter(|event| {
///     matches!(event, CoreEvent::Upload(_))
/// });
/// # }
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

    /// Receives the next event that passes the filter (if any).
    ///
    /// Lagged errors are skipped transparently; `Err` is only returned when
    /// the channel is closed.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if let Some(filter) = &self.filter {
                        if !filter(&event) {
                            continue;
                        }
                    }
                    return Ok(event);
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return Err(RecvError::Closed),
            }
        }
    }
}
