//! # Upload Status Publisher
//!
//! Projects engine events into an observable status snapshot.
//!
//! ## Overview
//!
//! Pure projection, no business logic: the publisher subscribes to the
//! [`EventBus`] on its own task and folds upload/background events into an
//! [`UploadStatus`] snapshot published through a `tokio::sync::watch`
//! channel. Observers on any execution context (a UI thread included)
//! borrow a consistent snapshot or await changes, without touching the
//! worker's state.
//!
//! Progress is clamped monotonically non-decreasing within a session; a new
//! session resets it. If the publisher ever lags behind the bus it drops the
//! missed events and keeps folding: snapshots may skip intermediate values
//! but never regress.

use core_runtime::events::{BackgroundEvent, CoreEvent, EventBus, RecvError, UploadEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::SessionStatus;

/// Externally observable upload state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadStatus {
    /// Whether a session is currently uploading
    pub is_uploading: bool,
    /// Progress ratio in `[0, 1]`, monotonic within a session
    pub progress: f64,
    /// Items uploaded in the current session
    pub uploaded_count: u64,
    /// Total items in the current session
    pub total_count: u64,
    /// Session-level status
    pub status: SessionStatus,
    /// Failure message when `status` is `Failed`
    pub error_message: Option<String>,
    /// Lifetime count of items uploaded by background cycles
    pub background_upload_count: u64,
    /// When the last background item was uploaded, Unix seconds
    pub last_upload_date: Option<i64>,
}

impl Default for UploadStatus {
    fn default() -> Self {
        Self {
            is_uploading: false,
            progress: 0.0,
            uploaded_count: 0,
            total_count: 0,
            status: SessionStatus::Idle,
            error_message: None,
            background_upload_count: 0,
            last_upload_date: None,
        }
    }
}

impl UploadStatus {
    /// Seed a snapshot with persisted background counters.
    pub fn with_background_counters(count: u64, last_upload_date: Option<i64>) -> Self {
        Self {
            background_upload_count: count,
            last_upload_date,
            ..Default::default()
        }
    }

    fn apply(&mut self, event: &CoreEvent, session_id: &mut Option<String>, now: i64) {
        match event {
            CoreEvent::Upload(UploadEvent::SessionStarted {
                session_id: id,
                total_items,
            }) => {
                *session_id = Some(id.clone());
                self.is_uploading = *total_items > 0;
                self.progress = 0.0;
                self.uploaded_count = 0;
                self.total_count = *total_items;
                self.status = if *total_items > 0 {
                    SessionStatus::Uploading
                } else {
                    SessionStatus::Completed
                };
                self.error_message = None;
            }
            CoreEvent::Upload(UploadEvent::Progress {
                session_id: id,
                uploaded,
                total,
                ..
            }) => {
                if session_id.as_deref() == Some(id.as_str()) {
                    self.uploaded_count = (*uploaded).max(self.uploaded_count);
                    self.total_count = *total;
                    let ratio = if *total == 0 {
                        0.0
                    } else {
                        self.uploaded_count as f64 / *total as f64
                    };
                    // Monotonic within a session.
                    self.progress = self.progress.max(ratio.min(1.0));
                }
            }
            CoreEvent::Upload(UploadEvent::SessionCompleted {
                session_id: id,
                uploaded,
                total,
            }) => {
                if session_id.as_deref() == Some(id.as_str()) {
                    self.is_uploading = false;
                    self.status = SessionStatus::Completed;
                    self.uploaded_count = (*uploaded).max(self.uploaded_count);
                    self.total_count = *total;
                    if *total > 0 {
                        self.progress = self
                            .progress
                            .max(self.uploaded_count as f64 / *total as f64);
                    }
                }
            }
            CoreEvent::Upload(UploadEvent::SessionFailed {
                session_id: id,
                message,
                uploaded,
            }) => {
                // A pre-scan denial arrives without a SessionStarted.
                *session_id = Some(id.clone());
                self.is_uploading = false;
                self.status = SessionStatus::Failed;
                self.error_message = Some(message.clone());
                self.uploaded_count = (*uploaded).max(self.uploaded_count);
            }
            CoreEvent::Upload(UploadEvent::SessionCancelled {
                session_id: id,
                uploaded,
            }) => {
                if session_id.as_deref() == Some(id.as_str()) {
                    self.is_uploading = false;
                    self.status = SessionStatus::Idle;
                    self.uploaded_count = (*uploaded).max(self.uploaded_count);
                }
            }
            CoreEvent::Upload(UploadEvent::ItemFailed { .. }) => {}
            CoreEvent::Background(BackgroundEvent::CycleFinished { uploaded, .. }) => {
                if *uploaded > 0 {
                    self.background_upload_count += uploaded;
                    self.last_upload_date = Some(now);
                }
            }
            CoreEvent::Background(_) => {}
        }
    }
}

/// Folds bus events into a watchable [`UploadStatus`].
pub struct UploadStatusPublisher {
    receiver: watch::Receiver<UploadStatus>,
    handle: JoinHandle<()>,
}

impl UploadStatusPublisher {
    /// Spawn the projection task.
    ///
    /// `initial` seeds the snapshot, typically with persisted background
    /// counters so the UI shows them before the first event arrives.
    pub fn spawn(events: &EventBus, initial: UploadStatus) -> Self {
        let mut bus_rx = events.subscribe();
        let (tx, receiver) = watch::channel(initial.clone());

        let handle = tokio::spawn(async move {
            let mut status = initial;
            let mut session_id: Option<String> = None;
            loop {
                match bus_rx.recv().await {
                    Ok(event) => {
                        let now = chrono::Utc::now().timestamp();
                        status.apply(&event, &mut session_id, now);
                        if tx.send(status.clone()).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "Status publisher lagged behind event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self { receiver, handle }
    }

    /// Watch receiver for observers; `borrow()` gives the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.receiver.clone()
    }

    /// Latest snapshot.
    pub fn current(&self) -> UploadStatus {
        self.receiver.borrow().clone()
    }
}

impl Drop for UploadStatusPublisher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    async fn wait_for<F>(rx: &mut watch::Receiver<UploadStatus>, predicate: F) -> UploadStatus
    where
        F: Fn(&UploadStatus) -> bool,
    {
        timeout(Duration::from_secs(2), async {
            loop {
                {
                    let current = rx.borrow();
                    if predicate(&current) {
                        return current.clone();
                    }
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("status predicate not reached in time")
    }

    fn started(id: &str, total: u64) -> CoreEvent {
        CoreEvent::Upload(UploadEvent::SessionStarted {
            session_id: id.to_string(),
            total_items: total,
        })
    }

    fn progress(id: &str, uploaded: u64, total: u64) -> CoreEvent {
        CoreEvent::Upload(UploadEvent::Progress {
            session_id: id.to_string(),
            uploaded,
            total,
            percent: ((uploaded * 100) / total.max(1)) as u8,
        })
    }

    #[tokio::test]
    async fn test_projection_of_full_session() {
        let bus = EventBus::new(64);
        let publisher = UploadStatusPublisher::spawn(&bus, UploadStatus::default());
        let mut rx = publisher.subscribe();

        bus.emit(started("s-1", 4)).unwrap();
        let status = wait_for(&mut rx, |s| s.is_uploading).await;
        assert_eq!(status.total_count, 4);
        assert_eq!(status.status, SessionStatus::Uploading);

        bus.emit(progress("s-1", 2, 4)).unwrap();
        let status = wait_for(&mut rx, |s| s.uploaded_count == 2).await;
        assert!((status.progress - 0.5).abs() < f64::EPSILON);

        bus.emit(CoreEvent::Upload(UploadEvent::SessionCompleted {
            session_id: "s-1".to_string(),
            uploaded: 4,
            total: 4,
        }))
        .unwrap();
        let status = wait_for(&mut rx, |s| s.status == SessionStatus::Completed).await;
        assert!(!status.is_uploading);
        assert!((status.progress - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_progress_never_regresses_within_session() {
        let bus = EventBus::new(64);
        let publisher = UploadStatusPublisher::spawn(&bus, UploadStatus::default());
        let mut rx = publisher.subscribe();

        bus.emit(started("s-1", 4)).unwrap();
        bus.emit(progress("s-1", 3, 4)).unwrap();
        let status = wait_for(&mut rx, |s| s.uploaded_count == 3).await;
        assert!((status.progress - 0.75).abs() < f64::EPSILON);

        // An out-of-order lower progress value must not pull the ratio back.
        bus.emit(progress("s-1", 1, 4)).unwrap();
        bus.emit(progress("s-1", 4, 4)).unwrap();
        let status = wait_for(&mut rx, |s| s.uploaded_count == 4).await;
        assert!((status.progress - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_new_session_resets_progress() {
        let bus = EventBus::new(64);
        let publisher = UploadStatusPublisher::spawn(&bus, UploadStatus::default());
        let mut rx = publisher.subscribe();

        bus.emit(started("s-1", 2)).unwrap();
        bus.emit(progress("s-1", 2, 2)).unwrap();
        wait_for(&mut rx, |s| s.uploaded_count == 2).await;

        bus.emit(started("s-2", 3)).unwrap();
        let status = wait_for(&mut rx, |s| s.total_count == 3).await;
        assert_eq!(status.uploaded_count, 0);
        assert!(status.progress.abs() < f64::EPSILON);
        assert!(status.is_uploading);
    }

    #[tokio::test]
    async fn test_failed_session_carries_message() {
        let bus = EventBus::new(64);
        let publisher = UploadStatusPublisher::spawn(&bus, UploadStatus::default());
        let mut rx = publisher.subscribe();

        bus.emit(CoreEvent::Upload(UploadEvent::SessionFailed {
            session_id: "s-1".to_string(),
            message: "photo library access denied".to_string(),
            uploaded: 0,
        }))
        .unwrap();

        let status = wait_for(&mut rx, |s| s.status == SessionStatus::Failed).await;
        assert_eq!(
            status.error_message.as_deref(),
            Some("photo library access denied")
        );
        assert!(!status.is_uploading);
    }

    #[tokio::test]
    async fn test_background_counters_accumulate() {
        let bus = EventBus::new(64);
        let initial = UploadStatus::with_background_counters(5, Some(1_700_000_000));
        let publisher = UploadStatusPublisher::spawn(&bus, initial);
        let mut rx = publisher.subscribe();

        assert_eq!(publisher.current().background_upload_count, 5);

        bus.emit(CoreEvent::Background(BackgroundEvent::CycleFinished {
            uploaded: 3,
            expired: false,
        }))
        .unwrap();

        let status = wait_for(&mut rx, |s| s.background_upload_count == 8).await;
        assert!(status.last_upload_date.unwrap() >= 1_700_000_000);
    }

    #[tokio::test]
    async fn test_empty_session_completes() {
        let bus = EventBus::new(64);
        let publisher = UploadStatusPublisher::spawn(&bus, UploadStatus::default());
        let mut rx = publisher.subscribe();

        bus.emit(started("s-1", 0)).unwrap();
        let status = wait_for(&mut rx, |s| s.status == SessionStatus::Completed).await;
        assert!(!status.is_uploading);
        assert_eq!(status.total_count, 0);
    }
}
