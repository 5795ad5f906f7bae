//! # Upload Session State Machine
//!
//! Manages the lifecycle of upload sessions with validated state transitions.
//!
//! ## Overview
//!
//! A session aggregates one scan-and-upload batch: the tasks admitted from a
//! scan, their per-item states, and the session-level status the UI observes.
//! Transitions are validated so that progress accounting stays consistent:
//! `uploaded_count` never regresses and never exceeds the task count.
//!
//! ## State Machine
//!
//! ```text
//!           ┌────────────→ Completed
//! Uploading ┼────────────→ Failed
//!           └── cancel ──→ Idle
//! ```
//!
//! An empty batch is born `Completed` (a trivially-successful run). A
//! cancelled session first marks its remaining tasks `Failed(Cancelled)` so
//! every task is terminal, then returns to `Idle`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_upload::session::UploadSession;
//!
//! let mut session = UploadSession::new(tasks);
//! session.start_task(0)?;
//! session.record_success(0)?;
//! let session = session.complete()?;
//! ```

use crate::error::{Result, UploadError};
use bridge_traits::assets::{MediaItem, MediaItemId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| UploadError::InvalidSessionId(e.to_string()))?,
        ))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Task Types
// ============================================================================

/// Why a task reached the `Failed` state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    /// Library access was revoked mid-session
    Permission,
    /// Asset bytes could not be fetched
    Fetch,
    /// The transfer itself failed
    Transfer,
    /// The ledger rejected the completion record
    Ledger,
    /// The session was cancelled before the task ran
    Cancelled,
}

impl FailureReason {
    /// Get the string representation for storage and logging
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Permission => "permission",
            FailureReason::Fetch => "fetch",
            FailureReason::Transfer => "transfer",
            FailureReason::Ledger => "ledger",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-task state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state")]
pub enum TaskState {
    /// Task is queued and waiting to be processed
    Pending,
    /// Task is currently uploading
    InFlight,
    /// Upload finished and the ledger recorded it
    Succeeded,
    /// Task failed permanently
    Failed { reason: FailureReason },
}

impl TaskState {
    /// Check if state is terminal (succeeded or failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

/// One upload attempt series for a media item.
///
/// Created when the item is admitted to a session; transitions through
/// states as the worker drives it; terminal once succeeded or permanently
/// failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTask {
    /// The media item being uploaded (read-only view into the library)
    pub item: MediaItem,
    /// Current state
    pub state: TaskState,
    /// Number of attempts made so far
    pub attempts: u32,
    /// Error message from the last failed attempt
    pub error_message: Option<String>,
}

impl UploadTask {
    /// Create a new pending task for an item
    pub fn new(item: MediaItem) -> Self {
        Self {
            item,
            state: TaskState::Pending,
            attempts: 0,
            error_message: None,
        }
    }

    /// The media item's stable identifier
    pub fn media_id(&self) -> &MediaItemId {
        &self.item.id
    }
}

// ============================================================================
// Session Status
// ============================================================================

/// Session-level status observed by presentation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No upload running (also the post-cancellation state)
    Idle,
    /// Tasks are being processed
    Uploading,
    /// Every task reached a terminal state
    Completed,
    /// The session aborted; see `error_message`
    Failed,
}

impl SessionStatus {
    /// Check if this status represents an active state
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Uploading)
    }

    /// Get the string representation for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Uploading => "uploading",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SessionStatus::Idle),
            "uploading" => Ok(SessionStatus::Uploading),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            _ => Err(UploadError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Upload Session
// ============================================================================

/// One scan-and-upload batch with state machine semantics.
///
/// Tasks are stored in discovery order. The invariants the worker relies on:
/// - `uploaded_count <= total_count()` always
/// - `uploaded_count` only ever increments
/// - `Completed` implies every task is terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Tasks in discovery order
    pub tasks: Vec<UploadTask>,
    /// Current session status
    pub status: SessionStatus,
    /// Number of tasks that succeeded
    pub uploaded_count: u64,
    /// Error message if failed
    pub error_message: Option<String>,
    /// When the session was created
    pub started_at: i64,
    /// When the session reached a terminal status
    pub completed_at: Option<i64>,
}

impl UploadSession {
    /// Create a session from admitted tasks.
    ///
    /// A non-empty batch starts `Uploading`; an empty batch is a valid,
    /// trivially-successful run and is born `Completed`.
    pub fn new(tasks: Vec<UploadTask>) -> Self {
        let now = current_timestamp();
        let status = if tasks.is_empty() {
            SessionStatus::Completed
        } else {
            SessionStatus::Uploading
        };

        Self {
            id: SessionId::new(),
            completed_at: (status == SessionStatus::Completed).then_some(now),
            tasks,
            status,
            uploaded_count: 0,
            error_message: None,
            started_at: now,
        }
    }

    /// Create a session that failed before any task was admitted
    /// (e.g. permission denied at scan start).
    pub fn failed(message: impl Into<String>) -> Self {
        let now = current_timestamp();
        Self {
            id: SessionId::new(),
            tasks: Vec::new(),
            status: SessionStatus::Failed,
            uploaded_count: 0,
            error_message: Some(message.into()),
            started_at: now,
            completed_at: Some(now),
        }
    }

    /// Total number of tasks in this session
    pub fn total_count(&self) -> u64 {
        self.tasks.len() as u64
    }

    /// Progress ratio in `[0, 1]`, monotonically non-decreasing.
    ///
    /// An empty session reports 0.0 (the ratio is undefined; the status
    /// carries the completion signal).
    pub fn progress(&self) -> f64 {
        if self.tasks.is_empty() {
            0.0
        } else {
            self.uploaded_count as f64 / self.total_count() as f64
        }
    }

    /// Mark a task in-flight and count the attempt.
    pub fn start_task(&mut self, index: usize) -> Result<()> {
        self.ensure_uploading("start_task")?;
        let task = self.task_mut(index)?;
        task.state = TaskState::InFlight;
        task.attempts += 1;
        Ok(())
    }

    /// Record a task success and bump the uploaded counter.
    pub fn record_success(&mut self, index: usize) -> Result<()> {
        self.ensure_uploading("record_success")?;
        let total = self.total_count();
        let task = self.task_mut(index)?;
        task.state = TaskState::Succeeded;
        task.error_message = None;

        debug_assert!(self.uploaded_count < total);
        self.uploaded_count = (self.uploaded_count + 1).min(total);
        Ok(())
    }

    /// Record a permanent task failure. Sibling tasks are unaffected.
    pub fn record_failure(
        &mut self,
        index: usize,
        reason: FailureReason,
        message: impl Into<String>,
    ) -> Result<()> {
        self.ensure_uploading("record_failure")?;
        let task = self.task_mut(index)?;
        task.state = TaskState::Failed { reason };
        task.error_message = Some(message.into());
        Ok(())
    }

    /// Mark the session as completed.
    ///
    /// # Errors
    ///
    /// Returns an error if any task is still non-terminal, or if the session
    /// is not `Uploading`.
    pub fn complete(&mut self) -> Result<()> {
        self.validate_transition(SessionStatus::Completed)?;
        if let Some(task) = self.tasks.iter().find(|t| !t.state.is_terminal()) {
            return Err(UploadError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: SessionStatus::Completed.as_str().to_string(),
                reason: format!("task {} is not terminal", task.item.id),
            });
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(current_timestamp());
        Ok(())
    }

    /// Mark the session as failed with an error message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.validate_transition(SessionStatus::Failed)?;
        self.status = SessionStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(current_timestamp());
        Ok(())
    }

    /// Cancel the session.
    ///
    /// Remaining non-terminal tasks become `Failed(Cancelled)` so the whole
    /// batch is terminal, then the session returns to `Idle`. Tasks that
    /// already succeeded stay succeeded; their ledger entries are kept.
    pub fn cancel(&mut self) -> Result<()> {
        self.validate_transition(SessionStatus::Idle)?;
        for task in &mut self.tasks {
            if !task.state.is_terminal() {
                task.state = TaskState::Failed {
                    reason: FailureReason::Cancelled,
                };
            }
        }
        self.status = SessionStatus::Idle;
        self.completed_at = Some(current_timestamp());
        Ok(())
    }

    /// Duration of the session in seconds, if terminal.
    pub fn duration_secs(&self) -> Option<u64> {
        self.completed_at
            .map(|end| end.saturating_sub(self.started_at) as u64)
    }

    fn task_mut(&mut self, index: usize) -> Result<&mut UploadTask> {
        let id = self.id;
        self.tasks
            .get_mut(index)
            .ok_or_else(|| UploadError::SessionNotFound {
                session_id: format!("{} task {}", id, index),
            })
    }

    fn ensure_uploading(&self, operation: &str) -> Result<()> {
        if self.status != SessionStatus::Uploading {
            return Err(UploadError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: operation.to_string(),
                reason: "Session must be uploading".to_string(),
            });
        }
        Ok(())
    }

    /// Validate a state transition
    fn validate_transition(&self, to: SessionStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (SessionStatus::Uploading, SessionStatus::Completed)
                | (SessionStatus::Uploading, SessionStatus::Failed)
                | (SessionStatus::Uploading, SessionStatus::Idle)
        );

        if !valid {
            return Err(UploadError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

/// Get current Unix timestamp
fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time before UNIX epoch")
        .as_secs() as i64
}

// ============================================================================
// Tests
// ============================================================================
