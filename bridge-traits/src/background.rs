//! Background Execution and Task Scheduling
//!
//! Provides platform-aware background task scheduling for periodic upload
//! cycles.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Task execution constraints
#[derive(Debug, Clone)]
pub struct TaskConstraints {
    /// Require WiFi connection
    pub requires_wifi: bool,
    /// Require any network connection
    pub requires_network: bool,
    /// Require device to be charging
    pub requires_charging: bool,
    /// Require device to be idle
    pub requires_idle: bool,
}

impl Default for TaskConstraints {
    fn default() -> Self {
        Self {
            requires_wifi: false,
            requires_network: true,
            requires_charging: false,
            requires_idle: false,
        }
    }
}

/// Scheduled task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Task execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task is scheduled but not yet running
    Scheduled,
    /// Task is currently executing
    Running,
    /// Task completed successfully
    Completed,
    /// Task failed
    Failed,
    /// Task was cancelled
    Cancelled,
}

/// Context handed to a task handler for one execution.
///
/// The host trips the expiration token when its execution window ends (iOS
/// hands BGAppRefreshTask roughly 30 seconds; Android WorkManager stops work
/// under Doze). Handlers should treat expiration as "wrap up and keep partial
/// progress", not as an error.
#[derive(Debug, Clone)]
pub struct TaskRun {
    expiration: CancellationToken,
}

impl TaskRun {
    /// Create a run bound to the given expiration token.
    pub fn new(expiration: CancellationToken) -> Self {
        Self { expiration }
    }

    /// Create a run with no execution deadline (tests, foreground runs).
    pub fn unbounded() -> Self {
        Self {
            expiration: CancellationToken::new(),
        }
    }

    /// Token tripped at the host's execution deadline.
    pub fn expiration(&self) -> CancellationToken {
        self.expiration.clone()
    }

    /// Whether the host deadline has already passed.
    pub fn is_expired(&self) -> bool {
        self.expiration.is_cancelled()
    }
}

/// Handler invoked for each execution of a registered task.
pub type TaskHandler = Arc<dyn Fn(TaskRun) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Background task executor trait
///
/// Abstracts platform-specific background task scheduling:
/// - **iOS**: BGTaskScheduler (requires user opt-in)
/// - **Android**: WorkManager (respects Doze mode)
/// - **Desktop**: System scheduler (cron, launchd, Task Scheduler) or daemon
///
/// # Platform Constraints
///
/// Different platforms have different limitations:
/// - iOS: short execution windows, must re-register periodically, the system
///   decides actual run times
/// - Android: deferred under Doze/Idle mode based on constraints
///
/// A failed or expired execution must not stop future recurrences; only
/// [`cancel_task`](BackgroundExecutor::cancel_task) stops a schedule.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::{BackgroundExecutor, TaskConstraints};
/// use std::time::Duration;
///
/// async fn arm(executor: &dyn BackgroundExecutor) -> Result<()> {
///     executor
///         .schedule_task(
///             "upload.background-refresh",
///             Duration::from_secs(15 * 60),
///             TaskConstraints { requires_wifi: true, ..Default::default() },
///         )
///         .await?;
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait BackgroundExecutor: Send + Sync {
    /// Register the handler invoked for a task identifier.
    ///
    /// Must be called before the first `schedule_*` for that identifier.
    /// Re-registering replaces the previous handler.
    async fn register_handler(&self, task_id: &str, handler: TaskHandler) -> Result<()>;

    /// Schedule a recurring task
    ///
    /// # Arguments
    ///
    /// * `task_id` - Unique identifier for the task
    /// * `interval` - Minimum re-arm interval between runs
    /// * `constraints` - Execution constraints (network, charging, etc.)
    async fn schedule_task(
        &self,
        task_id: &str,
        interval: Duration,
        constraints: TaskConstraints,
    ) -> Result<TaskId>;

    /// Schedule a one-time delayed task
    async fn schedule_once(
        &self,
        task_id: &str,
        delay: Duration,
        constraints: TaskConstraints,
    ) -> Result<TaskId>;

    /// Cancel a scheduled task
    async fn cancel_task(&self, task_id: &TaskId) -> Result<()>;

    /// Get status of a task
    async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus>;

    /// List all scheduled tasks
    async fn list_tasks(&self) -> Result<Vec<TaskId>>;

    /// Check if background execution is available
    ///
    /// Some hosts may not support background execution at all.
    async fn is_available(&self) -> bool {
        true
    }

    /// Get estimated time until next execution window
    ///
    /// Returns `None` if the information is not available or if the task
    /// will execute immediately.
    async fn next_execution_time(&self, task_id: &TaskId) -> Result<Option<Duration>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_constraints() {
        let constraints = TaskConstraints {
            requires_wifi: true,
            ..Default::default()
        };

        assert!(constraints.requires_wifi);
        assert!(constraints.requires_network);
        assert!(!constraints.requires_charging);
    }

    #[test]
    fn test_task_id() {
        let id1 = TaskId::new("upload.background-refresh");
        let id2 = TaskId::new("upload.background-refresh");

        assert_eq!(id1, id2);
    }

    #[test]
    fn test_task_run_expiration() {
        let run = TaskRun::unbounded();
        assert!(!run.is_expired());

        let token = CancellationToken::new();
        let run = TaskRun::new(token.clone());
        token.cancel();
        assert!(run.is_expired());
        assert!(run.expiration().is_cancelled());
    }
}
