//! Background Task Execution Implementation
//!
//! Tokio-based stand-in for a platform background scheduler. Recurring tasks
//! re-arm unconditionally after every run (success, failure or expiration),
//! matching the contract that only an explicit cancel stops a schedule. An
//! optional per-run deadline trips the handler's expiration token the way a
//! mobile host ends a background execution window.

use async_trait::async_trait;
use bridge_traits::{
    background::{BackgroundExecutor, TaskConstraints, TaskHandler, TaskId, TaskRun, TaskStatus},
    error::{BridgeError, Result},
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
    time::{Clock, SystemClock},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Tokio-based background executor for desktop.
pub struct TokioBackgroundExecutor {
    tasks: Arc<RwLock<HashMap<TaskId, TaskInfo>>>,
    handlers: Arc<RwLock<HashMap<String, TaskHandler>>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Arc<dyn Clock>,
    /// Per-run execution window; `None` runs handlers without a deadline.
    run_deadline: Option<Duration>,
}

struct TaskInfo {
    status: TaskStatus,
    handle: Option<JoinHandle<()>>,
    cancel: Option<oneshot::Sender<()>>,
    last_run: Option<i64>,
    next_run: Option<i64>,
}

impl TokioBackgroundExecutor {
    /// Create a new background executor with no network monitoring.
    pub fn new() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_options(None, clock, None)
    }

    /// Create a background executor with an optional network monitor.
    pub fn with_network_monitor(monitor: Option<Arc<dyn NetworkMonitor>>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_options(monitor, clock, None)
    }

    /// Create a background executor with full control over its collaborators.
    pub fn with_options(
        monitor: Option<Arc<dyn NetworkMonitor>>,
        clock: Arc<dyn Clock>,
        run_deadline: Option<Duration>,
    ) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            network_monitor: monitor,
            clock,
            run_deadline,
        }
    }

    fn now_millis(clock: &dyn Clock) -> i64 {
        clock.unix_timestamp_millis()
    }

    fn duration_to_millis(duration: Duration) -> i64 {
        duration.as_millis().min(i64::MAX as u128) as i64
    }

    fn schedule_after(clock: &dyn Clock, delay: Duration) -> i64 {
        let now = Self::now_millis(clock);
        now.saturating_add(Self::duration_to_millis(delay))
    }

    fn millis_to_duration(millis: i64) -> Duration {
        if millis <= 0 {
            Duration::from_secs(0)
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    async fn handler_for(&self, task_id: &str) -> Option<TaskHandler> {
        let handlers = self.handlers.read().await;
        handlers.get(task_id).cloned()
    }

    async fn insert_task(&self, id: TaskId, info: TaskInfo) {
        let mut tasks = self.tasks.write().await;
        tasks.insert(id, info);
    }

    async fn update_task<F>(&self, id: &TaskId, update: F)
    where
        F: FnOnce(&mut TaskInfo),
    {
        let mut tasks = self.tasks.write().await;
        if let Some(info) = tasks.get_mut(id) {
            update(info);
        }
    }

    async fn remove_task(&self, id: &TaskId) -> Option<TaskInfo> {
        let mut tasks = self.tasks.write().await;
        tasks.remove(id)
    }

    async fn constraints_satisfied(
        monitor: Option<Arc<dyn NetworkMonitor>>,
        constraints: &TaskConstraints,
    ) -> bool {
        if !(constraints.requires_network || constraints.requires_wifi) {
            return true;
        }

        if let Some(monitor) = monitor {
            match monitor.get_network_info().await {
                Ok(NetworkInfo {
                    status: NetworkStatus::Connected,
                    network_type,
                    ..
                }) => {
                    if constraints.requires_wifi {
                        matches!(network_type, Some(NetworkType::WiFi))
                    } else {
                        true
                    }
                }
                Ok(_) => false,
                Err(err) => {
                    warn!("Network monitor error: {}", err);
                    false
                }
            }
        } else {
            warn!(
                "Network constraints requested but no monitor provided; assuming constraint satisfied"
            );
            true
        }
    }

    /// Invoke a handler with an expiration token armed at the deadline.
    async fn execute_handler(
        handler: &TaskHandler,
        run_deadline: Option<Duration>,
    ) -> Result<()> {
        let expiration = CancellationToken::new();
        let timer = run_deadline.map(|deadline| {
            let token = expiration.clone();
            tokio::spawn(async move {
                sleep(deadline).await;
                token.cancel();
            })
        });

        let result = handler(TaskRun::new(expiration)).await;

        if let Some(timer) = timer {
            timer.abort();
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_recurring_task(
        tasks: Arc<RwLock<HashMap<TaskId, TaskInfo>>>,
        id: TaskId,
        handler: TaskHandler,
        period: Duration,
        constraints: TaskConstraints,
        mut cancel_rx: oneshot::Receiver<()>,
        monitor: Option<Arc<dyn NetworkMonitor>>,
        clock: Arc<dyn Clock>,
        run_deadline: Option<Duration>,
    ) {
        let mut ticker = tokio::time::interval(period);
        let period_millis = Self::duration_to_millis(period);
        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    let mut tasks = tasks.write().await;
                    if let Some(info) = tasks.get_mut(&id) {
                        info.status = TaskStatus::Cancelled;
                        info.next_run = None;
                    }
                    break;
                }
                _ = ticker.tick() => {
                    if !Self::constraints_satisfied(monitor.clone(), &constraints).await {
                        debug!(task_id = %id.0, "Constraints not satisfied; skipping run");
                        let mut tasks = tasks.write().await;
                        if let Some(info) = tasks.get_mut(&id) {
                            info.next_run = Some(Self::now_millis(clock.as_ref()).saturating_add(period_millis));
                        }
                        continue;
                    }

                    {
                        let mut tasks = tasks.write().await;
                        if let Some(info) = tasks.get_mut(&id) {
                            info.status = TaskStatus::Running;
                        }
                    }

                    let result = Self::execute_handler(&handler, run_deadline).await;

                    // Whatever happened, the schedule stays armed for the
                    // next tick; only cancel_task stops it.
                    let mut tasks = tasks.write().await;
                    if let Some(info) = tasks.get_mut(&id) {
                        let now = Self::now_millis(clock.as_ref());
                        info.last_run = Some(now);
                        info.next_run = Some(now.saturating_add(period_millis));
                        info.status = match result {
                            Ok(()) => TaskStatus::Completed,
                            Err(err) => {
                                warn!(task_id = %id.0, error = %err, "Recurring task failed");
                                TaskStatus::Failed
                            }
                        };
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_one_time_task(
        tasks: Arc<RwLock<HashMap<TaskId, TaskInfo>>>,
        id: TaskId,
        handler: TaskHandler,
        delay: Duration,
        constraints: TaskConstraints,
        mut cancel_rx: oneshot::Receiver<()>,
        monitor: Option<Arc<dyn NetworkMonitor>>,
        clock: Arc<dyn Clock>,
        run_deadline: Option<Duration>,
    ) {
        let delay_sleep = sleep(delay);
        tokio::pin!(delay_sleep);
        tokio::select! {
            _ = &mut cancel_rx => {
                let mut tasks = tasks.write().await;
                if let Some(info) = tasks.get_mut(&id) {
                    info.status = TaskStatus::Cancelled;
                    info.next_run = None;
                }
                return;
            }
            _ = delay_sleep.as_mut() => {}
        }

        loop {
            if Self::constraints_satisfied(monitor.clone(), &constraints).await {
                break;
            }

            let retry_sleep = sleep(Duration::from_secs(5));
            tokio::pin!(retry_sleep);
            tokio::select! {
                _ = &mut cancel_rx => {
                    let mut tasks = tasks.write().await;
                    if let Some(info) = tasks.get_mut(&id) {
                        info.status = TaskStatus::Cancelled;
                        info.next_run = None;
                    }
                    return;
                }
                _ = retry_sleep.as_mut() => {}
            }
        }

        {
            let mut tasks = tasks.write().await;
            if let Some(info) = tasks.get_mut(&id) {
                info.status = TaskStatus::Running;
            }
        }

        let result = Self::execute_handler(&handler, run_deadline).await;

        let mut tasks = tasks.write().await;
        if let Some(info) = tasks.get_mut(&id) {
            info.last_run = Some(Self::now_millis(clock.as_ref()));
            info.next_run = None;
            info.status = match result {
                Ok(()) => TaskStatus::Completed,
                Err(err) => {
                    warn!(task_id = %id.0, error = %err, "One-time task failed");
                    TaskStatus::Failed
                }
            };
        }
    }
}

impl Default for TokioBackgroundExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundExecutor for TokioBackgroundExecutor {
    async fn register_handler(&self, task_id: &str, handler: TaskHandler) -> Result<()> {
        let mut handlers = self.handlers.write().await;
        handlers.insert(task_id.to_string(), handler);
        Ok(())
    }

    async fn schedule_task(
        &self,
        task_id: &str,
        interval: Duration,
        constraints: TaskConstraints,
    ) -> Result<TaskId> {
        let id = TaskId::new(task_id);

        debug!(
            task_id = task_id,
            interval_secs = interval.as_secs(),
            "Scheduling recurring task"
        );

        let handler = self.handler_for(task_id).await.ok_or_else(|| {
            BridgeError::OperationFailed(format!("No handler registered for task: {}", task_id))
        })?;
        let (cancel_tx, cancel_rx) = oneshot::channel();

        self.insert_task(
            id.clone(),
            TaskInfo {
                status: TaskStatus::Scheduled,
                handle: None,
                cancel: Some(cancel_tx),
                last_run: None,
                next_run: Some(Self::now_millis(self.clock.as_ref())),
            },
        )
        .await;

        let tasks = Arc::clone(&self.tasks);
        let monitor = self.network_monitor.clone();
        let task_id_clone = TaskId::new(task_id);
        let clock = Arc::clone(&self.clock);
        let run_deadline = self.run_deadline;

        let handle = tokio::spawn(async move {
            TokioBackgroundExecutor::run_recurring_task(
                tasks,
                task_id_clone,
                handler,
                interval,
                constraints,
                cancel_rx,
                monitor,
                clock,
                run_deadline,
            )
            .await;
        });

        self.update_task(&id, |info| {
            info.handle = Some(handle);
        })
        .await;

        Ok(id)
    }

    async fn schedule_once(
        &self,
        task_id: &str,
        delay: Duration,
        constraints: TaskConstraints,
    ) -> Result<TaskId> {
        let id = TaskId::new(task_id);

        debug!(
            task_id = task_id,
            delay_secs = delay.as_secs(),
            "Scheduling one-time task"
        );

        let handler = self.handler_for(task_id).await.ok_or_else(|| {
            BridgeError::OperationFailed(format!("No handler registered for task: {}", task_id))
        })?;
        let (cancel_tx, cancel_rx) = oneshot::channel();

        self.insert_task(
            id.clone(),
            TaskInfo {
                status: TaskStatus::Scheduled,
                handle: None,
                cancel: Some(cancel_tx),
                last_run: None,
                next_run: Some(Self::schedule_after(self.clock.as_ref(), delay)),
            },
        )
        .await;

        let tasks = Arc::clone(&self.tasks);
        let monitor = self.network_monitor.clone();
        let task_id_clone = TaskId::new(task_id);
        let clock = Arc::clone(&self.clock);
        let run_deadline = self.run_deadline;

        let handle = tokio::spawn(async move {
            TokioBackgroundExecutor::run_one_time_task(
                tasks,
                task_id_clone,
                handler,
                delay,
                constraints,
                cancel_rx,
                monitor,
                clock,
                run_deadline,
            )
            .await;
        });

        self.update_task(&id, |info| {
            info.handle = Some(handle);
        })
        .await;

        Ok(id)
    }

    async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        debug!(task_id = ?task_id, "Cancelling task");

        if let Some(mut info) = self.remove_task(task_id).await {
            if let Some(cancel) = info.cancel.take() {
                let _ = cancel.send(());
            }
            if let Some(handle) = info.handle.take() {
                handle.abort();
            }
            return Ok(());
        }

        Err(BridgeError::OperationFailed(format!(
            "Task not found: {:?}",
            task_id
        )))
    }

    async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus> {
        let tasks = self.tasks.read().await;
        tasks
            .get(task_id)
            .map(|info| info.status.clone())
            .ok_or_else(|| BridgeError::OperationFailed(format!("Task not found: {:?}", task_id)))
    }

    async fn list_tasks(&self) -> Result<Vec<TaskId>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.keys().cloned().collect())
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn next_execution_time(&self, task_id: &TaskId) -> Result<Option<Duration>> {
        let tasks = self.tasks.read().await;
        if let Some(info) = tasks.get(task_id) {
            if let Some(next) = info.next_run {
                let now = Self::now_millis(self.clock.as_ref());
                let remaining = next - now;
                Ok(Some(Self::millis_to_duration(remaining)))
            } else {
                Ok(None)
            }
        } else {
            Err(BridgeError::OperationFailed(format!(
                "Task not found: {:?}",
                task_id
            )))
        }
    }
}
