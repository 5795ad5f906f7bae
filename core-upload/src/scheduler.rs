//! # Background Upload Scheduler
//!
//! Periodically re-triggers scan-and-upload cycles through the host's
//! background execution facility, independent of foreground app state.
//!
//! ## Overview
//!
//! The manager registers a cycle handler with the [`BackgroundExecutor`] and
//! arms a recurring schedule. The enabled flag is persisted in the
//! [`SettingsStore`], so the schedule is restored at process start without
//! the user flipping the switch again.
//!
//! Re-arming is the executor's job and happens regardless of the current
//! cycle's outcome: a failed or expired cycle never silently stops future
//! scheduling. Only an explicit [`disable`](BackgroundUploadManager::disable)
//! stops the recurring trigger.
//!
//! Host deadlines are best-effort boundaries: when the expiration token
//! trips mid-cycle the worker cancels cooperatively, every already-succeeded
//! task is in the ledger (entries are written per task, never batched), and
//! the cycle reports complete to the host to avoid scheduling penalties.

use std::sync::Arc;

use bridge_traits::{
    background::{BackgroundExecutor, TaskConstraints, TaskId, TaskRun},
    storage::SettingsStore,
    time::Clock,
};
use core_runtime::{
    config::UploadConfig,
    events::{BackgroundEvent, CoreEvent, EventBus},
};
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, UploadError},
    uploader::Uploader,
};

/// Identifier under which the recurring cycle is registered with the host.
pub const BACKGROUND_TASK_ID: &str = "upload.background-refresh";

/// Settings key for the persisted on/off switch.
pub const SETTING_ENABLED: &str = "background_upload_enabled";

/// Settings key for the lifetime count of background-uploaded items.
pub const SETTING_CYCLE_COUNT: &str = "background_upload_count";

/// Settings key for the last successful upload time (Unix seconds).
pub const SETTING_LAST_UPLOAD_AT: &str = "last_upload_at";

/// Drives periodic background upload cycles.
pub struct BackgroundUploadManager {
    uploader: Arc<Uploader>,
    executor: Arc<dyn BackgroundExecutor>,
    settings: Arc<dyn SettingsStore>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: UploadConfig,
    task_id: Mutex<Option<TaskId>>,
}

impl BackgroundUploadManager {
    /// Create the manager and register the cycle handler with the executor.
    pub async fn new(
        uploader: Arc<Uploader>,
        executor: Arc<dyn BackgroundExecutor>,
        settings: Arc<dyn SettingsStore>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        config: UploadConfig,
    ) -> Result<Arc<Self>> {
        let manager = Arc::new(Self {
            uploader,
            executor,
            settings,
            events,
            clock,
            config,
            task_id: Mutex::new(None),
        });

        let handler_manager = Arc::clone(&manager);
        let handler: bridge_traits::TaskHandler = Arc::new(move |run: TaskRun| {
            let manager = Arc::clone(&handler_manager);
            async move {
                manager.run_cycle(run).await;
                // Report complete either way; an unhappy cycle must not
                // penalize future scheduling.
                Ok(())
            }
            .boxed()
        });
        manager
            .executor
            .register_handler(BACKGROUND_TASK_ID, handler)
            .await
            .map_err(|e| UploadError::Scheduler(e.to_string()))?;

        Ok(manager)
    }

    /// Enable background upload: persist the switch and arm the schedule.
    pub async fn enable(&self) -> Result<()> {
        self.settings
            .set_bool(SETTING_ENABLED, true)
            .await
            .map_err(|e| UploadError::Settings(e.to_string()))?;
        self.arm().await?;

        info!(
            interval_secs = self.config.background_interval.as_secs(),
            "Background upload enabled"
        );
        self.events
            .emit(CoreEvent::Background(BackgroundEvent::SchedulingEnabled {
                interval_secs: self.config.background_interval.as_secs(),
            }))
            .ok();
        Ok(())
    }

    /// Disable background upload: persist the switch and cancel the schedule.
    ///
    /// This is the only path that stops scheduling; cycle failures never do.
    pub async fn disable(&self) -> Result<()> {
        self.settings
            .set_bool(SETTING_ENABLED, false)
            .await
            .map_err(|e| UploadError::Settings(e.to_string()))?;

        let mut task_id = self.task_id.lock().await;
        if let Some(id) = task_id.take() {
            if let Err(e) = self.executor.cancel_task(&id).await {
                warn!(error = %e, "Failed to cancel background task");
            }
        }

        info!("Background upload disabled");
        self.events
            .emit(CoreEvent::Background(BackgroundEvent::SchedulingDisabled))
            .ok();
        Ok(())
    }

    /// Re-arm the schedule at process start when the persisted switch is on.
    pub async fn restore(&self) -> Result<bool> {
        let enabled = self.is_enabled().await?;
        if enabled {
            self.arm().await?;
            debug!("Background upload schedule restored");
        }
        Ok(enabled)
    }

    /// Whether the persisted switch is on.
    pub async fn is_enabled(&self) -> Result<bool> {
        Ok(self
            .settings
            .get_bool(SETTING_ENABLED)
            .await
            .map_err(|e| UploadError::Settings(e.to_string()))?
            .unwrap_or(false))
    }

    /// Lifetime count of items uploaded by background cycles.
    pub async fn background_upload_count(&self) -> Result<u64> {
        Ok(self
            .settings
            .get_i64(SETTING_CYCLE_COUNT)
            .await
            .map_err(|e| UploadError::Settings(e.to_string()))?
            .unwrap_or(0)
            .max(0) as u64)
    }

    /// When the last item was uploaded, Unix seconds.
    pub async fn last_upload_date(&self) -> Result<Option<i64>> {
        self.settings
            .get_i64(SETTING_LAST_UPLOAD_AT)
            .await
            .map_err(|e| UploadError::Settings(e.to_string()))
    }

    async fn arm(&self) -> Result<()> {
        let constraints = TaskConstraints {
            requires_wifi: self.config.wifi_only,
            ..Default::default()
        };

        let id = self
            .executor
            .schedule_task(
                BACKGROUND_TASK_ID,
                self.config.background_interval,
                constraints,
            )
            .await
            .map_err(|e| UploadError::Scheduler(e.to_string()))?;

        *self.task_id.lock().await = Some(id);
        Ok(())
    }

    /// One background cycle: scan, upload what fits, keep partial progress.
    async fn run_cycle(&self, run: TaskRun) {
        debug!("Background cycle triggered");
        self.events
            .emit(CoreEvent::Background(BackgroundEvent::CycleStarted))
            .ok();

        let result = self
            .uploader
            .scan_and_upload(Some(self.config.background_scan_limit), run.expiration())
            .await;

        let uploaded = match result {
            Ok(session) => session.uploaded_count,
            Err(UploadError::UploadInProgress) => {
                // A foreground upload is running; this cycle is a no-op.
                debug!("Skipping background cycle, upload already in progress");
                0
            }
            Err(e) => {
                warn!(error = %e, "Background cycle failed");
                0
            }
        };

        if uploaded > 0 {
            if let Err(e) = self.record_cycle_progress(uploaded).await {
                warn!(error = %e, "Failed to persist background counters");
            }
        }

        self.events
            .emit(CoreEvent::Background(BackgroundEvent::CycleFinished {
                uploaded,
                expired: run.is_expired(),
            }))
            .ok();
    }

    async fn record_cycle_progress(&self, uploaded: u64) -> Result<()> {
        let count = self.background_upload_count().await? + uploaded;
        self.settings
            .set_i64(SETTING_CYCLE_COUNT, count as i64)
            .await
            .map_err(|e| UploadError::Settings(e.to_string()))?;
        self.settings
            .set_i64(SETTING_LAST_UPLOAD_AT, self.clock.unix_timestamp())
            .await
            .map_err(|e| UploadError::Settings(e.to_string()))?;
        Ok(())
    }
}
