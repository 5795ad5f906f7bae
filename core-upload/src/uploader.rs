//! # Upload Worker
//!
//! Drives upload sessions: admission, sequential processing, retry with
//! backoff, cancellation, and ledger bookkeeping.
//!
//! ## Overview
//!
//! The uploader owns the scan-and-upload pipeline:
//!
//! 1. **Permission gate**: library authorization is checked (and requested
//!    when undetermined) before anything else; a denial fails the session
//!    with zero tasks and zero ledger writes.
//! 2. **Admission**: candidate items are filtered against the ledger and
//!    against items already admitted to a live session, under a single
//!    admission lock, so two concurrent scans can never double-admit the
//!    same item.
//! 3. **Processing**: a plain loop in the calling task drives tasks
//!    sequentially in discovery order. Transient failures retry with
//!    exponential backoff up to a configured bound; permission failures are
//!    permanent and skip retry. Per-task failures never abort sibling tasks.
//! 4. **Ledger writes**: each success is recorded immediately (digest and
//!    remote ref included) before progress is published, so a host deadline
//!    can never lose a completed upload. A ledger write that keeps failing
//!    aborts the session: completed work is never silently dropped.
//!
//! Cancellation is cooperative: the token is checked between tasks and
//! handed to the transport so an in-flight transfer can abort. Items that
//! already succeeded stay recorded: at-least-once, not atomic-batch.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_traits::{
    assets::{AssetLibrary, AuthorizationStatus, MediaItem, MediaKind},
    error::BridgeError,
    time::Clock,
    transport::MediaTransport,
};
use core_runtime::{
    config::UploadConfig,
    events::{CoreEvent, EventBus, UploadEvent},
};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, UploadError},
    ledger::{LedgerEntry, UploadLedger},
    session::{FailureReason, SessionStatus, UploadSession, UploadTask},
};

/// Outcome of processing a single task, including its retries.
enum TaskOutcome {
    Succeeded,
    Failed {
        reason: FailureReason,
        message: String,
    },
    Cancelled,
    /// The ledger refused the completion record; fatal for the session.
    LedgerFailed(String),
}

/// Releases the single-flight guard when a scan finishes by any path.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The upload queue/worker engine.
///
/// Constructed once with its collaborators injected; no ambient global
/// state. Cheap to share behind an `Arc`.
pub struct Uploader {
    assets: Arc<dyn AssetLibrary>,
    transport: Arc<dyn MediaTransport>,
    ledger: Arc<dyn UploadLedger>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: UploadConfig,
    /// Media ids admitted to a session that has not yet finished. Guards
    /// against double-admission across concurrent scans; checked and
    /// updated atomically with the ledger lookup.
    admitted: Mutex<HashSet<String>>,
    /// Single-flight guard for scan cycles.
    running: AtomicBool,
    /// Snapshot of the most recent session, for observers.
    current: RwLock<Option<UploadSession>>,
}

impl Uploader {
    pub fn new(
        assets: Arc<dyn AssetLibrary>,
        transport: Arc<dyn MediaTransport>,
        ledger: Arc<dyn UploadLedger>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        config: UploadConfig,
    ) -> Self {
        Self {
            assets,
            transport,
            ledger,
            events,
            clock,
            config,
            admitted: Mutex::new(HashSet::new()),
            running: AtomicBool::new(false),
            current: RwLock::new(None),
        }
    }

    /// Snapshot of the most recent session.
    pub async fn current_session(&self) -> Option<UploadSession> {
        self.current.read().await.clone()
    }

    /// Admit a batch of candidate items into a new session.
    ///
    /// Filters out items already recorded in the ledger and items already
    /// admitted to a live session, preserving discovery order. The ledger
    /// check happens under the admission lock, so concurrent `admit` calls
    /// over overlapping sets never produce duplicate tasks for the same id.
    ///
    /// An empty surviving batch yields a session that is already
    /// `Completed`, a valid, trivially-successful run.
    pub async fn admit(&self, items: Vec<MediaItem>) -> Result<UploadSession> {
        let mut admitted = self.admitted.lock().await;

        let mut tasks = Vec::new();
        for item in items {
            let key = item.id.as_str().to_string();
            if admitted.contains(&key) {
                debug!(media_id = %item.id, "Skipping item already admitted to a live session");
                continue;
            }
            if self.ledger.is_uploaded(&item.id).await? {
                debug!(media_id = %item.id, "Skipping item already in ledger");
                continue;
            }
            admitted.insert(key);
            tasks.push(UploadTask::new(item));
        }
        drop(admitted);

        let session = UploadSession::new(tasks);
        info!(
            session_id = %session.id,
            total = session.total_count(),
            "Admitted upload session"
        );

        self.events
            .emit(CoreEvent::Upload(UploadEvent::SessionStarted {
                session_id: session.id.as_str(),
                total_items: session.total_count(),
            }))
            .ok();

        if session.status == SessionStatus::Completed {
            self.events
                .emit(CoreEvent::Upload(UploadEvent::SessionCompleted {
                    session_id: session.id.as_str(),
                    uploaded: 0,
                    total: 0,
                }))
                .ok();
        }

        self.set_current(&session).await;
        Ok(session)
    }

    /// Drive a session to a terminal state.
    ///
    /// Processes tasks sequentially in discovery order. Returns the session
    /// in its final state; session-level failures are carried in
    /// `session.status`, not as an `Err`.
    pub async fn run(
        &self,
        mut session: UploadSession,
        cancel: CancellationToken,
    ) -> Result<UploadSession> {
        if session.status != SessionStatus::Uploading {
            return Ok(session);
        }

        for index in 0..session.tasks.len() {
            if cancel.is_cancelled() {
                return self.finish_cancelled(session).await;
            }

            if index > 0 && !self.config.inter_item_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return self.finish_cancelled(session).await,
                    _ = tokio::time::sleep(self.config.inter_item_delay) => {}
                }
            }

            let item = session.tasks[index].item.clone();
            match self.process_task(&mut session, index, &item, &cancel).await? {
                TaskOutcome::Succeeded => {
                    session.record_success(index)?;
                    let uploaded = session.uploaded_count;
                    let total = session.total_count();
                    self.events
                        .emit(CoreEvent::Upload(UploadEvent::Progress {
                            session_id: session.id.as_str(),
                            uploaded,
                            total,
                            percent: percent(uploaded, total),
                        }))
                        .ok();
                }
                TaskOutcome::Failed { reason, message } => {
                    warn!(
                        session_id = %session.id,
                        media_id = %item.id,
                        reason = %reason,
                        error = %message,
                        "Task failed permanently"
                    );
                    session.record_failure(index, reason, message.clone())?;
                    self.events
                        .emit(CoreEvent::Upload(UploadEvent::ItemFailed {
                            session_id: session.id.as_str(),
                            media_id: item.id.to_string(),
                            reason: message,
                            will_retry: false,
                        }))
                        .ok();
                }
                TaskOutcome::Cancelled => {
                    return self.finish_cancelled(session).await;
                }
                TaskOutcome::LedgerFailed(message) => {
                    // A completed upload's record must never be dropped
                    // silently; surface the failure at session level.
                    session.fail(format!("ledger write failed: {}", message))?;
                    self.release(&session).await;
                    self.events
                        .emit(CoreEvent::Upload(UploadEvent::SessionFailed {
                            session_id: session.id.as_str(),
                            message: session
                                .error_message
                                .clone()
                                .unwrap_or_default(),
                            uploaded: session.uploaded_count,
                        }))
                        .ok();
                    self.set_current(&session).await;
                    return Ok(session);
                }
            }

            self.set_current(&session).await;
        }

        session.complete()?;
        self.release(&session).await;
        info!(
            session_id = %session.id,
            uploaded = session.uploaded_count,
            total = session.total_count(),
            "Upload session completed"
        );
        self.events
            .emit(CoreEvent::Upload(UploadEvent::SessionCompleted {
                session_id: session.id.as_str(),
                uploaded: session.uploaded_count,
                total: session.total_count(),
            }))
            .ok();
        self.set_current(&session).await;
        Ok(session)
    }

    /// One full scan-and-upload cycle: permission gate, favorites scan,
    /// admission, processing.
    ///
    /// `limit` bounds each per-kind favorites listing. Only one cycle runs
    /// at a time; a second caller gets [`UploadError::UploadInProgress`].
    pub async fn scan_and_upload(
        &self,
        limit: Option<usize>,
        cancel: CancellationToken,
    ) -> Result<UploadSession> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(UploadError::UploadInProgress);
        }
        let _guard = RunningGuard(&self.running);

        let mut status = self.assets.authorization_status().await;
        if status == AuthorizationStatus::NotDetermined {
            status = match self.assets.request_authorization().await {
                Ok(status) => status,
                Err(e) => return self.finish_failed_scan(e.to_string()).await,
            };
        }
        if !status.allows_read() {
            return self
                .finish_failed_scan("photo library access denied".to_string())
                .await;
        }

        let mut items = match self.assets.list_favorites(MediaKind::Photo, limit).await {
            Ok(items) => items,
            Err(e) => return self.finish_failed_scan(e.to_string()).await,
        };
        match self.assets.list_favorites(MediaKind::Video, limit).await {
            Ok(videos) => items.extend(videos),
            Err(e) => return self.finish_failed_scan(e.to_string()).await,
        }

        debug!(candidates = items.len(), "Favorites scan finished");

        let session = self.admit(items).await?;
        self.run(session, cancel).await
    }

    async fn process_task(
        &self,
        session: &mut UploadSession,
        index: usize,
        item: &MediaItem,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome> {
        loop {
            if cancel.is_cancelled() {
                return Ok(TaskOutcome::Cancelled);
            }

            session.start_task(index)?;
            let attempt = session.tasks[index].attempts;
            debug!(
                session_id = %session.id,
                media_id = %item.id,
                attempt,
                "Starting upload attempt"
            );

            let failure = match self.attempt_upload(item, cancel).await {
                Ok(entry) => {
                    return match self.write_ledger(entry).await {
                        Ok(()) => Ok(TaskOutcome::Succeeded),
                        Err(message) => Ok(TaskOutcome::LedgerFailed(message)),
                    };
                }
                Err(failure) => failure,
            };

            if cancel.is_cancelled() {
                return Ok(TaskOutcome::Cancelled);
            }

            let (reason, transient, message) = failure;
            if !transient || attempt >= self.config.max_attempts {
                return Ok(TaskOutcome::Failed { reason, message });
            }

            self.events
                .emit(CoreEvent::Upload(UploadEvent::ItemFailed {
                    session_id: session.id.as_str(),
                    media_id: item.id.to_string(),
                    reason: message.clone(),
                    will_retry: true,
                }))
                .ok();

            let backoff = self.config.initial_backoff * 2u32.saturating_pow(attempt - 1);
            warn!(
                session_id = %session.id,
                media_id = %item.id,
                attempt,
                max_attempts = self.config.max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %message,
                "Attempt failed, will retry"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Ok(TaskOutcome::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    /// Fetch bytes and transfer them; on success build the ledger entry.
    async fn attempt_upload(
        &self,
        item: &MediaItem,
        cancel: &CancellationToken,
    ) -> std::result::Result<LedgerEntry, (FailureReason, bool, String)> {
        let bytes = self
            .assets
            .fetch_bytes(item)
            .await
            .map_err(|e| classify(e, FailureReason::Fetch))?;

        let digest = sha256_hex(&bytes);

        let remote = self
            .transport
            .upload(item, bytes, cancel)
            .await
            .map_err(|e| classify(e, FailureReason::Transfer))?;

        Ok(
            LedgerEntry::new(item.id.clone(), self.clock.unix_timestamp())
                .with_digest(digest)
                .with_remote_ref(remote.location),
        )
    }

    /// Record a success, retrying the write before giving up.
    async fn write_ledger(&self, entry: LedgerEntry) -> std::result::Result<(), String> {
        let mut last_error = String::new();
        for attempt in 1..=self.config.ledger_write_attempts {
            match self.ledger.mark_uploaded(entry.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        media_id = %entry.media_id,
                        attempt,
                        error = %last_error,
                        "Ledger write failed"
                    );
                    if attempt < self.config.ledger_write_attempts {
                        tokio::time::sleep(self.config.initial_backoff).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn finish_cancelled(&self, mut session: UploadSession) -> Result<UploadSession> {
        session.cancel()?;
        self.release(&session).await;
        info!(
            session_id = %session.id,
            uploaded = session.uploaded_count,
            "Upload session cancelled"
        );
        self.events
            .emit(CoreEvent::Upload(UploadEvent::SessionCancelled {
                session_id: session.id.as_str(),
                uploaded: session.uploaded_count,
            }))
            .ok();
        self.set_current(&session).await;
        Ok(session)
    }

    async fn finish_failed_scan(&self, message: String) -> Result<UploadSession> {
        let session = UploadSession::failed(message.clone());
        warn!(session_id = %session.id, error = %message, "Scan aborted");
        self.events
            .emit(CoreEvent::Upload(UploadEvent::SessionFailed {
                session_id: session.id.as_str(),
                message,
                uploaded: 0,
            }))
            .ok();
        self.set_current(&session).await;
        Ok(session)
    }

    /// Forget a finished session's ids so later scans can re-admit the
    /// items that did not succeed (the succeeded ones are in the ledger).
    async fn release(&self, session: &UploadSession) {
        let mut admitted = self.admitted.lock().await;
        for task in &session.tasks {
            admitted.remove(task.media_id().as_str());
        }
    }

    async fn set_current(&self, session: &UploadSession) {
        *self.current.write().await = Some(session.clone());
    }
}

fn percent(uploaded: u64, total: u64) -> u8 {
    if total == 0 {
        0
    } else {
        ((uploaded as f64 / total as f64) * 100.0).min(100.0) as u8
    }
}

fn classify(e: BridgeError, stage: FailureReason) -> (FailureReason, bool, String) {
    match &e {
        BridgeError::PermissionDenied(_) => (FailureReason::Permission, false, e.to_string()),
        _ => (stage, e.is_transient(), e.to_string()),
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
