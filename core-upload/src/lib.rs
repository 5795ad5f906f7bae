//! # Upload Engine
//!
//! Discovers favorited media, queues it, and uploads it with durable
//! progress tracking.
//!
//! ## Overview
//!
//! This crate contains the background upload pipeline:
//! - Scanning the device library for favorited photos and videos
//! - Filtering out already-uploaded items against a durable ledger
//! - Driving upload sessions with retry, backoff and cancellation
//! - Re-triggering scans periodically via the host background facility
//! - Projecting engine state into an observable status snapshot
//!
//! ## Components
//!
//! - **Session State Machine** (`session`): Upload session lifecycle with validated state transitions
//! - **Upload Ledger** (`ledger`): Durable record of completed uploads, keyed by stable media ids
//! - **Upload Worker** (`uploader`): Admission, sequential processing, retry logic
//! - **Scheduler** (`scheduler`): Periodic background cycles with persisted enable/disable
//! - **Status Publisher** (`status`): Watchable projection of engine events

pub mod error;
pub mod ledger;
pub mod scheduler;
pub mod session;
pub mod status;
pub mod uploader;

pub use error::{Result, UploadError};
pub use ledger::{LedgerEntry, SqliteUploadLedger, UploadLedger};
pub use scheduler::{
    BackgroundUploadManager, BACKGROUND_TASK_ID, SETTING_CYCLE_COUNT, SETTING_ENABLED,
    SETTING_LAST_UPLOAD_AT,
};
pub use session::{
    FailureReason, SessionId, SessionStatus, TaskState, UploadSession, UploadTask,
};
pub use status::{UploadStatus, UploadStatusPublisher};
pub use uploader::Uploader;
