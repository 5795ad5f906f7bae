use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Photo library access denied: {0}")]
    PermissionDenied(String),

    #[error("Fetch failed for {media_id}: {message}")]
    Fetch { media_id: String, message: String },

    #[error("Transfer failed for {media_id}: {message}")]
    Transfer {
        media_id: String,
        message: String,
        transient: bool,
    },

    #[error("Ledger write failed: {0}")]
    Ledger(String),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("An upload session is already running")]
    UploadInProgress,

    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, UploadError>;
