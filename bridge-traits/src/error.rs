use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Transfer failed: {message}")]
    Transfer { message: String, transient: bool },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether retrying the failed operation can reasonably succeed.
    ///
    /// Permission problems and explicitly permanent transfer rejections are
    /// final; everything else (I/O, timeouts, 5xx-class transfers) is worth
    /// another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::PermissionDenied(_) => false,
            BridgeError::NotAvailable(_) => false,
            BridgeError::Transfer { transient, .. } => *transient,
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
