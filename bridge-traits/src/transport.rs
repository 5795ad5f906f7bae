//! Upload Transport Abstraction
//!
//! Moves media bytes to their remote destination. The core treats the
//! transport as a single capability: give it an item and its bytes, get back
//! a reference to where the upload landed.
//!
//! Error classification matters more than the wire protocol here: the upload
//! worker retries transient failures with backoff and gives up immediately on
//! permanent ones, so implementations must set
//! [`BridgeError::Transfer::transient`](crate::error::BridgeError) honestly
//! (timeouts and 5xx responses are transient; 4xx rejections are not).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{assets::MediaItem, error::Result};
use bytes::Bytes;

/// Reference to an uploaded object on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMediaRef {
    /// Remote location (URL or provider-specific key)
    pub location: String,
}

impl RemoteMediaRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

/// Media transfer trait
///
/// # Cancellation
///
/// `cancel` is tripped when the user stops an upload or a background
/// execution window expires. Implementations should abort the in-flight
/// transfer promptly and return an error; the worker decides how to record
/// the aborted attempt.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::transport::MediaTransport;
/// use tokio_util::sync::CancellationToken;
///
/// async fn push(transport: &dyn MediaTransport, item: &MediaItem, data: Bytes) -> Result<()> {
///     let remote = transport.upload(item, data, &CancellationToken::new()).await?;
///     println!("uploaded to {}", remote.location);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Upload one item's bytes, returning the remote reference on success.
    async fn upload(
        &self,
        item: &MediaItem,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<RemoteMediaRef>;
}
