//! Device Media Library Abstraction
//!
//! Provides platform-agnostic access to the user's photo and video library.
//!
//! The core never enumerates the library itself; it asks the host for
//! favorited items and for the bytes of a specific item. Authorization is
//! modelled explicitly because every mobile platform gates library access
//! behind a user prompt.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stable identifier for a media item.
///
/// The identifier must survive across scans and process restarts: the upload
/// ledger is keyed by it. Implementations must never derive it from the
/// capture timestamp (same-second captures would collide); use the platform
/// asset identifier or an equivalent unique key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaItemId(String);

impl MediaItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MediaItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of media asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Get the string representation for storage and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Library authorization state.
///
/// Mirrors the authorization models of mobile photo libraries:
/// - **iOS**: PHAuthorizationStatus (full/limited/denied/restricted)
/// - **Android**: READ_MEDIA_IMAGES / READ_MEDIA_VIDEO runtime permissions
/// - **Desktop**: usually a plain directory readability check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthorizationStatus {
    /// Full read access granted
    Authorized,
    /// Access granted to a user-selected subset
    Limited,
    /// The user explicitly denied access
    Denied,
    /// Access denied by policy (parental controls, MDM)
    Restricted,
    /// The user has not been asked yet; a prompt is required
    NotDetermined,
}

impl AuthorizationStatus {
    /// Whether scans may read the library in this state.
    pub fn allows_read(&self) -> bool {
        matches!(
            self,
            AuthorizationStatus::Authorized | AuthorizationStatus::Limited
        )
    }
}

/// One candidate unit of upload, as reported by the host library.
///
/// Immutable from the core's perspective; a scan produces a read-only view
/// and the core never writes back into the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Stable unique identifier
    pub id: MediaItemId,
    /// Photo or video
    pub kind: MediaKind,
    /// Capture time, Unix seconds
    pub created_at: i64,
    /// User-flagged favorite status
    pub is_favorite: bool,
    /// Size in bytes when the host knows it cheaply
    pub file_size: Option<u64>,
}

/// Media library access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::assets::{AssetLibrary, MediaKind};
///
/// async fn favorite_photos(library: &dyn AssetLibrary) -> Result<usize> {
///     let items = library.list_favorites(MediaKind::Photo, Some(10)).await?;
///     Ok(items.len())
/// }
/// ```
#[async_trait]
pub trait AssetLibrary: Send + Sync {
    /// Current authorization state, without prompting.
    async fn authorization_status(&self) -> AuthorizationStatus;

    /// Prompt the user for access if the state is `NotDetermined`.
    ///
    /// Returns the resulting state. Implementations must not prompt again
    /// when the state is already determined.
    async fn request_authorization(&self) -> Result<AuthorizationStatus>;

    /// List favorited media of the given kind, newest first.
    ///
    /// `limit` bounds the scan; background cycles pass a small limit to fit
    /// their execution window.
    async fn list_favorites(&self, kind: MediaKind, limit: Option<usize>)
        -> Result<Vec<MediaItem>>;

    /// Fetch the full-quality bytes for an item.
    ///
    /// Fails with `BridgeError::PermissionDenied` when access was revoked
    /// between the scan and the fetch.
    async fn fetch_bytes(&self, item: &MediaItem) -> Result<Bytes>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_allows_read() {
        assert!(AuthorizationStatus::Authorized.allows_read());
        assert!(AuthorizationStatus::Limited.allows_read());
        assert!(!AuthorizationStatus::Denied.allows_read());
        assert!(!AuthorizationStatus::Restricted.allows_read());
        assert!(!AuthorizationStatus::NotDetermined.allows_read());
    }

    #[test]
    fn test_media_item_id_equality() {
        let a = MediaItemId::new("DCIM/IMG_0042.heic");
        let b = MediaItemId::new("DCIM/IMG_0042.heic");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "DCIM/IMG_0042.heic");
    }

    #[test]
    fn test_media_kind_roundtrip() {
        assert_eq!(MediaKind::Photo.as_str(), "photo");
        assert_eq!(MediaKind::Video.to_string(), "video");
    }
}
