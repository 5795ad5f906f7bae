//! Asset Library Implementation over a local media directory
//!
//! Desktop stand-in for a platform photo library: media files live under a
//! root directory and the user's favorites are listed in a `favorites.json`
//! manifest next to them. Item identifiers are library-relative paths, a
//! stable key that survives rescans and restarts, unlike capture timestamps.

use async_trait::async_trait;
use bridge_traits::{
    assets::{AssetLibrary, AuthorizationStatus, MediaItem, MediaItemId, MediaKind},
    error::{BridgeError, Result},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::{debug, warn};

/// Manifest file listing favorited items by relative path.
pub const FAVORITES_MANIFEST: &str = "favorites.json";

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "gif", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "webm"];

#[derive(Debug, Default, Serialize, Deserialize)]
struct FavoritesManifest {
    favorites: Vec<String>,
}

/// Filesystem-backed media library.
///
/// Authorization mirrors the platform model: the library starts
/// `NotDetermined` and [`request_authorization`](AssetLibrary::request_authorization)
/// resolves it by probing the root directory, standing in for the user
/// prompt a mobile host would show.
pub struct FsAssetLibrary {
    root: PathBuf,
    authorization: Mutex<AuthorizationStatus>,
}

impl FsAssetLibrary {
    /// Create a library over the given media root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            authorization: Mutex::new(AuthorizationStatus::NotDetermined),
        }
    }

    /// Create a library over the user's pictures directory.
    pub fn default_library() -> Self {
        let root = dirs::picture_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photoflow");
        Self::new(root)
    }

    fn kind_for(path: &Path) -> Option<MediaKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Photo)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    fn relative_id(&self, path: &Path) -> Option<MediaItemId> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut id = String::new();
        for component in rel.components() {
            if !id.is_empty() {
                id.push('/');
            }
            id.push_str(&component.as_os_str().to_string_lossy());
        }
        Some(MediaItemId::new(id))
    }

    async fn load_manifest(&self) -> HashSet<String> {
        let path = self.root.join(FAVORITES_MANIFEST);
        match fs::read(&path).await {
            Ok(data) => match serde_json::from_slice::<FavoritesManifest>(&data) {
                Ok(manifest) => manifest.favorites.into_iter().collect(),
                Err(e) => {
                    warn!(path = ?path, error = %e, "Malformed favorites manifest");
                    HashSet::new()
                }
            },
            Err(_) => HashSet::new(),
        }
    }

    /// Walk the library collecting media files of one kind.
    async fn collect_files(&self, kind: MediaKind) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    BridgeError::PermissionDenied(format!("{}", dir.display()))
                } else {
                    BridgeError::Io(e)
                }
            })?;

            while let Some(entry) = entries.next_entry().await.map_err(BridgeError::Io)? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(BridgeError::Io)?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if Self::kind_for(&path) == Some(kind) {
                    found.push(path);
                }
            }
        }

        Ok(found)
    }

    async fn item_for(&self, path: &Path, favorites: &HashSet<String>) -> Option<MediaItem> {
        let id = self.relative_id(path)?;
        let kind = Self::kind_for(path)?;
        let metadata = fs::metadata(path).await.ok()?;

        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Some(MediaItem {
            is_favorite: favorites.contains(id.as_str()),
            id,
            kind,
            created_at,
            file_size: Some(metadata.len()),
        })
    }
}

#[async_trait]
impl AssetLibrary for FsAssetLibrary {
    async fn authorization_status(&self) -> AuthorizationStatus {
        *self.authorization.lock().unwrap()
    }

    async fn request_authorization(&self) -> Result<AuthorizationStatus> {
        let current = *self.authorization.lock().unwrap();
        if current != AuthorizationStatus::NotDetermined {
            return Ok(current);
        }

        let resolved = match fs::read_dir(&self.root).await {
            Ok(_) => AuthorizationStatus::Authorized,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                AuthorizationStatus::Denied
            }
            Err(_) => AuthorizationStatus::Denied,
        };

        *self.authorization.lock().unwrap() = resolved;
        debug!(root = ?self.root, status = ?resolved, "Resolved library authorization");
        Ok(resolved)
    }

    async fn list_favorites(
        &self,
        kind: MediaKind,
        limit: Option<usize>,
    ) -> Result<Vec<MediaItem>> {
        if !self.authorization_status().await.allows_read() {
            return Err(BridgeError::PermissionDenied(
                "media library not authorized".to_string(),
            ));
        }

        let favorites = self.load_manifest().await;
        let paths = self.collect_files(kind).await?;

        let mut items = Vec::new();
        for path in paths {
            if let Some(item) = self.item_for(&path, &favorites).await {
                if item.is_favorite {
                    items.push(item);
                }
            }
        }

        // Newest first, stable key as tie-break for same-second captures.
        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        if let Some(limit) = limit {
            items.truncate(limit);
        }

        debug!(kind = %kind, count = items.len(), "Listed favorites");
        Ok(items)
    }

    async fn fetch_bytes(&self, item: &MediaItem) -> Result<Bytes> {
        let path = self.root.join(item.id.as_str());
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                BridgeError::PermissionDenied(format!("{}", path.display()))
            } else {
                BridgeError::OperationFailed(format!("Failed to read {}: {}", path.display(), e))
            }
        })?;
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &Path, contents: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(contents).unwrap();
    }

    fn seed_library(root: &Path, favorites: &[&str]) {
        write_file(&root.join("DCIM/IMG_0001.jpg"), b"photo-1");
        write_file(&root.join("DCIM/IMG_0002.jpg"), b"photo-2");
        write_file(&root.join("DCIM/VID_0001.mp4"), b"video-1");
        write_file(&root.join("notes.txt"), b"not media");

        let manifest = FavoritesManifest {
            favorites: favorites.iter().map(|s| s.to_string()).collect(),
        };
        write_file(
            &root.join(FAVORITES_MANIFEST),
            serde_json::to_vec(&manifest).unwrap().as_slice(),
        );
    }

    async fn authorized_library(root: &Path) -> FsAssetLibrary {
        let library = FsAssetLibrary::new(root);
        library.request_authorization().await.unwrap();
        library
    }

    #[tokio::test]
    async fn test_authorization_flow() {
        let dir = tempfile::tempdir().unwrap();
        let library = FsAssetLibrary::new(dir.path());

        assert_eq!(
            library.authorization_status().await,
            AuthorizationStatus::NotDetermined
        );
        assert_eq!(
            library.request_authorization().await.unwrap(),
            AuthorizationStatus::Authorized
        );
        assert_eq!(
            library.authorization_status().await,
            AuthorizationStatus::Authorized
        );
    }

    #[tokio::test]
    async fn test_missing_root_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let library = FsAssetLibrary::new(dir.path().join("does-not-exist"));

        assert_eq!(
            library.request_authorization().await.unwrap(),
            AuthorizationStatus::Denied
        );
    }

    #[tokio::test]
    async fn test_list_requires_authorization() {
        let dir = tempfile::tempdir().unwrap();
        let library = FsAssetLibrary::new(dir.path());

        let result = library.list_favorites(MediaKind::Photo, None).await;
        assert!(matches!(result, Err(BridgeError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_list_favorites_filters_by_manifest_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        seed_library(dir.path(), &["DCIM/IMG_0001.jpg", "DCIM/VID_0001.mp4"]);
        let library = authorized_library(dir.path()).await;

        let photos = library.list_favorites(MediaKind::Photo, None).await.unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].id.as_str(), "DCIM/IMG_0001.jpg");
        assert_eq!(photos[0].kind, MediaKind::Photo);
        assert!(photos[0].is_favorite);
        assert_eq!(photos[0].file_size, Some(7));

        let videos = library.list_favorites(MediaKind::Video, None).await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id.as_str(), "DCIM/VID_0001.mp4");
    }

    #[tokio::test]
    async fn test_limit_bounds_scan() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..6 {
            write_file(
                &dir.path().join(format!("DCIM/IMG_{:04}.jpg", i)),
                b"photo",
            );
        }
        let favorites: Vec<String> =
            (0..6).map(|i| format!("DCIM/IMG_{:04}.jpg", i)).collect();
        let manifest = FavoritesManifest { favorites };
        write_file(
            &dir.path().join(FAVORITES_MANIFEST),
            serde_json::to_vec(&manifest).unwrap().as_slice(),
        );

        let library = authorized_library(dir.path()).await;
        let photos = library
            .list_favorites(MediaKind::Photo, Some(3))
            .await
            .unwrap();
        assert_eq!(photos.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_bytes_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        seed_library(dir.path(), &["DCIM/IMG_0002.jpg"]);
        let library = authorized_library(dir.path()).await;

        let photos = library.list_favorites(MediaKind::Photo, None).await.unwrap();
        let bytes = library.fetch_bytes(&photos[0]).await.unwrap();
        assert_eq!(&bytes[..], b"photo-2");
    }

    #[tokio::test]
    async fn test_fetch_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        seed_library(dir.path(), &[]);
        let library = authorized_library(dir.path()).await;

        let ghost = MediaItem {
            id: MediaItemId::new("DCIM/GONE.jpg"),
            kind: MediaKind::Photo,
            created_at: 0,
            is_favorite: true,
            file_size: None,
        };
        assert!(library.fetch_bytes(&ghost).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_manifest_means_no_favorites() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("DCIM/IMG_0001.jpg"), b"photo-1");
        write_file(&dir.path().join(FAVORITES_MANIFEST), b"{ not json");

        let library = authorized_library(dir.path()).await;
        let photos = library.list_favorites(MediaKind::Photo, None).await.unwrap();
        assert!(photos.is_empty());
    }
}
