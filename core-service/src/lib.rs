//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (asset library,
//! transport, settings, background executor) into the upload engine. Desktop
//! apps typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`); mobile hosts inject their own platform-native adapters
//! through [`core_runtime::config::CoreConfig`].
//!
//! The façade owns the long-lived engine objects (uploader, scheduler,
//! status publisher) and hands them out through explicit references; there
//! is no ambient global state.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_runtime::{
    config::CoreConfig,
    events::{CoreEvent, EventBus, Receiver},
};
use core_upload::{
    BackgroundUploadManager, SqliteUploadLedger, UploadSession, UploadStatus,
    UploadStatusPublisher, Uploader,
};
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Primary façade exposed to host applications.
///
/// Construct once at startup with [`UploadCore::new`]; cheap to share.
pub struct UploadCore {
    uploader: Arc<Uploader>,
    scheduler: Option<Arc<BackgroundUploadManager>>,
    publisher: UploadStatusPublisher,
    events: EventBus,
    cancel: Mutex<Option<CancellationToken>>,
}

impl UploadCore {
    /// Build the core from a validated configuration.
    ///
    /// Fails fast when a required capability is missing (the config builder
    /// already enforces this) or when the ledger cannot be opened.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        let events = EventBus::new(config.upload.event_buffer);

        let ledger = match &config.ledger_path {
            Some(path) => SqliteUploadLedger::open(path).await?,
            None => SqliteUploadLedger::in_memory().await?,
        };

        let uploader = Arc::new(Uploader::new(
            Arc::clone(&config.asset_library),
            Arc::clone(&config.transport),
            Arc::new(ledger),
            events.clone(),
            Arc::clone(&config.clock),
            config.upload.clone(),
        ));

        let scheduler = match &config.background_executor {
            Some(executor) => Some(
                BackgroundUploadManager::new(
                    Arc::clone(&uploader),
                    Arc::clone(executor),
                    Arc::clone(&config.settings_store),
                    events.clone(),
                    Arc::clone(&config.clock),
                    config.upload.clone(),
                )
                .await?,
            ),
            None => {
                info!("No background executor provided; manual uploads only");
                None
            }
        };

        // Seed the observable snapshot with the persisted counters so the
        // host sees them before the first event arrives.
        let initial = match &scheduler {
            Some(manager) => UploadStatus::with_background_counters(
                manager.background_upload_count().await?,
                manager.last_upload_date().await?,
            ),
            None => UploadStatus::default(),
        };
        let publisher = UploadStatusPublisher::spawn(&events, initial);

        Ok(Self {
            uploader,
            scheduler,
            publisher,
            events,
            cancel: Mutex::new(None),
        })
    }

    /// Run one scan-and-upload cycle to completion and return the session.
    pub async fn upload_once(&self) -> Result<UploadSession> {
        let token = self.fresh_token().await;
        let session = self.uploader.scan_and_upload(None, token).await?;
        Ok(session)
    }

    /// Start a scan-and-upload cycle on a worker task and return immediately.
    ///
    /// Progress flows through [`status`](Self::status) and
    /// [`events`](Self::events); a cycle already in flight is left running.
    pub async fn start_upload(&self) {
        let token = self.fresh_token().await;
        let uploader = Arc::clone(&self.uploader);
        tokio::spawn(async move {
            match uploader.scan_and_upload(None, token).await {
                Ok(_) => {}
                Err(core_upload::UploadError::UploadInProgress) => {
                    info!("Upload already running; ignoring start request");
                }
                Err(e) => warn!(error = %e, "Upload failed to start"),
            }
        });
    }

    /// Cooperatively cancel the running upload, if any.
    ///
    /// Already-uploaded items stay recorded in the ledger.
    pub async fn cancel_upload(&self) {
        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
    }

    /// Enable periodic background upload (persisted).
    pub async fn enable_background_upload(&self) -> Result<()> {
        self.scheduler()?.enable().await?;
        Ok(())
    }

    /// Disable periodic background upload (persisted).
    pub async fn disable_background_upload(&self) -> Result<()> {
        self.scheduler()?.disable().await?;
        Ok(())
    }

    /// Re-arm the background schedule at process start when the persisted
    /// switch is on. Returns whether it was armed.
    pub async fn restore_background_upload(&self) -> Result<bool> {
        Ok(self.scheduler()?.restore().await?)
    }

    /// Whether background upload is currently enabled.
    pub async fn is_background_upload_enabled(&self) -> Result<bool> {
        Ok(self.scheduler()?.is_enabled().await?)
    }

    /// Watchable status snapshot for presentation layers.
    pub fn status(&self) -> watch::Receiver<UploadStatus> {
        self.publisher.subscribe()
    }

    /// Latest status snapshot.
    pub fn current_status(&self) -> UploadStatus {
        self.publisher.current()
    }

    /// Subscribe to raw engine events.
    pub fn events(&self) -> Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the most recent session.
    pub async fn current_session(&self) -> Option<UploadSession> {
        self.uploader.current_session().await
    }

    async fn fresh_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().await = Some(token.clone());
        token
    }

    fn scheduler(&self) -> Result<&Arc<BackgroundUploadManager>> {
        self.scheduler
            .as_ref()
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "BackgroundExecutor".to_string(),
                message: "Background upload requires a BackgroundExecutor in the core config"
                    .to_string(),
            })
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Wires the desktop bridges (filesystem asset library, HTTP transport,
/// SQLite settings, tokio background executor) into an [`UploadCore`]. The
/// media library lives under `media_root` with a `favorites.json` manifest;
/// durable state goes under `data_dir`.
///
/// ```ignore
/// use core_service::bootstrap_desktop;
///
/// let core = bootstrap_desktop(
///     "/home/me/Pictures/photoflow",
///     "/home/me/.local/share/photoflow",
///     "https://media.example.com",
/// )
/// .await?;
/// core.restore_background_upload().await?;
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    media_root: impl Into<std::path::PathBuf>,
    data_dir: impl Into<std::path::PathBuf>,
    endpoint: impl Into<String>,
) -> Result<UploadCore> {
    use bridge_desktop::{
        DesktopNetworkMonitor, FsAssetLibrary, HttpMediaTransport, SqliteSettingsStore,
        TokioBackgroundExecutor,
    };

    let data_dir = data_dir.into();
    let settings = SqliteSettingsStore::new(data_dir.join("settings.db"))
        .await
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
    let transport = HttpMediaTransport::new(endpoint)
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
    let monitor = Arc::new(DesktopNetworkMonitor::new());

    let config = CoreConfig::builder()
        .ledger_path(data_dir.join("upload-ledger.db"))
        .asset_library(Arc::new(FsAssetLibrary::new(media_root.into())))
        .transport(Arc::new(transport))
        .settings_store(Arc::new(settings))
        .network_monitor(Arc::clone(&monitor) as Arc<dyn bridge_traits::NetworkMonitor>)
        .background_executor(Arc::new(TokioBackgroundExecutor::with_network_monitor(
            Some(monitor),
        )))
        .build()?;

    UploadCore::new(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{
        assets::{AssetLibrary, AuthorizationStatus, MediaItem, MediaItemId, MediaKind},
        error::Result as BridgeResult,
        storage::SettingsStore,
        transport::{MediaTransport, RemoteMediaRef},
    };
    use bytes::Bytes;
    use core_upload::SessionStatus;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct TinyLibrary;

    #[async_trait]
    impl AssetLibrary for TinyLibrary {
        async fn authorization_status(&self) -> AuthorizationStatus {
            AuthorizationStatus::Authorized
        }
        async fn request_authorization(&self) -> BridgeResult<AuthorizationStatus> {
            Ok(AuthorizationStatus::Authorized)
        }
        async fn list_favorites(
            &self,
            kind: MediaKind,
            _limit: Option<usize>,
        ) -> BridgeResult<Vec<MediaItem>> {
            match kind {
                MediaKind::Photo => Ok(vec![MediaItem {
                    id: MediaItemId::new("only-photo"),
                    kind: MediaKind::Photo,
                    created_at: 1_700_000_000,
                    is_favorite: true,
                    file_size: None,
                }]),
                MediaKind::Video => Ok(Vec::new()),
            }
        }
        async fn fetch_bytes(&self, _item: &MediaItem) -> BridgeResult<Bytes> {
            Ok(Bytes::from_static(b"jpeg-bytes"))
        }
    }

    struct TinyTransport;

    #[async_trait]
    impl MediaTransport for TinyTransport {
        async fn upload(
            &self,
            item: &MediaItem,
            _data: Bytes,
            _cancel: &CancellationToken,
        ) -> BridgeResult<RemoteMediaRef> {
            Ok(RemoteMediaRef::new(format!("mem://{}", item.id)))
        }
    }

    #[derive(Default)]
    struct TinySettings {
        bools: StdMutex<HashMap<String, bool>>,
        ints: StdMutex<HashMap<String, i64>>,
    }

    #[async_trait]
    impl SettingsStore for TinySettings {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }
        async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
            self.bools.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
        async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
            Ok(self.bools.lock().unwrap().get(key).copied())
        }
        async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()> {
            self.ints.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
        async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>> {
            Ok(self.ints.lock().unwrap().get(key).copied())
        }
        async fn set_f64(&self, _key: &str, _value: f64) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_f64(&self, _key: &str) -> BridgeResult<Option<f64>> {
            Ok(None)
        }
        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn has_key(&self, _key: &str) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn clear_all(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn base_config() -> CoreConfig {
        CoreConfig::builder()
            .asset_library(Arc::new(TinyLibrary))
            .transport(Arc::new(TinyTransport))
            .settings_store(Arc::new(TinySettings::default()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_once_through_facade() {
        let core = UploadCore::new(base_config()).await.unwrap();

        let session = core.upload_once().await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.uploaded_count, 1);

        let current = core.current_session().await.unwrap();
        assert_eq!(current.id, session.id);
    }

    #[tokio::test]
    async fn test_background_controls_require_executor() {
        let core = UploadCore::new(base_config()).await.unwrap();

        let err = core.enable_background_upload().await.unwrap_err();
        assert!(matches!(err, CoreError::CapabilityMissing { .. }));
    }

    #[tokio::test]
    async fn test_cancel_without_running_upload_is_noop() {
        let core = UploadCore::new(base_config()).await.unwrap();
        core.cancel_upload().await;
        assert_eq!(core.current_status().status, SessionStatus::Idle);
    }
}
