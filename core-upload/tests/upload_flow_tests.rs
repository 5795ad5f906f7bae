//! Integration tests for the scan-and-upload pipeline
//!
//! These tests verify the complete upload workflow including:
//! - Idempotent re-scans against the durable ledger
//! - Monotonic progress accounting
//! - Cancellation with at-least-once ledger semantics
//! - Permission gating before any task is created
//! - Background cycles and manual uploads sharing one ledger

use async_trait::async_trait;
use bridge_traits::{
    assets::{AssetLibrary, AuthorizationStatus, MediaItem, MediaItemId, MediaKind},
    error::{BridgeError, Result as BridgeResult},
    time::SystemClock,
    transport::{MediaTransport, RemoteMediaRef},
};
use bytes::Bytes;
use core_runtime::{
    config::UploadConfig,
    events::{CoreEvent, EventBus, UploadEvent},
};
use core_upload::{
    ledger::{SqliteUploadLedger, UploadLedger},
    session::SessionStatus,
    status::{UploadStatus, UploadStatusPublisher},
    uploader::Uploader,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Implementations
// ============================================================================

mockall::mock! {
    Library {}

    #[async_trait]
    impl AssetLibrary for Library {
        async fn authorization_status(&self) -> AuthorizationStatus;
        async fn request_authorization(&self) -> BridgeResult<AuthorizationStatus>;
        async fn list_favorites(
            &self,
            kind: MediaKind,
            limit: Option<usize>,
        ) -> BridgeResult<Vec<MediaItem>>;
        async fn fetch_bytes(&self, item: &MediaItem) -> BridgeResult<Bytes>;
    }
}

fn photo(id: &str) -> MediaItem {
    MediaItem {
        id: MediaItemId::new(id),
        kind: MediaKind::Photo,
        created_at: 1_700_000_000,
        is_favorite: true,
        file_size: Some(128),
    }
}

fn video(id: &str) -> MediaItem {
    MediaItem {
        id: MediaItemId::new(id),
        kind: MediaKind::Video,
        created_at: 1_700_000_100,
        is_favorite: true,
        file_size: Some(4096),
    }
}

/// Library serving a mutable favorites list.
struct ListLibrary {
    items: Mutex<Vec<MediaItem>>,
}

impl ListLibrary {
    fn new(items: Vec<MediaItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }
}

#[async_trait]
impl AssetLibrary for ListLibrary {
    async fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::Authorized
    }

    async fn request_authorization(&self) -> BridgeResult<AuthorizationStatus> {
        Ok(AuthorizationStatus::Authorized)
    }

    async fn list_favorites(
        &self,
        kind: MediaKind,
        limit: Option<usize>,
    ) -> BridgeResult<Vec<MediaItem>> {
        let mut items: Vec<MediaItem> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.kind == kind && i.is_favorite)
            .cloned()
            .collect();
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn fetch_bytes(&self, item: &MediaItem) -> BridgeResult<Bytes> {
        Ok(Bytes::from(format!("payload:{}", item.id)))
    }
}

/// Transport that records uploads and can be slowed down per call.
struct RecordingTransport {
    uploads: Mutex<Vec<String>>,
    delay: Duration,
    fail_ids: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            fail_ids: Mutex::new(Vec::new()),
        }
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn fail_always(&self, id: &str) {
        self.fail_ids.lock().unwrap().push(id.to_string());
    }

    fn uploaded_ids(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaTransport for RecordingTransport {
    async fn upload(
        &self,
        item: &MediaItem,
        _data: Bytes,
        cancel: &CancellationToken,
    ) -> BridgeResult<RemoteMediaRef> {
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(BridgeError::Transfer {
                        message: "transfer aborted".to_string(),
                        transient: true,
                    });
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        let id = item.id.as_str().to_string();
        if self.fail_ids.lock().unwrap().contains(&id) {
            return Err(BridgeError::Transfer {
                message: "temporary outage".to_string(),
                transient: true,
            });
        }

        self.uploads.lock().unwrap().push(id.clone());
        Ok(RemoteMediaRef::new(format!("https://media.test/u/{}", id)))
    }
}

fn fast_config() -> UploadConfig {
    UploadConfig {
        initial_backoff: Duration::from_millis(1),
        ..Default::default()
    }
}

async fn build_uploader(
    library: Arc<dyn AssetLibrary>,
    transport: Arc<dyn MediaTransport>,
) -> (Arc<Uploader>, Arc<SqliteUploadLedger>, EventBus) {
    let ledger = Arc::new(SqliteUploadLedger::in_memory().await.unwrap());
    let events = EventBus::new(256);
    let uploader = Arc::new(Uploader::new(
        library,
        transport,
        ledger.clone(),
        events.clone(),
        Arc::new(SystemClock),
        fast_config(),
    ));
    (uploader, ledger, events)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_full_pipeline_uploads_photos_then_videos() {
    let library = Arc::new(ListLibrary::new(vec![
        photo("p-1"),
        photo("p-2"),
        video("v-1"),
    ]));
    let transport = Arc::new(RecordingTransport::new());
    let (uploader, ledger, _) = build_uploader(library, transport.clone()).await;

    let session = uploader
        .scan_and_upload(None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.uploaded_count, 3);
    // Discovery order: photos before videos.
    assert_eq!(transport.uploaded_ids(), vec!["p-1", "p-2", "v-1"]);
    assert_eq!(ledger.uploaded_count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_second_scan_excludes_already_uploaded() {
    let library = Arc::new(ListLibrary::new(vec![photo("p-1"), photo("p-2")]));
    let transport = Arc::new(RecordingTransport::new());
    let (uploader, _, _) = build_uploader(library.clone(), transport.clone()).await;

    uploader
        .scan_and_upload(None, CancellationToken::new())
        .await
        .unwrap();

    // A new favorite appears between scans.
    library.items.lock().unwrap().push(photo("p-3"));

    let second = uploader
        .scan_and_upload(None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.total_count(), 1);
    assert_eq!(second.uploaded_count, 1);
    assert_eq!(transport.uploaded_ids(), vec!["p-1", "p-2", "p-3"]);
}

#[tokio::test]
async fn test_progress_events_are_monotonic() {
    let library = Arc::new(ListLibrary::new(
        (0..5).map(|i| photo(&format!("p-{}", i))).collect(),
    ));
    let transport = Arc::new(RecordingTransport::new());
    let (uploader, _, events) = build_uploader(library, transport).await;

    let mut rx = events.subscribe();
    let session = uploader
        .scan_and_upload(None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(session.uploaded_count, 5);

    let mut last_uploaded = 0u64;
    while let Ok(event) = rx.try_recv() {
        if let CoreEvent::Upload(UploadEvent::Progress {
            uploaded, total, ..
        }) = event
        {
            assert!(uploaded >= last_uploaded);
            assert!(uploaded <= total);
            last_uploaded = uploaded;
        }
    }
    assert_eq!(last_uploaded, 5);
}

#[tokio::test]
async fn test_empty_scan_is_trivially_successful() {
    let library = Arc::new(ListLibrary::new(Vec::new()));
    let transport = Arc::new(RecordingTransport::new());
    let (uploader, ledger, _) = build_uploader(library, transport).await;

    let session = uploader
        .scan_and_upload(None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.total_count(), 0);
    assert!(session.tasks.is_empty());
    assert_eq!(ledger.uploaded_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancel_mid_session_keeps_exactly_completed_entries() {
    let library = Arc::new(ListLibrary::new(
        (0..4).map(|i| photo(&format!("p-{}", i))).collect(),
    ));
    let transport = Arc::new(RecordingTransport::with_delay(Duration::from_millis(40)));
    let (uploader, ledger, events) = build_uploader(library, transport).await;

    let mut rx = events.subscribe();
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let run_uploader = uploader.clone();
    let handle = tokio::spawn(async move {
        run_uploader
            .scan_and_upload(None, run_cancel)
            .await
            .unwrap()
    });

    // Cancel after the first item completes.
    loop {
        match rx.recv().await {
            Ok(CoreEvent::Upload(UploadEvent::Progress { uploaded, .. })) if uploaded >= 1 => {
                cancel.cancel();
                break;
            }
            Ok(_) => continue,
            Err(_) => panic!("event bus closed early"),
        }
    }

    let session = handle.await.unwrap();
    assert_eq!(session.status, SessionStatus::Idle);
    assert!(session.tasks.iter().all(|t| t.state.is_terminal()));

    // Exactly the k completed items are in the ledger, no partial entries.
    let recorded = ledger.uploaded_count().await.unwrap();
    assert_eq!(recorded, session.uploaded_count);
    assert!(recorded >= 1);
    assert!(recorded < 4);
    for task in session
        .tasks
        .iter()
        .filter(|t| t.state == core_upload::session::TaskState::Succeeded)
    {
        assert!(ledger.is_uploaded(task.media_id()).await.unwrap());
    }
}

#[tokio::test]
async fn test_permission_denied_yields_failed_session_without_tasks() {
    let mut library = MockLibrary::new();
    library
        .expect_authorization_status()
        .returning(|| AuthorizationStatus::NotDetermined);
    // The undetermined state triggers exactly one explicit prompt.
    library
        .expect_request_authorization()
        .times(1)
        .returning(|| Ok(AuthorizationStatus::Denied));
    library.expect_list_favorites().times(0);
    library.expect_fetch_bytes().times(0);

    let transport = Arc::new(RecordingTransport::new());
    let (uploader, ledger, events) = build_uploader(Arc::new(library), transport.clone()).await;

    let mut rx = events.subscribe();
    let session = uploader
        .scan_and_upload(None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.total_count(), 0);
    assert_eq!(ledger.uploaded_count().await.unwrap(), 0);
    assert!(transport.uploaded_ids().is_empty());

    match rx.recv().await.unwrap() {
        CoreEvent::Upload(UploadEvent::SessionFailed { message, .. }) => {
            assert!(message.contains("denied"));
        }
        other => panic!("expected SessionFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transient_failure_retries_then_moves_on() {
    let library = Arc::new(ListLibrary::new(vec![photo("flaky"), photo("ok")]));
    let transport = Arc::new(RecordingTransport::new());
    transport.fail_always("flaky");
    let (uploader, ledger, events) = build_uploader(library, transport.clone()).await;

    let mut rx = events.subscribe();
    let session = uploader
        .scan_and_upload(None, CancellationToken::new())
        .await
        .unwrap();

    // "flaky" exhausted its retries; "ok" uploaded regardless.
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.uploaded_count, 1);
    assert_eq!(session.tasks[0].attempts, 3);
    assert!(ledger.is_uploaded(&MediaItemId::new("ok")).await.unwrap());
    assert!(!ledger.is_uploaded(&MediaItemId::new("flaky")).await.unwrap());

    let mut retry_events = 0;
    let mut permanent_failures = 0;
    while let Ok(event) = rx.try_recv() {
        if let CoreEvent::Upload(UploadEvent::ItemFailed { will_retry, .. }) = event {
            if will_retry {
                retry_events += 1;
            } else {
                permanent_failures += 1;
            }
        }
    }
    assert_eq!(retry_events, 2);
    assert_eq!(permanent_failures, 1);
}

#[tokio::test]
async fn test_status_publisher_reflects_pipeline() {
    let library = Arc::new(ListLibrary::new(vec![photo("p-1"), photo("p-2")]));
    let transport = Arc::new(RecordingTransport::new());
    let (uploader, _, events) = build_uploader(library, transport).await;

    let publisher = UploadStatusPublisher::spawn(&events, UploadStatus::default());
    let mut watch = publisher.subscribe();

    uploader
        .scan_and_upload(None, CancellationToken::new())
        .await
        .unwrap();

    // Drain watch updates until the terminal snapshot arrives.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        {
            let status = watch.borrow();
            if status.status == SessionStatus::Completed && status.uploaded_count == 2 {
                assert!(!status.is_uploading);
                assert!((status.progress - 1.0).abs() < f64::EPSILON);
                break;
            }
        }
        tokio::select! {
            changed = watch.changed() => changed.unwrap(),
            _ = tokio::time::sleep_until(deadline) => panic!("status never completed"),
        }
    }
}
