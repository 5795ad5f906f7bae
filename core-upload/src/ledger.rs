//! # Upload Ledger
//!
//! Durable record of which media items have been successfully uploaded.
//!
//! ## Overview
//!
//! The ledger is what makes re-scans idempotent: admission filters out every
//! item already recorded here, so a favorited photo is uploaded exactly once
//! across any number of manual scans and background cycles.
//!
//! Entries are keyed by the stable media identifier (never by capture
//! timestamps, which collide for same-second captures) and survive process
//! restarts. The SQLite implementation upserts per key, so concurrent scan
//! cycles cannot corrupt an entry: the last completed write for a key wins
//! and every write is a single transactional statement.
//!
//! ## Usage
//!
//! ```ignore
//! use core_upload::ledger::{LedgerEntry, SqliteUploadLedger, UploadLedger};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = SqliteUploadLedger::in_memory().await?;
//! let id = MediaItemId::new("DCIM/IMG_0042.heic");
//!
//! assert!(!ledger.is_uploaded(&id).await?);
//! ledger.mark_uploaded(LedgerEntry::new(id.clone(), 1_700_000_000)).await?;
//! assert!(ledger.is_uploaded(&id).await?);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bridge_traits::assets::MediaItemId;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, UploadError};

/// Persisted record of one completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Stable media identifier (primary key)
    pub media_id: MediaItemId,
    /// When the upload completed, Unix seconds
    pub uploaded_at: i64,
    /// SHA-256 digest of the uploaded bytes, hex-encoded
    pub content_sha256: Option<String>,
    /// Where the upload landed
    pub remote_ref: Option<String>,
}

impl LedgerEntry {
    /// Create a minimal entry
    pub fn new(media_id: MediaItemId, uploaded_at: i64) -> Self {
        Self {
            media_id,
            uploaded_at,
            content_sha256: None,
            remote_ref: None,
        }
    }

    /// Attach the content digest
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.content_sha256 = Some(digest.into());
        self
    }

    /// Attach the remote reference
    pub fn with_remote_ref(mut self, remote_ref: impl Into<String>) -> Self {
        self.remote_ref = Some(remote_ref.into());
        self
    }
}

/// Ledger persistence trait.
///
/// The only mutable, durable state in the core. All mutations go through
/// this serialized interface; no side effects beyond the store itself.
#[async_trait]
pub trait UploadLedger: Send + Sync {
    /// Whether an item has already been uploaded
    async fn is_uploaded(&self, id: &MediaItemId) -> Result<bool>;

    /// Record a completed upload (idempotent per key)
    async fn mark_uploaded(&self, entry: LedgerEntry) -> Result<()>;

    /// Fetch the full entry for an item
    async fn entry(&self, id: &MediaItemId) -> Result<Option<LedgerEntry>>;

    /// Total number of recorded uploads
    async fn uploaded_count(&self) -> Result<u64>;
}

/// SQLite implementation of the upload ledger
pub struct SqliteUploadLedger {
    pool: SqlitePool,
}

impl SqliteUploadLedger {
    /// Open (or create) the ledger database at the given path
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UploadError::Ledger(format!("Failed to create ledger dir: {}", e)))?;
        }

        let path_str = path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{}?mode=rwc", path_str);

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(|e| UploadError::Ledger(format!("Failed to open ledger: {}", e)))?;

        let ledger = Self { pool };
        ledger.initialize().await?;
        info!(path = ?path, "Opened upload ledger");
        Ok(ledger)
    }

    /// Create an in-memory ledger (for testing)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| UploadError::Ledger(format!("Failed to open ledger: {}", e)))?;

        let ledger = Self { pool };
        ledger.initialize().await?;
        Ok(ledger)
    }

    /// Create a ledger over an existing pool
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let ledger = Self { pool };
        ledger.initialize().await?;
        Ok(ledger)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS upload_ledger (
                media_id TEXT PRIMARY KEY,
                uploaded_at INTEGER NOT NULL,
                content_sha256 TEXT,
                remote_ref TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| UploadError::Ledger(e.to_string()))?;

        Ok(())
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> LedgerEntry {
        LedgerEntry {
            media_id: MediaItemId::new(row.get::<String, _>("media_id")),
            uploaded_at: row.get("uploaded_at"),
            content_sha256: row.get("content_sha256"),
            remote_ref: row.get("remote_ref"),
        }
    }
}

#[async_trait]
impl UploadLedger for SqliteUploadLedger {
    async fn is_uploaded(&self, id: &MediaItemId) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM upload_ledger WHERE media_id = ?")
                .bind(id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| UploadError::Ledger(e.to_string()))?;

        Ok(count > 0)
    }

    async fn mark_uploaded(&self, entry: LedgerEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_ledger (media_id, uploaded_at, content_sha256, remote_ref)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(media_id) DO UPDATE SET
                uploaded_at = excluded.uploaded_at,
                content_sha256 = excluded.content_sha256,
                remote_ref = excluded.remote_ref
            "#,
        )
        .bind(entry.media_id.as_str())
        .bind(entry.uploaded_at)
        .bind(&entry.content_sha256)
        .bind(&entry.remote_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| UploadError::Ledger(e.to_string()))?;

        debug!(media_id = %entry.media_id, "Recorded upload in ledger");
        Ok(())
    }

    async fn entry(&self, id: &MediaItemId) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query(
            "SELECT media_id, uploaded_at, content_sha256, remote_ref \
             FROM upload_ledger WHERE media_id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| UploadError::Ledger(e.to_string()))?;

        Ok(row.as_ref().map(Self::row_to_entry))
    }

    async fn uploaded_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM upload_ledger")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| UploadError::Ledger(e.to_string()))?;

        Ok(count as u64)
    }
}
