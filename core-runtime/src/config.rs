//! # Core Configuration Module
//!
//! Provides configuration management for the upload core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all necessary dependencies and settings for the core
//! library. It enforces fail-fast validation so a missing platform capability
//! surfaces at startup with an actionable message, not at first use.
//!
//! ## Required Dependencies
//!
//! - `AssetLibrary` - Source of favorited media items
//! - `MediaTransport` - Destination for uploaded bytes
//! - `SettingsStore` - Persisted switches and counters
//!
//! ## Optional Dependencies
//!
//! - `BackgroundExecutor` - Periodic background cycles (no executor = manual
//!   uploads only)
//! - `NetworkMonitor` - Connectivity gating for background constraints
//! - `Clock` - Injectable time source (defaults to `SystemClock`)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .ledger_path("/path/to/upload-ledger.db")
//!     .asset_library(Arc::new(my_library))
//!     .transport(Arc::new(my_transport))
//!     .settings_store(Arc::new(my_settings))
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    AssetLibrary, BackgroundExecutor, Clock, MediaTransport, NetworkMonitor, SettingsStore,
    SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for the upload engine.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum attempts per item before it is marked permanently failed.
    pub max_attempts: u32,

    /// Initial retry backoff; doubles per failed attempt.
    pub initial_backoff: Duration,

    /// Pause between consecutive items in a session.
    pub inter_item_delay: Duration,

    /// Scan limit for manual (foreground) uploads. `None` scans the whole
    /// favorites list.
    pub scan_limit: Option<usize>,

    /// Scan limit for background cycles, kept small to fit the host's
    /// execution window.
    pub background_scan_limit: usize,

    /// Minimum re-arm interval between background cycles.
    pub background_interval: Duration,

    /// Attempts for the ledger write after a successful transfer. A write
    /// that still fails aborts the session rather than dropping the record.
    pub ledger_write_attempts: u32,

    /// Restrict background cycles to WiFi.
    pub wifi_only: bool,

    /// Event bus buffer size.
    pub event_buffer: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            inter_item_delay: Duration::ZERO,
            scan_limit: None,
            background_scan_limit: 10,
            background_interval: Duration::from_secs(15 * 60),
            ledger_write_attempts: 3,
            wifi_only: false,
            event_buffer: 100,
        }
    }
}

/// Core configuration for the upload core.
///
/// This struct holds all dependencies and settings required to initialize
/// the core library. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite upload ledger. `None` keeps the ledger in memory
    /// (tests only; a real deployment must persist it).
    pub ledger_path: Option<PathBuf>,

    /// Device media library (required)
    pub asset_library: Arc<dyn AssetLibrary>,

    /// Upload destination (required)
    pub transport: Arc<dyn MediaTransport>,

    /// Persisted preferences storage (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Background task executor (optional)
    pub background_executor: Option<Arc<dyn BackgroundExecutor>>,

    /// Network connectivity monitor (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Engine tunables
    pub upload: UploadConfig,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("ledger_path", &self.ledger_path)
            .field("asset_library", &"AssetLibrary { ... }")
            .field("transport", &"MediaTransport { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field(
                "background_executor",
                &self
                    .background_executor
                    .as_ref()
                    .map(|_| "BackgroundExecutor { ... }"),
            )
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field("upload", &self.upload)
            .finish()
    }
}

impl CoreConfig {
    /// Create a new configuration builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::new()
    }
}

/// Builder for [`CoreConfig`] with fail-fast capability validation.
#[derive(Default)]
pub struct CoreConfigBuilder {
    ledger_path: Option<PathBuf>,
    asset_library: Option<Arc<dyn AssetLibrary>>,
    transport: Option<Arc<dyn MediaTransport>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    background_executor: Option<Arc<dyn BackgroundExecutor>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    upload: Option<UploadConfig>,
}

impl CoreConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the on-disk ledger location.
    pub fn ledger_path(mut self, path: impl AsRef<Path>) -> Self {
        self.ledger_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn asset_library(mut self, library: Arc<dyn AssetLibrary>) -> Self {
        self.asset_library = Some(library);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn MediaTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn background_executor(mut self, executor: Arc<dyn BackgroundExecutor>) -> Self {
        self.background_executor = Some(executor);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn upload_config(mut self, upload: UploadConfig) -> Self {
        self.upload = Some(upload);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] with an actionable message when a
    /// required bridge was not provided, and [`Error::Config`] for invalid
    /// tunables.
    pub fn build(self) -> Result<CoreConfig> {
        let asset_library = self.asset_library.ok_or_else(|| Error::CapabilityMissing {
            capability: "AssetLibrary".to_string(),
            message: "No asset library implementation provided. \
                      Desktop: use bridge_desktop::FsAssetLibrary. \
                      Mobile: inject a platform-native adapter."
                .to_string(),
        })?;

        let transport = self.transport.ok_or_else(|| Error::CapabilityMissing {
            capability: "MediaTransport".to_string(),
            message: "No media transport implementation provided. \
                      Desktop: use bridge_desktop::HttpMediaTransport. \
                      Mobile: inject a platform-native adapter."
                .to_string(),
        })?;

        let settings_store = self.settings_store.ok_or_else(|| Error::CapabilityMissing {
            capability: "SettingsStore".to_string(),
            message: "No settings store implementation provided. \
                      Desktop: use bridge_desktop::SqliteSettingsStore. \
                      Mobile: inject a platform-native adapter."
                .to_string(),
        })?;

        let upload = self.upload.unwrap_or_default();
        if upload.max_attempts == 0 {
            return Err(Error::Config(
                "upload.max_attempts must be at least 1".to_string(),
            ));
        }
        if upload.ledger_write_attempts == 0 {
            return Err(Error::Config(
                "upload.ledger_write_attempts must be at least 1".to_string(),
            ));
        }
        if upload.event_buffer == 0 {
            return Err(Error::Config(
                "upload.event_buffer must be at least 1".to_string(),
            ));
        }

        Ok(CoreConfig {
            ledger_path: self.ledger_path,
            asset_library,
            transport,
            settings_store,
            background_executor: self.background_executor,
            network_monitor: self.network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            upload,
        })
    }
}
