//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the upload core and platform-specific
//! implementations. Each trait represents a capability that the core requires but
//! that must be implemented differently per platform (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### Media & Transfer
//! - [`AssetLibrary`](assets::AssetLibrary) - Device photo/video library access with authorization gating
//! - [`MediaTransport`](transport::MediaTransport) - Moves media bytes to their remote destination
//!
//! ### Platform Integration
//! - [`BackgroundExecutor`](background::BackgroundExecutor) - Periodic background triggers respecting platform constraints
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity and metered network detection
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core should fail fast with descriptive errors when a required capability is missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! pub fn new(config: CoreConfig) -> Result<Self> {
//!     let assets = config.asset_library
//!         .ok_or_else(|| Error::CapabilityMissing {
//!             capability: "AssetLibrary".to_string(),
//!             message: "No asset library implementation provided. \
//!                      Desktop: use bridge_desktop::FsAssetLibrary. \
//!                      Mobile: inject platform-native adapter.".to_string()
//!         })?;
//!     // ...
//! }
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type for consistent
//! error handling. Platform implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Classify transfer failures as transient or permanent honestly; the
//!   upload worker's retry policy depends on it
//! - Provide actionable error messages
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks. Implementations must ensure thread safety.

pub mod assets;
pub mod background;
pub mod error;
pub mod network;
pub mod storage;
pub mod time;
pub mod transport;

pub use error::BridgeError;

// Re-export commonly used types
pub use assets::{AssetLibrary, AuthorizationStatus, MediaItem, MediaItemId, MediaKind};
pub use background::{BackgroundExecutor, TaskConstraints, TaskHandler, TaskId, TaskRun, TaskStatus};
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::SettingsStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
pub use transport::{MediaTransport, RemoteMediaRef};
