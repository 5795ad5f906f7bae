//! # Desktop Bridge Implementations
//!
//! Native implementations of the [`bridge_traits`] capabilities, built on
//! tokio, reqwest and sqlx:
//!
//! - [`FsAssetLibrary`] - media library over a local directory with a
//!   favorites manifest
//! - [`HttpMediaTransport`] - HTTP upload transport with transient/permanent
//!   error classification
//! - [`TokioBackgroundExecutor`] - recurring background triggers with
//!   constraint gating and per-run deadlines
//! - [`SqliteSettingsStore`] - durable key-value preferences
//! - [`DesktopNetworkMonitor`] - TCP-probe connectivity detection
//!
//! Mobile hosts ship their own adapter crates implementing the same traits;
//! nothing in the core depends on this crate.

pub mod assets;
pub mod background;
pub mod network;
pub mod settings;
pub mod transport;

pub use assets::{FsAssetLibrary, FAVORITES_MANIFEST};
pub use background::TokioBackgroundExecutor;
pub use network::DesktopNetworkMonitor;
pub use settings::SqliteSettingsStore;
pub use transport::HttpMediaTransport;
