//! peerwatch-state — shared state and persisted settings for Peerwatch.
//!
//! Holds the domain types the health monitor mutates and the request
//! layer reads: per-peer health records, their JSON snapshots, aggregate
//! statistics, and per-interface monitoring configuration.
//!
//! # Persistence
//!
//! Interface configuration lives in an INI-style settings file shared with
//! the tunnel dashboard. Each interface owns one `[Health:<name>]` section;
//! every other section in the file is preserved untouched when Peerwatch
//! writes its own.
//!
//! The `InterfaceConfigStore` is `Clone` + `Send` + `Sync` (backed by an
//! `Arc<RwLock<_>>`) and can be shared across async tasks.

pub mod error;
pub mod names;
pub mod settings;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use settings::SettingsFile;
pub use store::InterfaceConfigStore;
pub use types::*;
