//! `tankfarm-console` - backend client, auto-persistence and the embedded web
//! UI for tank-farm scheduling.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Scheduling backend client.
pub mod api;
/// Application state and actions.
pub mod app;
/// Console configuration (`tankfarm.toml`).
pub mod config;
/// Console errors.
pub mod error;
/// Export files and CSV downloads.
pub mod export;
/// Debounced local and remote persistence.
pub mod persist;
/// Embedded web UI.
pub mod web;

pub use api::{ApiClient, ExportKind};
pub use app::{Console, CurrentResults};
pub use config::ConsoleConfig;
pub use error::ConsoleError;
pub use persist::{FileLocalStore, LocalStore, PersistenceCoordinator, RemoteStore};
