//! taskdeck-core - Core library for Taskdeck
//!
//! This crate contains the task models, the libSQL-backed local store, and
//! the engine that keeps the local task set in sync with a single remote
//! backup blob. The CLI is a thin shell over [`engine::SyncEngine`].

pub mod auth;
pub mod backup;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod merge;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use engine::{SyncEngine, SyncEngineBuilder};
pub use error::{Error, Result};
pub use models::{TaskId, TaskRecord};
