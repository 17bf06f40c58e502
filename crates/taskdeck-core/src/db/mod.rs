//! Local persistence for Taskdeck

mod connection;
mod migrations;
mod session_repository;
mod task_repository;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

pub use connection::Database;
pub use session_repository::LibSqlSessionRepository;
pub use task_repository::LibSqlTaskStore;

use crate::Result;

/// Open (or create) the database at `path` and build both stores over one
/// shared connection.
pub async fn open_stores(path: impl AsRef<Path>) -> Result<(LibSqlTaskStore, LibSqlSessionRepository)> {
    let db = Arc::new(Mutex::new(Database::open(path).await?));
    Ok((
        LibSqlTaskStore::new(Arc::clone(&db)),
        LibSqlSessionRepository::new(db),
    ))
}
