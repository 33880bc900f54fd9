//! Storage backends for targets, samples and alerts
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Shared**: one `Arc<dyn StorageBackend>` is used by every concurrent
//!   per-target unit of a collection cycle
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, good for small fleets
//! - **In-Memory**: No persistence, for testing or throwaway runs
//!
//! ## Usage
//!
//! ```no_run
//! use fleet_monitoring::config::StorageConfig;
//! use fleet_monitoring::storage::open_backend;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = open_backend(&StorageConfig::default()).await?;
//!     let targets = backend.list_targets().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use schema::{AlertRow, FleetStats, MetricKind, SampleRow, Severity};

/// Open the backend described by the configuration.
///
/// A `DATABASE_PATH` environment variable overrides the configured SQLite
/// path.
pub async fn open_backend(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, nothing will be persisted");
            Ok(Arc::new(memory::MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path, .. } => {
            let path = crate::util::get_database_path().unwrap_or_else(|| path.clone());
            Ok(Arc::new(sqlite::SqliteBackend::new(path).await?))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::InvalidConfig(
            "SQLite storage requires the 'storage-sqlite' feature".to_string(),
        )),
    }
}
