use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ns_core::{ArticleStore, Result};
use serde::{Deserialize, Serialize};

pub mod backends;

pub use backends::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Sqlite,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Memory => write!(f, "memory"),
            StorageKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Build the configured store. `location` is the database file for SQLite
/// and ignored for memory.
pub async fn create_storage(kind: StorageKind, location: &Path) -> Result<Arc<dyn ArticleStore>> {
    match kind {
        StorageKind::Memory => Ok(Arc::new(MemoryStorage::new())),
        #[cfg(feature = "sqlite")]
        StorageKind::Sqlite => Ok(Arc::new(SQLiteStorage::new_with_path(location).await?)),
        #[cfg(not(feature = "sqlite"))]
        StorageKind::Sqlite => Err(ns_core::Error::Config(format!(
            "SQLite storage requested for {} but ns_storage was built without the `sqlite` feature",
            location.display()
        ))),
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageKind};
}
