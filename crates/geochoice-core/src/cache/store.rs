use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Level, Place, PlaceId};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache table is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Cache worker failed: {0}")]
    Worker(String),
}

/// Filtered-sorted reads and transactional writes over the three tables.
#[async_trait]
pub trait PlaceCache: Send + Sync {
    /// Rows of `level` whose parent is `parent_id`, ordered by name ascending.
    async fn query(&self, level: Level, parent_id: PlaceId) -> Result<Vec<Place>, CacheError>;

    /// Insert every place stamped with `parent_id`, all or nothing.
    ///
    /// A row whose id is already present in the table replaces it.
    async fn write_transaction(
        &self,
        level: Level,
        places: &[Place],
        parent_id: PlaceId,
    ) -> Result<(), CacheError>;
}
