use async_trait::async_trait;

use super::ApiError;
use crate::models::{Level, Place, PlaceId};

/// Where places come from when the cache has none.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_countries(&self) -> Result<Vec<Place>, ApiError>;

    async fn fetch_states(&self, country_id: PlaceId) -> Result<Vec<Place>, ApiError>;

    async fn fetch_cities(&self, state_id: PlaceId) -> Result<Vec<Place>, ApiError>;

    /// Fetch the list for `level` under `parent_id`.
    ///
    /// Countries have no parent, so `parent_id` is ignored for them.
    async fn fetch(&self, level: Level, parent_id: PlaceId) -> Result<Vec<Place>, ApiError> {
        match level {
            Level::Country => self.fetch_countries().await,
            Level::State => self.fetch_states(parent_id).await,
            Level::City => self.fetch_cities(parent_id).await,
        }
    }
}
