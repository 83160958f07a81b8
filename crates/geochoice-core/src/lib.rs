//! geochoice core: dependent country → state → city selection.
//!
//! Each level is a [`slot::ChoiceSlot`] whose list is loaded cache-first
//! with network fallback ([`loader`]). [`picker::PlacePicker`] chains the
//! three levels, cascading resets downward when a selection changes,
//! retrying failed levels on demand, and restoring a saved selection
//! without redundant loads.

pub mod api;
pub mod cache;
pub mod config;
pub mod loader;
pub mod models;
pub mod observable;
pub mod persistence;
pub mod picker;
pub mod slot;

#[cfg(test)]
mod test_utils;

pub use api::{ApiClient, ApiError, RemoteSource};
pub use cache::{CacheError, JsonPlaceCache, PlaceCache};
pub use config::Config;
pub use loader::{LoadError, LoadFailure, Problem};
pub use models::{Level, Place, PlaceId, NO_SELECTION};
pub use observable::{Observable, Subscription};
pub use persistence::{SavedSelection, SelectionStore};
pub use picker::PlacePicker;
pub use slot::{ChoiceSlot, LoadState, PlaceSlot};
