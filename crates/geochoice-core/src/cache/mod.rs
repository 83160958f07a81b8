//! Local caching module for offline place lookups.
//!
//! `PlaceCache` is the seam the loader reads and writes through.
//! `JsonPlaceCache` stores one JSON table per level; once a subtree has
//! been downloaded it is served from disk across restarts. There is no
//! expiry: an empty result is the only thing that sends a load to the
//! network.

pub mod json;
pub mod store;

pub use json::{CachedData, JsonPlaceCache};
pub use store::{CacheError, PlaceCache};
