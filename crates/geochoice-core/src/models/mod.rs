//! Data models for the place hierarchy.
//!
//! - `Place`: one country, state or city, identical in shape at every level
//! - `Level`: which of the three dependent lists a place belongs to

pub mod level;
pub mod place;

pub use level::Level;
pub use place::{Place, PlaceId, NO_SELECTION};
