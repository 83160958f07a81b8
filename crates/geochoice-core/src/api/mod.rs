//! Remote place directory.
//!
//! `RemoteSource` is the network seam the loader falls back to when the
//! cache has nothing for a parent. `ApiClient` implements it over HTTP with
//! `reqwest`; each level is one GET returning a JSON array of places.

pub mod client;
pub mod error;
pub mod source;

pub use client::ApiClient;
pub use error::ApiError;
pub use source::RemoteSource;
