//! Loader and source utilities for the `lazy-collection` crate.
//!
//! `lazy-collection` only decides *when* a batch must be fetched. This crate provides the
//! pieces an application usually writes around it:
//!
//! - [`VecSource`]: an in-memory, append-only source that enforces contiguous appends
//! - [`event_channel`]: forwards collection events into a `crossbeam-channel`
//! - [`BatchLoader`]: services load requests, reorders out-of-order completions, and rolls
//!   back failed batches
//!
//! The crate is framework-agnostic; views call [`BatchLoader::on_visible_range`] and read
//! through the shared collection.
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod channel;
mod error;
mod loader;
mod vec_source;

#[cfg(test)]
mod tests;

pub use channel::{chain_callbacks, event_channel};
pub use error::AppendError;
pub use loader::{BatchLoader, LoaderStats, SharedCollection};
pub use vec_source::{Row, VecSource};
