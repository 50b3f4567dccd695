//! A fixed-size virtual collection that lazily requests its missing tail in batches.
//!
//! A [`VirtualCollection`] presents `items_count` logical items over a [`SourceCollection`]
//! that only holds a prefix of them. Reading past the loaded prefix:
//! - returns a placeholder (`None`, and `true` for the synthetic pending-marker attribute)
//! - requests every batch up to the one containing the index, each batch exactly once, even
//!   under concurrent readers
//!
//! The crate performs no I/O. The owner listens for [`BatchEvent::LoadRequest`], fetches the
//! batch, and appends it to the source, or calls [`VirtualCollection::rollback_batch`] when the
//! fetch fails.
//!
//! For a ready-made in-memory source and loader loop, see the `lazy-collection-adapter` crate.
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod collection;
mod cursor;
mod options;
mod schema;
mod source;
mod types;


pub use collection::VirtualCollection;
pub use cursor::BatchCursor;
pub use options::{EventCallback, LazyCollectionOptions};
pub use schema::{AttributeSchema, DEFAULT_PENDING_MARKER_NAME};
pub use source::SourceCollection;
pub use types::{AttributeKey, BatchEvent, BatchRange, BatchState, Value};
