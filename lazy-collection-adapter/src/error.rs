use thiserror::Error;

/// Errors returned when writing rows into a [`crate::VecSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppendError {
    /// The rows do not start right after the last materialized item.
    #[error("rows start at index {start_index}, but the source holds {len} items")]
    NonContiguous { start_index: usize, len: usize },
    /// A completed batch does not belong to the collection.
    #[error("batch {batch} is outside the collection ({batch_count} batches)")]
    UnknownBatch { batch: usize, batch_count: usize },
}
