use alloc::sync::Arc;

use crate::{AttributeKey, AttributeSchema, Value};

/// The backing store a [`crate::VirtualCollection`] virtualizes over.
///
/// Contract (not verified by the collection):
/// - The source grows only by appending contiguous ranges: index `k` becomes readable only after
///   every index `< k` is readable.
/// - `len()` is non-decreasing, except when the owner truncates after a rollback.
/// - `attribute_schema()` is non-empty.
pub trait SourceCollection: Send + Sync {
    /// Number of materialized items.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn attribute_schema(&self) -> AttributeSchema;

    /// Reads one attribute of a materialized item. Only called with `index < len()`.
    fn read(&self, index: usize, key: AttributeKey) -> Option<Value>;

    /// A counter that changes whenever the schema changes.
    ///
    /// Sources that return `Some` allow the merged schema to be cached between calls. The
    /// default (`None`) means the schema is recomputed every time it is requested.
    fn schema_revision(&self) -> Option<u64> {
        None
    }
}

impl<S: SourceCollection + ?Sized> SourceCollection for Arc<S> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn attribute_schema(&self) -> AttributeSchema {
        (**self).attribute_schema()
    }

    fn read(&self, index: usize, key: AttributeKey) -> Option<Value> {
        (**self).read(index, key)
    }

    fn schema_revision(&self) -> Option<u64> {
        (**self).schema_revision()
    }
}

impl<S: SourceCollection + ?Sized> SourceCollection for &S {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn attribute_schema(&self) -> AttributeSchema {
        (**self).attribute_schema()
    }

    fn read(&self, index: usize, key: AttributeKey) -> Option<Value> {
        (**self).read(index, key)
    }

    fn schema_revision(&self) -> Option<u64> {
        (**self).schema_revision()
    }
}
