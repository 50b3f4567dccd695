use alloc::borrow::Cow;
use alloc::sync::Arc;

use crate::BatchEvent;
use crate::schema::DEFAULT_PENDING_MARKER_NAME;

/// A callback fired for every [`BatchEvent`].
///
/// It may be invoked from whichever thread called `get`/`load_more`/`rollback_batch`, so it must
/// not block. Forwarding into a channel is the usual pattern.
pub type EventCallback = Arc<dyn Fn(BatchEvent) + Send + Sync>;

/// Configuration for [`crate::VirtualCollection`].
///
/// Cheap to clone: the callback is stored in an `Arc`.
pub struct LazyCollectionOptions {
    /// Logical size of the collection once every batch has been loaded.
    pub items_count: usize,
    /// Number of items per batch. Must be non-zero.
    pub batch_size: usize,
    /// Name under which the pending marker appears in the attribute schema.
    pub pending_marker_name: Cow<'static, str>,
    pub on_event: Option<EventCallback>,
}

impl Clone for LazyCollectionOptions {
    fn clone(&self) -> Self {
        Self {
            items_count: self.items_count,
            batch_size: self.batch_size,
            pending_marker_name: self.pending_marker_name.clone(),
            on_event: self.on_event.clone(),
        }
    }
}

impl LazyCollectionOptions {
    pub fn new(items_count: usize, batch_size: usize) -> Self {
        Self {
            items_count,
            batch_size,
            pending_marker_name: Cow::Borrowed(DEFAULT_PENDING_MARKER_NAME),
            on_event: None,
        }
    }

    pub fn with_pending_marker_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.pending_marker_name = name.into();
        self
    }

    pub fn with_on_event(
        mut self,
        on_event: Option<impl Fn(BatchEvent) + Send + Sync + 'static>,
    ) -> Self {
        self.on_event = on_event.map(|f| Arc::new(f) as _);
        self
    }

    /// Sets an already shared callback (e.g. one returned by a channel helper).
    pub fn with_event_callback(mut self, on_event: EventCallback) -> Self {
        self.on_event = Some(on_event);
        self
    }

    /// Number of batches needed to cover `items_count`.
    pub fn batch_count(&self) -> usize {
        if self.batch_size == 0 {
            return 0;
        }
        self.items_count.div_ceil(self.batch_size)
    }
}

impl core::fmt::Debug for LazyCollectionOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LazyCollectionOptions")
            .field("items_count", &self.items_count)
            .field("batch_size", &self.batch_size)
            .field("pending_marker_name", &self.pending_marker_name)
            .field("on_event", &self.on_event.as_ref().map(|_| ".."))
            .finish()
    }
}
