use alloc::sync::Arc;

use crate::cursor::BatchCursor;
use crate::{
    AttributeKey, AttributeSchema, BatchEvent, BatchRange, BatchState, LazyCollectionOptions,
    SourceCollection, Value,
};

#[cfg(feature = "std")]
type SchemaCache = std::sync::RwLock<Option<(u64, AttributeSchema)>>;

/// A fixed-size logical collection over a smaller, incrementally growing source.
///
/// Reads past the end of the source return a placeholder and request the missing batches
/// through [`BatchEvent::LoadRequest`]. The collection never fetches anything itself; the owner
/// performs the fetch, appends the rows to the source, and reports failures back through
/// [`VirtualCollection::rollback_batch`].
///
/// All query methods take `&self` and may be called concurrently. The only shared mutable state
/// is the batch cursor.
#[derive(Debug)]
pub struct VirtualCollection<S> {
    source: S,
    options: LazyCollectionOptions,
    cursor: BatchCursor,
    pending_key: AttributeKey,
    #[cfg(feature = "std")]
    schema_cache: SchemaCache,
}

impl<S: SourceCollection> VirtualCollection<S> {
    /// Creates a collection over `source`.
    ///
    /// # Panics
    ///
    /// Panics if `options.batch_size` is zero, the source's attribute schema is empty, or the
    /// schema already uses `u32::MAX` (no key is left for the pending marker).
    pub fn new(source: S, options: LazyCollectionOptions) -> Self {
        assert!(options.batch_size > 0, "batch_size must be non-zero");
        let pending_key = pending_key_for(&source.attribute_schema());
        let cursor = BatchCursor::from_source_len(source.len(), options.batch_size);
        ldebug!(
            items_count = options.items_count,
            batch_size = options.batch_size,
            source_len = source.len(),
            pending_key = pending_key.get(),
            "VirtualCollection::new"
        );
        Self {
            source,
            options,
            cursor,
            pending_key,
            #[cfg(feature = "std")]
            schema_cache: SchemaCache::default(),
        }
    }

    /// Shorthand for `new(source, LazyCollectionOptions::new(items_count, batch_size))`.
    pub fn with_batches(source: S, items_count: usize, batch_size: usize) -> Self {
        Self::new(source, LazyCollectionOptions::new(items_count, batch_size))
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn options(&self) -> &LazyCollectionOptions {
        &self.options
    }

    pub fn items_count(&self) -> usize {
        self.options.items_count
    }

    pub fn batch_size(&self) -> usize {
        self.options.batch_size
    }

    /// Logical size: `items_count`, or the source length if the source outgrew it.
    pub fn len(&self) -> usize {
        self.options.items_count.max(self.source.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items the source has materialized so far.
    pub fn loaded_len(&self) -> usize {
        self.source.len()
    }

    /// Key of the synthetic boolean attribute that reports "not loaded yet".
    pub fn pending_key(&self) -> AttributeKey {
        self.pending_key
    }

    pub fn set_on_event(&mut self, on_event: Option<impl Fn(BatchEvent) + Send + Sync + 'static>) {
        self.options.on_event = on_event.map(|f| Arc::new(f) as _);
    }

    /// Reads attribute `key` of logical item `index`.
    ///
    /// Loaded items are delegated to the source, and the pending marker reads `false`. For items
    /// past the source, every batch up to the one containing `index` that has not been requested
    /// yet is requested (each exactly once), then the pending marker reads `true` and every other
    /// attribute is `None`.
    pub fn get(&self, index: usize, key: AttributeKey) -> Option<Value> {
        if index < self.source.len() {
            if key == self.pending_key {
                return Some(Value::Bool(false));
            }
            return self.source.read(index, key);
        }

        if !self.check_index(index) {
            return None;
        }
        self.claim_through(index);
        if key == self.pending_key {
            Some(Value::Bool(true))
        } else {
            None
        }
    }

    /// Whether `index` has not been materialized by the source yet.
    pub fn is_pending(&self, index: usize) -> bool {
        index >= self.source.len()
    }

    /// Requests every unrequested batch up to the one containing `index`, without reading.
    ///
    /// Returns the number of batches newly requested by this call.
    pub fn request_through(&self, index: usize) -> usize {
        if index < self.source.len() || !self.check_index(index) {
            return 0;
        }
        self.claim_through(index)
    }

    pub fn can_load_more(&self) -> bool {
        self.source.len() < self.options.items_count
    }

    /// Requests the batch after the cursor, regardless of what has been read.
    ///
    /// Returns the requested batch id.
    pub fn load_more(&self) -> usize {
        let batch = self.cursor.claim_next();
        ltrace!(batch, "VirtualCollection::load_more");
        self.emit(BatchEvent::LoadRequest { batch });
        batch
    }

    /// Reports that loading `batch` failed.
    ///
    /// If `batch` is at or below the cursor, the cursor is rewound to `batch - 1` and an
    /// [`BatchEvent::InvalidateRange`] is emitted for the batch's indexes (clamped to
    /// `items_count`). A rollback for a batch above the cursor is stale and ignored.
    ///
    /// Returns `true` if the rollback took effect.
    pub fn rollback_batch(&self, batch: usize) -> bool {
        if !self.cursor.rollback(batch) {
            ltrace!(
                batch,
                cursor = ?self.cursor.current(),
                "VirtualCollection::rollback_batch: stale"
            );
            return false;
        }
        ldebug!(batch, "VirtualCollection::rollback_batch");
        if let Some(range) = self.batch_range(batch) {
            self.emit(BatchEvent::InvalidateRange {
                start_index: range.start_index,
                end_index: range.end_index - 1,
            });
        }
        true
    }

    /// The source schema with the pending marker merged in.
    pub fn attribute_schema(&self) -> AttributeSchema {
        #[cfg(feature = "std")]
        if let Some(revision) = self.source.schema_revision() {
            return self.cached_schema(revision);
        }
        self.merged_schema()
    }

    /// Recomputes the pending-marker key from the source's current schema.
    ///
    /// The key is derived once at construction. Owners that add attributes to the source must
    /// call this afterwards so the marker keeps clear of the new keys.
    pub fn refresh_pending_key(&mut self) -> AttributeKey {
        self.pending_key = pending_key_for(&self.source.attribute_schema());
        #[cfg(feature = "std")]
        if let Ok(mut cache) = self.schema_cache.write() {
            *cache = None;
        }
        ldebug!(
            pending_key = self.pending_key.get(),
            "VirtualCollection::refresh_pending_key"
        );
        self.pending_key
    }

    /// Highest batch id requested so far, or `None` if nothing has been requested.
    pub fn highest_requested_batch(&self) -> Option<usize> {
        self.cursor.current()
    }

    pub fn batch_of(&self, index: usize) -> usize {
        index / self.options.batch_size
    }

    /// Number of batches needed to cover `items_count`.
    pub fn batch_count(&self) -> usize {
        self.options.batch_count()
    }

    /// Logical indexes covered by `batch`, clamped to `items_count`.
    ///
    /// Returns `None` if the batch starts at or past `items_count`.
    pub fn batch_range(&self, batch: usize) -> Option<BatchRange> {
        let start_index = batch.checked_mul(self.options.batch_size)?;
        if start_index >= self.options.items_count {
            return None;
        }
        let end_index = start_index
            .saturating_add(self.options.batch_size)
            .min(self.options.items_count);
        Some(BatchRange {
            batch,
            start_index,
            end_index,
        })
    }

    /// Request state of `batch`, inferred from the cursor and the source length.
    pub fn batch_state(&self, batch: usize) -> BatchState {
        if let Some(range) = self.batch_range(batch)
            && self.source.len() >= range.end_index
        {
            return BatchState::Fulfilled;
        }
        if self.cursor.is_requested(batch) {
            BatchState::Requested
        } else {
            BatchState::Unrequested
        }
    }

    fn claim_through(&self, index: usize) -> usize {
        let needed = self.batch_of(index);
        self.cursor.claim_through(needed, |batch| {
            ltrace!(batch, index, "VirtualCollection: load request");
            self.emit(BatchEvent::LoadRequest { batch });
        })
    }

    fn check_index(&self, index: usize) -> bool {
        if index >= self.len() {
            lwarn!(
                index,
                items_count = self.options.items_count,
                "VirtualCollection: index out of range"
            );
            debug_assert!(
                index < self.len(),
                "VirtualCollection: index out of range (index={index}, len={})",
                self.len()
            );
            return false;
        }
        true
    }

    fn merged_schema(&self) -> AttributeSchema {
        self.source
            .attribute_schema()
            .with_pending_marker(self.pending_key, &self.options.pending_marker_name)
    }

    #[cfg(feature = "std")]
    fn cached_schema(&self, revision: u64) -> AttributeSchema {
        if let Ok(cache) = self.schema_cache.read()
            && let Some((cached_revision, schema)) = cache.as_ref()
            && *cached_revision == revision
        {
            return schema.clone();
        }
        let schema = self.merged_schema();
        if let Ok(mut cache) = self.schema_cache.write() {
            *cache = Some((revision, schema.clone()));
        }
        schema
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(cb) = &self.options.on_event {
            cb(event);
        }
    }
}

fn pending_key_for(schema: &AttributeSchema) -> AttributeKey {
    let Some(max) = schema.max_key() else {
        panic!("source attribute schema must not be empty");
    };
    match max.checked_next() {
        Some(key) => key,
        None => panic!("no free attribute key above the source schema (max={max})"),
    }
}
