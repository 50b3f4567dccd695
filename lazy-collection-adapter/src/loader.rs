use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use lazy_collection::{
    BatchEvent, BatchRange, BatchState, LazyCollectionOptions, SourceCollection, VirtualCollection,
};

use crate::{AppendError, Row, VecSource, chain_callbacks, event_channel};

/// A collection shared between the loader and its readers.
pub type SharedCollection = Arc<VirtualCollection<Arc<VecSource>>>;

/// Counters describing what a [`BatchLoader`] has done so far.
///
/// With `feature = "serde"`, this type implements `Serialize`/`Deserialize`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoaderStats {
    /// Load requests accepted for fetching.
    pub requested: u64,
    /// Load requests ignored because the batch was already in flight, buffered or loaded.
    pub duplicate_requests: u64,
    pub appended_batches: u64,
    pub failed: u64,
    pub invalidated: u64,
}

/// A framework-neutral loader that services a [`VirtualCollection`]'s load requests.
///
/// Readers share [`BatchLoader::collection`] and call `get` from any thread. The owner of the
/// loader drives it, typically once per frame or whenever the event channel wakes it:
/// - [`BatchLoader::pump`] fetches every pending batch synchronously
/// - or [`BatchLoader::poll_requests`] + [`BatchLoader::complete`]/[`BatchLoader::fail`] for
///   asynchronous fetches
///
/// Completed batches are appended to the [`VecSource`] strictly in order. A batch that finishes
/// before its predecessors is buffered until the gap is filled.
#[derive(Debug)]
pub struct BatchLoader {
    collection: SharedCollection,
    source: Arc<VecSource>,
    events: Receiver<BatchEvent>,
    queued: Vec<usize>,
    in_flight: BTreeSet<usize>,
    completed: BTreeMap<usize, Vec<Row>>,
    stats: LoaderStats,
    last_error: Option<String>,
}

impl BatchLoader {
    /// Creates a loader and the collection it serves.
    ///
    /// An `on_event` callback already present in `options` keeps receiving every event.
    pub fn new(source: Arc<VecSource>, mut options: LazyCollectionOptions) -> Self {
        let (forward, events) = event_channel();
        options.on_event = Some(match options.on_event.take() {
            Some(user) => chain_callbacks(user, forward),
            None => forward,
        });
        let collection = Arc::new(VirtualCollection::new(Arc::clone(&source), options));

        // A partially loaded source starts with the batch holding its first missing item
        // marked as requested. Nothing will emit a request for it, so fetch it ourselves.
        let mut queued = Vec::new();
        if let Some(batch) = collection.highest_requested_batch()
            && collection.batch_range(batch).is_some()
            && collection.batch_state(batch) == BatchState::Requested
        {
            queued.push(batch);
        }

        Self {
            collection,
            source,
            events,
            queued,
            in_flight: BTreeSet::new(),
            completed: BTreeMap::new(),
            stats: LoaderStats::default(),
            last_error: None,
        }
    }

    pub fn collection(&self) -> &SharedCollection {
        &self.collection
    }

    pub fn source(&self) -> &Arc<VecSource> {
        &self.source
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats
    }

    /// The message of the most recent failed fetch.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn in_flight(&self) -> impl Iterator<Item = usize> + '_ {
        self.in_flight.iter().copied()
    }

    /// Batches that completed but wait for an earlier batch before they can be appended.
    pub fn buffered(&self) -> impl Iterator<Item = usize> + '_ {
        self.completed.keys().copied()
    }

    pub fn is_idle(&self) -> bool {
        self.queued.is_empty() && self.in_flight.is_empty() && self.events.is_empty()
    }

    /// Drains the event channel and returns the batches that now need fetching.
    ///
    /// Each returned batch is marked in flight until [`BatchLoader::complete`] or
    /// [`BatchLoader::fail`] is called for it.
    pub fn poll_requests(&mut self) -> Vec<usize> {
        let mut out = Vec::new();
        for batch in std::mem::take(&mut self.queued) {
            self.accept(batch, &mut out);
        }
        while let Ok(event) = self.events.try_recv() {
            match event {
                BatchEvent::LoadRequest { batch } => self.accept(batch, &mut out),
                BatchEvent::InvalidateRange {
                    start_index,
                    end_index,
                } => self.invalidate(start_index, end_index, &mut out),
            }
        }
        out
    }

    /// Hands the rows fetched for `batch` to the loader.
    ///
    /// Rows are appended once every earlier batch is present. Completions for batches that are
    /// not in flight (e.g. rolled back in the meantime) are discarded.
    ///
    /// Returns the number of batches appended to the source by this call.
    pub fn complete(&mut self, batch: usize, rows: Vec<Row>) -> Result<usize, AppendError> {
        if !self.in_flight.remove(&batch) {
            atrace!(batch, "BatchLoader::complete: not in flight, discarded");
            return Ok(0);
        }
        if self.collection.batch_range(batch).is_none() {
            return Err(AppendError::UnknownBatch {
                batch,
                batch_count: self.collection.batch_count(),
            });
        }
        self.completed.insert(batch, rows);
        self.flush()
    }

    /// Reports that fetching `batch` failed and rolls the collection back.
    ///
    /// Returns whether the rollback took effect (see [`VirtualCollection::rollback_batch`]).
    pub fn fail(&mut self, batch: usize) -> bool {
        // Cleared before the rollback: readers may claim the batch again as soon as the cursor
        // moves.
        self.in_flight.remove(&batch);
        self.completed.remove(&batch);
        self.stats.failed += 1;
        self.collection.rollback_batch(batch)
    }

    /// Fetches every pending batch with `fetch` and applies the results.
    ///
    /// A fetch error rolls the batch back; the batch is requested again the next time a reader
    /// touches it. Returns the number of batches appended to the source.
    pub fn pump<E: fmt::Display>(
        &mut self,
        mut fetch: impl FnMut(BatchRange) -> Result<Vec<Row>, E>,
    ) -> Result<usize, AppendError> {
        let mut appended = 0usize;
        for batch in self.poll_requests() {
            let Some(range) = self.collection.batch_range(batch) else {
                // Pulled past `items_count`: there is nothing to fetch.
                self.in_flight.remove(&batch);
                continue;
            };
            match fetch(range) {
                Ok(rows) => appended += self.complete(batch, rows)?,
                Err(err) => {
                    let message = err.to_string();
                    awarn!(batch, error = %message, "BatchLoader::pump: fetch failed");
                    self.last_error = Some(message);
                    self.fail(batch);
                }
            }
        }
        Ok(appended)
    }

    /// Tells the loader which logical rows a view is showing (`start..end`).
    ///
    /// Requests every batch up to `end + prefetch`. When the view sits on the loaded tail and
    /// every requested batch has arrived, the next batch is pulled explicitly.
    ///
    /// Returns the number of batches requested.
    pub fn on_visible_range(&self, start: usize, end: usize, prefetch: usize) -> usize {
        let c = &self.collection;
        let len = c.len();
        if start >= end || len == 0 {
            return 0;
        }
        let horizon = end.saturating_add(prefetch).min(len) - 1;
        let mut requested = c.request_through(horizon);

        let settled = c
            .highest_requested_batch()
            .is_none_or(|b| c.batch_state(b) == BatchState::Fulfilled);
        if requested == 0 && settled && end >= c.loaded_len() && c.can_load_more() {
            let next = c.highest_requested_batch().map_or(0, |b| b + 1);
            if c.batch_range(next).is_some() {
                c.load_more();
                requested += 1;
            }
        }
        requested
    }

    fn accept(&mut self, batch: usize, out: &mut Vec<usize>) {
        if self.in_flight.contains(&batch)
            || self.completed.contains_key(&batch)
            || self.collection.batch_state(batch) == BatchState::Fulfilled
        {
            atrace!(batch, "BatchLoader: duplicate request");
            self.stats.duplicate_requests += 1;
            return;
        }
        self.in_flight.insert(batch);
        self.stats.requested += 1;
        out.push(batch);
    }

    /// Drops loader state for the batches of a rolled-back range.
    ///
    /// The cursor is rewound before the event is sent, so a reader may already have claimed a
    /// batch again and its `LoadRequest` may have been drained ahead of this event. A batch that
    /// is in flight and requested again is left alone; one that lost its buffered rows but is
    /// requested again is re-accepted so it cannot stall.
    fn invalidate(&mut self, start_index: usize, end_index: usize, out: &mut Vec<usize>) {
        let batch_size = self.collection.batch_size();
        let first = start_index / batch_size;
        let last = end_index / batch_size;
        for batch in first..=last {
            let requested = self.collection.batch_state(batch) == BatchState::Requested;
            if requested && self.in_flight.contains(&batch) {
                continue;
            }
            self.in_flight.remove(&batch);
            self.completed.remove(&batch);
            if requested {
                self.accept(batch, out);
            }
        }
        self.stats.invalidated += 1;
    }

    fn flush(&mut self) -> Result<usize, AppendError> {
        let batch_size = self.collection.batch_size();
        let mut appended = 0usize;
        loop {
            let len = self.source.len();
            let batch = len / batch_size;
            let Some(rows) = self.completed.remove(&batch) else {
                break;
            };
            // The source may already hold the head of this batch.
            let skip = len - batch * batch_size;
            self.source.append_at(len, rows.into_iter().skip(skip))?;
            appended += 1;
            self.stats.appended_batches += 1;
        }
        Ok(appended)
    }
}
