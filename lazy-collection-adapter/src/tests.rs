use crate::*;

use std::sync::{Arc, Mutex, OnceLock, Weak};

use lazy_collection::{
    AttributeKey, AttributeSchema, BatchEvent, BatchRange, LazyCollectionOptions,
    SourceCollection, Value, VirtualCollection,
};

const ID: AttributeKey = AttributeKey(0);
const LABEL: AttributeKey = AttributeKey(1);

fn schema() -> AttributeSchema {
    AttributeSchema::new().with(ID, "id").with(LABEL, "label")
}

fn row(i: usize) -> Row {
    Row::new()
        .with(ID, i as i64)
        .with(LABEL, format!("row {i}"))
}

fn rows(range: BatchRange) -> Vec<Row> {
    (range.start_index..range.end_index).map(row).collect()
}

fn ok_rows(range: BatchRange) -> Result<Vec<Row>, String> {
    Ok(rows(range))
}

fn loader(preloaded: usize, items_count: usize, batch_size: usize) -> BatchLoader {
    let source = Arc::new(VecSource::with_rows(
        schema(),
        (0..preloaded).map(row).collect(),
    ));
    BatchLoader::new(source, LazyCollectionOptions::new(items_count, batch_size))
}

#[test]
fn vec_source_rejects_gaps() {
    let source = VecSource::new(schema());
    assert_eq!(source.append_at(0, [row(0), row(1)]), Ok(2));
    assert_eq!(
        source.append_at(5, [row(5)]),
        Err(AppendError::NonContiguous {
            start_index: 5,
            len: 2,
        })
    );
    assert_eq!(source.len(), 2);
    assert_eq!(source.read(1, ID), Some(Value::Int(1)));
    assert_eq!(source.read(1, AttributeKey(9)), None);
    assert_eq!(source.read(2, ID), None);

    source.truncate(1);
    assert_eq!(source.len(), 1);
    assert_eq!(source.push_rows([row(1)]), 2);
}

#[test]
fn vec_source_schema_revision_changes_with_schema() {
    let source = VecSource::new(schema());
    assert_eq!(source.schema_revision(), Some(0));
    source.set_schema(schema().with(AttributeKey(5), "extra"));
    assert_eq!(source.schema_revision(), Some(1));
    assert_eq!(source.attribute_schema().get(AttributeKey(5)), Some("extra"));
}

#[test]
fn collection_sees_schema_updates_through_revision() {
    let l = loader(0, 10, 5);
    let c = Arc::clone(l.collection());
    assert_eq!(c.attribute_schema().len(), 3);

    l.source().set_schema(schema().with(AttributeKey(3), "late"));
    let merged = c.attribute_schema();
    assert_eq!(merged.get(AttributeKey(3)), Some("late"));
}

#[test]
fn event_channel_forwards_events() {
    let (callback, rx) = event_channel();
    callback(BatchEvent::LoadRequest { batch: 4 });
    assert_eq!(rx.try_recv(), Ok(BatchEvent::LoadRequest { batch: 4 }));
    assert!(rx.try_recv().is_err());
}

#[test]
fn pump_fulfills_pending_reads() {
    let mut l = loader(0, 35, 10);
    let c = Arc::clone(l.collection());

    assert_eq!(c.get(25, ID), None);
    assert_eq!(l.pump(ok_rows), Ok(3));
    assert_eq!(c.loaded_len(), 30);
    assert_eq!(c.get(25, ID), Some(Value::Int(25)));
    assert_eq!(c.get(25, c.pending_key()), Some(Value::Bool(false)));

    c.get(34, ID);
    assert_eq!(l.pump(ok_rows), Ok(1));
    assert_eq!(c.loaded_len(), 35);
    assert!(!c.can_load_more());
    assert!(l.is_idle());
    assert_eq!(l.stats().requested, 4);
    assert_eq!(l.stats().appended_batches, 4);
}

#[test]
fn out_of_order_completions_are_buffered() {
    let mut l = loader(0, 40, 10);
    let c = Arc::clone(l.collection());
    c.get(25, ID);
    assert_eq!(l.poll_requests(), [0, 1, 2]);

    let range = |b| c.batch_range(b).unwrap();
    assert_eq!(l.complete(2, rows(range(2))), Ok(0));
    assert_eq!(l.complete(1, rows(range(1))), Ok(0));
    assert_eq!(l.buffered().collect::<Vec<_>>(), [1, 2]);
    assert_eq!(c.loaded_len(), 0);

    assert_eq!(l.complete(0, rows(range(0))), Ok(3));
    assert_eq!(c.loaded_len(), 30);
    assert_eq!(c.get(29, LABEL), Some(Value::from("row 29")));
    assert_eq!(l.buffered().count(), 0);
}

#[test]
fn failed_batch_is_rolled_back_and_retried() {
    let mut l = loader(0, 40, 10);
    let c = Arc::clone(l.collection());
    c.get(25, ID);

    let appended = l.pump(|range: BatchRange| {
        if range.batch == 1 {
            Err("connection reset")
        } else {
            Ok(rows(range))
        }
    });
    assert_eq!(appended, Ok(1));
    assert_eq!(c.loaded_len(), 10);
    assert_eq!(c.highest_requested_batch(), Some(0));
    assert_eq!(l.last_error(), Some("connection reset"));
    assert_eq!(l.buffered().collect::<Vec<_>>(), [2]);

    // The reader comes back to the same row; batch 2 is already buffered.
    c.get(25, ID);
    assert_eq!(l.pump(ok_rows), Ok(2));
    assert_eq!(c.loaded_len(), 30);
    assert_eq!(l.stats().failed, 1);
    assert_eq!(l.stats().invalidated, 1);
    // Batch 1 is re-accepted by the invalidation, so both queued requests are duplicates.
    assert_eq!(l.stats().duplicate_requests, 2);
}

#[test]
fn completion_after_rollback_is_discarded() {
    let mut l = loader(0, 40, 10);
    let c = Arc::clone(l.collection());
    c.get(5, ID);
    assert_eq!(l.poll_requests(), [0]);

    // Someone else reports the failure before the fetch returns.
    assert!(c.rollback_batch(0));
    assert!(l.poll_requests().is_empty());

    let range = c.batch_range(0).unwrap();
    assert_eq!(l.complete(0, rows(range)), Ok(0));
    assert_eq!(c.loaded_len(), 0);
}

#[test]
fn partially_loaded_source_fetches_its_open_batch() {
    let mut l = loader(25, 40, 10);
    let c = Arc::clone(l.collection());
    assert_eq!(c.highest_requested_batch(), Some(2));

    assert_eq!(l.pump(ok_rows), Ok(1));
    assert_eq!(c.loaded_len(), 30);
    assert_eq!(c.get(27, ID), Some(Value::Int(27)));
}

#[test]
fn visible_range_prefetches_ahead() {
    let mut l = loader(0, 100, 10);
    let c = Arc::clone(l.collection());

    assert_eq!(l.on_visible_range(0, 12, 10), 3);
    assert_eq!(c.highest_requested_batch(), Some(2));
    assert_eq!(l.on_visible_range(0, 12, 10), 0);
    assert_eq!(l.pump(ok_rows), Ok(3));
}

#[test]
fn visible_range_pulls_at_loaded_tail() {
    let mut l = loader(0, 30, 10);
    let c = Arc::clone(l.collection());
    c.load_more();
    l.pump(ok_rows).unwrap();
    assert_eq!(c.loaded_len(), 10);

    // Showing rows 0..10 with no prefetch touches nothing unloaded.
    assert_eq!(l.on_visible_range(0, 10, 0), 1);
    assert_eq!(c.highest_requested_batch(), Some(1));
    // Batch 1 is still outstanding: no second pull.
    assert_eq!(l.on_visible_range(0, 10, 0), 0);

    l.pump(ok_rows).unwrap();
    assert_eq!(l.on_visible_range(0, 20, 0), 1);
    l.pump(ok_rows).unwrap();
    assert_eq!(c.loaded_len(), 30);
    assert_eq!(l.on_visible_range(0, 30, 0), 0);
}

#[test]
fn user_callback_still_sees_events() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let options = LazyCollectionOptions::new(20, 10).with_on_event(Some({
        let seen = Arc::clone(&seen);
        move |e: BatchEvent| seen.lock().unwrap().push(e)
    }));
    let mut l = BatchLoader::new(Arc::new(VecSource::new(schema())), options);

    l.collection().get(3, ID);
    assert_eq!(l.poll_requests(), [0]);
    assert_eq!(
        *seen.lock().unwrap(),
        [BatchEvent::LoadRequest { batch: 0 }]
    );
}

#[test]
fn concurrent_readers_with_one_loader() {
    let mut l = loader(0, 500, 25);
    let c = Arc::clone(l.collection());

    std::thread::scope(|s| {
        for t in 0..4usize {
            let c = &c;
            s.spawn(move || {
                for i in (t..500).step_by(7) {
                    c.get(i, ID);
                }
            });
        }
    });

    assert_eq!(l.pump(ok_rows), Ok(20));
    assert_eq!(c.loaded_len(), 500);
    assert_eq!(l.stats().duplicate_requests, 0);
    for i in [0, 250, 499] {
        assert_eq!(c.get(i, ID), Some(Value::Int(i as i64)));
    }
}

/// A loader whose event hook reads the first row of every invalidated range, so the batch is
/// claimed again before the loader sees the invalidation.
fn reclaiming_loader(items_count: usize, batch_size: usize) -> BatchLoader {
    type Slot = OnceLock<Weak<VirtualCollection<Arc<VecSource>>>>;
    let slot: Arc<Slot> = Arc::default();
    let options = LazyCollectionOptions::new(items_count, batch_size).with_on_event(Some({
        let slot = Arc::clone(&slot);
        move |e: BatchEvent| {
            if let BatchEvent::InvalidateRange { start_index, .. } = e
                && let Some(c) = slot.get().and_then(Weak::upgrade)
            {
                c.get(start_index, ID);
            }
        }
    }));
    let l = BatchLoader::new(Arc::new(VecSource::new(schema())), options);
    assert!(slot.set(Arc::downgrade(l.collection())).is_ok());
    l
}

#[test]
fn batch_reclaimed_before_invalidation_still_loads() {
    let mut l = reclaiming_loader(20, 10);
    let c = Arc::clone(l.collection());
    c.get(5, ID);

    assert_eq!(l.pump(|_: BatchRange| Err::<Vec<Row>, _>("timeout")), Ok(0));
    assert_eq!(c.highest_requested_batch(), Some(0));

    assert_eq!(l.pump(ok_rows), Ok(1));
    assert_eq!(c.loaded_len(), 10);
    assert_eq!(c.get(5, ID), Some(Value::Int(5)));
    assert_eq!(l.in_flight().count(), 0);
}

#[test]
fn buffered_batch_reclaimed_before_invalidation_is_fetched_again() {
    let mut l = reclaiming_loader(30, 10);
    let c = Arc::clone(l.collection());
    c.get(15, ID);
    assert_eq!(l.poll_requests(), [0, 1]);

    let range = |b| c.batch_range(b).unwrap();
    assert_eq!(l.complete(1, rows(range(1))), Ok(0));
    assert!(c.rollback_batch(1));
    assert_eq!(c.highest_requested_batch(), Some(1));

    assert_eq!(l.poll_requests(), [1]);
    assert_eq!(l.buffered().count(), 0);
    assert_eq!(l.complete(0, rows(range(0))), Ok(1));
    assert_eq!(l.complete(1, rows(range(1))), Ok(1));
    assert_eq!(c.loaded_len(), 20);
}
