use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lazy_collection::{AttributeKey, AttributeSchema, BatchRange, LazyCollectionOptions};
use lazy_collection_adapter::{BatchLoader, Row, VecSource};

const NAME: AttributeKey = AttributeKey(0);

fn fetch(range: BatchRange) -> Result<Vec<Row>, String> {
    // Simulate a flaky backend: batch 3 fails on its first attempt.
    static FAILED_ONCE: AtomicBool = AtomicBool::new(false);
    if range.batch == 3 && !FAILED_ONCE.swap(true, Ordering::Relaxed) {
        return Err(format!(
            "timeout fetching rows {}..{}",
            range.start_index, range.end_index
        ));
    }
    Ok((range.start_index..range.end_index)
        .map(|i| Row::new().with(NAME, format!("contact #{i}")))
        .collect())
}

fn main() {
    let source = Arc::new(VecSource::new(AttributeSchema::new().with(NAME, "name")));
    let mut loader = BatchLoader::new(source, LazyCollectionOptions::new(95, 20));
    let c = Arc::clone(loader.collection());
    let pending = c.pending_key();

    // A view shows rows 0..15 and prefetches one screen ahead.
    loader.on_visible_range(0, 15, 15);
    loader.pump(fetch).unwrap();
    println!("loaded={} row 3={:?}", c.loaded_len(), c.get(3, NAME));

    // The user flings to the bottom.
    loader.on_visible_range(80, 95, 15);
    loader.pump(fetch).unwrap();
    println!(
        "loaded={} last_error={:?} row 90 pending={:?}",
        c.loaded_len(),
        loader.last_error(),
        c.get(90, pending)
    );

    // The view repaints; the failed batch is requested again.
    loader.on_visible_range(80, 95, 15);
    loader.pump(fetch).unwrap();
    println!(
        "loaded={} row 94={:?} stats={:?}",
        c.loaded_len(),
        c.get(94, NAME),
        loader.stats()
    );
}
