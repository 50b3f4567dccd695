use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use lazy_collection::{
    AttributeKey, AttributeSchema, BatchEvent, LazyCollectionOptions, SourceCollection, Value,
    VirtualCollection,
};

const TITLE: AttributeKey = AttributeKey(0);

/// A source whose rows are derived from their index; only the length grows.
struct Numbers {
    len: AtomicUsize,
}

impl SourceCollection for Numbers {
    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    fn attribute_schema(&self) -> AttributeSchema {
        AttributeSchema::new().with(TITLE, "title")
    }

    fn read(&self, index: usize, _key: AttributeKey) -> Option<Value> {
        Some(Value::Text(format!("row #{index}")))
    }
}

fn main() {
    let source = Arc::new(Numbers {
        len: AtomicUsize::new(25),
    });
    let requests = Arc::new(Mutex::new(Vec::new()));

    let opts = LazyCollectionOptions::new(100, 10).with_on_event(Some({
        let requests = Arc::clone(&requests);
        move |e: BatchEvent| requests.lock().unwrap().push(e)
    }));
    let c = VirtualCollection::new(Arc::clone(&source), opts);
    let pending = c.pending_key();

    println!("schema={:?}", c.attribute_schema().iter().collect::<Vec<_>>());
    println!("cursor={:?}", c.highest_requested_batch());

    // A view scrolls straight to row 55.
    println!(
        "row 55: value={:?} pending={:?}",
        c.get(55, TITLE),
        c.get(55, pending)
    );
    println!("events={:?}", requests.lock().unwrap());

    // The application fetched batches 2..=5 and appended them.
    source.len.store(60, Ordering::Release);
    println!(
        "row 55: value={:?} pending={:?}",
        c.get(55, TITLE),
        c.get(55, pending)
    );

    // Batch 6 fails to load.
    c.load_more();
    c.rollback_batch(6);
    println!("events={:?}", requests.lock().unwrap());
    println!("can_load_more={}", c.can_load_more());
}
