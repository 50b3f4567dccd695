use std::sync::Arc;

use crossbeam_channel::{Receiver, unbounded};
use lazy_collection::{BatchEvent, EventCallback};

/// Creates an event callback that forwards every [`BatchEvent`] into a channel.
///
/// The callback never blocks, so it is safe to hand to a collection that is read from UI or
/// worker threads. Events sent after the receiver is dropped are discarded.
pub fn event_channel() -> (EventCallback, Receiver<BatchEvent>) {
    let (tx, rx) = unbounded();
    let callback: EventCallback = Arc::new(move |event: BatchEvent| {
        let _ = tx.send(event);
    });
    (callback, rx)
}

/// Combines two callbacks; `first` sees every event before `second`.
pub fn chain_callbacks(first: EventCallback, second: EventCallback) -> EventCallback {
    Arc::new(move |event: BatchEvent| {
        first(event);
        second(event);
    })
}
