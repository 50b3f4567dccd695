use core::sync::atomic::{AtomicIsize, Ordering};

const NONE_REQUESTED: isize = -1;

/// The "highest batch requested so far" counter.
///
/// Every batch id `<= current()` has been requested (or rolled back and not yet re-requested);
/// no batch id above it has. All updates are single compare-and-swap steps, so a batch id is
/// handed out to at most one caller per advance of the cursor.
#[derive(Debug)]
pub struct BatchCursor {
    highest: AtomicIsize,
}

impl BatchCursor {
    pub fn new(highest_requested: Option<usize>) -> Self {
        Self {
            highest: AtomicIsize::new(encode(highest_requested)),
        }
    }

    /// Initial cursor for a source that already holds `source_len` items.
    ///
    /// An empty source starts with nothing requested; otherwise the batch containing
    /// `source_len` (the first missing index) counts as requested.
    pub fn from_source_len(source_len: usize, batch_size: usize) -> Self {
        debug_assert!(batch_size > 0, "batch_size must be non-zero");
        if source_len == 0 {
            Self::new(None)
        } else {
            Self::new(Some(source_len / batch_size))
        }
    }

    pub fn current(&self) -> Option<usize> {
        decode(self.highest.load(Ordering::Acquire))
    }

    /// Returns `true` if `batch` is at or below the cursor.
    pub fn is_requested(&self, batch: usize) -> bool {
        self.highest.load(Ordering::Acquire) >= encode(Some(batch))
    }

    /// Advances the cursor up to and including `needed`, one batch at a time.
    ///
    /// `emit` is called once for every batch id this caller successfully claimed, in increasing
    /// order. Callers that lose a race for a given id emit nothing for it. Returns the number of
    /// batches claimed.
    pub fn claim_through(&self, needed: usize, mut emit: impl FnMut(usize)) -> usize {
        let target = encode(Some(needed));
        let mut claimed = 0usize;
        let mut cur = self.highest.load(Ordering::Acquire);
        while cur < target {
            let next = cur + 1;
            match self
                .highest
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    claimed += 1;
                    emit(next as usize);
                    cur = next;
                }
                Err(actual) => cur = actual,
            }
        }
        claimed
    }

    /// Unconditionally claims the batch after the cursor and returns its id.
    pub fn claim_next(&self) -> usize {
        let prev = self.highest.fetch_add(1, Ordering::AcqRel);
        (prev + 1) as usize
    }

    /// Rewinds the cursor to `batch - 1` if `batch` is at or below it.
    ///
    /// Returns `false` (and changes nothing) for a stale rollback, i.e. when `batch` is already
    /// above the cursor.
    pub fn rollback(&self, batch: usize) -> bool {
        let batch = encode(Some(batch));
        let mut cur = self.highest.load(Ordering::Acquire);
        loop {
            if batch > cur {
                return false;
            }
            match self.highest.compare_exchange_weak(
                cur,
                batch - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }
}

impl Default for BatchCursor {
    fn default() -> Self {
        Self::new(None)
    }
}

fn encode(batch: Option<usize>) -> isize {
    match batch {
        Some(b) => isize::try_from(b).unwrap_or(isize::MAX),
        None => NONE_REQUESTED,
    }
}

fn decode(raw: isize) -> Option<usize> {
    usize::try_from(raw).ok()
}
