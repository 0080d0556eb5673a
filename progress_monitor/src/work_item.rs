use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use more_asserts::debug_assert_le;

/// The read-only view the monitor has of one externally driven operation.
///
/// Every method is a point-in-time snapshot; the monitor queries them once per scan and
/// never mutates the item.
pub trait WorkItem: Debug + Send + Sync {
    /// Expected size in bytes; zero when unknown.
    fn total(&self) -> u64;

    /// Cumulative progress reported so far.
    fn value(&self) -> u64;

    fn is_done(&self) -> bool;

    fn is_errored(&self) -> bool;
}

const PENDING: u8 = 0;
const DONE: u8 = 1;
const ERRORED: u8 = 2;

/// A ready-made lock-free work item that transfer tasks can update from any thread.
///
/// Reaching a positive total through `increment` or `set_value` marks the tracker done.
/// Once done or errored, the tracker ignores the other terminal mark.
#[derive(Debug, Default)]
pub struct Tracker {
    total: AtomicU64,
    value: AtomicU64,
    // PENDING, DONE or ERRORED; only ever leaves PENDING once.
    state: AtomicU8,
}

impl Tracker {
    pub fn new(total: u64) -> Arc<Self> {
        Arc::new(Self {
            total: total.into(),
            ..Default::default()
        })
    }

    pub fn increment(&self, n_bytes: u64) {
        if self.is_finished() {
            return;
        }
        let value = self.value.fetch_add(n_bytes, Ordering::Relaxed) + n_bytes;
        self.complete_if_full(value);
    }

    pub fn set_value(&self, value: u64) {
        if self.is_finished() {
            return;
        }
        self.value.store(value, Ordering::Relaxed);
        self.complete_if_full(value);
    }

    /// Sets the total once the size becomes known.  Totals only grow.
    pub fn update_total(&self, total: u64) {
        let old_total = self.total.swap(total, Ordering::Relaxed);
        debug_assert_le!(old_total, total);
    }

    pub fn mark_as_done(&self) {
        self.finish(DONE);
    }

    pub fn mark_as_errored(&self) {
        self.finish(ERRORED);
    }

    fn finish(&self, terminal: u8) {
        let _ = self
            .state
            .compare_exchange(PENDING, terminal, Ordering::AcqRel, Ordering::Acquire);
    }

    fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) != PENDING
    }

    fn complete_if_full(&self, value: u64) {
        let total = self.total.load(Ordering::Relaxed);
        if total > 0 && value >= total {
            self.mark_as_done();
        }
    }
}

impl WorkItem for Tracker {
    fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }

    fn is_errored(&self) -> bool {
        self.state.load(Ordering::Acquire) == ERRORED
    }
}
