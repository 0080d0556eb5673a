use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::WorkItem;

/// Identity of a registered handle: the address of its shared allocation.
type HandleKey = usize;

fn handle_key(handle: &Arc<dyn WorkItem>) -> HandleKey {
    Arc::as_ptr(handle) as *const () as HandleKey
}

/// What the monitor has observed about one handle.  Only the poll pass flips `done` or
/// `errored`, and it flips at most one of them, once.
#[derive(Debug)]
struct TrackerRecord {
    start_time: Instant,
    declared_total: u64,
    label: Arc<str>,
    done: bool,
    errored: bool,
}

impl TrackerRecord {
    fn is_pending(&self) -> bool {
        !self.done && !self.errored
    }
}

#[derive(Debug)]
struct TrackedItem {
    handle: Arc<dyn WorkItem>,
    record: TrackerRecord,
}

/// A one-time change of a record from pending to a terminal state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Transition {
    Done { label: Arc<str>, total: u64, elapsed: Duration },
    Errored { label: Arc<str>, elapsed: Duration },
}

/// Side table of tracker records, kept in registration order so transitions found in the
/// same scan are reported in that order.
///
/// Not synchronized itself; the monitor keeps it behind its state lock.
#[derive(Debug, Default)]
pub(crate) struct TrackerRegistry {
    items: Vec<TrackedItem>,
    index: HashMap<HandleKey, usize>,
}

impl TrackerRegistry {
    /// Registering the same handle twice replaces the earlier record.
    pub fn register(&mut self, handle: Arc<dyn WorkItem>, declared_total: u64, label: Arc<str>) {
        let key = handle_key(&handle);
        debug_assert!(!self.index.contains_key(&key), "work item {label:?} registered twice");

        let item = TrackedItem {
            handle,
            record: TrackerRecord {
                start_time: Instant::now(),
                declared_total,
                label,
                done: false,
                errored: false,
            },
        };

        match self.index.get(&key) {
            Some(&i) => self.items[i] = item,
            None => {
                self.index.insert(key, self.items.len());
                self.items.push(item);
            },
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn len_active(&self) -> usize {
        self.items.iter().filter(|t| t.record.is_pending()).count()
    }

    pub fn len_done(&self) -> usize {
        self.items.iter().filter(|t| t.record.done).count()
    }

    pub fn len_errored(&self) -> usize {
        self.items.iter().filter(|t| t.record.errored).count()
    }

    /// Pending items that have not reported any progress yet.
    pub fn len_in_queue(&self) -> usize {
        self.items
            .iter()
            .filter(|t| t.record.is_pending() && t.handle.value() == 0)
            .count()
    }

    /// Checks every pending record against its handle and applies the transitions found.
    /// Completion wins over error when a handle reports both.
    pub fn scan(&mut self, now: Instant) -> Vec<Transition> {
        let mut transitions = Vec::new();

        for TrackedItem { handle, record } in self.items.iter_mut().filter(|t| t.record.is_pending()) {
            let elapsed = now.saturating_duration_since(record.start_time);

            if handle.is_done() {
                record.done = true;
                let total = match handle.total() {
                    0 => record.declared_total,
                    n => n,
                };
                transitions.push(Transition::Done {
                    label: record.label.clone(),
                    total,
                    elapsed,
                });
            } else if handle.is_errored() {
                record.errored = true;
                transitions.push(Transition::Errored {
                    label: record.label.clone(),
                    elapsed,
                });
            }
        }

        transitions
    }
}
