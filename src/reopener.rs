//! Throttled Reopener Registry (spec §4.7): coalesces a burst of region
//! closures after a schema change into a single throttled reopen pass per
//! table, rather than flooding every region server at once.

use crate::bytekey::{RegionName, TableName};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One table's in-progress reopen: the regions still awaiting
/// confirmation, throttled at `batch_size` in flight at a time.
struct ReopenerHandle {
    pending: HashSet<RegionName>,
    in_flight: HashSet<RegionName>,
    batch_size: usize,
    cancelled: AtomicBool,
}

impl ReopenerHandle {
    fn new(regions: impl IntoIterator<Item = RegionName>, batch_size: usize) -> Self {
        use itertools::Itertools;
        ReopenerHandle {
            // Sorted + deduped so a caller handing over an unordered,
            // possibly-overlapping region list still gets a deterministic
            // batch order (no region counted twice).
            pending: regions.into_iter().sorted().dedup().collect(),
            in_flight: HashSet::new(),
            batch_size: batch_size.max(1),
            cancelled: AtomicBool::new(false),
        }
    }

    fn next_batch(&mut self) -> Vec<RegionName> {
        let room = self.batch_size.saturating_sub(self.in_flight.len());
        let batch: Vec<RegionName> = self.pending.iter().take(room).cloned().collect();
        for name in &batch {
            self.pending.remove(name);
            self.in_flight.insert(name.clone());
        }
        batch
    }

    fn is_done(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}

/// `HashMap<TableName, ReopenerHandle>` behind a single lock (spec §4.7).
#[derive(Default)]
pub struct ReopenerRegistry {
    handles: Mutex<HashMap<TableName, ReopenerHandle>>,
}

impl ReopenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(ReopenerRegistry::default())
    }

    /// Start (or no-op if already in progress) a throttled reopen of every
    /// region in `regions` for `table`. Idempotent per spec §4.7: a second
    /// call for a table already being reopened does nothing.
    pub fn create(&self, table: TableName, regions: impl IntoIterator<Item = RegionName>, batch_size: usize) -> Vec<RegionName> {
        let mut handles = self.handles.lock().unwrap();
        if handles.contains_key(&table) {
            return Vec::new();
        }
        let mut handle = ReopenerHandle::new(regions, batch_size);
        let batch = handle.next_batch();
        handles.insert(table, handle);
        batch
    }

    pub fn is_reopening(&self, table: &TableName) -> bool {
        self.handles.lock().unwrap().contains_key(table)
    }

    /// A region server has confirmed `region` reopened; move it out of
    /// flight and release the next batch slot, if any (spec §4.7). Returns
    /// the newly released batch, which may be empty if nothing is pending
    /// or the table's reopen is already finished.
    pub fn notify_region_reopened(&self, table: &TableName, region: &RegionName) -> Vec<RegionName> {
        let mut handles = self.handles.lock().unwrap();
        let Some(handle) = handles.get_mut(table) else {
            return Vec::new();
        };
        handle.in_flight.remove(region);
        if handle.cancelled.load(Ordering::SeqCst) || handle.is_done() {
            handles.remove(table);
            return Vec::new();
        }
        let batch = handle.next_batch();
        if handle.is_done() {
            handles.remove(table);
        }
        batch
    }

    /// Abandon `table`'s in-progress reopen, e.g. because the table was
    /// disabled mid-flight (spec §4.7).
    pub fn delete(&self, table: &TableName) {
        if let Some(handle) = self.handles.lock().unwrap().get(table) {
            handle.cancelled.store(true, Ordering::SeqCst);
        }
        self.handles.lock().unwrap().remove(table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: u64) -> RegionName {
        RegionName(format!("t,,{}", id).into_bytes())
    }

    #[test]
    fn create_is_idempotent_while_in_progress() {
        let registry = ReopenerRegistry::new();
        let table = TableName(b"t".to_vec());
        let first = registry.create(table.clone(), vec![region(1), region(2), region(3)], 2);
        assert_eq!(first.len(), 2);
        assert!(registry.is_reopening(&table));

        let second = registry.create(table.clone(), vec![region(9)], 2);
        assert!(second.is_empty());
    }

    #[test]
    fn confirmation_releases_next_batch_then_finishes() {
        let registry = ReopenerRegistry::new();
        let table = TableName(b"t".to_vec());
        let first = registry.create(table.clone(), vec![region(1), region(2), region(3)], 2);
        assert_eq!(first.len(), 2);

        let released = registry.notify_region_reopened(&table, &first[0]);
        assert_eq!(released.len(), 1);
        assert!(registry.is_reopening(&table));

        let remaining: Vec<RegionName> = first.into_iter().skip(1).chain(released).collect();
        for name in &remaining {
            registry.notify_region_reopened(&table, name);
        }
        assert!(!registry.is_reopening(&table));
    }
}
