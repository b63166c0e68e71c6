//! The Transition Table (spec §4.1): the process-wide map from region name
//! to its in-flight state, mirrored into the coordination service under the
//! same lock. This is the outermost lock in the manager (spec §5's lock
//! ordering discipline): no other manager lock may be acquired while
//! holding it, except the preferred-assignment lock.

use crate::bytekey::RegionName;
use crate::coordination::{CoordinationService, EventKind, RegionTransitionEventData};
use crate::region::{RegionState, RegionStateRecord};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub struct TransitionTable {
    // BTreeMap keyed by RegionName keeps iteration in unsigned-lexicographic
    // name order, which the assignment engine's candidate scan depends on
    // (spec §4.3 step 1.4: "iterate transition entries in name order").
    entries: Mutex<BTreeMap<RegionName, Arc<RegionStateRecord>>>,
    coordination: Arc<dyn CoordinationService>,
}

impl TransitionTable {
    pub fn new(coordination: Arc<dyn CoordinationService>) -> Self {
        TransitionTable {
            entries: Mutex::new(BTreeMap::new()),
            coordination,
        }
    }

    /// Insert or replace the record for `name`. If its state is UNASSIGNED,
    /// write (or refresh) the mirror node with an OFFLINE payload, matching
    /// every transition into UNASSIGNED per spec §3.
    pub fn put(&self, name: RegionName, record: Arc<RegionStateRecord>, sender: &str) {
        if record.state() == RegionState::Unassigned {
            self.coordination.upsert(
                &name.short_name(),
                RegionTransitionEventData::new(EventKind::Offline, sender),
            );
        }
        self.entries.lock().unwrap().insert(name, record);
    }

    /// Remove `name`'s entry and delete its mirror node -- every transition
    /// out of the table does both (spec §3).
    pub fn remove(&self, name: &RegionName) -> Option<Arc<RegionStateRecord>> {
        self.coordination.delete(&name.short_name());
        self.entries.lock().unwrap().remove(name)
    }

    /// `removeRegion` (spec §3): `CLOSED -> ∅`. Deletes the entry and its
    /// mirror node; if the removed record was not marked offline, the
    /// region is immediately re-created in UNASSIGNED so it gets picked up
    /// by the next candidate scan instead of vanishing from the table.
    pub fn remove_region(&self, name: &RegionName, sender: &str) {
        let removed = self.remove(name);
        if let Some(record) = removed {
            if !record.is_offline() {
                let fresh = Arc::new(RegionStateRecord::new_unassigned(record.info.clone()));
                self.put(name.clone(), fresh, sender);
            }
        }
    }

    pub fn contains(&self, name: &RegionName) -> bool {
        self.entries.lock().unwrap().contains_key(name)
    }

    pub fn get(&self, name: &RegionName) -> Option<Arc<RegionStateRecord>> {
        self.entries.lock().unwrap().get(name).cloned()
    }

    /// Writes the mirror node for an OFFLINE region that is about to be
    /// handed out for PENDING_OPEN. Open Question (c): this uses the
    /// OFFLINE event kind even though the region is moving to PENDING_OPEN
    /// -- "master has cleared the region, any server may claim it" -- and
    /// must stay that way for compatibility with region-server-side
    /// handlers.
    pub fn mark_offline_for_claim(&self, name: &RegionName, sender: &str) {
        self.coordination.upsert(
            &name.short_name(),
            RegionTransitionEventData::new(EventKind::Offline, sender),
        );
    }

    /// A consistent point-in-time copy, ordered by region name.
    pub fn snapshot(&self) -> Vec<(RegionName, Arc<RegionStateRecord>)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytekey::{RowKey, TableName};
    use crate::coordination::InMemoryCoordinationService;
    use crate::region::RegionInfo;

    fn region(id: u64) -> RegionInfo {
        RegionInfo::new(TableName(b"t".to_vec()), RowKey(b"a".to_vec()), id)
    }

    #[test]
    fn put_unassigned_writes_mirror_and_remove_deletes_it() {
        let zk = Arc::new(InMemoryCoordinationService::new());
        let table = TransitionTable::new(zk.clone());
        let info = region(1);
        let name = info.name();
        let record = Arc::new(RegionStateRecord::new_unassigned(info));

        table.put(name.clone(), record, "master");
        assert!(table.contains(&name));
        assert!(zk.get(&name.short_name()).is_some());

        table.remove(&name);
        assert!(!table.contains(&name));
        assert!(zk.get(&name.short_name()).is_none());
    }

    #[test]
    fn remove_region_recreates_unassigned_when_not_offline() {
        let zk = Arc::new(InMemoryCoordinationService::new());
        let table = TransitionTable::new(zk.clone());
        let info = region(1);
        let name = info.name();
        let record = Arc::new(RegionStateRecord::new_unassigned(info));
        record.assign_pending_open(crate::server::ServerName::new("s1", 1)).unwrap();
        record.confirm_open().unwrap();
        record.begin_close(crate::server::ServerName::new("s1", 1), false).unwrap();
        record.close_delivered().unwrap();
        record.confirm_closed().unwrap();
        table.put(name.clone(), record, "master");

        table.remove_region(&name, "master");

        let reborn = table.get(&name).unwrap();
        assert_eq!(reborn.state(), RegionState::Unassigned);
        assert!(zk.get(&name.short_name()).is_some());
    }

    #[test]
    fn remove_region_stays_gone_when_offline() {
        let zk = Arc::new(InMemoryCoordinationService::new());
        let table = TransitionTable::new(zk.clone());
        let info = region(2);
        let name = info.name();
        let record = Arc::new(RegionStateRecord::new_unassigned(info));
        record.assign_pending_open(crate::server::ServerName::new("s1", 1)).unwrap();
        record.confirm_open().unwrap();
        record.begin_close(crate::server::ServerName::new("s1", 1), true).unwrap();
        record.close_delivered().unwrap();
        record.confirm_closed().unwrap();
        table.put(name.clone(), record, "master");

        table.remove_region(&name, "master");

        assert!(table.get(&name).is_none());
        assert!(zk.get(&name.short_name()).is_none());
    }

    #[test]
    fn snapshot_is_ordered_by_name() {
        let zk = Arc::new(InMemoryCoordinationService::new());
        let table = TransitionTable::new(zk);
        for id in [3u64, 1, 2] {
            let info = region(id);
            let name = info.name();
            table.put(name, Arc::new(RegionStateRecord::new_unassigned(info)), "m");
        }
        let names: Vec<_> = table.snapshot().into_iter().map(|(n, _)| n).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
