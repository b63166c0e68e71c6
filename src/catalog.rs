//! Catalog Tracking (spec §4.2): location of the root region, the set of
//! online meta regions ordered by start key, and the expected meta count.

use crate::bytekey::{RowKey, TableName, META_TABLE_PREFIX};
use crate::coordination::CoordinationService;
use crate::error::Error;
use crate::region::RegionInfo;
use crate::server::ServerName;
use atomic_refcell::AtomicRefCell;
use spin::RwLock as SpinRwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Reads dominate writes on the meta map (new meta regions come online
/// rarely; every user-region lookup reads it), so it's guarded by a
/// reader-writer lock rather than a plain mutex, per the design notes'
/// explicit call for that discipline (spec §9) -- the same reasoning
/// `scheduler::work_bucket`'s queue uses `spin::RwLock` for.
pub struct CatalogTracker {
    root_location: Mutex<Option<ServerName>>,
    online_meta_regions: SpinRwLock<BTreeMap<RowKey, (ServerName, RegionInfo)>>,
    number_of_meta_regions: AtomicUsize,
    shutdown_requested: AtomicBool,
    coordination: Arc<dyn CoordinationService>,
    /// When the root scanner last attempted to persist a new root
    /// location, for staleness diagnostics. Only the root-scanner thread
    /// ever writes this, so a single-writer cell is enough -- the same
    /// reasoning `global_state.rs` uses `AtomicRefCell` for `gc_start_time`.
    last_root_write_attempt: AtomicRefCell<Option<Instant>>,
}

impl CatalogTracker {
    pub fn new(coordination: Arc<dyn CoordinationService>) -> Self {
        CatalogTracker {
            root_location: Mutex::new(None),
            online_meta_regions: SpinRwLock::new(BTreeMap::new()),
            number_of_meta_regions: AtomicUsize::new(1),
            shutdown_requested: AtomicBool::new(false),
            coordination,
            last_root_write_attempt: AtomicRefCell::new(None),
        }
    }

    pub fn last_root_write_attempt(&self) -> Option<Instant> {
        *self.last_root_write_attempt.borrow()
    }

    /// Persist the root region's new address with bounded retries, then
    /// update the in-memory location. On exhaustion, requests master
    /// shutdown rather than silently losing track of root (spec §4.2 / §7).
    pub fn set_root_region_location(&self, server: ServerName, retries: u32) -> Result<(), Error> {
        *self.last_root_write_attempt.borrow_mut() = Some(Instant::now());
        match self.coordination.write_root_location(&server.address, retries) {
            Ok(()) => {
                *self.root_location.lock().unwrap() = Some(server);
                Ok(())
            }
            Err(err) => {
                self.shutdown_requested.store(true, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    pub fn root_region_location(&self) -> Option<ServerName> {
        self.root_location.lock().unwrap().clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Clears the in-memory root location. Per spec §4.2, this does *not*
    /// schedule reassignment by itself -- that's `reassign_root_region`'s
    /// job.
    pub fn unset_root_region(&self) {
        *self.root_location.lock().unwrap() = None;
    }

    pub fn put_meta_region_online(&self, start_key: RowKey, server: ServerName, info: RegionInfo) {
        self.online_meta_regions
            .write()
            .insert(start_key, (server, info));
    }

    pub fn offline_meta_region_with_start_key(&self, start_key: &RowKey) {
        self.online_meta_regions.write().remove(start_key);
    }

    pub fn set_number_of_meta_regions(&self, n: usize) {
        self.number_of_meta_regions.store(n, Ordering::SeqCst);
    }

    pub fn number_of_meta_regions(&self) -> usize {
        self.number_of_meta_regions.load(Ordering::SeqCst)
    }

    pub fn online_meta_region_count(&self) -> usize {
        self.online_meta_regions.read().len()
    }

    /// True while fewer meta regions are online than expected -- the
    /// "reassigning metas" condition that pauses user-region assignment
    /// (spec §3 / §4.3 step 3).
    pub fn is_reassigning_metas(&self) -> bool {
        self.online_meta_region_count() < self.number_of_meta_regions()
    }

    pub fn are_all_meta_regions_online(&self) -> bool {
        self.root_region_location().is_some() && !self.is_reassigning_metas()
    }

    /// Whether `server` currently hosts any online meta region -- used by
    /// the assignment engine to avoid double-hosting root and meta on the
    /// same server (spec §4.3 steps 2/3). Compares by address only (Open
    /// Question (a)): a server that restarted under a new start code but
    /// kept the same address still counts as hosting meta until the
    /// catalog is told otherwise.
    pub fn hosts_meta(&self, server: &ServerName) -> bool {
        self.online_meta_regions
            .read()
            .values()
            .any(|(s, _)| s.same_server_as(server))
    }

    /// Every online meta region currently recorded against `server`'s
    /// address, used by `offline_meta_server` to find what needs
    /// reassignment when a server is declared dead (spec §7).
    pub fn meta_regions_hosted_by(&self, server: &ServerName) -> Vec<(RowKey, RegionInfo)> {
        self.online_meta_regions
            .read()
            .iter()
            .filter(|(_, (s, _))| s.same_server_as(server))
            .map(|(k, (_, info))| (k.clone(), info.clone()))
            .collect()
    }

    /// The meta region whose start key is the greatest key <= `row`.
    /// Rows prefixed with `.META.,` are special-cased to route to ROOT
    /// instead (spec §4.2).
    pub fn get_meta_region_for_row(&self, row: &RowKey) -> Result<MetaLookup, Error> {
        if row.0.starts_with(META_TABLE_PREFIX) {
            return Ok(MetaLookup::Root);
        }
        if self.root_region_location().is_none() {
            return Err(Error::NotAllMetaRegionsOnline {
                reason: "root region location unknown",
            });
        }
        let meta = self.online_meta_regions.read();
        meta.range(..=row.clone())
            .next_back()
            .map(|(_, (server, info))| MetaLookup::Meta(server.clone(), info.clone()))
            .ok_or(Error::NotAllMetaRegionsOnline {
                reason: "no meta region covers this row",
            })
    }

    /// Floor-entry lookup by region name, with a single-entry fast path:
    /// when exactly one meta region is online, that one is returned
    /// regardless of key (spec §4.2).
    pub fn get_first_meta_region_for_region(&self, new_region: &RowKey) -> Option<(ServerName, RegionInfo)> {
        let meta = self.online_meta_regions.read();
        if meta.len() == 1 {
            return meta.values().next().cloned();
        }
        meta.range(..=new_region.clone())
            .next_back()
            .map(|(_, v)| v.clone())
    }

    /// The suffix of the meta map beginning at the greatest start key <=
    /// `table_name`, used to enumerate every meta region that might hold
    /// rows of `table_name`. Fails if root is missing (needed to resolve
    /// `.META.` itself) or if the meta quorum isn't complete (needed for
    /// any other user table) -- spec §4.2.
    pub fn get_meta_regions_for_table(
        &self,
        table_name: &TableName,
    ) -> Result<Vec<(ServerName, RegionInfo)>, Error> {
        if table_name.0 == b".META." {
            if self.root_region_location().is_none() {
                return Err(Error::NotAllMetaRegionsOnline {
                    reason: "root region location unknown",
                });
            }
        } else if !self.are_all_meta_regions_online() {
            return Err(Error::NotAllMetaRegionsOnline {
                reason: "meta quorum incomplete",
            });
        }

        let meta = self.online_meta_regions.read();
        let start = RowKey(table_name.0.clone());
        let floor_key = meta
            .range(..=start)
            .next_back()
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| meta.keys().next().cloned().unwrap_or_default());
        Ok(meta.range(floor_key..).map(|(_, v)| v.clone()).collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetaLookup {
    Root,
    Meta(ServerName, RegionInfo),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytekey::RowKey;
    use crate::coordination::InMemoryCoordinationService;

    fn tracker() -> CatalogTracker {
        CatalogTracker::new(Arc::new(InMemoryCoordinationService::new()))
    }

    fn meta_row(start: &[u8]) -> RegionInfo {
        RegionInfo::new(TableName(b".META.".to_vec()), RowKey(start.to_vec()), 1)
    }

    #[test]
    fn meta_prefixed_row_routes_to_root() {
        let tracker = tracker();
        let row = RowKey(b".META.,foo,1".to_vec());
        assert_eq!(tracker.get_meta_region_for_row(&row).unwrap(), MetaLookup::Root);
    }

    #[test]
    fn floor_lookup_picks_greatest_key_leq_row() {
        let tracker = tracker();
        tracker.set_root_region_location(ServerName::new("root", 1), 1).unwrap();
        tracker.put_meta_region_online(RowKey(b"a".to_vec()), ServerName::new("s1", 1), meta_row(b"a"));
        tracker.put_meta_region_online(RowKey(b"m".to_vec()), ServerName::new("s2", 1), meta_row(b"m"));

        let row = RowKey(b"z".to_vec());
        match tracker.get_meta_region_for_row(&row).unwrap() {
            MetaLookup::Meta(server, _) => assert_eq!(server.address, "s2"),
            MetaLookup::Root => panic!("expected meta"),
        }
    }

    #[test]
    fn single_entry_fast_path_ignores_key() {
        let tracker = tracker();
        tracker.put_meta_region_online(RowKey(b"m".to_vec()), ServerName::new("only", 1), meta_row(b"m"));
        let (server, _) = tracker
            .get_first_meta_region_for_region(&RowKey(b"totally-unrelated".to_vec()))
            .unwrap();
        assert_eq!(server.address, "only");
    }

    #[test]
    fn reassigning_metas_until_expected_count_reached() {
        let tracker = tracker();
        tracker.set_number_of_meta_regions(2);
        assert!(tracker.is_reassigning_metas());
        tracker.put_meta_region_online(RowKey(b"a".to_vec()), ServerName::new("s1", 1), meta_row(b"a"));
        assert!(tracker.is_reassigning_metas());
        tracker.put_meta_region_online(RowKey(b"m".to_vec()), ServerName::new("s2", 1), meta_row(b"m"));
        assert!(!tracker.is_reassigning_metas());
    }
}
