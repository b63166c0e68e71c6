//! `RegionManager`: the crate's top-level struct, composing every
//! component module the way `mmtk::MMTK` composes `GlobalState`,
//! `GCWorkScheduler` and a `Plan` (grounded on `mmtk.rs`'s `MMTK` struct
//! and `MMTKBuilder::build`).

use crate::assign::AssignmentEngine;
use crate::balancer::LoadBalancer;
use crate::catalog::CatalogTracker;
use crate::coordination::CoordinationService;
use crate::locality::LocalityTracker;
use crate::options::Options;
use crate::preferred::PreferredAssignmentStore;
use crate::queues::ActionQueues;
use crate::region::RegionState;
use crate::reopener::ReopenerRegistry;
use crate::server::{HeartbeatIn, Message, ServerName, ServerTracker};
use crate::transition::TransitionTable;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default poll interval `start_preferred_assignment_timer` falls back to
/// when the delay queue is empty, mirroring `scanner.rs`'s own
/// wake-frequency default.
const PREFERRED_ASSIGNMENT_WAKE_FREQUENCY: Duration = Duration::from_secs(5);

/// Everything the crate owns for one running master: the Transition Table,
/// Catalog Tracking, Preferred Assignment Store, Load Balancer, Action
/// Queues, Reopener Registry, fleet tracker and Assignment Engine (spec §2's
/// component list).
pub struct RegionManager {
    pub transition: Arc<TransitionTable>,
    pub catalog: Arc<CatalogTracker>,
    pub preferred: Arc<PreferredAssignmentStore>,
    pub queues: Arc<ActionQueues>,
    pub reopener: Arc<ReopenerRegistry>,
    pub servers: Arc<ServerTracker>,
    pub options: Options,
    engine: AssignmentEngine,
}

/// Mirrors the teacher's `MMTKBuilder` -> `MMTKBuilder::build()` two-step
/// construction (`mmtk.rs`): collect configuration and collaborators, then
/// produce the fully wired manager.
pub struct RegionManagerBuilder {
    options: Options,
    coordination: Arc<dyn CoordinationService>,
    sender: String,
    preferred_host: HashMap<crate::bytekey::RegionName, String>,
}

impl RegionManagerBuilder {
    pub fn new(coordination: Arc<dyn CoordinationService>, sender: impl Into<String>) -> Self {
        RegionManagerBuilder {
            options: Options::default(),
            coordination,
            sender: sender.into(),
            preferred_host: HashMap::new(),
        }
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn preferred_hosts(mut self, map: HashMap<crate::bytekey::RegionName, String>) -> Self {
        self.preferred_host = map;
        self
    }

    pub fn build(self) -> RegionManager {
        let transition = Arc::new(TransitionTable::new(self.coordination.clone()));
        let catalog = Arc::new(CatalogTracker::new(self.coordination.clone()));
        let preferred = PreferredAssignmentStore::new(self.options.preferred_assignment_hold_period());
        let queues = Arc::new(ActionQueues::new());
        let reopener = ReopenerRegistry::new();
        let servers = Arc::new(ServerTracker::new());

        let locality = LocalityTracker::new(
            // Locality mode's apply window and hold window are independent
            // settings (spec §4.4: hold <= apply); the planned-restart hold
            // period is unrelated to either.
            self.options.locality_apply_period(),
            self.options.best_locality_hold_period(),
            self.preferred_host,
        );
        let balancer = LoadBalancer::new(*self.options.regions_slop, *self.options.regions_close_max);

        let engine = AssignmentEngine::new(
            transition.clone(),
            catalog.clone(),
            preferred.clone(),
            servers.clone(),
            queues.clone(),
            locality,
            balancer,
            *self.options.regions_per_checkin as usize,
            self.sender,
        );

        RegionManager {
            transition,
            catalog,
            preferred,
            queues,
            reopener,
            servers,
            options: self.options,
            engine,
        }
    }
}

impl RegionManager {
    /// The sole public decision entry point (spec §4.3 / §10).
    pub fn on_heartbeat(&self, heartbeat: HeartbeatIn) -> Vec<Message> {
        self.engine.on_heartbeat(heartbeat)
    }

    /// A server has disconnected or been declared dead: drop it from the
    /// fleet snapshot and release any preferred-assignment holds naming it
    /// (spec §4.4's holds are server-scoped and must not survive the
    /// server they were granted to).
    pub fn remove_server(&self, server: &ServerName) {
        self.servers.remove(server);
        for region in self.preferred.holds_for(server) {
            self.preferred.remove_hold(server, &region);
        }
    }

    /// Forces root back to UNASSIGNED when the server hosting it has been
    /// lost, so the next heartbeat's candidate scan (spec §4.3 step 2)
    /// picks it back up -- `reassignRootRegion` (spec §4.2). A no-op once
    /// shutdown has been requested: there's no point reassigning root to a
    /// master that's already tearing down.
    pub fn offline_root_region(&self) {
        if self.catalog.is_shutdown_requested() {
            return;
        }
        self.catalog.unset_root_region();
        if let Some((name, record)) = self
            .transition
            .snapshot()
            .into_iter()
            .find(|(_, record)| record.info.is_root())
        {
            if record.state() != RegionState::Unassigned {
                let record = Arc::new(crate::region::RegionStateRecord::new_unassigned(record.info.clone()));
                self.transition.put(name, record, "master");
            }
        }
    }

    /// `offlineMetaServer(addr)` (spec §7): a server hosting root and/or
    /// meta regions has been declared dead. Forces root back to UNASSIGNED
    /// if it was hosted there, and every meta region it hosted back to
    /// UNASSIGNED too, dropping each from the catalog's online-meta set so
    /// the reassigning-metas gate (spec §4.3 step 3) engages until a
    /// server claims them again.
    pub fn offline_meta_server(&self, server: &ServerName) {
        if self
            .catalog
            .root_region_location()
            .as_ref()
            .map(|s| s.same_server_as(server))
            .unwrap_or(false)
        {
            self.offline_root_region();
        }

        for (start_key, info) in self.catalog.meta_regions_hosted_by(server) {
            let name = info.name();
            if let Some(record) = self.transition.get(&name) {
                if record.state() != RegionState::Unassigned {
                    let fresh = Arc::new(crate::region::RegionStateRecord::new_unassigned(record.info.clone()));
                    self.transition.put(name, fresh, "master");
                }
            }
            self.catalog.offline_meta_region_with_start_key(&start_key);
        }
    }

    /// Spawns the background thread that expires planned-restart holds
    /// (spec §2/§5's "preferred-assignment expiry thread"), mirroring how
    /// `scanner::ScannerHandle::spawn` owns the catalog scanner's thread.
    /// The caller owns the returned handle and is responsible for joining
    /// it after calling `self.preferred.shutdown()`.
    pub fn start_preferred_assignment_timer(&self) -> std::thread::JoinHandle<()> {
        self.preferred.spawn_expiry_thread(PREFERRED_ASSIGNMENT_WAKE_FREQUENCY)
    }

    pub fn region_count(&self) -> usize {
        self.transition.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytekey::{RowKey, TableName};
    use crate::coordination::InMemoryCoordinationService;
    use crate::region::{RegionInfo, RegionStateRecord};

    #[test]
    fn single_server_cold_start_claims_root_then_opens_it() {
        let manager = RegionManagerBuilder::new(Arc::new(InMemoryCoordinationService::new()), "master:1,1").build();
        let root_info = RegionInfo::new(TableName(b"-ROOT-".to_vec()), RowKey(b"".to_vec()), 0);
        let name = root_info.name();
        manager
            .transition
            .put(name.clone(), Arc::new(RegionStateRecord::new_unassigned(root_info)), "master");

        let server = ServerName::new("s1", 1);
        let messages = manager.on_heartbeat(HeartbeatIn {
            server: server.clone(),
            load: crate::server::Load::default(),
            most_loaded_regions: Vec::new(),
        });

        assert_eq!(messages, vec![Message::Open(name.clone())]);
        assert_eq!(manager.transition.get(&name).unwrap().state(), RegionState::PendingOpen);
    }

    #[test]
    fn remove_server_releases_its_preferred_holds() {
        let manager = RegionManagerBuilder::new(Arc::new(InMemoryCoordinationService::new()), "master:1,1").build();
        let server = ServerName::new("s1", 1);
        let region = crate::bytekey::RegionName(b"t,,1".to_vec());
        manager.preferred.add_hold(server.clone(), region.clone());
        assert_eq!(manager.preferred.region_count(), 1);

        manager.remove_server(&server);
        assert_eq!(manager.preferred.region_count(), 0);
    }
}
