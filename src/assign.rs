//! The Assignment Engine (spec §4.3): the decision function invoked once
//! per heartbeat. This is where the Transition Table, Catalog Tracking,
//! Preferred Assignment Store, fleet load snapshot, locality tracker and
//! action queues all come together to decide what to tell a reporting
//! server to do next.

use crate::balancer::LoadBalancer;
use crate::bytekey::RegionName;
use crate::catalog::CatalogTracker;
use crate::locality::LocalityTracker;
use crate::preferred::PreferredAssignmentStore;
use crate::queues::ActionQueues;
use crate::region::{RegionInfo, RegionState, RegionStateRecord};
use crate::server::{CloseReason, HeartbeatIn, Message, ServerName, ServerTracker};
use crate::transition::TransitionTable;
use std::sync::{Arc, Mutex};

/// Serializes the whole per-heartbeat decision under one lock (spec §5:
/// "The Assignment Engine serializes on a single manager-level monitor in
/// addition [to the Transition-Table lock] -- callers guarantee mutual
/// exclusion while it runs").
pub struct AssignmentEngine {
    transition: Arc<TransitionTable>,
    catalog: Arc<CatalogTracker>,
    preferred: Arc<PreferredAssignmentStore>,
    servers: Arc<ServerTracker>,
    queues: Arc<ActionQueues>,
    locality: Mutex<LocalityTracker>,
    balancer: LoadBalancer,
    max_assign_in_one_go: usize,
    sender: String,
    monitor: Mutex<()>,
}

impl AssignmentEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transition: Arc<TransitionTable>,
        catalog: Arc<CatalogTracker>,
        preferred: Arc<PreferredAssignmentStore>,
        servers: Arc<ServerTracker>,
        queues: Arc<ActionQueues>,
        locality: LocalityTracker,
        balancer: LoadBalancer,
        max_assign_in_one_go: usize,
        sender: impl Into<String>,
    ) -> Self {
        AssignmentEngine {
            transition,
            catalog,
            preferred,
            servers,
            queues,
            locality: Mutex::new(locality),
            balancer,
            max_assign_in_one_go,
            sender: sender.into(),
            monitor: Mutex::new(()),
        }
    }

    /// Entry point: `(serverInfo, mostLoadedRegionsReport) -> messages`
    /// (spec §4.3). `most_loaded_regions` isn't consulted directly by this
    /// engine (it feeds the load balancer's shed candidate choice) but is
    /// accepted on `HeartbeatIn` to keep the wire contract faithful to
    /// spec §6.
    pub fn on_heartbeat(&self, hb: HeartbeatIn) -> Vec<Message> {
        let _serialize = self.monitor.lock().unwrap();

        self.servers.report_heartbeat(&hb.server, hb.load);
        self.locality.lock().unwrap().note_server_joined(hb.server.host());

        // Queued administrative actions are piggy-backed on every
        // heartbeat regardless of what else happens (spec §4.6).
        let mut messages = self.queues.drain_for(&hb.server);
        let had_pending_actions = !messages.is_empty();

        let (candidates, from_preferred) = self.select_candidates(&hb);

        if candidates.is_empty() {
            let locality_active = self.locality.lock().unwrap().is_locality_mode_active();
            if !had_pending_actions && !locality_active {
                let other_loads = self.servers.loads_excluding(&hb.server);
                let shed = self.balancer.regions_to_shed(hb.load.regions, &other_loads);
                if shed > 0 {
                    for region in self.pick_regions_to_shed(&hb.server, shed) {
                        messages.push(Message::Close(region, CloseReason::Overloaded));
                    }
                }
            }
            return messages;
        }

        let single_server = self.servers.is_single_server_cluster();
        let locality_active = self.locality.lock().unwrap().is_locality_mode_active();

        let selected = if from_preferred || single_server || locality_active {
            candidates
        } else {
            let this_load = hb.load.regions;
            let other_loads = self.servers.loads_excluding(&hb.server);
            let has_meta = candidates.iter().any(|r| r.is_meta() || r.is_root());
            let n = balanced_assignment_count(candidates.len(), this_load, &other_loads, has_meta);
            cap_candidates(candidates, n, self.max_assign_in_one_go)
        };

        for info in selected {
            messages.push(self.do_region_assignment(&info, hb.server.clone()));
        }

        messages
    }

    /// Step 1 of §4.3: choose the candidate set. Returns `(candidates,
    /// came_from_preferred_bypass)`.
    fn select_candidates(&self, hb: &HeartbeatIn) -> (Vec<RegionInfo>, bool) {
        let held = self.preferred.holds_for(&hb.server);
        if !held.is_empty() {
            let mut bypass = Vec::new();
            for name in held {
                if let Some(record) = self.transition.get(&name) {
                    if record.state() == RegionState::Unassigned {
                        bypass.push(record.info.clone());
                        self.preferred.remove_hold(&hb.server, &name);
                    }
                }
            }
            if !bypass.is_empty() {
                return (bypass, true);
            }
        }

        if let Some(root) = self.root_record() {
            if root.state() == RegionState::Unassigned {
                let double_hosting = self.catalog.hosts_meta(&hb.server) && self.servers.server_count() > 1;
                if !double_hosting {
                    return (vec![root.info.clone()], false);
                }
            }
        }

        let reassigning_metas = self.catalog.is_reassigning_metas();
        if reassigning_metas {
            let hosts_root = self
                .catalog
                .root_region_location()
                .map(|s| s.same_server_as(&hb.server))
                .unwrap_or(false);
            let hosts_meta_or_root = hosts_root || self.catalog.hosts_meta(&hb.server);
            if hosts_meta_or_root && self.servers.server_count() > 1 {
                return (Vec::new(), false);
            }
        }

        let mut candidates = Vec::new();
        let locality = self.locality.lock().unwrap();
        let user_regions_assignable = self.servers.user_regions_assignable();
        for (name, record) in self.transition.snapshot() {
            let info = &record.info;
            let is_catalog_region = info.is_meta() || info.is_root();

            if reassigning_metas && !is_catalog_region {
                continue;
            }
            if !is_catalog_region && !user_regions_assignable {
                continue;
            }
            if let Some(holder) = self.preferred.held_for(&name) {
                if holder != hb.server {
                    continue;
                }
            }
            if !locality.allows_assignment(&name, hb.server.host()) {
                continue;
            }
            if record.state() == RegionState::Unassigned {
                candidates.push(info.clone());
            }
        }
        (candidates, false)
    }

    fn root_record(&self) -> Option<Arc<RegionStateRecord>> {
        self.transition
            .snapshot()
            .into_iter()
            .find(|(_, record)| record.info.is_root())
            .map(|(_, record)| record)
    }

    /// §4.3 step 3, `doRegionAssignment`: PENDING_OPEN, OFFLINE mirror
    /// write, ensure table entry, then `MSG_REGION_OPEN`.
    fn do_region_assignment(&self, info: &RegionInfo, server: ServerName) -> Message {
        let name = info.name();
        let record = self
            .transition
            .get(&name)
            .unwrap_or_else(|| Arc::new(RegionStateRecord::new_unassigned(info.clone())));

        if let Err(err) = record.assign_pending_open(server.clone()) {
            log::warn!("assignment of {} to {} hit an illegal transition: {}", name, server, err);
        }
        self.transition.mark_offline_for_claim(&name, &self.sender);
        self.transition.put(name.clone(), record, &self.sender);
        Message::Open(name)
    }

    /// Select up to `count` OPEN regions currently owned by `server` to
    /// close, for the load balancer's shed path (spec §4.5).
    fn pick_regions_to_shed(&self, server: &ServerName, count: usize) -> Vec<RegionName> {
        let mut shed = Vec::new();
        for (name, record) in self.transition.snapshot() {
            if shed.len() >= count {
                break;
            }
            if record.state() == RegionState::Open && record.server().as_ref() == Some(server) {
                if let Err(err) = record.begin_close(server.clone(), false) {
                    log::warn!("shed-close of {} hit an illegal transition: {}", name, err);
                    continue;
                }
                shed.push(name);
            }
        }
        shed
    }
}

/// §4.3.1 step 1: simulate filling each strictly lighter server up to
/// `this_load`, summing assignments needed, saturating at `n_to_assign`.
fn regions_to_give_other_servers(n_to_assign: usize, this_load: usize, other_loads: &[usize]) -> usize {
    let mut total = 0usize;
    for &load in other_loads {
        if load < this_load {
            total += this_load - load;
            if total >= n_to_assign {
                return n_to_assign;
            }
        }
    }
    total.min(n_to_assign)
}

fn div_ceil(a: usize, b: usize) -> usize {
    if b == 0 {
        0
    } else {
        (a + b - 1) / b
    }
}

/// §4.3.1 steps 1-4: how many of the candidate regions this server should
/// take right now.
fn balanced_assignment_count(n_to_assign: usize, this_load: usize, other_loads: &[usize], has_meta: bool) -> usize {
    if n_to_assign == 0 {
        return 0;
    }
    let to_others = regions_to_give_other_servers(n_to_assign, this_load, other_loads);
    let n = n_to_assign.saturating_sub(to_others);
    if n == 0 && !has_meta {
        return 0;
    }

    let heavier: Vec<usize> = other_loads.iter().copied().filter(|&l| l > this_load).collect();
    let next_heavier = heavier.iter().copied().min();
    let consumed = match next_heavier {
        Some(tier) => (tier - this_load).min(n),
        None => n,
    };

    let remaining = n - consumed;
    let assigned = if remaining == 0 {
        consumed
    } else {
        let extra = match next_heavier {
            Some(tier) => {
                let n_heavier = heavier.iter().filter(|&&l| l == tier).count();
                div_ceil(remaining, n_heavier)
            }
            None => div_ceil(remaining, other_loads.len() + 1),
        };
        consumed + extra
    };

    assigned.min(n_to_assign)
}

/// Cap the candidate set at `max_assign_in_one_go`, keeping every meta/root
/// region regardless of the cap -- "meta regions are always assignable even
/// when step 2 produces 0" (spec §4.3.1).
fn cap_candidates(candidates: Vec<RegionInfo>, n: usize, max_assign_in_one_go: usize) -> Vec<RegionInfo> {
    let cap = n.min(max_assign_in_one_go);
    let (catalog_regions, user_regions): (Vec<_>, Vec<_>) =
        candidates.into_iter().partition(|r| r.is_meta() || r.is_root());
    let remaining = cap.saturating_sub(catalog_regions.len());
    let mut selected = catalog_regions;
    selected.extend(user_regions.into_iter().take(remaining));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn give_to_others_saturates_at_n_to_assign() {
        // thisLoad=20, lighter servers at 5 and 8 want 15+12=27 regions,
        // but only 10 are available to hand out.
        assert_eq!(regions_to_give_other_servers(10, 20, &[5, 8]), 10);
    }

    #[test]
    fn give_to_others_ignores_heavier_and_equal_servers() {
        assert_eq!(regions_to_give_other_servers(10, 10, &[10, 15, 9]), 1);
    }

    #[test]
    fn balanced_assignment_assigns_nothing_once_others_absorb_all() {
        let n = balanced_assignment_count(5, 20, &[5, 5], false);
        assert_eq!(n, 0);
    }

    #[test]
    fn balanced_assignment_takes_the_gap_to_next_tier() {
        // No lighter servers to hand off to; one heavier tier at 15, this
        // server at 10, n_to_assign=3: gap is 5, more than enough for 3.
        let n = balanced_assignment_count(3, 10, &[15], false);
        assert_eq!(n, 3);
    }

    #[test]
    fn meta_always_assignable_even_when_n_is_zero() {
        let candidates = vec![
            RegionInfo::new(crate::bytekey::TableName(b".META.".to_vec()), crate::bytekey::RowKey(b"".to_vec()), 1),
        ];
        let selected = cap_candidates(candidates.clone(), 0, 10);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn cap_limits_user_regions_but_not_meta() {
        let meta = RegionInfo::new(crate::bytekey::TableName(b".META.".to_vec()), crate::bytekey::RowKey(b"".to_vec()), 1);
        let user: Vec<RegionInfo> = (0..5)
            .map(|i| RegionInfo::new(crate::bytekey::TableName(b"t".to_vec()), crate::bytekey::RowKey(b"a".to_vec()), i))
            .collect();
        let mut candidates = vec![meta];
        candidates.extend(user);
        let selected = cap_candidates(candidates, 2, 2);
        // cap=2 total; meta takes one slot unconditionally, leaving 1 for user regions.
        assert_eq!(selected.len(), 2);
    }
}
