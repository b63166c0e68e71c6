//! Preferred Assignment Store & Timer (spec §4.4): planned-restart holds
//! that reserve a region for a specific server until it next heartbeats, or
//! until the hold expires.
//!
//! The delay queue is a `BinaryHeap` of `Reverse<Deadline>` behind the same
//! `Mutex` + `Condvar` monitor pattern the teacher crate uses for its
//! work-stealing queues (`scheduler::work_bucket::WorkBucket`) -- per the
//! design notes (spec §9), "a priority queue keyed by deadline with a
//! condition variable whose wait timeout equals the next deadline is a
//! sufficient replacement for a generic delay queue."

use crate::bytekey::RegionName;
use crate::server::ServerName;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct HoldEntry {
    deadline: Instant,
    server: ServerName,
    region: RegionName,
}

impl PartialEq for HoldEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for HoldEntry {}
impl PartialOrd for HoldEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HoldEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

struct Inner {
    /// `preferredAssignmentMap`: server -> regions held for it.
    by_server: HashMap<ServerName, HashSet<RegionName>>,
    /// The reverse index: region -> server it's held for. Invariant
    /// (spec §3): `regionsWithPreferredAssignment == union of
    /// preferredAssignmentMap's values`, maintained by construction since
    /// both are mutated together under the same lock.
    by_region: HashMap<RegionName, ServerName>,
}

/// Holds + delay queue, both guarded by one lock per spec §4.4/§5.
pub struct PreferredAssignmentStore {
    inner: Mutex<Inner>,
    queue: Mutex<BinaryHeap<Reverse<DeadlineKey>>>,
    monitor: Arc<(Mutex<()>, Condvar)>,
    closed: AtomicBool,
    hold_period: Duration,
}

/// Wraps `HoldEntry` for the `Reverse` binary-heap ordering (soonest
/// deadline first) while keeping `HoldEntry` itself naturally ordered.
struct DeadlineKey(HoldEntry);
impl PartialEq for DeadlineKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for DeadlineKey {}
impl PartialOrd for DeadlineKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DeadlineKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PreferredAssignmentStore {
    pub fn new(hold_period: Duration) -> Arc<Self> {
        Arc::new(PreferredAssignmentStore {
            inner: Mutex::new(Inner {
                by_server: HashMap::new(),
                by_region: HashMap::new(),
            }),
            queue: Mutex::new(BinaryHeap::new()),
            monitor: Arc::new((Mutex::new(()), Condvar::new())),
            closed: AtomicBool::new(false),
            hold_period,
        })
    }

    /// Reserve `region` for `server` for `hold_period` (spec §4.4: "planned
    /// restart holds").
    pub fn add_hold(&self, server: ServerName, region: RegionName) {
        let deadline = Instant::now() + self.hold_period;
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .by_server
                .entry(server.clone())
                .or_default()
                .insert(region.clone());
            inner.by_region.insert(region.clone(), server.clone());
        }
        self.queue
            .lock()
            .unwrap()
            .push(Reverse(DeadlineKey(HoldEntry {
                deadline,
                server,
                region,
            })));
        let _guard = self.monitor.0.lock().unwrap();
        self.monitor.1.notify_one();
    }

    /// Atomically drop `region` from both the map and the reverse index,
    /// dropping the empty per-server set if it was the last hold, and
    /// purging the matching delay-queue entry so the queue never outlives
    /// the hold it was scheduled for (spec §4.4 / §8's invariant "delay-queue
    /// size == number of hold entries in `preferredAssignmentMap`" -- this is
    /// the common path, reached whenever a hold is consumed before its timer
    /// fires, not just on expiry).
    pub fn remove_hold(&self, server: &ServerName, region: &RegionName) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(set) = inner.by_server.get_mut(server) {
            set.remove(region);
            if set.is_empty() {
                inner.by_server.remove(server);
            }
        }
        inner.by_region.remove(region);
        drop(inner);

        let mut queue = self.queue.lock().unwrap();
        let remaining: BinaryHeap<Reverse<DeadlineKey>> = std::mem::take(&mut *queue)
            .into_iter()
            .filter(|Reverse(entry)| !(entry.0.region == *region && entry.0.server == *server))
            .collect();
        *queue = remaining;
    }

    /// Every region held for `server`, used by the assignment engine's step
    /// 1 bypass (spec §4.3).
    pub fn holds_for(&self, server: &ServerName) -> Vec<RegionName> {
        self.inner
            .lock()
            .unwrap()
            .by_server
            .get(server)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The server a region is currently held for, if any. Used by the
    /// assignment engine's candidate scan to skip regions held for someone
    /// else (spec §4.3 step 1.4).
    pub fn held_for(&self, region: &RegionName) -> Option<ServerName> {
        self.inner.lock().unwrap().by_region.get(region).cloned()
    }

    pub fn region_count(&self) -> usize {
        self.inner.lock().unwrap().by_region.len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _guard = self.monitor.0.lock().unwrap();
        self.monitor.1.notify_all();
    }

    /// Run the expiry handler. Blocks on the delay queue with a timeout
    /// equal to the next deadline (or the wake-frequency fallback when the
    /// queue is empty) so it can observe shutdown promptly, per spec §5.
    pub fn run_expiry_loop(self: &Arc<Self>, wake_frequency: Duration) {
        while !self.closed.load(Ordering::SeqCst) {
            let wait_for = {
                let queue = self.queue.lock().unwrap();
                match queue.peek() {
                    Some(Reverse(entry)) => entry
                        .0
                        .deadline
                        .saturating_duration_since(Instant::now()),
                    None => wake_frequency,
                }
            };

            let guard = self.monitor.0.lock().unwrap();
            let (_guard, _timeout) = self
                .monitor
                .1
                .wait_timeout(guard, wait_for.min(wake_frequency))
                .unwrap();
            drop(_guard);

            self.drain_expired();
        }
    }

    /// Spawns the dedicated expiry-handler thread spec §2/§5 call for ("one
    /// preferred-assignment expiry thread"), mirroring how
    /// `scanner::ScannerHandle::spawn` owns its own background loop. The
    /// caller is responsible for eventually calling `shutdown()` and joining
    /// the returned handle.
    pub fn spawn_expiry_thread(self: &Arc<Self>, wake_frequency: Duration) -> std::thread::JoinHandle<()> {
        let store = self.clone();
        std::thread::spawn(move || store.run_expiry_loop(wake_frequency))
    }

    /// Force an expiry sweep right now, bypassing the wait-timeout loop.
    /// Used by `run_expiry_loop` internally and exposed for tests that need
    /// deterministic expiry without sleeping through a full wake cycle.
    pub fn drain_expired(&self) {
        let now = Instant::now();
        loop {
            let expired = {
                let mut queue = self.queue.lock().unwrap();
                match queue.peek() {
                    Some(Reverse(entry)) if entry.0.deadline <= now => {
                        queue.pop().map(|Reverse(e)| e.0)
                    }
                    _ => None,
                }
            };
            match expired {
                Some(entry) => self.remove_hold(&entry.server, &entry.region),
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_remove_leaves_both_sides_empty() {
        let store = PreferredAssignmentStore::new(Duration::from_secs(60));
        let server = ServerName::new("s1", 1);
        let region = RegionName(b"t,,1".to_vec());

        store.add_hold(server.clone(), region.clone());
        assert_eq!(store.region_count(), 1);
        assert_eq!(store.queue_len(), 1);
        assert_eq!(store.held_for(&region), Some(server.clone()));

        store.remove_hold(&server, &region);
        assert_eq!(store.region_count(), 0);
        assert!(store.held_for(&region).is_none());
        assert!(store.holds_for(&server).is_empty());
    }

    #[test]
    fn expiry_drains_map_and_queue_together() {
        let store = PreferredAssignmentStore::new(Duration::from_millis(1));
        let server = ServerName::new("s1", 1);
        let region = RegionName(b"t,,1".to_vec());
        store.add_hold(server, region);
        std::thread::sleep(Duration::from_millis(20));
        store.drain_expired();
        assert_eq!(store.region_count(), 0);
        assert_eq!(store.queue_len(), 0);
    }
}
