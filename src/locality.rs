//! Locality mode (spec §4.4): a time-bounded window after master start
//! during which the assignment engine prefers each region's last-known-best
//! host, sourced from an externally supplied `table:encodedRegion ->
//! preferredHostname` mapping.

use crate::bytekey::RegionName;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// `applyPreferredAssignmentPeriod` / `holdRegionForBestLocalityPeriod`
/// windows plus the supplied locality mapping, anchored to master start.
pub struct LocalityTracker {
    master_start: Instant,
    apply_period: Duration,
    hold_period: Duration,
    preferred_host: HashMap<RegionName, String>,
    /// Hosts that have already heartbeated at least once; a region whose
    /// preferred host hasn't joined yet (and the hold window has elapsed)
    /// is released to normal assignment rather than waiting forever.
    quick_start: HashSet<String>,
}

impl LocalityTracker {
    pub fn new(apply_period: Duration, hold_period: Duration, preferred_host: HashMap<RegionName, String>) -> Self {
        LocalityTracker {
            master_start: Instant::now(),
            apply_period,
            hold_period,
            preferred_host,
            quick_start: HashSet::new(),
        }
    }

    /// True for the master's entire lifetime once the apply window has
    /// elapsed once -- locality mode never turns back on (spec §4.4).
    pub fn is_locality_mode_active(&self) -> bool {
        self.master_start.elapsed() < self.apply_period
    }

    fn hold_window_active(&self) -> bool {
        self.master_start.elapsed() < self.hold_period
    }

    pub fn note_server_joined(&mut self, host: &str) {
        self.quick_start.insert(host.to_string());
    }

    /// Whether `region` may be assigned to `candidate_host` right now.
    /// Spec §4.3 step 4's literal wording gates the fallback branch on the
    /// hold window *not yet* having elapsed, which would make a
    /// non-preferred host assignable only during the hold window and
    /// permanently blocked for the remainder of the (longer) apply window
    /// once it elapses -- the opposite of a fallback. Open Question (d):
    /// this implements the fallback once the hold window *has* elapsed,
    /// which is the reading that actually lets assignment proceed when the
    /// preferred host never shows up; see DESIGN.md.
    pub fn allows_assignment(&self, region: &RegionName, candidate_host: &str) -> bool {
        if !self.is_locality_mode_active() {
            return true;
        }
        match self.preferred_host.get(region) {
            None => true,
            Some(preferred) => {
                if candidate_host.starts_with(preferred.as_str()) {
                    return true;
                }
                !self.quick_start.contains(preferred) && !self.hold_window_active()
            }
        }
    }

    pub fn preferred_host_for(&self, region: &RegionName) -> Option<&str> {
        self.preferred_host.get(region).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> RegionName {
        RegionName(b"t,,1".to_vec())
    }

    #[test]
    fn region_with_no_preference_is_always_assignable() {
        let tracker = LocalityTracker::new(Duration::from_secs(60), Duration::from_secs(30), HashMap::new());
        assert!(tracker.allows_assignment(&region(), "anyhost"));
    }

    #[test]
    fn matching_host_is_always_allowed() {
        let mut map = HashMap::new();
        map.insert(region(), "preferred-host".to_string());
        let tracker = LocalityTracker::new(Duration::from_secs(60), Duration::from_secs(30), map);
        assert!(tracker.allows_assignment(&region(), "preferred-host:60020"));
    }

    #[test]
    fn mismatched_host_blocked_during_hold_window() {
        let mut map = HashMap::new();
        map.insert(region(), "preferred-host".to_string());
        let tracker = LocalityTracker::new(Duration::from_secs(60), Duration::from_secs(30), map);
        assert!(!tracker.allows_assignment(&region(), "other-host"));
    }

    #[test]
    fn inactive_locality_mode_allows_everything() {
        let mut map = HashMap::new();
        map.insert(region(), "preferred-host".to_string());
        let tracker = LocalityTracker::new(Duration::from_millis(0), Duration::from_millis(0), map);
        assert!(tracker.allows_assignment(&region(), "other-host"));
    }
}
