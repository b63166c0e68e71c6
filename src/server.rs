//! Server identity, load reports, and the heartbeat wire types (spec §6).

use crate::bytekey::RegionName;
use crate::region::RegionInfo;
use std::collections::HashMap;
use std::sync::Mutex;

/// A server's logical name, e.g. `host.example.com,60020,1600000000123`. The
/// start code (the trailing timestamp) disambiguates a restarted server from
/// its predecessor. Open Question (a) in the spec notes that some legacy
/// checks compare by `address` (host:port, no start code) where they should
/// compare by the full `ServerName` -- see `ServerName::same_server_as`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerName {
    pub address: String,
    pub start_code: u64,
}

impl ServerName {
    pub fn new(address: impl Into<String>, start_code: u64) -> Self {
        ServerName {
            address: address.into(),
            start_code,
        }
    }

    /// Host the server address resolves to, e.g. `host.example.com` out of
    /// `host.example.com:60020`. Used by locality mode's prefix match.
    pub fn host(&self) -> &str {
        self.address.split(':').next().unwrap_or(&self.address)
    }

    /// Whether `self` and `other` name the same physical address, ignoring
    /// start code. Flagged in spec Open Question (a): some internal checks
    /// use this comparison where a full `ServerName` (including start code)
    /// equality check would be semantically correct; callers that care about
    /// a server's *current incarnation* (not just its address) should use
    /// `==` instead.
    pub fn same_server_as(&self, other: &ServerName) -> bool {
        self.address == other.address
    }
}

impl std::fmt::Display for ServerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.address, self.start_code)
    }
}

/// A server's self-reported load, carried on every heartbeat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Load {
    pub requests: u64,
    pub regions: usize,
}

/// `(serverInfo, mostLoadedRegions)` as received from the RPC layer.
#[derive(Clone, Debug)]
pub struct HeartbeatIn {
    pub server: ServerName,
    pub load: Load,
    pub most_loaded_regions: Vec<RegionInfo>,
}

/// One outbound instruction piggy-backed on the heartbeat response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Open(RegionName),
    Close(RegionName, CloseReason),
    Split(RegionName),
    Compact(RegionName),
    MajorCompact(RegionName),
    Flush(RegionName),
    CfCompact(RegionName, String),
    CfMajorCompact(RegionName, String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    Overloaded,
    Forced,
}

/// The manager's view of the fleet: every server it has heard a heartbeat
/// from, and the load it last reported. Spec.md calls this the "fleet-wide
/// load snapshot" / "server manager" without specifying its shape (see
/// SPEC_FULL §7) -- it's specified here because the assignment engine's
/// balancing properties genuinely depend on it.
#[derive(Default)]
pub struct ServerTracker {
    servers: Mutex<HashMap<ServerName, Load>>,
    /// Whether user-region assignment is enabled yet. Cleared while the
    /// cluster is still warming up (spec §4.3 step "server manager says
    /// user regions are not yet assignable").
    user_regions_assignable: std::sync::atomic::AtomicBool,
}

impl ServerTracker {
    pub fn new() -> Self {
        ServerTracker {
            servers: Mutex::new(HashMap::new()),
            user_regions_assignable: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn report_heartbeat(&self, server: &ServerName, load: Load) {
        self.servers.lock().unwrap().insert(server.clone(), load);
    }

    pub fn remove(&self, server: &ServerName) {
        self.servers.lock().unwrap().remove(server);
    }

    pub fn server_count(&self) -> usize {
        self.servers.lock().unwrap().len()
    }

    pub fn is_single_server_cluster(&self) -> bool {
        self.server_count() <= 1
    }

    /// Every known server's region count, for the balancer.
    pub fn loads(&self) -> Vec<usize> {
        self.servers.lock().unwrap().values().map(|l| l.regions).collect()
    }

    /// Every known server's region count except `server`'s own -- what the
    /// balancer and the balanced-assignment procedure mean by "the rest of
    /// the fleet" (spec §4.3.1 / §4.5).
    pub fn loads_excluding(&self, server: &ServerName) -> Vec<usize> {
        self.servers
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s != server)
            .map(|(_, l)| l.regions)
            .collect()
    }

    pub fn set_user_regions_assignable(&self, assignable: bool) {
        self.user_regions_assignable
            .store(assignable, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn user_regions_assignable(&self) -> bool {
        self.user_regions_assignable
            .load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_strips_port() {
        let s = ServerName::new("host.example.com:60020", 1);
        assert_eq!(s.host(), "host.example.com");
    }

    #[test]
    fn same_server_as_ignores_start_code() {
        let a = ServerName::new("host:1", 100);
        let b = ServerName::new("host:1", 200);
        assert!(a.same_server_as(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn single_server_cluster_detection() {
        let tracker = ServerTracker::new();
        assert!(tracker.is_single_server_cluster());
        tracker.report_heartbeat(&ServerName::new("a", 1), Load::default());
        assert!(tracker.is_single_server_cluster());
        tracker.report_heartbeat(&ServerName::new("b", 1), Load::default());
        assert!(!tracker.is_single_server_cluster());
    }
}
