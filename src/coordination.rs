//! The coordination-service mirror (spec §6 / §9).
//!
//! The coordination service itself (ZooKeeper in the system this was
//! distilled from, or any similar session-based service) is an external
//! collaborator -- spec §1 places it out of scope and §9's design notes say
//! to "treat as an external collaborator with two operations: `upsert(path,
//! bytes)` and `delete(path)`, both potentially blocking." This module
//! specifies that trait seam plus the wire format of the payload it carries,
//! and a blocking in-memory implementation for tests.

use crate::bytekey::ShortRegionName;
use std::collections::HashMap;
use std::sync::Mutex;

/// Event kinds the manager writes into the mirror. Only one is used today
/// (`Offline`), but the type is carried in full since it's part of the wire
/// contract shared with region-server-side handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum EventKind {
    /// M2ZK_REGION_OFFLINE: written when a region becomes UNASSIGNED, and
    /// also (per Open Question (c)) when a region is handed out for
    /// PENDING_OPEN -- "master has cleared the region, any server may claim
    /// it." Preserved verbatim for compatibility with region-server-side
    /// handlers that key off this event type.
    Offline = 0,
    Opening = 1,
    Closing = 2,
}

impl EventKind {
    fn to_byte(self) -> u8 {
        self as u8
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(EventKind::Offline),
            1 => Some(EventKind::Opening),
            2 => Some(EventKind::Closing),
            _ => None,
        }
    }
}

/// `{event_type, sender}`, serialized as an event-kind byte followed by a
/// 4-byte big-endian length-prefixed sender string -- the existing wire
/// definition of `RegionTransitionEventData` this crate must stay
/// compatible with (spec §9 design notes).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionTransitionEventData {
    pub event: EventKind,
    pub sender: String,
}

impl RegionTransitionEventData {
    pub fn new(event: EventKind, sender: impl Into<String>) -> Self {
        RegionTransitionEventData {
            event,
            sender: sender.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let sender = self.sender.as_bytes();
        let mut buf = Vec::with_capacity(1 + 4 + sender.len());
        buf.push(self.event.to_byte());
        buf.extend_from_slice(&(sender.len() as u32).to_be_bytes());
        buf.extend_from_slice(sender);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 5 {
            return None;
        }
        let event = EventKind::from_byte(bytes[0])?;
        let len = u32::from_be_bytes(bytes[1..5].try_into().ok()?) as usize;
        let sender = std::str::from_utf8(bytes.get(5..5 + len)?).ok()?;
        Some(RegionTransitionEventData {
            event,
            sender: sender.to_string(),
        })
    }
}

/// The two blocking operations spec §9 calls out. A real implementation
/// talks to the coordination service's session and must tolerate spurious
/// reconnects -- both operations are expected to be idempotent.
pub trait CoordinationService: Send + Sync {
    fn upsert(&self, path: &ShortRegionName, payload: RegionTransitionEventData);
    fn delete(&self, path: &ShortRegionName);
    fn get(&self, path: &ShortRegionName) -> Option<RegionTransitionEventData>;

    /// The dedicated root-location node (spec §6: "stored at a dedicated
    /// node"). Returns `Ok(())` once written, after up to `attempts` tries;
    /// a real implementation backs off exponentially between attempts.
    fn write_root_location(&self, address: &str, attempts: u32) -> Result<(), crate::error::Error>;
}

/// An in-memory mirror, used by tests and as the crate's default so the
/// manager is exercisable without a real coordination-service session.
#[derive(Default)]
pub struct InMemoryCoordinationService {
    nodes: Mutex<HashMap<ShortRegionName, RegionTransitionEventData>>,
    root: Mutex<Option<String>>,
}

impl InMemoryCoordinationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_location(&self) -> Option<String> {
        self.root.lock().unwrap().clone()
    }
}

impl CoordinationService for InMemoryCoordinationService {
    fn upsert(&self, path: &ShortRegionName, payload: RegionTransitionEventData) {
        self.nodes.lock().unwrap().insert(*path, payload);
    }

    fn delete(&self, path: &ShortRegionName) {
        self.nodes.lock().unwrap().remove(path);
    }

    fn get(&self, path: &ShortRegionName) -> Option<RegionTransitionEventData> {
        self.nodes.lock().unwrap().get(path).cloned()
    }

    fn write_root_location(&self, address: &str, _attempts: u32) -> Result<(), crate::error::Error> {
        *self.root.lock().unwrap() = Some(address.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_payload_round_trips() {
        let event = RegionTransitionEventData::new(EventKind::Offline, "master:1234,5");
        let bytes = event.to_bytes();
        assert_eq!(RegionTransitionEventData::from_bytes(&bytes), Some(event));
    }

    #[test]
    fn truncated_payload_fails_to_parse() {
        let event = RegionTransitionEventData::new(EventKind::Closing, "sender");
        let mut bytes = event.to_bytes();
        bytes.truncate(2);
        assert_eq!(RegionTransitionEventData::from_bytes(&bytes), None);
    }

    #[test]
    fn in_memory_mirror_upsert_and_delete() {
        let zk = InMemoryCoordinationService::new();
        let path = ShortRegionName(1);
        assert!(zk.get(&path).is_none());
        zk.upsert(&path, RegionTransitionEventData::new(EventKind::Offline, "m"));
        assert!(zk.get(&path).is_some());
        zk.delete(&path);
        assert!(zk.get(&path).is_none());
    }
}
