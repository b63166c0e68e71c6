//! Action Queues (spec §4.6): administrative operations queued per region
//! (or per region+column-family) and delivered piggy-backed on the next
//! heartbeat from their preferred server.

use crate::bytekey::RegionName;
use crate::region::RegionInfo;
use crate::server::{Message, ServerName};
use enum_map::{Enum, EnumMap};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// The four single-level action kinds (spec §4.6). Column-family-scoped
/// compact/major-compact are handled separately since they carry an extra
/// key component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum ActionKind {
    Split,
    Compact,
    MajorCompact,
    Flush,
}

struct QueuedAction {
    info: RegionInfo,
    preferred_server: ServerName,
}

/// `enum_map::EnumMap` keyed by `ActionKind` -- reusing the teacher's own
/// dependency (used there for `WorkBucketStage`) rather than writing four
/// near-identical struct fields by hand.
pub struct ActionQueues {
    single_level: EnumMap<ActionKind, Mutex<BTreeMap<RegionName, QueuedAction>>>,
    cf_compact: Mutex<BTreeMap<(RegionName, String), RegionInfo>>,
    cf_major_compact: Mutex<BTreeMap<(RegionName, String), RegionInfo>>,
    cf_preferred_server: Mutex<BTreeMap<(RegionName, String), ServerName>>,
}

impl Default for ActionQueues {
    fn default() -> Self {
        ActionQueues {
            single_level: EnumMap::default(),
            cf_compact: Mutex::new(BTreeMap::new()),
            cf_major_compact: Mutex::new(BTreeMap::new()),
            cf_preferred_server: Mutex::new(BTreeMap::new()),
        }
    }
}

impl ActionQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_action(&self, info: RegionInfo, preferred_server: ServerName, kind: ActionKind) {
        self.single_level[kind].lock().unwrap().insert(
            info.name(),
            QueuedAction {
                info,
                preferred_server,
            },
        );
    }

    pub fn start_cf_compact(&self, info: RegionInfo, family: String, preferred_server: ServerName, major: bool) {
        let key = (info.name(), family.clone());
        self.cf_preferred_server
            .lock()
            .unwrap()
            .insert(key.clone(), preferred_server);
        let map = if major {
            &self.cf_major_compact
        } else {
            &self.cf_compact
        };
        map.lock().unwrap().insert(key, info);
    }

    pub fn contains(&self, kind: ActionKind, region: &RegionName) -> bool {
        self.single_level[kind].lock().unwrap().contains_key(region)
    }

    /// Emit every queued action whose preferred server matches `server`,
    /// removing it from the queue (at-most-once delivery per spec §4.6).
    pub fn drain_for(&self, server: &ServerName) -> Vec<Message> {
        let mut out = Vec::new();

        for (kind, queue) in self.single_level.iter() {
            let mut queue = queue.lock().unwrap();
            let ready: Vec<RegionName> = queue
                .iter()
                .filter(|(_, action)| action.preferred_server == *server)
                .map(|(name, _)| name.clone())
                .collect();
            for name in ready {
                queue.remove(&name);
                out.push(match kind {
                    ActionKind::Split => Message::Split(name),
                    ActionKind::Compact => Message::Compact(name),
                    ActionKind::MajorCompact => Message::MajorCompact(name),
                    ActionKind::Flush => Message::Flush(name),
                });
            }
        }

        self.drain_cf_queue(server, false, &mut out);
        self.drain_cf_queue(server, true, &mut out);
        out
    }

    fn drain_cf_queue(&self, server: &ServerName, major: bool, out: &mut Vec<Message>) {
        let map = if major {
            &self.cf_major_compact
        } else {
            &self.cf_compact
        };
        let preferred = self.cf_preferred_server.lock().unwrap();
        let mut map = map.lock().unwrap();
        let ready: Vec<(RegionName, String)> = map
            .keys()
            .filter(|key| preferred.get(*key) == Some(server))
            .cloned()
            .collect();
        drop(preferred);
        let mut preferred = self.cf_preferred_server.lock().unwrap();
        for key in ready {
            map.remove(&key);
            preferred.remove(&key);
            out.push(if major {
                Message::CfMajorCompact(key.0, key.1)
            } else {
                Message::CfCompact(key.0, key.1)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytekey::{RowKey, TableName};

    fn region(id: u64) -> RegionInfo {
        RegionInfo::new(TableName(b"t".to_vec()), RowKey(b"a".to_vec()), id)
    }

    #[test]
    fn split_delivered_only_to_preferred_server_and_removed_after() {
        let queues = ActionQueues::new();
        let info = region(9);
        let name = info.name();
        let s7 = ServerName::new("s7", 1);
        let s8 = ServerName::new("s8", 1);
        queues.start_action(info, s7.clone(), ActionKind::Split);

        assert!(queues.drain_for(&s8).is_empty());
        assert!(queues.contains(ActionKind::Split, &name));

        let delivered = queues.drain_for(&s7);
        assert_eq!(delivered, vec![Message::Split(name.clone())]);
        assert!(!queues.contains(ActionKind::Split, &name));

        assert!(queues.drain_for(&s7).is_empty());
    }

    #[test]
    fn cf_compact_round_trips() {
        let queues = ActionQueues::new();
        let info = region(1);
        let name = info.name();
        let s1 = ServerName::new("s1", 1);
        queues.start_cf_compact(info, "cf1".to_string(), s1.clone(), true);

        let delivered = queues.drain_for(&s1);
        assert_eq!(delivered, vec![Message::CfMajorCompact(name, "cf1".to_string())]);
    }
}
