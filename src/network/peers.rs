use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use libp2p::PeerId;

/// Một peer đang kết nối.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub peer_id: PeerId,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub rooms: BTreeSet<String>,
}

impl PeerEntry {
    fn new(peer_id: PeerId, now: DateTime<Utc>) -> Self {
        Self {
            peer_id,
            first_seen: now,
            last_seen: now,
            rooms: BTreeSet::new(),
        }
    }
}

/// Connected peers and the rooms they are subscribed to.
///
/// Peers stay listed until the transport reports their last connection
/// closed; there is no liveness timeout.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    entries: HashMap<PeerId, PeerEntry>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the peer was not known before.
    pub fn register(&mut self, peer_id: PeerId) -> bool {
        let now = Utc::now();
        match self.entries.get_mut(&peer_id) {
            Some(entry) => {
                entry.last_seen = now;
                false
            }
            None => {
                self.entries.insert(peer_id, PeerEntry::new(peer_id, now));
                true
            }
        }
    }

    pub fn remove(&mut self, peer_id: &PeerId) -> Option<PeerEntry> {
        self.entries.remove(peer_id)
    }

    pub fn join_room(&mut self, peer_id: PeerId, room: &str) {
        self.register(peer_id);
        if let Some(entry) = self.entries.get_mut(&peer_id) {
            entry.rooms.insert(room.to_string());
        }
    }

    pub fn leave_room(&mut self, peer_id: &PeerId, room: &str) {
        if let Some(entry) = self.entries.get_mut(peer_id) {
            entry.rooms.remove(room);
            entry.last_seen = Utc::now();
        }
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerEntry> {
        self.entries.get(peer_id)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.entries.contains_key(peer_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Short ids of the peers in `room`, sorted.
    pub fn room_members(&self, room: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.rooms.contains(room))
            .map(|entry| short_id(&entry.peer_id))
            .collect();
        members.sort();
        members
    }
}

/// Last 8 characters of the base58 peer id.
pub fn short_id(peer_id: &PeerId) -> String {
    let pretty = peer_id.to_base58();
    let start = pretty.len().saturating_sub(8);
    pretty[start..].to_string()
}
