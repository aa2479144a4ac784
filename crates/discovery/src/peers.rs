//! Thread-safe peer liveness table.
//!
//! Keyed by `(ip, port)`; names may collide across keys and are never used
//! as a key. The single mutex is held only for the duration of each
//! operation; `snapshot` hands out an owned copy so callers traverse
//! without the lock.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::identity::NodeIdentity;
use crate::PEER_TTL;

/// A known peer plus the instant its last heartbeat arrived.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub identity: NodeIdentity,
    pub last_seen: Instant,
}

impl PeerRecord {
    /// Seconds since the last heartbeat from this peer.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// Result of a name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameLookup {
    Found(NodeIdentity),
    NotFound,
    /// Two or more peers share the name; the caller must disambiguate by
    /// endpoint instead.
    Ambiguous,
}

/// Mapping from peer endpoint to its latest record.
#[derive(Debug, Default)]
pub struct PeerTable {
    inner: Mutex<HashMap<(Ipv4Addr, u16), PeerRecord>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the peer or bumps its `last_seen`.
    ///
    /// `last_seen` never moves backwards for a key, so a reordered pair of
    /// upserts cannot make a live peer look stale.
    pub fn upsert(&self, identity: NodeIdentity, now: Instant) {
        let mut map = self.inner.lock().unwrap();
        map.entry((identity.ip, identity.port))
            .and_modify(|record| {
                record.last_seen = record.last_seen.max(now);
                record.identity = identity.clone();
            })
            .or_insert(PeerRecord {
                identity,
                last_seen: now,
            });
    }

    /// Returns an owned point-in-time copy of all records, order unspecified.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.inner.lock().unwrap().values().cloned().collect()
    }

    /// Case-sensitive exact lookup by peer name.
    pub fn lookup_by_name(&self, name: &str) -> NameLookup {
        let map = self.inner.lock().unwrap();
        let mut matches = map.values().filter(|r| r.identity.name == name);
        match (matches.next(), matches.next()) {
            (None, _) => NameLookup::NotFound,
            (Some(record), None) => NameLookup::Found(record.identity.clone()),
            (Some(_), Some(_)) => NameLookup::Ambiguous,
        }
    }

    /// Lookup by `(ip, port)` endpoint.
    pub fn lookup_by_endpoint(&self, ip: Ipv4Addr, port: u16) -> Option<NodeIdentity> {
        let map = self.inner.lock().unwrap();
        map.get(&(ip, port)).map(|r| r.identity.clone())
    }

    /// Removes every record older than [`PEER_TTL`]. Returns the eviction
    /// count. Safe to call concurrently with `upsert`.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut map = self.inner.lock().unwrap();
        let before = map.len();
        map.retain(|_, record| now.saturating_duration_since(record.last_seen) <= PEER_TTL);
        before - map.len()
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
