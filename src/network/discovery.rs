use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use libp2p::{Multiaddr, PeerId};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    Mdns,
    Dht,
    Bootstrap,
    Manual,
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiscoverySource::Mdns => "mdns",
            DiscoverySource::Dht => "dht",
            DiscoverySource::Bootstrap => "bootstrap",
            DiscoverySource::Manual => "manual",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first dial.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given `attempt` failures so far.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// A dial the swarm should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialRequest {
    pub peer_id: PeerId,
    pub addresses: Vec<Multiaddr>,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialOutcome {
    RetryAt(Instant),
    GaveUp { attempts: u32 },
    /// The failure was for a dial the bridge did not start.
    Untracked,
}

#[derive(Debug)]
struct DialState {
    addresses: Vec<Multiaddr>,
    attempt: u32,
    source: DiscoverySource,
    retry_at: Option<Instant>,
}

/// Turns peer-found notifications into bounded, deduplicated dial attempts.
///
/// Discovery sources re-report the same peer freely; a peer that is
/// connected or already being dialled is never dialled again.
#[derive(Debug)]
pub struct DiscoveryBridge {
    policy: RetryPolicy,
    connected: HashSet<PeerId>,
    dialing: HashMap<PeerId, DialState>,
}

impl DiscoveryBridge {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            connected: HashSet::new(),
            dialing: HashMap::new(),
        }
    }

    pub fn on_peer_found(
        &mut self,
        peer_id: PeerId,
        addresses: Vec<Multiaddr>,
        source: DiscoverySource,
    ) -> Option<DialRequest> {
        if self.connected.contains(&peer_id) {
            return None;
        }
        if let Some(state) = self.dialing.get_mut(&peer_id) {
            for addr in addresses {
                if !state.addresses.contains(&addr) {
                    state.addresses.push(addr);
                }
            }
            return None;
        }

        log::info!("Discovered peer {peer_id} via {source}");
        let state = DialState {
            addresses,
            attempt: 1,
            source,
            retry_at: None,
        };
        let request = DialRequest {
            peer_id,
            addresses: state.addresses.clone(),
            attempt: state.attempt,
        };
        self.dialing.insert(peer_id, state);
        Some(request)
    }

    /// Returns `true` for a peer that was not connected before.
    pub fn on_connected(&mut self, peer_id: PeerId) -> bool {
        self.dialing.remove(&peer_id);
        self.connected.insert(peer_id)
    }

    pub fn on_disconnected(&mut self, peer_id: &PeerId) {
        self.connected.remove(peer_id);
    }

    pub fn on_dial_failed(&mut self, peer_id: &PeerId, now: Instant) -> DialOutcome {
        let Some(state) = self.dialing.get_mut(peer_id) else {
            return DialOutcome::Untracked;
        };
        if state.attempt >= self.policy.max_attempts {
            let attempts = state.attempt;
            log::warn!(
                "Giving up on {peer_id} ({}) after {attempts} attempts",
                state.source
            );
            self.dialing.remove(peer_id);
            return DialOutcome::GaveUp { attempts };
        }
        let at = now + self.policy.backoff(state.attempt);
        state.retry_at = Some(at);
        DialOutcome::RetryAt(at)
    }

    /// Dials whose backoff has elapsed.
    pub fn due_retries(&mut self, now: Instant) -> Vec<DialRequest> {
        let mut due = Vec::new();
        for (peer_id, state) in self.dialing.iter_mut() {
            if state.retry_at.is_some_and(|at| at <= now) {
                state.retry_at = None;
                state.attempt += 1;
                due.push(DialRequest {
                    peer_id: *peer_id,
                    addresses: state.addresses.clone(),
                    attempt: state.attempt,
                });
            }
        }
        due
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.connected.contains(peer_id)
    }

    pub fn is_dialing(&self, peer_id: &PeerId) -> bool {
        self.dialing.contains_key(peer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> Multiaddr {
        format!("/ip4/127.0.0.1/tcp/{port}").parse().unwrap()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(250));
        assert_eq!(p.backoff(40), Duration::from_millis(250));
    }

    #[test]
    fn repeated_discovery_dials_once_and_merges_addresses() {
        let mut bridge = DiscoveryBridge::new(policy());
        let peer = PeerId::random();

        let first = bridge.on_peer_found(peer, vec![addr(1)], DiscoverySource::Mdns).unwrap();
        assert_eq!(first.attempt, 1);
        assert!(bridge.on_peer_found(peer, vec![addr(1), addr(2)], DiscoverySource::Dht).is_none());

        let now = Instant::now();
        bridge.on_dial_failed(&peer, now);
        let retry = bridge.due_retries(now + Duration::from_secs(1));
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].addresses, vec![addr(1), addr(2)]);
        assert_eq!(retry[0].attempt, 2);
    }

    #[test]
    fn connected_peer_is_a_no_op() {
        let mut bridge = DiscoveryBridge::new(policy());
        let peer = PeerId::random();
        assert!(bridge.on_connected(peer));
        assert!(!bridge.on_connected(peer));
        assert!(bridge.on_peer_found(peer, vec![addr(1)], DiscoverySource::Mdns).is_none());

        bridge.on_disconnected(&peer);
        assert!(bridge.on_peer_found(peer, vec![addr(1)], DiscoverySource::Mdns).is_some());
    }

    #[test]
    fn retries_wait_for_backoff_then_give_up() {
        let mut bridge = DiscoveryBridge::new(policy());
        let peer = PeerId::random();
        let start = Instant::now();
        bridge.on_peer_found(peer, vec![addr(1)], DiscoverySource::Bootstrap);

        let DialOutcome::RetryAt(at) = bridge.on_dial_failed(&peer, start) else {
            panic!("expected a retry");
        };
        assert_eq!(at, start + Duration::from_millis(100));
        assert!(bridge.due_retries(start + Duration::from_millis(50)).is_empty());
        assert_eq!(bridge.due_retries(at).len(), 1);
        assert!(bridge.due_retries(at).is_empty());

        assert!(matches!(bridge.on_dial_failed(&peer, at), DialOutcome::RetryAt(_)));
        assert_eq!(bridge.due_retries(at + Duration::from_secs(1)).len(), 1);

        assert_eq!(
            bridge.on_dial_failed(&peer, at),
            DialOutcome::GaveUp { attempts: 3 }
        );
        assert!(!bridge.is_dialing(&peer));
    }

    #[test]
    fn success_clears_pending_dial() {
        let mut bridge = DiscoveryBridge::new(policy());
        let peer = PeerId::random();
        bridge.on_peer_found(peer, vec![addr(1)], DiscoverySource::Manual);
        bridge.on_connected(peer);
        assert!(!bridge.is_dialing(&peer));
        assert!(bridge.is_connected(&peer));
        assert_eq!(bridge.on_dial_failed(&peer, Instant::now()), DialOutcome::Untracked);
    }
}
