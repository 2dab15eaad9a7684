//! Membership registry and the per-peer state machine.
//!
//! Pure data plus transition logic. The detector owns exactly one registry and
//! serializes every access to it behind a single lock.

use std::collections::HashMap;
use tokio::time::Instant;

use super::types::{MembershipRecord, Peer, PeerState, UpdateEvent};

#[derive(Debug, Default)]
pub struct Registry {
    records: HashMap<Peer, MembershipRecord>,
    // insertion order, so listings are stable between calls
    order: Vec<Peer>,
}

impl Registry {
    pub fn new(peers: impl IntoIterator<Item = Peer>) -> Self {
        let mut registry = Self::default();

        for peer in peers {
            registry.insert(MembershipRecord::new(peer));
        }

        registry
    }

    fn insert(&mut self, record: MembershipRecord) {
        if !self.records.contains_key(&record.peer) {
            self.order.push(record.peer.clone());
        }
        self.records.insert(record.peer.clone(), record);
    }

    pub fn get(&self, peer: &Peer) -> Option<&MembershipRecord> {
        self.records.get(peer)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of every known peer, in the order they became known.
    pub fn list_peers(&self) -> Vec<Peer> {
        self.order.clone()
    }

    pub fn records(&self) -> Vec<MembershipRecord> {
        self.order
            .iter()
            .filter_map(|peer| self.records.get(peer).cloned())
            .collect()
    }

    pub fn count(&self, state: PeerState) -> usize {
        self.records.values().filter(|r| r.state == state).count()
    }

    /// Dead peers are left out of probe rounds.
    pub fn is_probe_candidate(&self, peer: &Peer) -> bool {
        self.records
            .get(peer)
            .is_some_and(|r| r.state != PeerState::Dead)
    }

    pub fn probe_candidates(&self) -> Vec<Peer> {
        self.order
            .iter()
            .filter(|peer| self.is_probe_candidate(peer))
            .cloned()
            .collect()
    }

    pub fn alive_peers_except(&self, excluded: &Peer) -> Vec<Peer> {
        self.order
            .iter()
            .filter(|peer| *peer != excluded)
            .filter(|peer| {
                self.records
                    .get(*peer)
                    .is_some_and(|r| r.state == PeerState::Alive)
            })
            .cloned()
            .collect()
    }

    /// Merges a gossiped update. Returns whether local state changed.
    ///
    /// The update wins only if its `(incarnation, rank)` is strictly greater
    /// than the record's, which makes merging commutative and idempotent.
    /// Unknown peers are added with the gossiped state.
    pub fn apply_update(&mut self, update: &UpdateEvent) -> bool {
        let now = Instant::now();
        let new_state = PeerState::from(update.update_type);

        match self.records.get_mut(&update.peer) {
            Some(record) => {
                if update.precedence() <= record.precedence() {
                    return false;
                }

                tracing::debug!(
                    peer = %update.peer,
                    "Updating {} (inc {}) -> {} (inc {})",
                    record.state,
                    record.incarnation,
                    new_state,
                    update.incarnation,
                );

                if record.state != new_state {
                    record.state = new_state;
                    record.last_state_change = now;
                    if new_state == PeerState::Suspect {
                        record.suspicion_episode += 1;
                    }
                }
                record.incarnation = update.incarnation;
                record.last_seq_num = update.seq_num;

                true
            }
            None => {
                tracing::info!(peer = %update.peer, "Discovered new member via gossip ({})", new_state);

                self.insert(MembershipRecord {
                    peer: update.peer.clone(),
                    state: new_state,
                    incarnation: update.incarnation,
                    last_seq_num: update.seq_num,
                    last_state_change: now,
                    last_seen: None,
                    suspicion_episode: u64::from(new_state == PeerState::Suspect),
                });

                true
            }
        }
    }

    /// Handles a self-assertion heard straight from `peer`.
    ///
    /// A Suspect record reverts to Alive when the asserted incarnation is at
    /// least the suspected one. Dead records need a strictly higher
    /// incarnation, which `apply_update` already covers.
    pub fn observe_direct(&mut self, peer: &Peer, incarnation: u64) -> bool {
        let Some(record) = self.records.get_mut(peer) else {
            return false;
        };

        if record.state != PeerState::Suspect || incarnation < record.incarnation {
            return false;
        }

        tracing::info!(peer = %peer, "{} refuted suspicion (inc={})", peer.id(), incarnation);

        record.state = PeerState::Alive;
        record.incarnation = incarnation;
        record.last_state_change = Instant::now();

        true
    }

    pub fn touch(&mut self, peer: &Peer) {
        if let Some(record) = self.records.get_mut(peer) {
            record.last_seen = Some(Instant::now());
        }
    }

    /// Alive -> Suspect after an exhausted probe escalation. Only the first
    /// failure of an episode transitions.
    pub fn suspect(&mut self, peer: &Peer) -> bool {
        match self.records.get_mut(peer) {
            Some(record) if record.state == PeerState::Alive => {
                record.state = PeerState::Suspect;
                record.last_state_change = Instant::now();
                record.suspicion_episode += 1;
                true
            }
            _ => false,
        }
    }

    /// Suspect -> Dead, but only if the suspicion `episode` is still running.
    pub fn expire_suspicion(&mut self, peer: &Peer, episode: u64) -> bool {
        match self.records.get_mut(peer) {
            Some(record)
                if record.state == PeerState::Suspect && record.suspicion_episode == episode =>
            {
                record.state = PeerState::Dead;
                record.last_state_change = Instant::now();
                true
            }
            _ => false,
        }
    }
}
