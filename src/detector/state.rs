use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::config::DetectorConfig;
use super::round::ProbeRound;
use crate::gossip::GossipQueue;
use crate::membership::{MembershipRecord, Peer, PeerState, Registry, UpdateEvent, UpdateType};

/// A state change worth reporting once the lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Transition {
        peer: Peer,
        /// `None` when the peer was unknown before.
        from: Option<PeerState>,
        to: PeerState,
        incarnation: u64,
        /// Suspicion episode of the record after the change.
        episode: u64,
    },
    /// Another peer claimed this node was suspect or dead.
    Refuted { incarnation: u64 },
}

/// Everything the detector mutates, kept behind one lock.
pub struct DetectorState {
    local: Peer,
    incarnation: u64,
    // last sequence number handed out by this node
    seq: u64,
    alive_seq: u64,
    registry: Registry,
    gossip: GossipQueue,
    round: ProbeRound,
    rng: StdRng,
    retransmit_ceiling: Option<u32>,
    retransmit_multiplier: u32,
    max_batch: usize,
}

impl DetectorState {
    pub fn new(config: &DetectorConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut state = Self {
            local: config.local_peer.clone(),
            incarnation: 0,
            seq: 0,
            alive_seq: 0,
            registry: Registry::new(config.peers.iter().cloned()),
            gossip: GossipQueue::new(),
            round: ProbeRound::new(),
            rng,
            retransmit_ceiling: config.retransmit_ceiling,
            retransmit_multiplier: config.retransmit_multiplier,
            max_batch: config.max_gossip_batch,
        };
        state.alive_seq = state.next_seq();

        state
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn local(&self) -> &Peer {
        &self.local
    }

    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gossip(&self) -> &GossipQueue {
        &self.gossip
    }

    /// This node's own Alive assertion at its current incarnation.
    pub fn self_alive(&self) -> UpdateEvent {
        UpdateEvent::new(
            self.local.clone(),
            UpdateType::Alive,
            self.incarnation,
            self.alive_seq,
        )
    }

    /// Gossip ceiling for the current group size (this node included).
    pub fn retransmit_ceiling(&self) -> u32 {
        if let Some(ceiling) = self.retransmit_ceiling {
            return ceiling.max(1);
        }

        let group = (self.registry.len() + 1) as f64;
        let factor = (group + 1.0).log10().ceil() as u32;

        (self.retransmit_multiplier * factor).max(1)
    }

    /// Batch to piggyback on the next outgoing message.
    ///
    /// Always leads with this node's own event: the queued refutation if
    /// there is one, the current self-assertion otherwise.
    pub fn outbound_updates(&mut self) -> Vec<UpdateEvent> {
        let ceiling = self.retransmit_ceiling();
        let mut batch = self.gossip.take_batch(self.max_batch, ceiling);

        match batch.iter().position(|u| u.peer == self.local) {
            Some(0) => {}
            Some(i) => {
                let own = batch.remove(i);
                batch.insert(0, own);
            }
            None => batch.insert(0, self.self_alive()),
        }

        batch
    }

    /// Merges piggybacked updates.
    ///
    /// `responder` is the peer that sent them in answer to our own request;
    /// its Alive assertions count as direct evidence and can clear a
    /// suspicion at an equal incarnation.
    pub fn merge(&mut self, updates: &[UpdateEvent], responder: Option<&Peer>) -> Vec<Change> {
        let mut changes = Vec::new();

        for update in updates {
            if update.peer == self.local {
                changes.extend(self.refute(update));
                continue;
            }

            let before = self.registry.get(&update.peer).map(|r| r.state);

            if self.registry.apply_update(update) {
                self.gossip.enqueue(update.clone());
            } else if responder == Some(&update.peer)
                && update.update_type == UpdateType::Alive
                && self.registry.observe_direct(&update.peer, update.incarnation)
            {
                // the pending suspicion was just disproved
                self.gossip.discard(&update.peer);
                self.gossip.enqueue(update.clone());
            } else {
                continue;
            }

            changes.extend(self.transition(&update.peer, before));
        }

        changes
    }

    fn refute(&mut self, claim: &UpdateEvent) -> Option<Change> {
        if claim.update_type == UpdateType::Alive || claim.incarnation < self.incarnation {
            return None;
        }

        self.incarnation = claim.incarnation + 1;
        self.alive_seq = self.next_seq();
        self.gossip.enqueue(self.self_alive());

        Some(Change::Refuted {
            incarnation: self.incarnation,
        })
    }

    fn transition(&self, peer: &Peer, before: Option<PeerState>) -> Option<Change> {
        let record = self.registry.get(peer)?;

        if before == Some(record.state) {
            return None;
        }

        Some(Change::Transition {
            peer: peer.clone(),
            from: before,
            to: record.state,
            incarnation: record.incarnation,
            episode: record.suspicion_episode,
        })
    }

    /// A probe of `peer` was answered.
    pub fn record_ack(&mut self, peer: &Peer, updates: &[UpdateEvent]) -> Vec<Change> {
        self.registry.touch(peer);
        self.merge(updates, Some(peer))
    }

    /// Merges the updates of an inbound request.
    ///
    /// Senders lead with their own Alive assertion, so that event is direct
    /// evidence about the sender and refutes a suspicion at an equal
    /// incarnation.
    pub fn record_request(&mut self, updates: &[UpdateEvent]) -> Vec<Change> {
        let sender = updates
            .first()
            .filter(|u| u.update_type == UpdateType::Alive && u.peer != self.local)
            .map(|u| u.peer.clone());

        let changes = self.merge(updates, sender.as_ref());
        if let Some(sender) = &sender {
            self.registry.touch(sender);
        }

        changes
    }

    pub fn touch(&mut self, peer: &Peer) {
        self.registry.touch(peer);
    }

    /// Escalation for `peer` is exhausted. Suspects it once per episode.
    pub fn suspect(&mut self, peer: &Peer) -> Option<Change> {
        if !self.registry.suspect(peer) {
            return None;
        }

        let change = self.transition(peer, Some(PeerState::Alive))?;
        self.originate(peer, UpdateType::Suspect);

        Some(change)
    }

    /// Suspicion timer for `episode` fired.
    pub fn expire_suspicion(&mut self, peer: &Peer, episode: u64) -> Option<Change> {
        if !self.registry.expire_suspicion(peer, episode) {
            return None;
        }

        let change = self.transition(peer, Some(PeerState::Suspect))?;
        self.originate(peer, UpdateType::Dead);

        Some(change)
    }

    fn originate(&mut self, peer: &Peer, update_type: UpdateType) {
        let incarnation = self
            .registry
            .get(peer)
            .map(|r| r.incarnation)
            .unwrap_or_default();
        let seq_num = self.next_seq();

        self.gossip
            .enqueue(UpdateEvent::new(peer.clone(), update_type, incarnation, seq_num));
    }

    /// Next peer to probe, or `None` when nothing is left to probe.
    pub fn next_probe_target(&mut self) -> Option<Peer> {
        let registry = &self.registry;

        self.round.next(
            &mut self.rng,
            || registry.probe_candidates(),
            |peer| registry.is_probe_candidate(peer),
        )
    }

    /// Up to `count` Alive peers, other than `target`, to probe it indirectly.
    pub fn choose_helpers(&mut self, target: &Peer, count: usize) -> Vec<Peer> {
        self.registry
            .alive_peers_except(target)
            .choose_multiple(&mut self.rng, count)
            .cloned()
            .collect()
    }

    pub fn record(&self, peer: &Peer) -> Option<MembershipRecord> {
        self.registry.get(peer).cloned()
    }
}
