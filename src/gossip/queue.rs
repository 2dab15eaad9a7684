use std::collections::HashMap;

use crate::membership::{Peer, UpdateEvent};

#[derive(Debug, Clone)]
struct Pending {
    event: UpdateEvent,
    transmits: u32,
    // tie-break so that batches are deterministic
    enqueued: u64,
}

/// Updates waiting to be piggybacked onto outgoing traffic.
///
/// At most one entry is kept per peer: the most authoritative one by merge
/// precedence. Every entry is dropped after it has been sent `ceiling` times.
#[derive(Debug, Default)]
pub struct GossipQueue {
    pending: HashMap<Peer, Pending>,
    counter: u64,
}

impl GossipQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(&self, peer: &Peer) -> Option<&UpdateEvent> {
        self.pending.get(peer).map(|p| &p.event)
    }

    /// Queues `event` unless an equally or more authoritative update about
    /// the same peer is already pending. A replaced entry restarts its
    /// retransmit count.
    pub fn enqueue(&mut self, event: UpdateEvent) -> bool {
        if let Some(existing) = self.pending.get(&event.peer)
            && existing.event.precedence() >= event.precedence()
        {
            return false;
        }

        self.counter += 1;
        self.pending.insert(
            event.peer.clone(),
            Pending {
                event,
                transmits: 0,
                enqueued: self.counter,
            },
        );

        true
    }

    pub fn discard(&mut self, peer: &Peer) -> Option<UpdateEvent> {
        self.pending.remove(peer).map(|p| p.event)
    }

    /// Picks up to `max` updates, least transmitted first, and counts one
    /// transmission for each. Entries reaching `ceiling` are removed.
    pub fn take_batch(&mut self, max: usize, ceiling: u32) -> Vec<UpdateEvent> {
        let mut candidates: Vec<(u32, u64, Peer)> = self
            .pending
            .iter()
            .map(|(peer, p)| (p.transmits, p.enqueued, peer.clone()))
            .collect();
        candidates.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut batch = Vec::with_capacity(max.min(candidates.len()));

        for (_, _, peer) in candidates.into_iter().take(max) {
            let exhausted = match self.pending.get_mut(&peer) {
                Some(p) => {
                    p.transmits += 1;
                    batch.push(p.event.clone());
                    p.transmits >= ceiling
                }
                None => false,
            };

            if exhausted {
                tracing::trace!(peer = %peer, "Gossip retransmit ceiling reached");
                self.pending.remove(&peer);
            }
        }

        batch
    }
}
