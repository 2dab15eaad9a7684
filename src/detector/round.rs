use rand::Rng;
use rand::seq::SliceRandom;

use crate::membership::Peer;

/// Shuffled probe order for one pass over the group.
///
/// Every candidate taken at the start of a round is handed out exactly once
/// before the round is refilled and reshuffled. Peers that stopped being
/// candidates in the middle of a round are skipped.
#[derive(Debug, Default)]
pub struct ProbeRound {
    order: Vec<Peer>,
    idx: usize,
}

impl ProbeRound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peers left in the current round, skipped ones included.
    pub fn remaining(&self) -> usize {
        self.order.len() - self.idx
    }

    pub fn next<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        refill: impl FnOnce() -> Vec<Peer>,
        keep: impl Fn(&Peer) -> bool,
    ) -> Option<Peer> {
        let mut refill = Some(refill);

        loop {
            while self.idx < self.order.len() {
                let peer = &self.order[self.idx];
                self.idx += 1;

                if keep(peer) {
                    return Some(peer.clone());
                }
            }

            // Round exhausted, start a new one (at most once per call)
            let refill = refill.take()?;
            self.order = refill();
            self.order.shuffle(rng);
            self.idx = 0;

            tracing::trace!("Starting probe round over {} peers", self.order.len());

            if self.order.is_empty() {
                return None;
            }
        }
    }
}
