//! Gossip Queue Tests
//!
//! ## Test Scopes
//! - **Supersession**: one entry per peer, the most authoritative one.
//! - **Retransmission**: fairness between entries and removal at the ceiling.

#[cfg(test)]
mod tests {
    use crate::gossip::GossipQueue;
    use crate::membership::{HttpPeer, Peer, UpdateEvent, UpdateType};

    fn peer(id: &str, port: u16) -> Peer {
        Peer::Http(HttpPeer::new(id, "127.0.0.1", port))
    }

    // ============================================================
    // SUPERSESSION TESTS
    // ============================================================

    #[test]
    fn test_newer_update_supersedes_pending_one() {
        let mut queue = GossipQueue::new();
        let b = peer("b", 9001);

        assert!(queue.enqueue(UpdateEvent::new(b.clone(), UpdateType::Suspect, 0, 1)));
        assert!(queue.enqueue(UpdateEvent::new(b.clone(), UpdateType::Dead, 0, 2)));

        assert_eq!(queue.len(), 1, "At most one entry per peer");
        assert_eq!(queue.get(&b).unwrap().update_type, UpdateType::Dead);
    }

    #[test]
    fn test_less_authoritative_update_is_rejected() {
        let mut queue = GossipQueue::new();
        let b = peer("b", 9001);
        queue.enqueue(UpdateEvent::new(b.clone(), UpdateType::Dead, 2, 7));

        assert!(!queue.enqueue(UpdateEvent::new(b.clone(), UpdateType::Suspect, 2, 8)));
        assert!(!queue.enqueue(UpdateEvent::new(b.clone(), UpdateType::Dead, 1, 9)));
        assert!(!queue.enqueue(UpdateEvent::new(b.clone(), UpdateType::Dead, 2, 7)));

        let pending = queue.get(&b).unwrap();
        assert_eq!(pending.update_type, UpdateType::Dead);
        assert_eq!(pending.seq_num, 7);
    }

    #[test]
    fn test_discard_removes_entry() {
        let mut queue = GossipQueue::new();
        let b = peer("b", 9001);
        queue.enqueue(UpdateEvent::new(b.clone(), UpdateType::Suspect, 0, 1));

        let removed = queue.discard(&b);

        assert_eq!(removed.map(|e| e.update_type), Some(UpdateType::Suspect));
        assert!(queue.is_empty());
        assert!(queue.discard(&b).is_none());
    }

    // ============================================================
    // RETRANSMISSION TESTS
    // ============================================================

    #[test]
    fn test_entry_dropped_at_ceiling() {
        let mut queue = GossipQueue::new();
        let b = peer("b", 9001);
        queue.enqueue(UpdateEvent::new(b.clone(), UpdateType::Suspect, 0, 1));

        for _ in 0..3 {
            assert_eq!(queue.take_batch(8, 3).len(), 1);
        }

        assert!(queue.is_empty(), "Sent ceiling times, must be gone");
        assert!(queue.take_batch(8, 3).is_empty());
    }

    #[test]
    fn test_replacement_restarts_retransmit_count() {
        let mut queue = GossipQueue::new();
        let b = peer("b", 9001);
        queue.enqueue(UpdateEvent::new(b.clone(), UpdateType::Suspect, 0, 1));
        queue.take_batch(8, 2);

        // ACT: supersede after one transmission
        queue.enqueue(UpdateEvent::new(b.clone(), UpdateType::Dead, 0, 2));

        // ASSERT: the new entry gets the full budget
        assert_eq!(queue.take_batch(8, 2).len(), 1);
        assert_eq!(queue.take_batch(8, 2).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_batch_prefers_least_transmitted() {
        let mut queue = GossipQueue::new();
        let b = peer("b", 9001);
        let c = peer("c", 9002);
        let d = peer("d", 9003);

        queue.enqueue(UpdateEvent::new(b.clone(), UpdateType::Suspect, 0, 1));
        queue.enqueue(UpdateEvent::new(c.clone(), UpdateType::Suspect, 0, 2));

        // b and c have now been sent once
        assert_eq!(queue.take_batch(2, 10).len(), 2);

        queue.enqueue(UpdateEvent::new(d.clone(), UpdateType::Dead, 0, 3));

        let batch = queue.take_batch(2, 10);
        let peers: Vec<Peer> = batch.into_iter().map(|e| e.peer).collect();

        assert_eq!(peers, vec![d, b], "Fresh entry first, then oldest by enqueue order");
    }

    #[test]
    fn test_batch_size_is_bounded() {
        let mut queue = GossipQueue::new();
        for port in 0..10 {
            queue.enqueue(UpdateEvent::new(
                peer(&format!("p{}", port), 9000 + port),
                UpdateType::Alive,
                1,
                port as u64,
            ));
        }

        assert_eq!(queue.take_batch(4, 5).len(), 4);
        assert_eq!(queue.len(), 10);
    }
}
