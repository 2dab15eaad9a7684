use std::time::Duration;

use crate::error::{DetectorError, Result};
use crate::membership::Peer;
use crate::transport::InboundSettings;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_INDIRECT_PING_PEERS: usize = 1;
pub const DEFAULT_INDIRECT_PING_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_SUSPICION_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_INJECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_INCOMING_BUFFER_SIZE: usize = 100;
pub const DEFAULT_RETRANSMIT_MULTIPLIER: u32 = 4;
pub const DEFAULT_MAX_GOSSIP_BATCH: usize = 16;

/// Everything the detector can be tuned with.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// This node. Claims about it are refuted rather than applied.
    pub local_peer: Peer,
    /// Initial peer set; must not be empty.
    pub peers: Vec<Peer>,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    /// Helpers asked to probe a peer that missed a direct ping.
    pub indirect_ping_peers: usize,
    /// How long to wait for helpers to relay their result.
    pub indirect_ping_timeout: Duration,
    /// Grace period between Suspect and Dead.
    pub suspicion_timeout: Duration,
    pub inject_timeout: Duration,
    pub process_timeout: Duration,
    pub incoming_buffer_size: usize,
    /// Fixed gossip retransmit ceiling. `None` scales it with the group:
    /// `retransmit_multiplier * ceil(log10(n + 1))`.
    pub retransmit_ceiling: Option<u32>,
    pub retransmit_multiplier: u32,
    pub max_gossip_batch: usize,
    pub rng_seed: Option<u64>,
}

impl DetectorConfig {
    pub fn new(local_peer: Peer, peers: Vec<Peer>) -> Self {
        Self {
            local_peer,
            peers,
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            indirect_ping_peers: DEFAULT_INDIRECT_PING_PEERS,
            indirect_ping_timeout: DEFAULT_INDIRECT_PING_TIMEOUT,
            suspicion_timeout: DEFAULT_SUSPICION_TIMEOUT,
            inject_timeout: DEFAULT_INJECT_TIMEOUT,
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            incoming_buffer_size: DEFAULT_INCOMING_BUFFER_SIZE,
            retransmit_ceiling: None,
            retransmit_multiplier: DEFAULT_RETRANSMIT_MULTIPLIER,
            max_gossip_batch: DEFAULT_MAX_GOSSIP_BATCH,
            rng_seed: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.peers.is_empty() {
            return Err(DetectorError::NoPeers);
        }

        if self.peers.contains(&self.local_peer) {
            return Err(DetectorError::InvalidConfig(format!(
                "local peer {} is listed in its own peer set",
                self.local_peer
            )));
        }

        let durations = [
            ("ping interval", self.ping_interval),
            ("ping timeout", self.ping_timeout),
            ("indirect ping timeout", self.indirect_ping_timeout),
            ("suspicion timeout", self.suspicion_timeout),
            ("inject timeout", self.inject_timeout),
            ("process timeout", self.process_timeout),
        ];

        for (name, value) in durations {
            if value.is_zero() {
                return Err(DetectorError::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }

        if self.max_gossip_batch == 0 {
            return Err(DetectorError::InvalidConfig(
                "max gossip batch must be at least 1".to_string(),
            ));
        }

        if self.retransmit_ceiling == Some(0) || self.retransmit_multiplier == 0 {
            return Err(DetectorError::InvalidConfig(
                "gossip retransmit ceiling must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Settings for the inbound queue a transport is built with.
    pub fn inbound_settings(&self) -> InboundSettings {
        InboundSettings {
            buffer_size: self.incoming_buffer_size,
            inject_timeout: self.inject_timeout,
            process_timeout: self.process_timeout,
        }
    }
}
