//! Failure Detector
//!
//! SWIM-style probing over a pluggable transport.
//!
//! ## Core Mechanisms
//! - **Probe rounds**: every `ping_interval` the scheduler takes the next peer from a shuffled round and probes it from its own task, so a slow peer never stalls the loop.
//! - **Escalation**: a missed direct ping is retried through up to `indirect_ping_peers` Alive helpers; if none reaches the target it becomes Suspect.
//! - **Suspicion**: each suspicion arms a timer; when it fires before a refutation the peer is declared Dead.
//! - **Anti-entropy**: every request and response carries a batch of gossip, merged under the single state lock.
//! - **Refutation**: claims that this node is suspect or dead are answered with a higher incarnation.

pub mod config;
pub mod round;
pub mod service;
pub mod state;

pub use config::DetectorConfig;
pub use round::ProbeRound;
pub use service::Detector;
pub use state::{Change, DetectorState};
