//! tattle: peer-to-peer failure detection
//!
//! This library crate holds the SWIM-style failure detector and the pluggable
//! pieces around it. The binary (`main.rs`) wires them to an HTTP server.
//!
//! ## Architecture Modules
//! - **`membership`**: Peer identities, update events and the registry that owns every
//!   peer's liveness state and the merge rule between updates.
//! - **`gossip`**: The queue of updates waiting to be piggybacked on outgoing messages,
//!   bounded by a retransmit ceiling.
//! - **`detector`**: The active component. Probe scheduling, direct/indirect escalation,
//!   suspicion timers, refutation and the inbound request loop.
//! - **`transport`**: The `Transport` seam, the inbound queue with its injection and
//!   processing budgets, and the HTTP and in-memory implementations.
//! - **`codec`**: JSON and bincode encodings of the wire messages.
//! - **`metrics`**: The observability sink the detector reports to, with a Prometheus backend.
//! - **`error`**: Typed errors for every layer.

pub mod codec;
pub mod detector;
pub mod error;
pub mod gossip;
pub mod membership;
pub mod metrics;
pub mod transport;

pub use detector::{Detector, DetectorConfig};
pub use error::{DetectorError, Result};
pub use membership::{HttpPeer, Peer, PeerState};
