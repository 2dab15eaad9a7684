//! Membership Module
//!
//! Holds what this node knows about the rest of the group and the rules for
//! changing that knowledge.
//!
//! ## Core Mechanisms
//! - **State machine**: every peer is `Alive`, `Suspect` or `Dead`. Probe failures move a peer
//!   to `Suspect`, an expired suspicion moves it to `Dead`.
//! - **Incarnation numbers**: a peer's own generation counter. Higher incarnations always win,
//!   equal incarnations are ordered Dead > Suspect > Alive.
//! - **Refutation**: a suspected peer answering directly, or asserting itself `Alive` with a
//!   higher incarnation, clears the suspicion.

pub mod registry;
pub mod types;

pub use registry::Registry;
pub use types::{HttpPeer, MembershipRecord, Peer, PeerState, UpdateEvent, UpdateType};
