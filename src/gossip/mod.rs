//! Gossip Dissemination
//!
//! Membership changes are never broadcast. They ride along on probe traffic:
//! every request and response carries a small batch taken from the
//! [`GossipQueue`], which bounds per-exchange traffic to O(peers) regardless
//! of churn.

pub mod queue;

pub use queue::GossipQueue;

#[cfg(test)]
mod tests;
