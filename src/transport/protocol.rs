//! Detector Wire Protocol
//!
//! Messages exchanged between peers. Every message carries a piggybacked
//! batch of [`UpdateEvent`]s, so each request/response pair doubles as an
//! anti-entropy exchange.

use serde::{Deserialize, Serialize};

use crate::membership::{Peer, UpdateEvent};

// --- API Endpoints ---

/// Endpoint for a direct liveness probe.
pub const ENDPOINT_PING_DIRECT: &str = "/v1/ping/direct";
/// Endpoint asking the receiver to probe a third peer on the caller's behalf.
pub const ENDPOINT_PING_INDIRECT: &str = "/v1/ping/indirect";

// --- Messages ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Request {
    DirectPing {
        updates: Vec<UpdateEvent>,
    },
    /// The receiver pings `target_peer` and reports whether it answered.
    IndirectPing {
        updates: Vec<UpdateEvent>,
        target_peer: Peer,
    },
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::DirectPing { .. } => RequestKind::DirectPing,
            Request::IndirectPing { .. } => RequestKind::IndirectPing,
        }
    }

    pub fn updates(&self) -> &[UpdateEvent] {
        match self {
            Request::DirectPing { updates } => updates,
            Request::IndirectPing { updates, .. } => updates,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    pub updates: Vec<UpdateEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    DirectPing,
    IndirectPing,
}

impl RequestKind {
    pub fn endpoint(self) -> &'static str {
        match self {
            RequestKind::DirectPing => ENDPOINT_PING_DIRECT,
            RequestKind::IndirectPing => ENDPOINT_PING_INDIRECT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::DirectPing => "direct_ping",
            RequestKind::IndirectPing => "indirect_ping",
        }
    }
}
