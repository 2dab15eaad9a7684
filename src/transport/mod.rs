//! Transport Module
//!
//! The detector is transport-agnostic: it sends requests through
//! [`Transport::rpc`] and reads requests sent by other peers from the inbound
//! queue the transport hands over once through
//! [`Transport::incoming_requests`].
//!
//! ## Implementations
//! - **`http`**: axum server + reqwest client, bodies encoded with a pluggable [`Codec`](crate::codec::Codec).
//! - **`memory`**: in-process network for tests and simulations, with partition control.

pub mod http;
pub mod inbound;
pub mod memory;
pub mod protocol;

pub use http::HttpTransport;
pub use inbound::{
    InboundReceiver, InboundSender, InboundSettings, IncomingRequest, Reply, ReplyFailure,
};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use protocol::{Request, RequestKind, Response};

use std::time::Duration;

use crate::error::TransportError;
use crate::membership::Peer;

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` to `peer`. Must resolve within `timeout`.
    async fn rpc(
        &self,
        peer: &Peer,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, TransportError>;

    /// Requests received from other peers. Yields the stream only once.
    fn incoming_requests(&self) -> Option<InboundReceiver>;
}

#[cfg(test)]
mod tests;
