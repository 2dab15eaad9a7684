//! In-process transport.
//!
//! Every node joining a [`MemoryNetwork`] registers its inbound queue under its
//! peer identity. A partitioned node behaves like an unreachable host: every
//! rpc to or from it hangs until the caller's timeout.

use dashmap::{DashMap, DashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Transport;
use super::inbound::{self, InboundReceiver, InboundSender, InboundSettings, ReplyFailure};
use super::protocol::{Request, Response};
use crate::error::TransportError;
use crate::membership::Peer;
use crate::metrics::MetricsSink;

#[derive(Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<DashMap<Peer, InboundSender>>,
    partitioned: Arc<DashSet<Peer>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(
        &self,
        peer: Peer,
        settings: InboundSettings,
        metrics: Arc<dyn MetricsSink>,
        cancel: CancellationToken,
    ) -> MemoryTransport {
        let (sender, receiver) = inbound::channel(settings, metrics, cancel);
        self.nodes.insert(peer.clone(), sender);

        MemoryTransport {
            local: peer,
            network: self.clone(),
            incoming: Mutex::new(Some(receiver)),
        }
    }

    pub fn partition(&self, peer: &Peer) {
        tracing::info!(peer = %peer, "Partitioning peer off the network");
        self.partitioned.insert(peer.clone());
    }

    pub fn heal(&self, peer: &Peer) {
        tracing::info!(peer = %peer, "Healing peer partition");
        self.partitioned.remove(peer);
    }

    fn is_partitioned(&self, peer: &Peer) -> bool {
        self.partitioned.contains(peer)
    }
}

pub struct MemoryTransport {
    local: Peer,
    network: MemoryNetwork,
    incoming: Mutex<Option<InboundReceiver>>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn rpc(
        &self,
        peer: &Peer,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        if self.network.is_partitioned(&self.local) || self.network.is_partitioned(peer) {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout(timeout));
        }

        // Clone the sender out so no map guard is held across an await
        let sender = self
            .network
            .nodes
            .get(peer)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::UnknownPeer(peer.to_string()))?;

        match tokio::time::timeout(timeout, sender.submit(request)).await {
            Err(_) => Err(TransportError::Timeout(timeout)),
            Ok(Err(e)) => Err(TransportError::Remote {
                status: 503,
                message: e.to_string(),
            }),
            Ok(Ok(Err(ReplyFailure::TargetUnreachable))) => Err(TransportError::TargetUnreachable),
            Ok(Ok(Ok(response))) => Ok(response),
        }
    }

    fn incoming_requests(&self) -> Option<InboundReceiver> {
        self.incoming.lock().ok()?.take()
    }
}
