//! Inbound request queue between a transport and the detector.
//!
//! Transports hand every received request to [`InboundSender::submit`], which
//! applies two independent budgets: the request must be accepted into the
//! queue within the injection timeout, and then answered within the
//! processing timeout. Both waits also end on cancellation.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::protocol::{Request, Response};
use crate::error::InboundError;
use crate::metrics::MetricsSink;

/// How the detector answered a request.
pub type Reply = Result<Response, ReplyFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFailure {
    /// The target of an indirect ping did not answer in time.
    TargetUnreachable,
}

#[derive(Debug)]
pub struct IncomingRequest {
    pub request: Request,
    /// Dropping the sender signals "no response" to the caller.
    pub reply: oneshot::Sender<Reply>,
}

pub type InboundReceiver = mpsc::Receiver<IncomingRequest>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundSettings {
    pub buffer_size: usize,
    pub inject_timeout: Duration,
    pub process_timeout: Duration,
}

impl Default for InboundSettings {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            inject_timeout: Duration::from_secs(1),
            process_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct InboundSender {
    tx: mpsc::Sender<IncomingRequest>,
    settings: InboundSettings,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
}

pub fn channel(
    settings: InboundSettings,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
) -> (InboundSender, InboundReceiver) {
    let (tx, rx) = mpsc::channel(settings.buffer_size.max(1));

    (
        InboundSender {
            tx,
            settings,
            metrics,
            cancel,
        },
        rx,
    )
}

impl InboundSender {
    pub async fn submit(&self, request: Request) -> Result<Reply, InboundError> {
        let kind = request.kind();
        let (reply_tx, reply_rx) = oneshot::channel();
        let incoming = IncomingRequest {
            request,
            reply: reply_tx,
        };

        // Try injecting the request into the detector
        tokio::select! {
            _ = self.cancel.cancelled() => return Err(InboundError::Cancelled),

            sent = tokio::time::timeout(self.settings.inject_timeout, self.tx.send(incoming)) => {
                match sent {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => return Err(InboundError::Cancelled),
                    Err(_) => {
                        tracing::warn!("Timed out injecting {} request", kind.as_str());
                        self.metrics.inject_timeout(kind);
                        return Err(InboundError::InjectTimeout);
                    }
                }
            }
        }

        // Now wait for the answer
        tokio::select! {
            _ = self.cancel.cancelled() => Err(InboundError::Cancelled),

            reply = tokio::time::timeout(self.settings.process_timeout, reply_rx) => {
                match reply {
                    Ok(Ok(reply)) => Ok(reply),
                    Ok(Err(_)) => Err(InboundError::Dropped),
                    Err(_) => {
                        tracing::warn!("Timed out waiting for {} response", kind.as_str());
                        self.metrics.process_timeout(kind);
                        Err(InboundError::ProcessTimeout)
                    }
                }
            }
        }
    }
}
