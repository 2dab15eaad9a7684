use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::config::DetectorConfig;
use super::state::{Change, DetectorState};
use crate::error::{DetectorError, Result, TransportError};
use crate::membership::{MembershipRecord, Peer, PeerState, UpdateEvent};
use crate::metrics::{MetricsSink, ProbeKind, ProbeStatus};
use crate::transport::{
    InboundReceiver, IncomingRequest, ReplyFailure, Request, Response, Transport,
};

/// Result of one probe task, applied by the scheduler.
#[derive(Debug)]
enum ProbeOutcome {
    Ack {
        target: Peer,
        response: Response,
    },
    IndirectAck {
        target: Peer,
        helper: Peer,
        response: Response,
    },
    Failed {
        target: Peer,
    },
}

impl ProbeOutcome {
    fn is_ack(&self) -> bool {
        !matches!(self, ProbeOutcome::Failed { .. })
    }
}

pub struct Detector {
    config: DetectorConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<DetectorState>,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
    incoming: Mutex<Option<InboundReceiver>>,
}

impl Detector {
    pub fn new(
        config: DetectorConfig,
        transport: Arc<dyn Transport>,
        metrics: Arc<dyn MetricsSink>,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let incoming = transport
            .incoming_requests()
            .ok_or(DetectorError::IncomingUnavailable)?;

        tracing::info!(
            "Created detector {} with {} initial peer(s)",
            config.local_peer,
            config.peers.len()
        );

        Ok(Arc::new(Self {
            state: Mutex::new(DetectorState::new(&config)),
            config,
            transport,
            metrics,
            cancel,
            incoming: Mutex::new(Some(incoming)),
        }))
    }

    /// Runs the probe scheduler and the inbound loop until cancelled.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let incoming = self
            .incoming
            .lock()
            .await
            .take()
            .ok_or(DetectorError::IncomingUnavailable)?;

        tracing::info!("Starting failure detector...");

        let inbound_handle = {
            let detector = self.clone();
            tokio::spawn(async move {
                detector.inbound_loop(incoming).await;
            })
        };

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

        let interval = self.config.ping_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                _ = ticker.tick() => {
                    let Some(target) = self.state.lock().await.next_probe_target() else {
                        tracing::debug!("No peers to probe");
                        continue;
                    };

                    let detector = self.clone();
                    let outcome_tx = outcome_tx.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = detector.cancel.cancelled() => {}
                            outcome = detector.probe(target) => {
                                let _ = outcome_tx.send(outcome);
                            }
                        }
                    });
                }

                Some(outcome) = outcome_rx.recv() => {
                    self.apply_outcome(outcome).await;
                }
            }
        }

        if let Err(e) = inbound_handle.await {
            tracing::error!("Inbound loop failed: {}", e);
        }

        tracing::info!("Failure detector stopped");

        Ok(())
    }

    /// Probes `target` right away, outside the regular schedule. Returns
    /// whether it (directly or through a helper) answered.
    pub async fn probe_now(self: &Arc<Self>, target: &Peer) -> bool {
        let outcome = self.probe(target.clone()).await;
        let acked = outcome.is_ack();
        self.apply_outcome(outcome).await;

        acked
    }

    async fn probe(&self, target: Peer) -> ProbeOutcome {
        let updates = self.outbound_updates().await;
        let started = Instant::now();

        match self
            .call(
                &target,
                Request::DirectPing {
                    updates: updates.clone(),
                },
                self.config.ping_timeout,
            )
            .await
        {
            Ok(response) => {
                self.metrics
                    .probe(ProbeKind::Direct, ProbeStatus::Ack, started.elapsed());
                return ProbeOutcome::Ack { target, response };
            }
            Err(e) => {
                tracing::debug!(peer = %target, "Direct ping failed: {}", e);
                self.metrics
                    .probe(ProbeKind::Direct, ProbeStatus::Failure, started.elapsed());
            }
        }

        self.probe_indirect(target, updates).await
    }

    /// Escalates through helpers, carrying the batch the direct ping already
    /// paid retransmits for.
    async fn probe_indirect(&self, target: Peer, updates: Vec<UpdateEvent>) -> ProbeOutcome {
        let helpers = self
            .state
            .lock()
            .await
            .choose_helpers(&target, self.config.indirect_ping_peers);

        if helpers.is_empty() {
            tracing::debug!(peer = %target, "No helpers available for indirect ping");
            return ProbeOutcome::Failed { target };
        }

        tracing::debug!(
            peer = %target,
            "Escalating to indirect ping through {} helper(s)",
            helpers.len()
        );

        let started = Instant::now();
        let timeout = self.config.indirect_ping_timeout;

        let mut pending = JoinSet::new();
        for helper in helpers {
            let transport = self.transport.clone();
            let request = Request::IndirectPing {
                updates: updates.clone(),
                target_peer: target.clone(),
            };

            pending.spawn(async move {
                let result = bounded_rpc(transport.as_ref(), &helper, request, timeout).await;
                (helper, result)
            });
        }

        // First helper to reach the target wins; dropping the set aborts the rest
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok((helper, Ok(response))) => {
                    self.metrics
                        .probe(ProbeKind::Indirect, ProbeStatus::Ack, started.elapsed());
                    return ProbeOutcome::IndirectAck {
                        target,
                        helper,
                        response,
                    };
                }
                Ok((helper, Err(e))) => {
                    tracing::debug!(peer = %target, helper = %helper, "Indirect ping failed: {}", e);
                }
                Err(e) => {
                    tracing::warn!("Indirect ping task failed: {}", e);
                }
            }
        }

        self.metrics
            .probe(ProbeKind::Indirect, ProbeStatus::Failure, started.elapsed());

        ProbeOutcome::Failed { target }
    }

    async fn apply_outcome(self: &Arc<Self>, outcome: ProbeOutcome) {
        let changes = {
            let mut state = self.state.lock().await;

            match outcome {
                ProbeOutcome::Ack { target, response } => {
                    state.record_ack(&target, &response.updates)
                }
                ProbeOutcome::IndirectAck {
                    target,
                    helper,
                    response,
                } => {
                    state.touch(&target);
                    state.record_ack(&helper, &response.updates)
                }
                ProbeOutcome::Failed { target } => state.suspect(&target).into_iter().collect(),
            }
        };

        self.report(changes);
    }

    async fn inbound_loop(self: Arc<Self>, mut incoming: InboundReceiver) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                next = incoming.recv() => match next {
                    Some(request) => self.handle_incoming(request).await,
                    None => {
                        tracing::warn!("Inbound request stream closed");
                        break;
                    }
                }
            }
        }
    }

    async fn handle_incoming(self: &Arc<Self>, incoming: IncomingRequest) {
        let IncomingRequest { request, reply } = incoming;

        match request {
            Request::DirectPing { updates } => {
                let (changes, outbound) = {
                    let mut state = self.state.lock().await;
                    let changes = state.record_request(&updates);
                    (changes, state.outbound_updates())
                };
                self.report(changes);
                self.metrics.gossip_sent(outbound.len());

                if reply.send(Ok(Response { updates: outbound })).is_err() {
                    tracing::debug!("Requester gave up before the direct ping was answered");
                }
            }

            Request::IndirectPing {
                updates,
                target_peer,
            } => {
                let changes = self.state.lock().await.record_request(&updates);
                self.report(changes);

                // Answered from a separate task so a slow target never stalls the loop
                let detector = self.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = detector.cancel.cancelled() => {}
                        answer = detector.ping_on_behalf(&target_peer) => {
                            if reply.send(answer).is_err() {
                                tracing::debug!("Requester gave up before the indirect ping was answered");
                            }
                        }
                    }
                });
            }
        }
    }

    async fn ping_on_behalf(self: &Arc<Self>, target: &Peer) -> std::result::Result<Response, ReplyFailure> {
        if target == &self.config.local_peer {
            return Ok(Response {
                updates: self.outbound_updates().await,
            });
        }

        let updates = self.outbound_updates().await;

        match self
            .call(target, Request::DirectPing { updates }, self.config.ping_timeout)
            .await
        {
            Ok(response) => {
                let (changes, outbound) = {
                    let mut state = self.state.lock().await;
                    let changes = state.record_ack(target, &response.updates);
                    (changes, state.outbound_updates())
                };
                self.report(changes);
                self.metrics.gossip_sent(outbound.len());

                Ok(Response { updates: outbound })
            }
            Err(e) => {
                tracing::debug!(peer = %target, "Ping on behalf of another peer failed: {}", e);
                Err(ReplyFailure::TargetUnreachable)
            }
        }
    }

    /// Logs changes, counts them and arms suspicion timers.
    fn report(self: &Arc<Self>, changes: Vec<Change>) {
        for change in changes {
            match change {
                Change::Refuted { incarnation } => {
                    tracing::warn!(incarnation, "Refuting a claim about this node");
                }

                Change::Transition {
                    peer,
                    from,
                    to,
                    incarnation,
                    episode,
                } => {
                    self.metrics.transition(to);

                    match (from, to) {
                        (None, state) => {
                            tracing::info!(peer = %peer, incarnation, "Discovered member ({})", state)
                        }
                        (Some(PeerState::Suspect), PeerState::Alive) => {
                            tracing::info!(peer = %peer, incarnation, "Suspicion refuted")
                        }
                        (Some(PeerState::Dead), PeerState::Alive) => {
                            tracing::info!(peer = %peer, incarnation, "Member came back to life")
                        }
                        (Some(from), to) => {
                            tracing::warn!(peer = %peer, incarnation, "{} -> {}", from, to)
                        }
                    }

                    if to == PeerState::Suspect {
                        self.arm_suspicion(peer, episode);
                    }
                }
            }
        }
    }

    fn arm_suspicion(self: &Arc<Self>, peer: Peer, episode: u64) {
        let detector = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = detector.cancel.cancelled() => {}
                _ = tokio::time::sleep(detector.config.suspicion_timeout) => {
                    let change = detector
                        .state
                        .lock()
                        .await
                        .expire_suspicion(&peer, episode);
                    detector.report(change.into_iter().collect());
                }
            }
        });
    }

    async fn outbound_updates(&self) -> Vec<UpdateEvent> {
        let updates = self.state.lock().await.outbound_updates();
        self.metrics.gossip_sent(updates.len());
        updates
    }

    async fn call(
        &self,
        peer: &Peer,
        request: Request,
        timeout: Duration,
    ) -> std::result::Result<Response, TransportError> {
        bounded_rpc(self.transport.as_ref(), peer, request, timeout).await
    }

    // --- Introspection ---

    pub fn local_peer(&self) -> &Peer {
        &self.config.local_peer
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn record(&self, peer: &Peer) -> Option<MembershipRecord> {
        self.state.lock().await.record(peer)
    }

    pub async fn snapshot(&self) -> Vec<MembershipRecord> {
        self.state.lock().await.registry().records()
    }

    pub async fn count(&self, state: PeerState) -> usize {
        self.state.lock().await.registry().count(state)
    }

    pub async fn incarnation(&self) -> u64 {
        self.state.lock().await.incarnation()
    }

    /// Gossip about `peer` still waiting to be piggybacked.
    pub async fn pending_update(&self, peer: &Peer) -> Option<UpdateEvent> {
        self.state.lock().await.gossip().get(peer).cloned()
    }
}

/// Transport call that resolves within `timeout` whatever the transport does.
async fn bounded_rpc(
    transport: &dyn Transport,
    peer: &Peer,
    request: Request,
    timeout: Duration,
) -> std::result::Result<Response, TransportError> {
    match tokio::time::timeout(timeout, transport.rpc(peer, request, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}
