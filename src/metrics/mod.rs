//! Observability sink.
//!
//! The detector reports counts and durations through [`MetricsSink`] instead
//! of process-wide globals. [`PrometheusMetrics`] registers its families in a
//! caller-provided `prometheus_client` registry.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::{Registry, Unit};
use std::time::Duration;

use crate::membership::PeerState;
use crate::transport::protocol::RequestKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Direct,
    Indirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeStatus {
    Ack,
    Failure,
}

pub trait MetricsSink: Send + Sync {
    fn inject_timeout(&self, kind: RequestKind);
    fn process_timeout(&self, kind: RequestKind);
    fn probe(&self, kind: ProbeKind, status: ProbeStatus, elapsed: Duration);
    fn transition(&self, to: PeerState);
    fn gossip_sent(&self, count: usize);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn inject_timeout(&self, _kind: RequestKind) {}
    fn process_timeout(&self, _kind: RequestKind) {}
    fn probe(&self, _kind: ProbeKind, _status: ProbeStatus, _elapsed: Duration) {}
    fn transition(&self, _to: PeerState) {}
    fn gossip_sent(&self, _count: usize) {}
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
enum RequestType {
    DirectPing,
    IndirectPing,
}

impl From<RequestKind> for RequestType {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::DirectPing => RequestType::DirectPing,
            RequestKind::IndirectPing => RequestType::IndirectPing,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    request_type: RequestType,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
enum Probe {
    Direct,
    Indirect,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
enum Outcome {
    Ack,
    Failure,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ProbeLabels {
    kind: Probe,
    outcome: Outcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
enum State {
    Alive,
    Suspect,
    Dead,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct TransitionLabels {
    state: State,
}

pub struct PrometheusMetrics {
    inject_timeouts: Family<RequestLabels, Counter>,
    process_timeouts: Family<RequestLabels, Counter>,
    probes: Family<ProbeLabels, Counter>,
    rtt: Histogram,
    transitions: Family<TransitionLabels, Counter>,
    gossip_updates: Counter,
}

impl PrometheusMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let sub_registry = registry.sub_registry_with_prefix("detector");

        let inject_timeouts = Family::default();
        sub_registry.register(
            "incoming_request_inject_timeout",
            "Number of timed-out attempts to inject an incoming request",
            inject_timeouts.clone(),
        );

        let process_timeouts = Family::default();
        sub_registry.register(
            "incoming_request_process_timeout",
            "Number of timed-out attempts to process an incoming request",
            process_timeouts.clone(),
        );

        let probes = Family::default();
        sub_registry.register(
            "probes",
            "Number of completed probes by kind and outcome",
            probes.clone(),
        );

        let rtt = Histogram::new(exponential_buckets(0.001, 2.0, 12));
        sub_registry.register_with_unit(
            "probe_rtt",
            "Round-trip time of successful direct probes",
            Unit::Seconds,
            rtt.clone(),
        );

        let transitions = Family::default();
        sub_registry.register(
            "peer_transitions",
            "Number of peer state transitions by target state",
            transitions.clone(),
        );

        let gossip_updates = Counter::default();
        sub_registry.register(
            "gossip_updates_sent",
            "Number of membership updates piggybacked on outgoing messages",
            gossip_updates.clone(),
        );

        Self {
            inject_timeouts,
            process_timeouts,
            probes,
            rtt,
            transitions,
            gossip_updates,
        }
    }
}

impl MetricsSink for PrometheusMetrics {
    fn inject_timeout(&self, kind: RequestKind) {
        self.inject_timeouts
            .get_or_create(&RequestLabels {
                request_type: kind.into(),
            })
            .inc();
    }

    fn process_timeout(&self, kind: RequestKind) {
        self.process_timeouts
            .get_or_create(&RequestLabels {
                request_type: kind.into(),
            })
            .inc();
    }

    fn probe(&self, kind: ProbeKind, status: ProbeStatus, elapsed: Duration) {
        let labels = ProbeLabels {
            kind: match kind {
                ProbeKind::Direct => Probe::Direct,
                ProbeKind::Indirect => Probe::Indirect,
            },
            outcome: match status {
                ProbeStatus::Ack => Outcome::Ack,
                ProbeStatus::Failure => Outcome::Failure,
            },
        };
        self.probes.get_or_create(&labels).inc();

        if kind == ProbeKind::Direct && status == ProbeStatus::Ack {
            self.rtt.observe(elapsed.as_secs_f64());
        }
    }

    fn transition(&self, to: PeerState) {
        let state = match to {
            PeerState::Alive => State::Alive,
            PeerState::Suspect => State::Suspect,
            PeerState::Dead => State::Dead,
        };
        self.transitions
            .get_or_create(&TransitionLabels { state })
            .inc();
    }

    fn gossip_sent(&self, count: usize) {
        self.gossip_updates.inc_by(count as u64);
    }
}
