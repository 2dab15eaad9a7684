//! Error taxonomy.
//!
//! Only configuration problems stop the detector. Everything that goes wrong
//! on a single exchange (`TransportError`, `CodecError`) is absorbed by the
//! probe state machine, and inbound overload (`InboundError`) is reported back
//! to the remote caller as a retryable condition.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("no peers provided")]
    NoPeers,

    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),

    #[error("transport incoming request stream is unavailable (already taken?)")]
    IncomingUnavailable,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("error encoding message: {0}")]
    Encode(String),

    #[error("error decoding message: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("rpc timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("remote answered with status {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("target peer did not answer the indirect ping")]
    TargetUnreachable,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("unknown peer: {0}")]
    UnknownPeer(String),
}

/// Failure to get an inbound request through the detector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InboundError {
    #[error("timeout injecting a request, detector is likely overloaded")]
    InjectTimeout,

    #[error("timeout waiting for a response, detector is likely overloaded")]
    ProcessTimeout,

    #[error("detector is shutting down")]
    Cancelled,

    #[error("detector dropped the request without answering")]
    Dropped,
}

pub type Result<T> = std::result::Result<T, DetectorError>;
