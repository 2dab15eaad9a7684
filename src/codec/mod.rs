//! Message Codecs
//!
//! Turn protocol messages into bytes and back. Transports stay unaware of the
//! encoding; a failure to decode is returned to the caller, never a panic.

pub mod binary;
pub mod json;

pub use binary::BincodeCodec;
pub use json::JsonCodec;

use std::sync::Arc;

use crate::error::CodecError;
use crate::transport::protocol::{Request, Response};

pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Value for the HTTP `Content-Type` header.
    fn content_type(&self) -> &'static str;

    fn encode_request(&self, request: &Request) -> Result<Vec<u8>, CodecError>;
    fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError>;
    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError>;
    fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError>;
}

/// Looks a codec up by the name used on the command line.
pub fn by_name(name: &str) -> Option<Arc<dyn Codec>> {
    match name {
        "json" => Some(Arc::new(JsonCodec)),
        "bincode" => Some(Arc::new(BincodeCodec)),
        _ => None,
    }
}

#[cfg(test)]
mod tests;
