//! Compact binary encoding. Smaller than JSON, but both ends must agree on it.

use super::Codec;
use crate::error::CodecError;
use crate::transport::protocol::{Request, Response};

#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn content_type(&self) -> &'static str {
        "application/octet-stream"
    }

    fn encode_request(&self, request: &Request) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(request).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(response).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
