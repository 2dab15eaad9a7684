use super::Codec;
use crate::error::CodecError;
use crate::transport::protocol::{Request, Response};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &'static str {
        "application/json; charset=utf-8"
    }

    fn encode_request(&self, request: &Request) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(request).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(response).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
