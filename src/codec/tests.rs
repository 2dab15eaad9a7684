//! Codec Tests
//!
//! Wire messages must survive both encodings unchanged, and garbage must come
//! back as a decode error.

#[cfg(test)]
mod tests {
    use crate::codec::{self, BincodeCodec, Codec, JsonCodec};
    use crate::error::CodecError;
    use crate::membership::{HttpPeer, Peer, UpdateEvent, UpdateType};
    use crate::transport::protocol::{Request, Response};

    fn sample_indirect() -> Request {
        let b = Peer::Http(HttpPeer::new("b", "10.0.0.2", 9000));
        let c = Peer::Http(HttpPeer::new("c", "10.0.0.3", 9000));

        Request::IndirectPing {
            updates: vec![
                UpdateEvent::new(b, UpdateType::Alive, 3, 11),
                UpdateEvent::new(c.clone(), UpdateType::Suspect, 0, 5),
            ],
            target_peer: c,
        }
    }

    // ============================================================
    // ENCODING TESTS
    // ============================================================

    #[test]
    fn test_json_preserves_messages() {
        let codec = JsonCodec;
        let request = sample_indirect();

        let bytes = codec.encode_request(&request).unwrap();
        assert_eq!(codec.decode_request(&bytes).unwrap(), request);

        let response = Response {
            updates: request.updates().to_vec(),
        };
        let bytes = codec.encode_response(&response).unwrap();
        assert_eq!(codec.decode_response(&bytes).unwrap(), response);
    }

    #[test]
    fn test_bincode_preserves_messages() {
        let codec = BincodeCodec;
        let request = sample_indirect();

        let bytes = codec.encode_request(&request).unwrap();
        assert_eq!(codec.decode_request(&bytes).unwrap(), request);

        let empty = Response::default();
        let bytes = codec.encode_response(&empty).unwrap();
        assert_eq!(codec.decode_response(&bytes).unwrap(), empty);
    }

    #[test]
    fn test_json_incarnation_defaults_to_zero() {
        let json = r#"{"DirectPing":{"updates":[{"peer":{"Http":{"id":"b","host":"h","port":1,"protocol":"http"}},"update_type":"Dead","seq_num":4}]}}"#;

        let decoded = JsonCodec.decode_request(json.as_bytes()).unwrap();

        assert_eq!(decoded.updates()[0].incarnation, 0);
        assert_eq!(decoded.updates()[0].seq_num, 4);
    }

    // ============================================================
    // ERROR TESTS
    // ============================================================

    #[test]
    fn test_garbage_is_a_decode_error() {
        let garbage = b"\xff\x00not a message";

        for codec in [codec::by_name("json").unwrap(), codec::by_name("bincode").unwrap()] {
            assert!(
                matches!(codec.decode_request(garbage), Err(CodecError::Decode(_))),
                "{} accepted garbage",
                codec.name()
            );
            assert!(matches!(
                codec.decode_response(b""),
                Err(CodecError::Decode(_))
            ));
        }
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(codec::by_name("json").unwrap().name(), "json");
        assert_eq!(
            codec::by_name("bincode").unwrap().content_type(),
            "application/octet-stream"
        );
        assert!(codec::by_name("xml").is_none());
    }
}
