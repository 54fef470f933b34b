//! JSON frame encoding/decoding
//!
//! Every WebSocket message carries exactly one JSON document. Frames larger
//! than [`MAX_FRAME_SIZE`] are rejected in both directions.

use crate::error::ProtocolError;
use crate::message::{Request, Response};

/// Maximum frame size (16MB - 1)
pub const MAX_FRAME_SIZE: usize = 0x00FF_FFFF;

/// Decode one inbound frame into a [`Request`]
pub fn decode_request(frame: &[u8]) -> Result<Request, ProtocolError> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: frame.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let text = std::str::from_utf8(frame)?;
    let request: Request = serde_json::from_str(text)?;
    if request.action.is_empty() {
        return Err(ProtocolError::MissingField("action"));
    }

    Ok(request)
}

/// Encode one outbound [`Response`] as a text frame
pub fn encode_response(response: &Response) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(response)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::ResultPayload;
    use serde_json::json;

    #[test]
    fn test_decode_request() {
        let frame = br#"{"request_id":"r1","action":"secret.list","params":{"namespace":"default"}}"#;
        let request = decode_request(frame).unwrap();
        assert_eq!(request.action, "secret.list");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_request(b"not json"),
            Err(ProtocolError::Serialization(_))
        ));
        assert!(matches!(
            decode_request(&[0xff, 0xfe]),
            Err(ProtocolError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_decode_rejects_blank_action() {
        let err = decode_request(br#"{"request_id":"r1","action":""}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("action")));
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let frame = vec![b' '; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            decode_request(&frame),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_encode_response() {
        let response = Response::request("r1", ResultPayload::success(json!([1, 2])));
        let text = encode_response(&response).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["request_id"], "r1");
        assert_eq!(value["data"]["data"], json!([1, 2]));
    }
}
