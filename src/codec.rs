//! Wire encoding.
//!
//! [`MessageCodec`] turns outgoing [`Command`]s into text frames and incoming frames
//! into [`Response`]s. [`JsonCodec`] is the JSON text protocol spoken by the broker.

use serde_json::Value;

use crate::Result;
use crate::error::DecodeError;
use crate::protocol::{Command, Response};

/// Converts between wire frames and protocol records.
pub trait MessageCodec: Send + 'static {
    /// Encode one command. Must be deterministic for a given input.
    fn encode(&self, command: &Command) -> Result<String>;

    /// Encode several commands into a single frame.
    fn encode_batch(&self, commands: &[Command]) -> Result<String>;

    /// Decode a frame.
    ///
    /// A frame holding an array fans out into one response per element; elements
    /// that are not responses are skipped. Empty or whitespace-only frames decode to
    /// nothing. Frames that are not JSON, or hold neither an object nor an array,
    /// fail with [`DecodeError`] naming the payload.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Response>>;
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode(&self, command: &Command) -> Result<String> {
        Ok(serde_json::to_string(command)?)
    }

    fn encode_batch(&self, commands: &[Command]) -> Result<String> {
        Ok(serde_json::to_string(commands)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Response>> {
        let trimmed = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map_or(&[][..], |start| &bytes[start..]);

        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        if trimmed.first() != Some(&b'[') {
            return serde_json::from_slice::<Response>(trimmed)
                .map(|response| vec![response])
                .map_err(|e| DecodeError::new(bytes, e).into());
        }

        let elements: Vec<Value> =
            serde_json::from_slice(trimmed).map_err(|e| DecodeError::new(bytes, e))?;

        Ok(elements
            .into_iter()
            .filter_map(|element| match serde_json::from_value::<Response>(element) {
                Ok(response) => Some(response),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Skipping undecodable batch element");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::Kind;
    use crate::path::PathFormat;
    use crate::protocol::Request;

    #[test]
    fn encode_is_deterministic() {
        let path = PathFormat::default().parse("news:sport").unwrap();
        let command = Request::publish(&path, json!({"b": 2, "a": 1})).into_command(9, None);

        let first = JsonCodec.encode(&command).unwrap();
        let second = JsonCodec.encode(&command).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn encode_batch_is_an_array() {
        let path = PathFormat::default().parse("sport").unwrap();
        let commands = vec![
            Request::subscribe(&path).into_command(1, None),
            Request::presence(&path).into_command(2, None),
        ];

        let frame = JsonCodec.encode_batch(&commands).unwrap();
        assert_eq!(
            frame,
            r#"[{"method":"subscribe","params":{"channel":"sport"},"uid":"1"},{"method":"presence","params":{"channel":"sport"},"uid":"2"}]"#
        );
    }

    #[test]
    fn decode_single_object() {
        let responses = JsonCodec
            .decode(br#"{"uid":"1","method":"connect","error":null,"body":"c1"}"#)
            .unwrap();

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].body, json!("c1"));
    }

    #[test]
    fn decode_array_fans_out() {
        let frame = br#"[
            {"method":"message","error":null,"body":{"channel":"a","data":1}},
            {"method":"join","error":null,"body":{"channel":"a","data":{}}}
        ]"#;

        let responses = JsonCodec.decode(frame).unwrap();
        let methods: Vec<_> = responses.iter().map(|r| r.method.as_str()).collect();
        assert_eq!(methods, ["message", "join"]);
    }

    #[test]
    fn decode_whitespace_is_empty() {
        assert!(JsonCodec.decode(b"").unwrap().is_empty());
        assert!(JsonCodec.decode(b" \n\t ").unwrap().is_empty());
    }

    #[test]
    fn decode_malformed_names_payload() {
        let error = JsonCodec.decode(b"{\"method\": 12").unwrap_err();

        assert_eq!(error.kind(), Kind::Decode);
        let decode = error.downcast_ref::<DecodeError>().unwrap();
        assert_eq!(decode.payload, "{\"method\": 12");
    }

    #[test]
    fn decode_skips_records_without_method() {
        let frame = br#"[{"body": 1}, null, {"method":"message","body":{"channel":"a"}}]"#;

        let responses = JsonCodec.decode(frame).unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].method, "message");
    }

    #[test]
    fn decode_rejects_scalar_frames() {
        let error = JsonCodec.decode(b"42").unwrap_err();

        assert_eq!(error.kind(), Kind::Decode);
    }

    #[test]
    fn decode_rejects_object_without_method() {
        let error = JsonCodec.decode(br#"{"body": 1}"#).unwrap_err();

        assert_eq!(error.kind(), Kind::Decode);
    }
}
