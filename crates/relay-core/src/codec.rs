//! Event encoding for WebSocket frames.
//!
//! Text frames carry JSON, binary frames carry CBOR. The transport keeps
//! message boundaries, so no length prefix is added.

use crate::error::RelayResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Cursor;

/// Encoding used on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Json,
    Cbor,
}

/// A single encoded event, ready to be written as one WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// The wire format this frame was written in.
    pub fn format(&self) -> WireFormat {
        match self {
            Frame::Text(_) => WireFormat::Json,
            Frame::Binary(_) => WireFormat::Cbor,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(s) => s.len(),
            Frame::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encode a value into a CBOR payload.
pub fn cbor_encode<T: Serialize>(value: &T) -> RelayResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(value, &mut payload)?;
    Ok(payload)
}

/// Decode a CBOR payload into a typed value.
pub fn cbor_decode<T: DeserializeOwned>(data: &[u8]) -> RelayResult<T> {
    let cursor = Cursor::new(data);
    let value: T = ciborium::from_reader(cursor)?;
    Ok(value)
}

/// Encode a value as a frame in the given format.
pub fn encode_frame<T: Serialize>(format: WireFormat, value: &T) -> RelayResult<Frame> {
    match format {
        WireFormat::Json => Ok(Frame::Text(serde_json::to_string(value)?)),
        WireFormat::Cbor => Ok(Frame::Binary(cbor_encode(value)?)),
    }
}

/// Decode a frame according to its own format.
pub fn decode_frame<T: DeserializeOwned>(frame: &Frame) -> RelayResult<T> {
    match frame {
        Frame::Text(s) => Ok(serde_json::from_str(s)?),
        Frame::Binary(b) => cbor_decode(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::messages::{ClientEvent, PrivateMessage, ServerEvent};

    fn msg() -> PrivateMessage {
        PrivateMessage {
            from: Identity::new("vishal").unwrap(),
            to: Identity::new("alice").unwrap(),
            text: "hello".into(),
        }
    }

    #[test]
    fn cbor_carries_tagged_events() {
        let ev = ClientEvent::PrivateMessage(msg());
        let frame = encode_frame(WireFormat::Cbor, &ev).unwrap();
        assert_eq!(frame.format(), WireFormat::Cbor);
        let back: ClientEvent = decode_frame(&frame).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn json_is_text() {
        let ev = ServerEvent::PrivateMessage(msg());
        let frame = encode_frame(WireFormat::Json, &ev).unwrap();
        match frame {
            Frame::Text(ref s) => assert!(s.contains("\"event\":\"private_message\"")),
            Frame::Binary(_) => panic!("expected text frame"),
        }
    }

    #[test]
    fn garbage_is_codec_error() {
        let res: RelayResult<ClientEvent> = decode_frame(&Frame::Binary(vec![0xff, 0x00]));
        assert!(matches!(res, Err(crate::RelayError::Codec(_))));

        let res: RelayResult<ClientEvent> = decode_frame(&Frame::Text("{\"event\":\"nope\"}".into()));
        assert!(res.is_err());
    }
}
