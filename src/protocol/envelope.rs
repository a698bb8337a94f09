//! Request/response envelopes.
//!
//! Every call travels as a [`RequestEnvelope`] carrying the fully-qualified
//! method name, the request id and the already-encoded payload. Replies come
//! back as [`ResponseEnvelope`]s carrying the same id. Payload bytes are
//! opaque at this layer.
//!
//! The binary form is protobuf (`name` = 1, `id` = 2, `data` = 3; the
//! response reuses tags 2 and 3). The text form is JSON with `data` as a
//! base64 string, following the protobuf JSON mapping.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Encoding, RequestId, Result};

/// Outbound envelope wrapping one method invocation.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestEnvelope {
    /// Fully-qualified method name, e.g. `.Calculator.Service.add`.
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(uint32, tag = "2")]
    pub id: u32,

    /// Encoded request payload.
    #[prost(bytes = "bytes", tag = "3")]
    #[serde(with = "base64_data")]
    pub data: Bytes,
}

/// Inbound envelope carrying one reply for a pending id.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseEnvelope {
    #[prost(uint32, tag = "2")]
    pub id: u32,

    /// Encoded response payload.
    #[prost(bytes = "bytes", tag = "3")]
    #[serde(with = "base64_data")]
    pub data: Bytes,
}

impl RequestEnvelope {
    // ---
    pub fn new(name: impl Into<String>, id: RequestId, data: Bytes) -> Self {
        Self {
            name: name.into(),
            id: id.as_u32(),
            data,
        }
    }

    pub fn request_id(&self) -> RequestId {
        RequestId::from(self.id)
    }
}

impl ResponseEnvelope {
    // ---
    pub fn new(id: RequestId, data: Bytes) -> Self {
        Self {
            id: id.as_u32(),
            data,
        }
    }

    pub fn request_id(&self) -> RequestId {
        RequestId::from(self.id)
    }
}

/// Wrap an encoded payload into a request frame.
pub fn encode_request(
    encoding: Encoding,
    name: &str,
    id: RequestId,
    payload: Bytes,
) -> Result<Bytes> {
    // ---
    encoding.encode(&RequestEnvelope::new(name, id, payload))
}

/// Decode one response frame.
pub fn decode_response(encoding: Encoding, frame: &[u8]) -> Result<ResponseEnvelope> {
    encoding.decode(frame)
}

/// Decode every response envelope contained in one inbound chunk.
///
/// Only [`Encoding::LengthDelimited`] can carry more than one envelope per
/// chunk; other encodings always yield exactly one.
pub fn decode_responses(encoding: Encoding, chunk: &[u8]) -> Result<Vec<ResponseEnvelope>> {
    encoding.decode_stream(chunk)
}

/// Decode a request frame, as the serving side of the protocol does.
pub fn decode_request(encoding: Encoding, frame: &[u8]) -> Result<RequestEnvelope> {
    encoding.decode(frame)
}

/// Encode a response frame, as the serving side of the protocol does.
pub fn encode_response(encoding: Encoding, id: RequestId, payload: Bytes) -> Result<Bytes> {
    encoding.encode(&ResponseEnvelope::new(id, payload))
}

/// serde adapter rendering `bytes` fields as standard base64 strings.
mod base64_data {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
