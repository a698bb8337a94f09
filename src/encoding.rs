//! Encoding strategies.
//!
//! One [`Encoding`] value decides how a message becomes bytes. The same
//! strategy is applied to envelopes and, independently, to payloads; a
//! client may pick a different one for each. Switching strategy changes the
//! wire representation only, never the call semantics.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Result, RpcError};

/// A message that can travel through every [`Encoding`].
///
/// This is the codec boundary: schema-generated types derive
/// `prost::Message` for the binary forms and serde for the text form.
pub trait Payload: prost::Message + Default + Serialize + DeserializeOwned + Send + 'static {}

impl<T> Payload for T where T: prost::Message + Default + Serialize + DeserializeOwned + Send + 'static {}

/// Serialization strategy for envelopes and payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// Canonical protobuf bytes.
    #[default]
    Binary,

    /// JSON text.
    #[serde(alias = "json")]
    Text,

    /// Standard base64 of the protobuf bytes.
    Base64,

    /// Lowercase hexadecimal of the protobuf bytes.
    Hex,

    /// Varint length prefix followed by protobuf bytes. Self-framing, so
    /// several messages may share one transport frame.
    #[serde(alias = "delimited")]
    LengthDelimited,
}

impl Encoding {
    // ---

    /// Every variant, in declaration order.
    pub const ALL: [Encoding; 5] = [
        Encoding::Binary,
        Encoding::Text,
        Encoding::Base64,
        Encoding::Hex,
        Encoding::LengthDelimited,
    ];

    /// Serialize one message.
    pub fn encode<M: Payload>(self, msg: &M) -> Result<Bytes> {
        // ---
        let bytes = match self {
            Encoding::Binary => msg.encode_to_vec(),
            Encoding::Text => serde_json::to_vec(msg)?,
            Encoding::Base64 => STANDARD.encode(msg.encode_to_vec()).into_bytes(),
            Encoding::Hex => hex::encode(msg.encode_to_vec()).into_bytes(),
            Encoding::LengthDelimited => msg.encode_length_delimited_to_vec(),
        };
        Ok(Bytes::from(bytes))
    }

    /// Deserialize exactly one message.
    pub fn decode<M: Payload>(self, bytes: &[u8]) -> Result<M> {
        // ---
        match self {
            Encoding::Binary => Ok(M::decode(bytes)?),
            Encoding::Text => Ok(serde_json::from_slice(bytes)?),
            Encoding::Base64 => {
                let raw = STANDARD.decode(bytes.trim_ascii())?;
                Ok(M::decode(raw.as_slice())?)
            }
            Encoding::Hex => {
                let raw = hex::decode(bytes.trim_ascii())?;
                Ok(M::decode(raw.as_slice())?)
            }
            Encoding::LengthDelimited => Ok(M::decode_length_delimited(bytes)?),
        }
    }

    /// Deserialize every message contained in one chunk.
    ///
    /// For [`Encoding::LengthDelimited`] the chunk may hold any number of
    /// back-to-back messages; a truncated trailing message is an error. All
    /// other encodings hold exactly one message per chunk.
    pub fn decode_stream<M: Payload>(self, chunk: &[u8]) -> Result<Vec<M>> {
        // ---
        if self != Encoding::LengthDelimited {
            return Ok(vec![self.decode(chunk)?]);
        }

        let mut buf = chunk;
        let mut messages = Vec::new();

        while !buf.is_empty() {
            let len = prost::decode_length_delimiter(&mut buf)?;
            if len > buf.len() {
                return Err(RpcError::Decode(format!(
                    "truncated frame: need {len} bytes, have {}",
                    buf.len()
                )));
            }
            let (head, rest) = buf.split_at(len);
            messages.push(M::decode(head)?);
            buf = rest;
        }

        Ok(messages)
    }

    /// MIME type announced by request/response transports.
    pub fn content_type(self) -> &'static str {
        match self {
            Encoding::Binary | Encoding::LengthDelimited => "application/x-protobuf",
            Encoding::Text => "application/json",
            Encoding::Base64 | Encoding::Hex => "text/plain",
        }
    }

    /// Whether encoded output is printable text.
    pub fn is_textual(self) -> bool {
        matches!(self, Encoding::Text | Encoding::Base64 | Encoding::Hex)
    }

    /// Whether encoded output carries its own message boundaries.
    pub fn is_self_framing(self) -> bool {
        self == Encoding::LengthDelimited
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Binary => "binary",
            Encoding::Text => "text",
            Encoding::Base64 => "base64",
            Encoding::Hex => "hex",
            Encoding::LengthDelimited => "length-delimited",
        };
        f.write_str(name)
    }
}

impl FromStr for Encoding {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        // ---
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" | "protobuf" => Ok(Encoding::Binary),
            "text" | "json" => Ok(Encoding::Text),
            "base64" => Ok(Encoding::Base64),
            "hex" => Ok(Encoding::Hex),
            "length-delimited" | "delimited" => Ok(Encoding::LengthDelimited),
            other => Err(RpcError::ConfigConflict(format!(
                "unrecognized encoding: {other}, valid values: binary, text, base64, hex, length-delimited"
            ))),
        }
    }
}
