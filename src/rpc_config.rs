//! Public, transport-agnostic client configuration.
//!
//! This type intentionally contains no transport-specific options. The
//! builder interprets it: the address scheme picks the transport family and
//! the transport layer turns the address into a connection.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Encoding, Result, TransportKind};

/// Client configuration, loadable from JSON.
///
/// # Example
///
/// ```
/// use protomux::{ClientConfig, Encoding};
///
/// let config = ClientConfig::from_json(r#"{
///     "address": "http://localhost:8088",
///     "transport": "request-response-sync",
///     "encoding": "text",
///     "request_timeout_ms": 5000
/// }"#).unwrap();
///
/// assert_eq!(config.encoding, Some(Encoding::Text));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    // ---
    /// Service address, e.g. `ws://localhost:8089` or `http://localhost:8088`.
    pub address: String,

    /// Transport kind. Defaults to the one implied by the address scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,

    /// Envelope encoding. Default: binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,

    /// Payload encoding. Default: same as the envelope encoding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_encoding: Option<Encoding>,

    /// Timeout applied by `ServiceClient::call`, in milliseconds. Default:
    /// none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// Create a config for `address` with every other setting defaulted.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            transport: None,
            encoding: None,
            payload_encoding: None,
            request_timeout_ms: None,
        }
    }

    /// Parse a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_transport(mut self, kind: TransportKind) -> Self {
        self.transport = Some(kind);
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_payload_encoding(mut self, encoding: Encoding) -> Self {
        self.payload_encoding = Some(encoding);
        self
    }

    /// Set the request timeout applied by `ServiceClient::call`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
