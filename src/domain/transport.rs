// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! Defines the interface between the multiplexer and whatever actually moves
//! bytes. It intentionally avoids any reference to concrete protocols or
//! client libraries; implementations live under `src/transport/`.
//!
//! A transport is responsible only for carrying opaque frames. Correlation,
//! decoding and callback dispatch happen in the multiplexer.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

use crate::{RequestId, Result, RpcError};

/// The two families of byte carriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Long-lived bidirectional connection. Inbound frames may arrive at any
    /// time, including several replies to one outbound frame.
    Push,

    /// One exchange per send: exactly one reply or one error, never
    /// unsolicited traffic.
    ///
    /// When `synchronous`, each exchange completes before the next request
    /// is issued; otherwise exchanges run concurrently.
    RequestResponse { synchronous: bool },
}

impl TransportKind {
    /// Whether replies can only arrive as answers to a send.
    pub fn is_request_response(self) -> bool {
        matches!(self, TransportKind::RequestResponse { .. })
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Push => f.write_str("push"),
            TransportKind::RequestResponse { synchronous: false } => {
                f.write_str("request-response")
            }
            TransportKind::RequestResponse { synchronous: true } => {
                f.write_str("request-response-sync")
            }
        }
    }
}

impl FromStr for TransportKind {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        // ---
        match s.trim().to_ascii_lowercase().as_str() {
            "push" | "ws" | "websocket" => Ok(TransportKind::Push),
            "request-response" | "http" | "xhr" => {
                Ok(TransportKind::RequestResponse { synchronous: false })
            }
            "request-response-sync" | "http-sync" | "xhr-sync" => {
                Ok(TransportKind::RequestResponse { synchronous: true })
            }
            other => Err(RpcError::ConfigConflict(format!(
                "unrecognized transport: {other}, valid values: push, request-response, request-response-sync"
            ))),
        }
    }
}

impl Serialize for TransportKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TransportKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Schemes understood by [`Address::parse`].
const SCHEMES: &[&str] = &["ws", "wss", "http", "https", "memory"];

/// Where a service lives.
///
/// The scheme selects the default transport kind: `ws`/`wss` and `memory`
/// are push, `http`/`https` are request/response.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address(Arc<Url>);

impl Address {
    // ---

    /// Parse and validate an address.
    ///
    /// # Errors
    ///
    /// [`RpcError::InvalidAddress`] if the string is not a URL, uses an
    /// unsupported scheme, or lacks a host where one is required.
    pub fn parse(address: &str) -> Result<Self> {
        // ---
        let url = Url::parse(address.trim())
            .map_err(|err| RpcError::InvalidAddress(format!("{address}: {err}")))?;

        if !SCHEMES.contains(&url.scheme()) {
            return Err(RpcError::InvalidAddress(format!(
                "{address}: unsupported scheme {}, valid schemes: {}",
                url.scheme(),
                SCHEMES.join(", ")
            )));
        }

        if url.scheme() != "memory" && url.host_str().map_or(true, str::is_empty) {
            return Err(RpcError::InvalidAddress(format!("{address}: missing host")));
        }

        Ok(Self(Arc::new(url)))
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Transport kind implied by the scheme.
    pub fn default_kind(&self) -> TransportKind {
        match self.scheme() {
            "http" | "https" => TransportKind::RequestResponse { synchronous: false },
            _ => TransportKind::Push,
        }
    }

    /// Whether `kind` can serve this address.
    pub fn accepts(&self, kind: TransportKind) -> bool {
        match self.scheme() {
            "memory" => true,
            _ => self.default_kind().is_request_response() == kind.is_request_response(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Address {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

/// Configuration handed to transport factory functions.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub address: Address,
    pub kind: TransportKind,
    /// MIME type of outbound frames, from the envelope encoding.
    pub content_type: &'static str,
    /// Outbound frames are printable text (see [`Encoding::is_textual`]).
    ///
    /// [`Encoding::is_textual`]: crate::Encoding::is_textual
    pub textual: bool,
}

/// Events flowing from a transport (and the multiplexer's own writer loop)
/// into the dispatch loop.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Raw bytes holding one or more response envelopes.
    Frame(Bytes),
    /// A send for this id failed.
    Failed { id: RequestId, error: RpcError },
    /// The connection is gone.
    Closed { reason: String },
    /// The caller ended the session.
    End,
}

/// Handle a transport uses to pass inbound traffic to its multiplexer.
///
/// Cheap to clone. Sending after the multiplexer has shut down is a no-op.
#[derive(Clone, Debug)]
pub struct InboundSender {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl InboundSender {
    // ---
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hand over one inbound frame. Returns `false` if nobody is listening
    /// any more.
    pub fn frame(&self, frame: Bytes) -> bool {
        self.tx.send(Inbound::Frame(frame)).is_ok()
    }

    /// Report that the connection closed or failed.
    pub fn closed(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Inbound::Closed {
            reason: reason.into(),
        });
    }

    /// Whether the receiving multiplexer has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) fn failed(&self, id: RequestId, error: RpcError) {
        let _ = self.tx.send(Inbound::Failed { id, error });
    }

    pub(crate) fn end(&self) -> bool {
        self.tx.send(Inbound::End).is_ok()
    }
}

/// Per-send completion handle: the `onMessage`/`onError` pair for one frame.
///
/// Push transports usually ignore it, since replies arrive through the
/// [`InboundSender`] given to [`Transport::open`]. Request/response
/// transports call [`deliver`](Self::deliver) with the reply or
/// [`fail`](Self::fail) with the error, exactly once.
#[derive(Debug)]
pub struct Delivery {
    id: RequestId,
    inbound: InboundSender,
}

impl Delivery {
    // ---
    pub(crate) fn new(id: RequestId, inbound: InboundSender) -> Self {
        Self { id, inbound }
    }

    /// Id of the request this frame carries.
    pub fn request_id(&self) -> RequestId {
        self.id
    }

    /// Pass a reply frame to the multiplexer.
    pub fn deliver(&self, frame: Bytes) {
        self.inbound.frame(frame);
    }

    /// Fail the call this frame belongs to.
    pub fn fail(self, error: RpcError) {
        self.inbound.failed(self.id, error);
    }
}

/// Transport abstraction.
///
/// Implementations must ensure that:
/// - `open()` returns only once frames can be sent;
/// - every inbound frame is passed to the `InboundSender` in arrival order;
/// - a connection loss is reported once through `InboundSender::closed`;
/// - a failed `send` is reported either by returning `Err` or through
///   `Delivery::fail`, never both.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
///
/// # Available Implementations
///
/// - `memory::pair` - In-memory push transport (always available)
/// - `create_websocket_transport` - WebSocket push (`transport_websocket`)
/// - `create_http_transport` - HTTP request/response (`transport_http`)
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    fn kind(&self) -> TransportKind;

    /// Connect to `address` and start forwarding inbound traffic.
    async fn open(&self, address: &Address, inbound: InboundSender) -> Result<()>;

    /// Send one frame.
    async fn send(&self, frame: Bytes, delivery: Delivery) -> Result<()>;

    /// Close the transport and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
pub type TransportPtr = Arc<dyn Transport>;
