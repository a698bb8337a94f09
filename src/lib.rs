//! Client-side RPC multiplexing over pluggable transports and encodings.
//!
//! Typed method calls on a service stub are wrapped in request envelopes,
//! carried over a byte transport (WebSocket push, HTTP request/response, or
//! an in-memory pair), and the replies are routed back to the caller that
//! is waiting for them.
//!
//! The pieces:
//!
//! - [`ServiceDescriptor`]: the method table of a service, passed in
//!   explicitly.
//! - [`Encoding`]: how envelopes and payloads become bytes (binary, text,
//!   base64, hex, length-delimited).
//! - [`Transport`]: what moves the bytes.
//! - [`ServiceClient`]: correlates requests and responses over one transport,
//!   with callback-style [`invoke`](ServiceClient::invoke) and async
//!   [`call`](ServiceClient::call)/[`subscribe`](ServiceClient::subscribe).
//! - [`rpc_service!`]: generates a typed stub per service.
//!
//! # Example
//!
//! ```ignore
//! protomux::rpc_service! {
//!     pub service Calculator(".Calculator.Service") {
//!         unary fn add(AddRequest) -> AddResult;
//!     }
//! }
//!
//! let calculator = Calculator::connect(
//!     ServiceClientBuilder::new().address("ws://localhost:8089"),
//! ).await?;
//!
//! calculator.add(&AddRequest { lhs: 2, rhs: 3 }, |result| {
//!     println!("2 + 3 = {}", result.unwrap().value);
//! })?;
//! ```

// Import all sub modules once...
mod macros;

mod client;
mod client_builder;
mod descriptor;
mod domain;
mod encoding;
mod error;
mod protocol;
mod rpc_config;
mod stub;
mod transport;

pub(crate) use macros::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_trace,
    log_warn,
};

// Re-export main types
pub use client::{ResponseStream, ServiceClient, SessionState, WeakServiceClient};
pub use client_builder::ServiceClientBuilder;
pub use descriptor::{MethodDescriptor, MethodKind, ServiceDescriptor, ServiceDescriptorBuilder};
pub use encoding::{Encoding, Payload};
pub use error::{Result, RpcError};
pub use rpc_config::ClientConfig;

pub use protocol::{
    // ---
    decode_request,
    decode_response,
    decode_responses,
    encode_request,
    encode_response,
    RequestEnvelope,
    RequestId,
    ResponseEnvelope,
};

// --- public re-exports
pub use domain::{
    //
    Address,
    Delivery,
    InboundSender,
    Transport,
    TransportConfig,
    TransportKind,
    TransportPtr,
};

pub use transport::memory;
pub use transport::{create_http_transport, create_transport, create_websocket_transport};
