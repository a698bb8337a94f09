use thiserror::Error;

use crate::MethodKind;

/// Errors that can occur while building a client or running calls on it.
///
/// Construction and dispatch errors are returned synchronously from the
/// call that caused them. Transport and lifecycle errors are delivered to
/// the callback of the pending call they concern.
#[derive(Error, Debug)]
pub enum RpcError {
    /// A required builder or configuration field was not provided.
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// Two configuration settings contradict each other.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// The service address could not be parsed or has an unsupported scheme.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The method name is not part of the service descriptor.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// The request or response type does not match the descriptor.
    #[error("method {method} expects {expected}, got {actual}")]
    TypeMismatch {
        method: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The operation is not valid for the method's kind (e.g. `call` on a
    /// streaming method).
    #[error("method {method} is {kind}")]
    WrongMethodKind { method: String, kind: MethodKind },

    /// A message could not be deserialized.
    #[error("decode error: {0}")]
    Decode(String),

    /// JSON serialization or deserialization failed. The only way encoding
    /// a message can fail.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying transport reported a failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport has not been opened, or has already been closed.
    #[error("transport not open")]
    NotOpen,

    /// The connection was closed while the call was outstanding.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The session was ended by the caller while the call was outstanding.
    #[error("session ended")]
    SessionEnded,

    /// Request timed out waiting for response
    #[error("request timed out")]
    Timeout,
}

impl From<prost::DecodeError> for RpcError {
    fn from(err: prost::DecodeError) -> Self {
        RpcError::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for RpcError {
    fn from(err: base64::DecodeError) -> Self {
        RpcError::Decode(format!("base64: {err}"))
    }
}

impl From<hex::FromHexError> for RpcError {
    fn from(err: hex::FromHexError) -> Self {
        RpcError::Decode(format!("hex: {err}"))
    }
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
