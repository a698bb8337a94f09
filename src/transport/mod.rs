//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Transport` trait. Network transports are hidden behind feature flags
//! and exposed only through constructor functions.
//!
//! Domain code must not depend on transport-specific types.

pub mod memory;

#[cfg(feature = "transport_websocket")]
mod websocket;

#[cfg(feature = "transport_http")]
mod http;

use crate::{Result, RpcError, TransportConfig, TransportKind, TransportPtr};

#[cfg(feature = "transport_websocket")]
pub use websocket::create_transport as create_websocket_transport;

#[cfg(not(feature = "transport_websocket"))]
pub async fn create_websocket_transport(_config: TransportConfig) -> Result<TransportPtr> {
    Err(RpcError::Transport(
        "transport_websocket feature is not enabled".into(),
    ))
}

#[cfg(feature = "transport_http")]
pub use http::create_transport as create_http_transport;

#[cfg(not(feature = "transport_http"))]
pub async fn create_http_transport(_config: TransportConfig) -> Result<TransportPtr> {
    Err(RpcError::Transport("transport_http feature is not enabled".into()))
}

/// Create the network transport selected by `config.kind`.
///
/// `memory://` addresses have no network transport; use [`memory::pair`]
/// and pass the transport to the builder explicitly.
pub async fn create_transport(config: TransportConfig) -> Result<TransportPtr> {
    // ---
    if config.address.scheme() == "memory" {
        return Err(RpcError::MissingConfig(format!(
            "explicit transport for {} (see memory::pair)",
            config.address
        )));
    }

    match config.kind {
        TransportKind::Push => create_websocket_transport(config).await,
        TransportKind::RequestResponse { .. } => create_http_transport(config).await,
    }
}
