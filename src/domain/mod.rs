//! Domain layer public interface.
//!
//! This module defines the transport-facing abstractions, independent of
//! any concrete network library.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod transport;

// --- Transport domain re-exports ---

pub(crate) use transport::Inbound;

pub use transport::{
    //
    Address,
    Delivery,
    InboundSender,
    Transport,
    TransportConfig,
    TransportKind,
    TransportPtr,
};
