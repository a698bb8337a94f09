// src/transport/memory/mod.rs

//! In-memory transport implementation.
//!
//! A pure in-process push transport plus the peer that plays the remote
//! service. It is intended for testing, local execution, and as a reference
//! for transport semantics.
//!
//! ## Reference Semantics
//!
//! The in-memory transport defines the **reference behavior** for the transport
//! layer. All other transport implementations are expected to approximate this
//! behavior as closely as their underlying systems allow and to document any
//! unavoidable deviations:
//!
//! - `open()` returns once frames can flow in both directions.
//! - Inbound frames reach the multiplexer in the order the peer sent them.
//! - Closing either side is observed exactly once by the other.
//! - Nothing is dropped due to timing or scheduling.
//!
//! ## Non-Goals
//!
//! No network behavior or failure simulation beyond an explicit close.

mod transport;

pub use transport::{pair, MemoryPeer, MemoryTransport, PeerSender};
