//! WebSocket push transport based on tokio-tungstenite.
//!
//! One long-lived connection per client. A reader task forwards every
//! inbound message in arrival order; sends write one binary message each.
//!
//! # Usage
//!
//! Enabled by the `transport_websocket` feature (on by default):
//!
//! ```toml
//! [dependencies]
//! protomux = { version = "0.1", features = ["transport_websocket"] }
//! ```
//!
//! Only `ws://` is supported; `wss://` needs a TLS-enabled build of
//! tokio-tungstenite.

mod transport;
pub use transport::create_transport;
