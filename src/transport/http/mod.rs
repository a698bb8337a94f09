//! HTTP request/response transport based on reqwest.
//!
//! Every send is one `POST` of the request frame; the response body is the
//! reply frame. Nothing ever arrives unsolicited.
//!
//! # Usage
//!
//! Enabled by the `transport_http` feature (on by default):
//!
//! ```toml
//! [dependencies]
//! protomux = { version = "0.1", features = ["transport_http"] }
//! ```

mod transport;
pub use transport::create_transport;
