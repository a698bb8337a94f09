/// Wire-level protocol: envelopes and request ids.
///
/// This module defines the framing messages that carry one application
/// payload each, and the identifiers used to correlate replies.
mod envelope;
mod request_id;

pub use envelope::{
    // ---
    decode_request,
    decode_response,
    decode_responses,
    encode_request,
    encode_response,
    RequestEnvelope,
    ResponseEnvelope,
};
pub use request_id::RequestId;
