use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier used to match a response envelope to its pending call.
///
/// Ids are drawn uniformly from the 32-bit space using the operating
/// system's CSPRNG. They are only required to be unique among the calls
/// currently outstanding on one client; the pending table re-draws on
/// collision (see `PendingTable::register_fresh`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u32);

impl RequestId {
    // ---

    /// Draw a new random request id.
    pub fn generate() -> Self {
        // ---
        Self(OsRng.next_u32())
    }

    /// The raw wire value.
    pub fn as_u32(self) -> u32 {
        // ---
        self.0
    }
}

impl fmt::Display for RequestId {
    // ---

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        write!(f, "{:08x}", self.0)
    }
}

impl From<u32> for RequestId {
    // ---

    fn from(value: u32) -> Self {
        // ---
        Self(value)
    }
}

impl From<RequestId> for u32 {
    // ---

    fn from(id: RequestId) -> Self {
        // ---
        id.0
    }
}
