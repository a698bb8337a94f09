use bytes::Bytes;
use std::collections::HashMap;

use crate::{MethodKind, RequestId, Result};

/// Type-erased continuation of one call. Receives the raw response payload
/// (or the error) and decodes it into the caller's response type.
///
/// Returns whether the call is still live; `false` after it delivered an
/// error.
pub(crate) type ResponseHandler = Box<dyn FnMut(Result<Bytes>) -> bool + Send>;

/// One outstanding invocation.
struct PendingCall {
    kind: MethodKind,
    // None while the dispatch loop is running a streaming handler
    handler: Option<ResponseHandler>,
}

/// Tracks calls waiting for responses.
///
/// The table is the single source of truth for "is this id still awaited".
/// Unary entries leave the table the first time they are taken; streaming
/// entries stay until removed or drained, and lend their handler out for
/// each response.
pub(crate) struct PendingTable {
    // ---
    calls: HashMap<RequestId, PendingCall>,
    closed: bool,
}

impl PendingTable {
    // ---

    /// Create a new empty pending table
    pub fn new() -> Self {
        // ---
        Self {
            calls: HashMap::new(),
            closed: false,
        }
    }

    /// Register a call under a fresh id.
    ///
    /// Ids come from `draw`; a drawn id that is already pending is thrown
    /// away and drawn again.
    pub fn register_fresh(
        &mut self,
        mut draw: impl FnMut() -> RequestId,
        kind: MethodKind,
        handler: ResponseHandler,
    ) -> RequestId {
        // ---
        let id = loop {
            let id = draw();
            if !self.calls.contains_key(&id) {
                break id;
            }
            crate::log_debug!("request id {id} collides with a pending call, drawing again");
        };

        self.calls.insert(
            id,
            PendingCall {
                kind,
                handler: Some(handler),
            },
        );
        id
    }

    /// Take the handler for a response to `id`.
    ///
    /// Unary calls are removed from the table. Streaming calls stay
    /// registered and must get their handler back through
    /// [`restore`](Self::restore).
    pub fn take(&mut self, id: RequestId) -> Option<(MethodKind, ResponseHandler)> {
        // ---
        let kind = self.calls.get(&id)?.kind;
        match kind {
            MethodKind::Unary => {
                let call = self.calls.remove(&id)?;
                call.handler.map(|handler| (MethodKind::Unary, handler))
            }
            MethodKind::Streaming => {
                let call = self.calls.get_mut(&id)?;
                call.handler.take().map(|handler| (MethodKind::Streaming, handler))
            }
        }
    }

    /// Give a streaming handler back after it ran.
    ///
    /// Returns false (and drops the handler) if the call was removed in the
    /// meantime.
    pub fn restore(&mut self, id: RequestId, handler: ResponseHandler) -> bool {
        // ---
        match self.calls.get_mut(&id) {
            Some(call) if call.handler.is_none() => {
                call.handler = Some(handler);
                true
            }
            _ => false,
        }
    }

    /// Remove a pending call, returning its handler if it is not currently
    /// lent out.
    pub fn remove(&mut self, id: RequestId) -> Option<ResponseHandler> {
        // ---
        self.calls.remove(&id).and_then(|call| call.handler)
    }

    /// Remove every pending call and refuse new ones from now on.
    pub fn close(&mut self) -> Vec<(RequestId, ResponseHandler)> {
        // ---
        self.closed = true;
        self.calls
            .drain()
            .filter_map(|(id, call)| call.handler.map(|handler| (id, handler)))
            .collect()
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[cfg(test)]
    pub fn contains(&self, id: RequestId) -> bool {
        self.calls.contains_key(&id)
    }

    /// Get the number of pending calls
    pub fn len(&self) -> usize {
        // ---
        self.calls.len()
    }
}
