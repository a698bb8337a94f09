//! Correlation multiplexer.
//!
//! One multiplexer owns one transport and the table of calls waiting on it.
//! It runs as two tasks:
//!
//! - the writer loop pushes queued frames through the transport in order
//!   and turns a failed send into a failure for that request id;
//! - the dispatch loop consumes everything inbound (frames, failures,
//!   connection loss, session end). It is the only place callbacks run and
//!   the only place a pending call reaches its terminal state.

use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::pending::{PendingTable, ResponseHandler};
use crate::domain::Inbound;
use crate::protocol::{decode_responses, encode_request, ResponseEnvelope};
use crate::{
    // ---
    Address,
    Delivery,
    Encoding,
    InboundSender,
    MethodDescriptor,
    MethodKind,
    RequestId,
    Result,
    RpcError,
    TransportKind,
    TransportPtr,
};

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The transport is being opened.
    Connecting,
    /// Calls may be invoked.
    Open,
    /// The session ended or the connection closed. Terminal.
    Ended,
}

/// One queued request frame for the writer loop.
struct Outbound {
    id: RequestId,
    frame: Bytes,
}

struct Shared {
    pending: Mutex<PendingTable>,
    state: watch::Sender<SessionState>,
    encoding: Encoding,
}

struct Tasks {
    dispatch: JoinHandle<()>,
    writer: JoinHandle<()>,
}

pub(crate) struct Multiplexer {
    shared: Arc<Shared>,
    inbound: InboundSender,
    outbound: mpsc::UnboundedSender<Outbound>,
    tasks: Mutex<Option<Tasks>>,
    transport: TransportPtr,
    transport_kind: TransportKind,
}

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Multiplexer {
    // ---

    /// Open `transport` on `address` and start both loops.
    pub async fn open(
        transport: TransportPtr,
        address: &Address,
        encoding: Encoding,
    ) -> Result<Self> {
        // ---
        let (state, _) = watch::channel(SessionState::Connecting);
        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingTable::new()),
            state,
            encoding,
        });

        let (inbound, inbound_rx) = InboundSender::channel();
        let transport_kind = transport.kind();

        crate::log_debug!("opening {transport_kind} transport to {address}");
        transport.open(address, inbound.clone()).await?;

        // Open before the dispatch loop runs, so an early close can only
        // move the state forward.
        shared.state.send_replace(SessionState::Open);

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let dispatch = tokio::spawn(dispatch_loop(shared.clone(), inbound_rx));
        let writer = tokio::spawn(writer_loop(transport.clone(), outbound_rx, inbound.clone()));

        crate::log_info!("session open: {address} over {transport_kind}, {encoding} envelopes");

        Ok(Self {
            shared,
            inbound,
            outbound,
            tasks: Mutex::new(Some(Tasks { dispatch, writer })),
            transport,
            transport_kind,
        })
    }

    /// Register a call and queue its request frame.
    ///
    /// `payload` is the already-encoded request message. Never waits on the
    /// network; the frame is sent by the writer loop.
    pub fn invoke(
        &self,
        method: &MethodDescriptor,
        payload: Bytes,
        handler: ResponseHandler,
    ) -> Result<RequestId> {
        // ---
        let name = method.full_name();

        let id = {
            let mut pending = lock_ignore_poison(&self.shared.pending);
            if pending.is_closed() {
                return Err(RpcError::SessionEnded);
            }
            pending.register_fresh(RequestId::generate, method.kind(), handler)
        };

        let frame = match encode_request(self.shared.encoding, name, id, payload) {
            Ok(frame) => frame,
            Err(err) => {
                self.forget(id);
                return Err(err);
            }
        };

        if self.outbound.send(Outbound { id, frame }).is_err() {
            self.forget(id);
            return Err(RpcError::SessionEnded);
        }

        crate::log_trace!("queued {name} as {id}");
        Ok(id)
    }

    /// Drop a pending call without running its callback.
    ///
    /// Returns `false` if the id was not pending (already answered, failed,
    /// or flushed).
    pub fn forget(&self, id: RequestId) -> bool {
        // ---
        lock_ignore_poison(&self.shared.pending).remove(id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        lock_ignore_poison(&self.shared.pending).len()
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn lifecycle(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport_kind
    }

    pub fn encoding(&self) -> Encoding {
        self.shared.encoding
    }

    /// End the session.
    ///
    /// Every pending call receives [`RpcError::SessionEnded`], then the
    /// transport is closed. Idempotent; once this returns no callback of this
    /// multiplexer runs again, for every caller.
    ///
    /// Does not wait for sends in flight: the writer loop is aborted after
    /// the flush and the transport closed underneath it.
    pub async fn end_session(&self) -> Result<()> {
        // ---
        let tasks = lock_ignore_poison(&self.tasks).take();
        let Some(tasks) = tasks else {
            // someone else is ending the session, wait for their flush
            let mut lifecycle = self.shared.state.subscribe();
            let _ = lifecycle
                .wait_for(|state| *state == SessionState::Ended)
                .await;
            return Ok(());
        };

        self.inbound.end();
        if let Err(err) = tasks.dispatch.await {
            crate::log_error!("dispatch task failed: {err}");
        }

        // queued frames are undeliverable now, and a send may be stuck
        tasks.writer.abort();
        match tasks.writer.await {
            Err(err) if !err.is_cancelled() => crate::log_error!("writer task failed: {err}"),
            _ => {}
        }

        let result = self.transport.close().await;
        crate::log_info!("session ended");
        result
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        // ---
        // Best effort: flush pending calls. Dropping `outbound` afterwards
        // lets the writer loop close the transport.
        if lock_ignore_poison(&self.tasks).take().is_some() {
            crate::log_debug!("multiplexer dropped without end_session");
            self.inbound.end();
        }
    }
}

impl Shared {
    // ---

    fn dispatch_frame(&self, frame: &[u8]) {
        // ---
        let envelopes = match decode_responses(self.encoding, frame) {
            Ok(envelopes) => envelopes,
            Err(err) => {
                crate::log_warn!("dropping undecodable frame ({} bytes): {err}", frame.len());
                return;
            }
        };

        for envelope in envelopes {
            self.dispatch_response(envelope);
        }
    }

    fn dispatch_response(&self, envelope: ResponseEnvelope) {
        // ---
        let id = envelope.request_id();
        let taken = lock_ignore_poison(&self.pending).take(id);

        let Some((kind, mut handler)) = taken else {
            crate::log_debug!("no pending call for response {id}, dropping");
            return;
        };

        let live = handler(Ok(envelope.data));

        if kind == MethodKind::Streaming {
            let mut pending = lock_ignore_poison(&self.pending);
            if live {
                pending.restore(id, handler);
            } else {
                pending.remove(id);
            }
        }
    }

    fn fail(&self, id: RequestId, error: RpcError) {
        // ---
        let handler = lock_ignore_poison(&self.pending).remove(id);
        match handler {
            Some(mut handler) => {
                handler(Err(error));
            }
            None => crate::log_debug!("failure for {id} after it settled: {error}"),
        }
    }

    /// Close the table and fail everything still in it.
    fn abandon(&self, error: impl Fn() -> RpcError) {
        // ---
        let handlers = lock_ignore_poison(&self.pending).close();
        if !handlers.is_empty() {
            crate::log_debug!("abandoning {} pending call(s): {}", handlers.len(), error());
        }
        for (_, mut handler) in handlers {
            handler(Err(error()));
        }
    }
}

async fn dispatch_loop(shared: Arc<Shared>, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
    // ---
    while let Some(event) = inbound.recv().await {
        match event {
            Inbound::Frame(frame) => {
                crate::log_trace!("inbound frame, {} bytes", frame.len());
                shared.dispatch_frame(&frame);
            }
            Inbound::Failed { id, error } => shared.fail(id, error),
            Inbound::Closed { reason } => {
                crate::log_warn!("connection closed: {reason}");
                shared.abandon(|| RpcError::ConnectionClosed(reason.clone()));
                break;
            }
            Inbound::End => {
                shared.abandon(|| RpcError::SessionEnded);
                break;
            }
        }
    }

    shared.state.send_replace(SessionState::Ended);
}

async fn writer_loop(
    transport: TransportPtr,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: InboundSender,
) {
    // ---
    while let Some(Outbound { id, frame }) = outbound.recv().await {
        // dispatch loop is gone, nobody would see the reply
        if inbound.is_closed() {
            crate::log_trace!("session over, not sending {id}");
            continue;
        }
        let delivery = Delivery::new(id, inbound.clone());
        if let Err(err) = transport.send(frame, delivery).await {
            crate::log_debug!("send for {id} failed: {err}");
            inbound.failed(id, err);
        }
    }

    // every multiplexer handle dropped
    if let Err(err) = transport.close().await {
        crate::log_debug!("closing transport after drop: {err}");
    }
}
