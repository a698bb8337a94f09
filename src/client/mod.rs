//! Typed client surface.
//!
//! [`ServiceClient`] pairs a [`ServiceDescriptor`] with a running
//! multiplexer. The callback-style [`invoke`](ServiceClient::invoke) is the
//! core contract; [`call`](ServiceClient::call) and
//! [`subscribe`](ServiceClient::subscribe) are async conveniences built on it.

mod multiplexer;
mod pending;

pub use multiplexer::SessionState;

pub(crate) use multiplexer::Multiplexer;

use bytes::Bytes;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

use crate::{
    // ---
    Encoding,
    MethodDescriptor,
    MethodKind,
    Payload,
    RequestId,
    Result,
    RpcError,
    ServiceDescriptor,
    TransportKind,
};
use pending::ResponseHandler;

/// Client for one service over one transport.
///
/// Cheap to clone; clones share the session. The session ends on
/// [`end_session`](Self::end_session), when the connection closes, or when
/// the last clone is dropped.
///
/// # Example
///
/// ```ignore
/// let client = ServiceClient::builder()
///     .descriptor(descriptor)
///     .address("ws://localhost:8089")
///     .build()
///     .await?;
///
/// client.invoke("add", &AddRequest { lhs: 2, rhs: 3 }, |result: Result<AddResult>| {
///     println!("{:?}", result);
/// })?;
///
/// let sum: AddResult = client.call("add", &AddRequest { lhs: 2, rhs: 3 }).await?;
/// ```
#[derive(Clone)]
pub struct ServiceClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    mux: Multiplexer,
    descriptor: ServiceDescriptor,
    payload_encoding: Encoding,
    request_timeout: Option<Duration>,
}

impl ServiceClient {
    // ---

    /// Start configuring a client.
    pub fn builder() -> crate::ServiceClientBuilder {
        crate::ServiceClientBuilder::new()
    }

    pub(crate) fn new(
        mux: Multiplexer,
        descriptor: ServiceDescriptor,
        payload_encoding: Encoding,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                mux,
                descriptor,
                payload_encoding,
                request_timeout,
            }),
        }
    }

    /// Invoke `method` and hand every response to `callback`.
    ///
    /// Unary methods call back exactly once. Streaming methods call back for
    /// each pushed update until the first error, which is always the last
    /// call.
    ///
    /// Returns as soon as the request is queued.
    ///
    /// # Errors
    ///
    /// - [`RpcError::UnknownMethod`] if the descriptor has no such method
    /// - [`RpcError::TypeMismatch`] if `Req`/`Resp` differ from the declared types
    /// - [`RpcError::SessionEnded`] if the session is over
    /// - [`RpcError::Serialization`] if the request cannot be encoded as JSON
    ///
    /// None of these invoke the callback, and no bytes are sent.
    ///
    /// The callback is owned by the session until the call ends. A streaming
    /// callback that captures a clone of this client keeps the session alive
    /// by itself; capture a [`downgrade`](Self::downgrade)d handle instead.
    pub fn invoke<Req, Resp, F>(&self, method: &str, request: &Req, mut callback: F) -> Result<RequestId>
    where
        Req: Payload,
        Resp: Payload,
        F: FnMut(Result<Resp>) + Send + 'static,
    {
        // ---
        let method = self.resolve::<Req, Resp>(method)?;
        self.invoke_resolved(method, request, move |result: Result<Resp>| {
            callback(result);
            true
        })
    }

    /// Invoke a unary method and wait for its response.
    ///
    /// Applies the client's request timeout, if one was configured. On
    /// expiry the call is forgotten and [`RpcError::Timeout`] returned.
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Payload,
        Resp: Payload,
    {
        // ---
        let method = self.resolve::<Req, Resp>(method)?;
        if method.kind() != MethodKind::Unary {
            return Err(RpcError::WrongMethodKind {
                method: method.full_name().to_string(),
                kind: method.kind(),
            });
        }

        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        let id = self.invoke_resolved(method, request, move |result: Result<Resp>| {
            if let Some(tx) = tx.take() {
                let _ = tx.send(result);
            }
            false
        })?;

        let Some(limit) = self.inner.request_timeout else {
            return rx.await.unwrap_or(Err(RpcError::SessionEnded));
        };

        match tokio::time::timeout(limit, rx).await {
            Ok(result) => result.unwrap_or(Err(RpcError::SessionEnded)),
            Err(_) => {
                self.inner.mux.forget(id);
                crate::log_debug!("{} ({id}) timed out after {limit:?}", method.full_name());
                Err(RpcError::Timeout)
            }
        }
    }

    /// Invoke a streaming method and receive its updates as a stream.
    pub fn subscribe<Req, Resp>(&self, method: &str, request: &Req) -> Result<ResponseStream<Resp>>
    where
        Req: Payload,
        Resp: Payload,
    {
        // ---
        let method = self.resolve::<Req, Resp>(method)?;
        if method.kind() != MethodKind::Streaming {
            return Err(RpcError::WrongMethodKind {
                method: method.full_name().to_string(),
                kind: method.kind(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        // not live once the stream is gone
        let id = self.invoke_resolved(method, request, move |result: Result<Resp>| {
            tx.send(result).is_ok()
        })?;

        Ok(ResponseStream {
            id,
            rx,
            done: false,
            client: Arc::downgrade(&self.inner),
        })
    }

    /// End the session: every pending call fails with
    /// [`RpcError::SessionEnded`] and the transport is closed.
    ///
    /// Idempotent. No callback runs after this returns.
    pub async fn end_session(&self) -> Result<()> {
        self.inner.mux.end_session().await
    }

    /// A handle that does not keep the session alive.
    pub fn downgrade(&self) -> WeakServiceClient {
        WeakServiceClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.inner.mux.state()
    }

    /// Watch the session state.
    pub fn lifecycle(&self) -> watch::Receiver<SessionState> {
        self.inner.mux.lifecycle()
    }

    /// Wait until the session has ended, for whatever reason.
    pub async fn closed(&self) {
        // ---
        let mut lifecycle = self.lifecycle();
        // sender lives as long as `self`, so this only fails once ended
        let _ = lifecycle
            .wait_for(|state| *state == SessionState::Ended)
            .await;
    }

    /// Number of calls still waiting for a response (streaming calls count
    /// until they end).
    pub fn pending_count(&self) -> usize {
        self.inner.mux.pending_count()
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.inner.descriptor
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.inner.mux.transport_kind()
    }

    /// Encoding used for envelopes.
    pub fn encoding(&self) -> Encoding {
        self.inner.mux.encoding()
    }

    /// Encoding used for request and response payloads.
    pub fn payload_encoding(&self) -> Encoding {
        self.inner.payload_encoding
    }

    fn resolve<Req, Resp>(&self, method: &str) -> Result<&MethodDescriptor> {
        // ---
        let method = self.inner.descriptor.resolve(method)?;
        method.check_types::<Req, Resp>()?;
        Ok(method)
    }

    fn invoke_resolved<Req, Resp, F>(
        &self,
        method: &MethodDescriptor,
        request: &Req,
        mut callback: F,
    ) -> Result<RequestId>
    where
        Req: Payload,
        Resp: Payload,
        F: FnMut(Result<Resp>) -> bool + Send + 'static,
    {
        // ---
        let encoding = self.inner.payload_encoding;
        let payload = encoding.encode(request)?;

        let handler: ResponseHandler = Box::new(move |result: Result<Bytes>| {
            match result.and_then(|data| encoding.decode::<Resp>(&data)) {
                Ok(response) => callback(Ok(response)),
                Err(err) => {
                    callback(Err(err));
                    false
                }
            }
        });

        self.inner.mux.invoke(method, payload, handler)
    }
}

/// Updates of one streaming call.
///
/// Yields each pushed response in delivery order. The stream ends (`None`)
/// after the call's terminal error has been yielded.
///
/// Dropping the stream ends the call.
pub struct ResponseStream<T> {
    id: RequestId,
    rx: mpsc::UnboundedReceiver<Result<T>>,
    done: bool,
    client: Weak<ClientInner>,
}

impl<T> ResponseStream<T> {
    // ---

    /// Id of the underlying call.
    pub fn request_id(&self) -> RequestId {
        self.id
    }

    /// Next update, or `None` once the call has ended.
    pub async fn next(&mut self) -> Option<Result<T>> {
        // ---
        if self.done {
            return None;
        }
        let item = self.rx.recv().await;
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

impl<T> Drop for ResponseStream<T> {
    fn drop(&mut self) {
        // ---
        if self.done {
            return;
        }
        if let Some(inner) = self.client.upgrade() {
            if inner.mux.forget(self.id) {
                crate::log_debug!("stream for {} dropped, call forgotten", self.id);
            }
        }
    }
}

/// Non-owning handle to a [`ServiceClient`], for callbacks that need to
/// reach the client without keeping its session alive.
#[derive(Clone)]
pub struct WeakServiceClient {
    inner: Weak<ClientInner>,
}

impl WeakServiceClient {
    /// The client, if any clone of it is still alive.
    pub fn upgrade(&self) -> Option<ServiceClient> {
        self.inner.upgrade().map(|inner| ServiceClient { inner })
    }
}
