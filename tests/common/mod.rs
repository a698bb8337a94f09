#![allow(dead_code)]

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use protomux::memory::{self, MemoryPeer, PeerSender};
use protomux::{
    //
    decode_request,
    encode_response,
    Encoding,
    RequestEnvelope,
    Result,
    ServiceClientBuilder,
};

// --- payload types, as a schema compiler would generate them

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct AddRequest {
    #[prost(int32, tag = "1")]
    pub lhs: i32,
    #[prost(int32, tag = "2")]
    pub rhs: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct AddResult {
    #[prost(int32, tag = "1")]
    pub value: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct SubRequest {
    #[prost(int32, tag = "1")]
    pub lhs: i32,
    #[prost(int32, tag = "2")]
    pub rhs: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct SubResult {
    #[prost(int32, tag = "1")]
    pub value: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct MulRequest {
    #[prost(int32, tag = "1")]
    pub lhs: i32,
    #[prost(int32, tag = "2")]
    pub rhs: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct MulResult {
    #[prost(int32, tag = "1")]
    pub value: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct DivRequest {
    #[prost(int32, tag = "1")]
    pub lhs: i32,
    #[prost(int32, tag = "2")]
    pub rhs: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct DivResult {
    #[prost(int32, tag = "1")]
    pub value: i32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct AckRequest {
    #[prost(string, tag = "1")]
    pub timestamp: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct AckResult {
    #[prost(string, tag = "1")]
    pub timestamp: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct TickRequest {
    #[prost(uint32, tag = "1")]
    pub count: u32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Tick {
    #[prost(uint32, tag = "1")]
    pub seq: u32,
}

protomux::rpc_service! {
    /// Integer calculator.
    pub service Calculator(".Calculator.Service") {
        unary fn add(AddRequest) -> AddResult;
        unary fn sub(SubRequest) -> SubResult;
        unary fn mul(MulRequest) -> MulResult;
        /// Floor division.
        unary fn div(DivRequest) -> DivResult;
    }
}

protomux::rpc_service! {
    /// Echoes the timestamp back.
    pub service Reflector(".Reflector.Service") {
        unary fn ack(AckRequest) -> AckResult;
    }
}

protomux::rpc_service! {
    /// Pushes `count` ticks for one request, then stays subscribed.
    pub service Ticker(".Ticker.Service") {
        streaming fn ticks(TickRequest) -> Tick;
    }
}

/// Division rounding towards negative infinity.
pub fn floor_div(lhs: i32, rhs: i32) -> i32 {
    // ---
    let q = lhs / rhs;
    if lhs % rhs != 0 && ((lhs < 0) != (rhs < 0)) {
        q - 1
    } else {
        q
    }
}

/// Payload replies for one request. Unknown methods get none.
pub fn answer(request: &RequestEnvelope, payloads: Encoding) -> Result<Vec<Bytes>> {
    // ---
    let data = &request.data;
    let reply = match request.name.as_str() {
        ".Calculator.Service.add" => {
            let req: AddRequest = payloads.decode(data)?;
            payloads.encode(&AddResult {
                value: req.lhs + req.rhs,
            })?
        }
        ".Calculator.Service.sub" => {
            let req: SubRequest = payloads.decode(data)?;
            payloads.encode(&SubResult {
                value: req.lhs - req.rhs,
            })?
        }
        ".Calculator.Service.mul" => {
            let req: MulRequest = payloads.decode(data)?;
            payloads.encode(&MulResult {
                value: req.lhs * req.rhs,
            })?
        }
        ".Calculator.Service.div" => {
            let req: DivRequest = payloads.decode(data)?;
            payloads.encode(&DivResult {
                value: floor_div(req.lhs, req.rhs),
            })?
        }
        ".Reflector.Service.ack" => {
            let req: AckRequest = payloads.decode(data)?;
            payloads.encode(&AckResult {
                timestamp: req.timestamp,
            })?
        }
        ".Ticker.Service.ticks" => {
            let req: TickRequest = payloads.decode(data)?;
            return (1..=req.count)
                .map(|seq| payloads.encode(&Tick { seq }))
                .collect();
        }
        _ => return Ok(Vec::new()),
    };
    Ok(vec![reply])
}

/// Reply frames for one request frame.
pub fn respond(frame: &[u8], envelopes: Encoding, payloads: Encoding) -> Result<Vec<Bytes>> {
    // ---
    let request = decode_request(envelopes, frame)?;
    answer(&request, payloads)?
        .into_iter()
        .map(|payload| encode_response(envelopes, request.request_id(), payload))
        .collect()
}

/// In-memory service answering every method above.
pub struct MemoryServer {
    // ---
    handle: JoinHandle<()>,
    sender: PeerSender,
    requests: Arc<AtomicUsize>,
}

impl MemoryServer {
    // ---
    pub fn start(mut peer: MemoryPeer, envelopes: Encoding, payloads: Encoding) -> Self {
        // ---
        let sender = peer.sender();
        let requests = Arc::new(AtomicUsize::new(0));
        let seen = requests.clone();

        let handle = tokio::spawn(async move {
            while let Some(frame) = peer.recv().await {
                seen.fetch_add(1, Ordering::SeqCst);
                match respond(&frame, envelopes, payloads) {
                    Ok(replies) => {
                        for reply in replies {
                            peer.send(reply);
                        }
                    }
                    Err(err) => tracing::warn!("test server: bad request: {err}"),
                }
            }
        });

        Self {
            handle,
            sender,
            requests,
        }
    }

    pub fn requests_seen(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn sender(&self) -> PeerSender {
        self.sender.clone()
    }

    pub async fn shutdown(self) {
        // ---
        self.handle.abort();
        let _ = self.handle.await;
    }
}

/// Builder for a memory client; the stub's `connect` fills in the descriptor.
pub fn memory_builder(transport: protomux::TransportPtr, encoding: Encoding) -> ServiceClientBuilder {
    ServiceClientBuilder::new()
        .address("memory://test")
        .transport(transport)
        .encoding(encoding)
}

/// Calculator connected to a [`MemoryServer`].
pub async fn calculator(envelopes: Encoding, payloads: Encoding) -> (Calculator, MemoryServer) {
    // ---
    let (transport, peer) = memory::pair();
    let server = MemoryServer::start(peer, envelopes, payloads);
    let calculator = Calculator::connect(
        memory_builder(transport, envelopes).payload_encoding(payloads),
    )
    .await
    .expect("connect calculator");
    (calculator, server)
}

/// Calculator whose remote end is driven by the test itself.
pub async fn calculator_with_peer(encoding: Encoding) -> (Calculator, MemoryPeer) {
    // ---
    let (transport, peer) = memory::pair();
    let calculator = Calculator::connect(memory_builder(transport, encoding))
        .await
        .expect("connect calculator");
    (calculator, peer)
}

/// A callback that forwards everything it receives into a channel.
pub fn collect<T: Send + 'static>() -> (
    impl FnMut(Result<T>) + Send + 'static,
    mpsc::UnboundedReceiver<Result<T>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |result: Result<T>| {
            let _ = tx.send(result);
        },
        rx,
    )
}

/// Next callback result, failing the test if none arrives in time.
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<Result<T>>) -> Result<T> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a callback")
        .expect("callback dropped without being called")
}

/// Assert that no further callback runs.
pub async fn assert_silent<T>(rx: &mut mpsc::UnboundedReceiver<Result<T>>) {
    // ---
    match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        Err(_) | Ok(None) => {}
        Ok(Some(_)) => panic!("unexpected callback"),
    }
}

/// Next request frame the peer receives, decoded.
pub async fn next_request(peer: &mut MemoryPeer, encoding: Encoding) -> RequestEnvelope {
    let frame = tokio::time::timeout(Duration::from_secs(5), peer.recv())
        .await
        .expect("timed out waiting for a request")
        .expect("transport closed");
    decode_request(encoding, &frame).expect("decode request")
}

pub fn init_logging() {
    // ---
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
