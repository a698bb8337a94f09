// src/transport/memory/transport.rs

//! In-memory transport implementation.
//!
//! This file contains the concrete implementation of the domain-level
//! `Transport` trait using in-process channels only.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    Address,
    Delivery,
    InboundSender,
    Result,
    RpcError,
    Transport,
    TransportKind,
    TransportPtr,
};

/// What the peer pushes towards the client.
#[derive(Debug)]
enum PeerEvent {
    Frame(Bytes),
    Close(String),
}

struct State {
    // None once closed
    to_peer: Option<mpsc::UnboundedSender<Bytes>>,
    // taken by open()
    from_peer: Option<mpsc::UnboundedReceiver<PeerEvent>>,
    forwarder: Option<JoinHandle<()>>,
    open: bool,
}

/// Client half of an in-memory pair.
///
/// Push semantics: every frame the peer sends is handed to the multiplexer,
/// whether or not a request asked for it.
pub struct MemoryTransport {
    // ---
    state: Mutex<State>,
}

/// Remote half of an in-memory pair: receives request frames and pushes
/// reply frames.
pub struct MemoryPeer {
    // ---
    requests: mpsc::UnboundedReceiver<Bytes>,
    replies: PeerSender,
}

/// Cloneable handle for pushing frames from the peer side, e.g. from a task
/// that produces streaming updates.
#[derive(Clone, Debug)]
pub struct PeerSender {
    tx: mpsc::UnboundedSender<PeerEvent>,
}

/// Create a connected transport/peer pair.
pub fn pair() -> (TransportPtr, MemoryPeer) {
    // ---
    let (to_peer, requests) = mpsc::unbounded_channel();
    let (tx, from_peer) = mpsc::unbounded_channel();

    let transport = MemoryTransport {
        state: Mutex::new(State {
            to_peer: Some(to_peer),
            from_peer: Some(from_peer),
            forwarder: None,
            open: false,
        }),
    };

    let peer = MemoryPeer {
        requests,
        replies: PeerSender { tx },
    };

    (Arc::new(transport), peer)
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    /// Start forwarding peer frames to `inbound`.
    ///
    /// A pair can be opened once.
    async fn open(&self, address: &Address, inbound: InboundSender) -> Result<()> {
        // ---
        let mut state = self.state.lock().await;
        let mut from_peer = state
            .from_peer
            .take()
            .ok_or_else(|| RpcError::Transport("memory transport already opened".into()))?;

        log_debug!("memory transport open on {address}");

        let forwarder = tokio::spawn(async move {
            loop {
                match from_peer.recv().await {
                    Some(PeerEvent::Frame(frame)) => {
                        if !inbound.frame(frame) {
                            break;
                        }
                    }
                    Some(PeerEvent::Close(reason)) => {
                        inbound.closed(reason);
                        break;
                    }
                    None => {
                        inbound.closed("memory peer dropped");
                        break;
                    }
                }
            }
        });

        state.forwarder = Some(forwarder);
        state.open = true;
        Ok(())
    }

    /// Hand the frame to the peer. Replies come back through the peer, not
    /// through `delivery`.
    async fn send(&self, frame: Bytes, _delivery: Delivery) -> Result<()> {
        // ---
        let state = self.state.lock().await;
        if !state.open {
            return Err(RpcError::NotOpen);
        }
        let to_peer = state.to_peer.as_ref().ok_or(RpcError::NotOpen)?;
        to_peer
            .send(frame)
            .map_err(|_| RpcError::Transport("memory peer is gone".into()))
    }

    async fn close(&self) -> Result<()> {
        // ---
        let mut state = self.state.lock().await;
        state.open = false;
        state.to_peer = None;
        if let Some(forwarder) = state.forwarder.take() {
            forwarder.abort();
        }
        log_debug!("memory transport closed");
        Ok(())
    }
}

impl MemoryPeer {
    // ---

    /// Next request frame, or `None` once the client closed the transport.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.requests.recv().await
    }

    /// Push one frame to the client. Returns `false` if the client is gone.
    pub fn send(&self, frame: Bytes) -> bool {
        self.replies.send(frame)
    }

    /// Close the connection from the remote side.
    pub fn close(&self, reason: impl Into<String>) {
        self.replies.close(reason)
    }

    /// Another handle for pushing frames.
    pub fn sender(&self) -> PeerSender {
        self.replies.clone()
    }
}

impl PeerSender {
    // ---
    pub fn send(&self, frame: Bytes) -> bool {
        self.tx.send(PeerEvent::Frame(frame)).is_ok()
    }

    pub fn close(&self, reason: impl Into<String>) {
        let _ = self.tx.send(PeerEvent::Close(reason.into()));
    }
}
