// src/transport/websocket/transport.rs

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::{
    // ---
    log_debug,
    log_info,
    log_warn,
    Address,
    Delivery,
    InboundSender,
    Result,
    RpcError,
    Transport,
    TransportConfig,
    TransportKind,
    TransportPtr,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// WebSocket transport.
///
/// ## Semantics
///
/// - `open()` returns after the WebSocket handshake completed.
/// - Binary and text messages are both forwarded as frames; text is passed
///   on as its UTF-8 bytes.
/// - A close frame, a read error, or the end of the stream is reported once
///   as a closed connection.
/// - `send()` writes a text message for textual encodings and a binary one
///   otherwise, and returns once it is written. Replies arrive through the
///   reader task, never through the per-send delivery handle.
struct WebSocketTransport {
    // ---
    config: TransportConfig,
    sink: Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

/// Create a WebSocket transport for `config.address`.
///
/// The connection is made by [`Transport::open`].
pub async fn create_transport(config: TransportConfig) -> Result<TransportPtr> {
    // ---
    if config.kind != TransportKind::Push {
        return Err(RpcError::ConfigConflict(format!(
            "websocket transport is push, not {}",
            config.kind
        )));
    }

    log_debug!("create websocket transport for {}", config.address);

    Ok(Arc::new(WebSocketTransport {
        config,
        sink: Mutex::new(None),
        reader: Mutex::new(None),
    }))
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    // ---
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    async fn open(&self, address: &Address, inbound: InboundSender) -> Result<()> {
        // ---
        if address != &self.config.address {
            log_warn!(
                "opening {address}, transport was configured for {}",
                self.config.address
            );
        }

        let mut sink = self.sink.lock().await;
        if sink.is_some() {
            return Err(RpcError::Transport("websocket already open".into()));
        }

        let (stream, _response) = connect_async(address.as_str())
            .await
            .map_err(|err| RpcError::Transport(format!("websocket connect to {address}: {err}")))?;

        let (write, read) = stream.split();
        *sink = Some(write);

        let reader = tokio::spawn(read_loop(read, inbound));
        *self.reader.lock().await = Some(reader);

        log_info!("websocket connected to {address}");
        Ok(())
    }

    async fn send(&self, frame: Bytes, _delivery: Delivery) -> Result<()> {
        // ---
        let msg = if self.config.textual {
            let text = Utf8Bytes::try_from(frame)
                .map_err(|err| RpcError::Transport(format!("websocket text frame: {err}")))?;
            Message::Text(text)
        } else {
            Message::Binary(frame)
        };

        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(RpcError::NotOpen)?;
        sink.send(msg)
            .await
            .map_err(|err| RpcError::Transport(format!("websocket send: {err}")))
    }

    async fn close(&self) -> Result<()> {
        // ---
        let sink = self.sink.lock().await.take();
        let result = match sink {
            Some(mut sink) => sink
                .close()
                .await
                .map_err(|err| RpcError::Transport(format!("websocket close: {err}"))),
            None => Ok(()),
        };

        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }

        log_debug!("websocket to {} closed", self.config.address);
        result
    }
}

async fn read_loop(mut read: SplitStream<WsStream>, inbound: InboundSender) {
    // ---
    let reason = loop {
        match read.next().await {
            Some(Ok(Message::Binary(data))) => {
                if !inbound.frame(data) {
                    return;
                }
            }
            Some(Ok(Message::Text(text))) => {
                if !inbound.frame(Bytes::copy_from_slice(text.as_str().as_bytes())) {
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) if !frame.reason.is_empty() => {
                        format!("closed by server: {}", frame.reason)
                    }
                    _ => "closed by server".to_string(),
                };
            }
            // ping/pong are answered by tungstenite itself
            Some(Ok(_)) => continue,
            Some(Err(err)) => break format!("websocket read: {err}"),
            None => break "websocket stream ended".to_string(),
        }
    };

    log_debug!("websocket reader stopping: {reason}");
    inbound.closed(reason);
}
