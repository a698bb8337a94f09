// src/transport/http/transport.rs

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinSet};
use url::Url;

use crate::{
    // ---
    log_debug,
    log_trace,
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

/// HTTP transport.
///
/// ## Semantics
///
/// - `open()` only validates the address; there is no connection to set up.
/// - Each `send()` is one exchange that ends in exactly one `deliver` or one
///   `fail` on its delivery handle, never in an `Err` return.
/// - Non-2xx statuses and empty bodies fail the call with the status and
///   body text.
/// - Every exchange runs on its own task. Synchronous mode waits for that
///   task inside `send()`, so requests go out one at a time in queue order.
/// - `close()` aborts every exchange still in flight, including the one a
///   synchronous `send()` is waiting on.
struct HttpTransport {
    // ---
    config: TransportConfig,
    synchronous: bool,
    client: reqwest::Client,
    state: Mutex<State>,
}

struct State {
    // Some while open
    url: Option<Url>,
    exchanges: JoinSet<()>,
    // exchange a synchronous send() is waiting on
    current: Option<AbortHandle>,
}

/// Create an HTTP transport for `config.address`.
pub async fn create_transport(config: TransportConfig) -> Result<TransportPtr> {
    // ---
    let TransportKind::RequestResponse { synchronous } = config.kind else {
        return Err(RpcError::ConfigConflict(format!(
            "http transport is request-response, not {}",
            config.kind
        )));
    };

    let client = reqwest::Client::builder()
        .build()
        .map_err(|err| RpcError::Transport(format!("http client: {err}")))?;

    log_debug!("create http transport for {} ({})", config.address, config.kind);

    Ok(Arc::new(HttpTransport {
        config,
        synchronous,
        client,
        state: Mutex::new(State {
            url: None,
            exchanges: JoinSet::new(),
            current: None,
        }),
    }))
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    // ---
    fn kind(&self) -> TransportKind {
        TransportKind::RequestResponse {
            synchronous: self.synchronous,
        }
    }

    async fn open(&self, address: &Address, _inbound: InboundSender) -> Result<()> {
        // ---
        if !matches!(address.scheme(), "http" | "https") {
            return Err(RpcError::InvalidAddress(format!(
                "{address}: http transport needs an http:// or https:// address"
            )));
        }

        self.state.lock().await.url = Some(address.url().clone());
        log_debug!("http transport ready for {address}");
        Ok(())
    }

    async fn send(&self, frame: Bytes, delivery: Delivery) -> Result<()> {
        // ---
        let mut state = self.state.lock().await;
        let url = state.url.clone().ok_or(RpcError::NotOpen)?;

        let client = self.client.clone();
        let content_type = self.config.content_type;

        if self.synchronous {
            let task = tokio::spawn(async move {
                finish(exchange(client, url, content_type, frame).await, delivery);
            });
            state.current = Some(task.abort_handle());
            drop(state);

            // the lock is released while waiting so close() can abort us
            if let Err(err) = task.await {
                if err.is_cancelled() {
                    log_debug!("http exchange aborted by close");
                } else {
                    return Err(RpcError::Transport(format!("http exchange task: {err}")));
                }
            }
            return Ok(());
        }

        // reap finished exchanges
        while state.exchanges.try_join_next().is_some() {}

        state.exchanges.spawn(async move {
            finish(exchange(client, url, content_type, frame).await, delivery);
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // ---
        let mut state = self.state.lock().await;
        state.url = None;
        if let Some(current) = state.current.take() {
            current.abort();
        }
        state.exchanges.abort_all();
        log_debug!("http transport for {} closed", self.config.address);
        Ok(())
    }
}

fn finish(result: Result<Bytes>, delivery: Delivery) {
    // ---
    match result {
        Ok(reply) => delivery.deliver(reply),
        Err(err) => delivery.fail(err),
    }
}

/// One POST round trip.
async fn exchange(
    client: reqwest::Client,
    url: Url,
    content_type: &'static str,
    frame: Bytes,
) -> Result<Bytes> {
    // ---
    log_trace!("POST {url}, {} bytes", frame.len());

    let resp = client
        .post(url)
        .header(CONTENT_TYPE, content_type)
        .header(ACCEPT, content_type)
        .body(frame)
        .send()
        .await
        .map_err(|err| RpcError::Transport(format!("http request: {err}")))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(RpcError::Transport(format!("http status {status}: {text}")));
    }

    let body = resp
        .bytes()
        .await
        .map_err(|err| RpcError::Transport(format!("http body: {err}")))?;

    if body.is_empty() {
        return Err(RpcError::Transport(format!("http status {status}: empty reply")));
    }
    Ok(body)
}
