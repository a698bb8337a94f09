mod common;

use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use protomux::{
    //
    encode_response,
    memory,
    Address,
    Delivery,
    Encoding,
    InboundSender,
    MethodKind,
    Result,
    RpcError,
    ServiceClientBuilder,
    SessionState,
    Transport,
    TransportKind,
};

#[tokio::test]
async fn test_calculator() -> Result<()> {
    // ---
    init_logging();

    let (calculator, server) = calculator(Encoding::Binary, Encoding::Binary).await;

    let (add, mut add_rx) = collect::<AddResult>();
    calculator.add(&AddRequest { lhs: 2, rhs: 3 }, add)?;
    assert_eq!(next(&mut add_rx).await?.value, 5);

    let (sub, mut sub_rx) = collect::<SubResult>();
    calculator.sub(&SubRequest { lhs: 2, rhs: 3 }, sub)?;
    assert_eq!(next(&mut sub_rx).await?.value, -1);

    let (mul, mut mul_rx) = collect::<MulResult>();
    calculator.mul(&MulRequest { lhs: 2, rhs: 3 }, mul)?;
    assert_eq!(next(&mut mul_rx).await?.value, 6);

    let (div, mut div_rx) = collect::<DivResult>();
    calculator.div(&DivRequest { lhs: 3, rhs: 2 }, div)?;
    assert_eq!(next(&mut div_rx).await?.value, 1);

    // floor, not truncation
    let (div, mut div_rx) = collect::<DivResult>();
    calculator.div(&DivRequest { lhs: -3, rhs: 2 }, div)?;
    assert_eq!(next(&mut div_rx).await?.value, -2);

    assert_eq!(server.requests_seen(), 5);
    assert_eq!(calculator.client().pending_count(), 0);

    calculator.end_session().await?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_call() -> Result<()> {
    // ---
    let (calculator, server) = calculator(Encoding::Binary, Encoding::Binary).await;
    let client = calculator.client();

    let sum: AddResult = client.call("add", &AddRequest { lhs: 20, rhs: 3 }).await?;
    assert_eq!(sum.value, 23);

    // fully-qualified names resolve too
    let quotient: DivResult = client
        .call(".Calculator.Service.div", &DivRequest { lhs: 7, rhs: 2 })
        .await?;
    assert_eq!(quotient.value, 3);

    calculator.end_session().await?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unknown_method_sends_nothing() {
    // ---
    let (calculator, mut peer) = calculator_with_peer(Encoding::Binary).await;
    let (callback, mut rx) = collect::<AddResult>();

    let err = calculator
        .client()
        .invoke("nope", &AddRequest { lhs: 1, rhs: 1 }, callback)
        .unwrap_err();
    assert!(matches!(err, RpcError::UnknownMethod(name) if name == "nope"));

    assert!(
        tokio::time::timeout(Duration::from_millis(100), peer.recv())
            .await
            .is_err(),
        "no bytes should reach the transport"
    );
    assert_eq!(calculator.client().pending_count(), 0);
    assert_silent(&mut rx).await;
}

#[tokio::test]
async fn test_dispatch_errors() {
    // ---
    let (calculator, _peer) = calculator_with_peer(Encoding::Binary).await;
    let client = calculator.client();

    let (callback, _rx) = collect::<AddResult>();
    let err = client
        .invoke("add", &DivRequest { lhs: 1, rhs: 1 }, callback)
        .unwrap_err();
    assert!(matches!(err, RpcError::TypeMismatch { .. }));

    let err = client
        .call::<AddRequest, AddResult>("sqrt", &AddRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::UnknownMethod(_)));

    let err = client
        .subscribe::<AddRequest, AddResult>("add", &AddRequest::default())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        RpcError::WrongMethodKind { kind: MethodKind::Unary, .. }
    ));
}

#[tokio::test]
async fn test_concurrent_requests() {
    // ---
    let (calculator, server) = calculator(Encoding::Binary, Encoding::Binary).await;

    let mut handles = Vec::new();

    for i in 0..50 {
        // ---
        let client = calculator.client().clone();

        handles.push(tokio::spawn(async move {
            let resp: MulResult = client
                .call("mul", &MulRequest { lhs: i, rhs: i })
                .await
                .unwrap();
            resp.value
        }));
    }

    for (i, task) in handles.into_iter().enumerate() {
        let product = task.await.unwrap();
        assert_eq!(product, (i * i) as i32);
    }

    assert_eq!(server.requests_seen(), 50);
    calculator.end_session().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_id_is_inert() -> Result<()> {
    // ---
    let (calculator, mut peer) = calculator_with_peer(Encoding::Binary).await;
    let (callback, mut rx) = collect::<AddResult>();

    let id = calculator.add(&AddRequest { lhs: 1, rhs: 2 }, callback)?;
    let request = next_request(&mut peer, Encoding::Binary).await;
    assert_eq!(request.request_id(), id);
    assert_eq!(request.name, ".Calculator.Service.add");

    // a reply for an id nobody asked for
    let stray = protomux::RequestId::from(id.as_u32().wrapping_add(1));
    let payload = Encoding::Binary.encode(&AddResult { value: 99 })?;
    peer.send(encode_response(Encoding::Binary, stray, payload)?);
    assert_silent(&mut rx).await;
    assert_eq!(calculator.client().pending_count(), 1);

    let payload = Encoding::Binary.encode(&AddResult { value: 3 })?;
    peer.send(encode_response(Encoding::Binary, id, payload)?);
    assert_eq!(next(&mut rx).await?.value, 3);
    Ok(())
}

#[tokio::test]
async fn test_unary_exactly_once() -> Result<()> {
    // ---
    let (calculator, mut peer) = calculator_with_peer(Encoding::Binary).await;
    let (callback, mut rx) = collect::<AddResult>();

    let id = calculator.add(&AddRequest { lhs: 1, rhs: 1 }, callback)?;
    next_request(&mut peer, Encoding::Binary).await;

    let payload = Encoding::Binary.encode(&AddResult { value: 2 })?;
    let frame = encode_response(Encoding::Binary, id, payload)?;
    peer.send(frame.clone());
    peer.send(frame);

    assert_eq!(next(&mut rx).await?.value, 2);
    // handler is gone after the first response
    assert!(rx.recv().await.is_none());
    assert_eq!(calculator.client().pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_streaming_updates_in_order() -> Result<()> {
    // ---
    let (transport, peer) = memory::pair();
    let server = MemoryServer::start(peer, Encoding::Binary, Encoding::Binary);
    let ticker = Ticker::connect(memory_builder(transport, Encoding::Binary)).await?;

    let mut stream = ticker
        .client()
        .subscribe::<TickRequest, Tick>("ticks", &TickRequest { count: 5 })?;

    for seq in 1..=5 {
        let tick = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended early")?;
        assert_eq!(tick.seq, seq);
    }

    // still subscribed
    assert_eq!(ticker.client().pending_count(), 1);

    // unsolicited updates for the same id keep arriving
    let payload = Encoding::Binary.encode(&Tick { seq: 6 })?;
    server.sender().send(encode_response(
        Encoding::Binary,
        stream.request_id(),
        payload,
    )?);
    assert_eq!(stream.next().await.unwrap()?.seq, 6);

    ticker.end_session().await?;
    assert!(matches!(stream.next().await, Some(Err(RpcError::SessionEnded))));
    assert!(stream.next().await.is_none());

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_call_rejects_streaming_method() {
    // ---
    let (transport, _peer) = memory::pair();
    let ticker = Ticker::connect(memory_builder(transport, Encoding::Binary))
        .await
        .unwrap();

    let err = ticker
        .client()
        .call::<TickRequest, Tick>("ticks", &TickRequest { count: 1 })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::WrongMethodKind { kind: MethodKind::Streaming, .. }
    ));
}

#[tokio::test]
async fn test_end_session_flushes_every_pending_call() -> Result<()> {
    // ---
    let (transport, mut peer) = memory::pair();
    let client = ServiceClientBuilder::new()
        .descriptor(Calculator::descriptor()?)
        .address("memory://flush")
        .transport(transport)
        .build()
        .await?;
    let calculator = Calculator::from_client(client.clone())?;

    let mut receivers = Vec::new();
    for i in 0..3 {
        let (callback, rx) = collect::<AddResult>();
        calculator.add(&AddRequest { lhs: i, rhs: i }, callback)?;
        receivers.push(rx);
    }
    for _ in 0..3 {
        next_request(&mut peer, Encoding::Binary).await;
    }
    assert_eq!(client.pending_count(), 3);

    let mut lifecycle = client.lifecycle();
    client.end_session().await?;

    for rx in &mut receivers {
        assert!(matches!(next(rx).await, Err(RpcError::SessionEnded)));
        // nothing after the terminal error
        assert!(rx.recv().await.is_none());
    }

    assert_eq!(*lifecycle.borrow_and_update(), SessionState::Ended);
    assert_eq!(client.pending_count(), 0);

    // idempotent, and the session stays over
    client.end_session().await?;
    let (callback, _rx) = collect::<AddResult>();
    assert!(matches!(
        calculator.add(&AddRequest::default(), callback),
        Err(RpcError::SessionEnded)
    ));

    // the peer sees the transport go away
    assert!(peer.recv().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_remote_close_flushes_with_connection_closed() -> Result<()> {
    // ---
    let (calculator, mut peer) = calculator_with_peer(Encoding::Binary).await;
    let (callback, mut rx) = collect::<AddResult>();

    calculator.add(&AddRequest { lhs: 1, rhs: 1 }, callback)?;
    next_request(&mut peer, Encoding::Binary).await;

    peer.close("server restarting");

    match next(&mut rx).await {
        Err(RpcError::ConnectionClosed(reason)) => assert_eq!(reason, "server restarting"),
        other => panic!("expected ConnectionClosed, got {other:?}"),
    }

    tokio::time::timeout(Duration::from_secs(5), calculator.client().closed())
        .await
        .expect("session should end");
    assert_eq!(calculator.client().state(), SessionState::Ended);
    Ok(())
}

#[tokio::test]
async fn test_dropping_client_flushes() -> Result<()> {
    // ---
    let (calculator, _peer) = calculator_with_peer(Encoding::Binary).await;
    let (callback, mut rx) = collect::<AddResult>();
    calculator.add(&AddRequest { lhs: 1, rhs: 1 }, callback)?;

    drop(calculator);

    assert!(matches!(next(&mut rx).await, Err(RpcError::SessionEnded)));
    Ok(())
}

#[tokio::test]
async fn test_every_encoding() -> Result<()> {
    // ---
    for envelopes in Encoding::ALL {
        for payloads in [envelopes, Encoding::Binary, Encoding::Text] {
            let (calculator, server) = calculator(envelopes, payloads).await;

            let (add, mut add_rx) = collect::<AddResult>();
            calculator.add(&AddRequest { lhs: 2, rhs: 3 }, add)?;
            assert_eq!(
                next(&mut add_rx).await?.value,
                5,
                "{envelopes} envelopes, {payloads} payloads"
            );

            let (div, mut div_rx) = collect::<DivResult>();
            calculator.div(&DivRequest { lhs: 3, rhs: 2 }, div)?;
            assert_eq!(next(&mut div_rx).await?.value, 1);

            calculator.end_session().await?;
            server.shutdown().await;
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_length_delimited_chunk_with_several_responses() -> Result<()> {
    // ---
    let encoding = Encoding::LengthDelimited;
    let (calculator, mut peer) = calculator_with_peer(encoding).await;

    let (first, mut first_rx) = collect::<AddResult>();
    let (second, mut second_rx) = collect::<AddResult>();
    let a = calculator.add(&AddRequest { lhs: 1, rhs: 1 }, first)?;
    let b = calculator.add(&AddRequest { lhs: 2, rhs: 2 }, second)?;
    next_request(&mut peer, encoding).await;
    next_request(&mut peer, encoding).await;

    // answer out of order, both in one transport frame
    let mut chunk = Vec::new();
    chunk.extend_from_slice(&encode_response(
        encoding,
        b,
        encoding.encode(&AddResult { value: 4 })?,
    )?);
    chunk.extend_from_slice(&encode_response(
        encoding,
        a,
        encoding.encode(&AddResult { value: 2 })?,
    )?);
    peer.send(Bytes::from(chunk));

    assert_eq!(next(&mut first_rx).await?.value, 2);
    assert_eq!(next(&mut second_rx).await?.value, 4);
    Ok(())
}

#[tokio::test]
async fn test_undecodable_payload_goes_to_caller() -> Result<()> {
    // ---
    let (calculator, mut peer) = calculator_with_peer(Encoding::Binary).await;
    let (callback, mut rx) = collect::<AddResult>();

    let id = calculator.add(&AddRequest { lhs: 1, rhs: 1 }, callback)?;
    next_request(&mut peer, Encoding::Binary).await;

    // truncated varint
    peer.send(encode_response(
        Encoding::Binary,
        id,
        Bytes::from_static(&[0x08, 0xff]),
    )?);

    assert!(matches!(next(&mut rx).await, Err(RpcError::Decode(_))));
    assert_eq!(calculator.client().pending_count(), 0);

    // garbage that is not even an envelope is dropped
    peer.send(Bytes::from_static(&[0xff, 0xff, 0xff]));
    assert_silent(&mut rx).await;
    Ok(())
}

#[tokio::test]
async fn test_request_timeout() -> Result<()> {
    // ---
    let (transport, mut peer) = memory::pair();
    let calculator = Calculator::connect(
        memory_builder(transport, Encoding::Binary).request_timeout(Duration::from_millis(50)),
    )
    .await?;

    let err = calculator
        .client()
        .call::<AddRequest, AddResult>("add", &AddRequest { lhs: 1, rhs: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout));
    assert_eq!(calculator.client().pending_count(), 0);

    // the late answer is inert
    let request = next_request(&mut peer, Encoding::Binary).await;
    let payload = Encoding::Binary.encode(&AddResult { value: 2 })?;
    peer.send(encode_response(Encoding::Binary, request.request_id(), payload)?);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calculator.client().pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_callback_may_invoke_again() -> Result<()> {
    // ---
    let (calculator, server) = calculator(Encoding::Binary, Encoding::Binary).await;
    let (done, mut done_rx) = collect::<MulResult>();

    let chained = calculator.clone();
    let mut done = Some(done);
    calculator.add(&AddRequest { lhs: 2, rhs: 3 }, move |result: Result<AddResult>| {
        let sum = result.unwrap().value;
        if let Some(done) = done.take() {
            chained.mul(&MulRequest { lhs: sum, rhs: sum }, done).unwrap();
        }
    })?;

    assert_eq!(next(&mut done_rx).await?.value, 25);
    calculator.end_session().await?;
    server.shutdown().await;
    Ok(())
}

// --- transports that fail every send

struct RefusingTransport {
    // report through the delivery handle instead of returning Err
    via_delivery: bool,
    sends: AtomicUsize,
}

#[async_trait::async_trait]
impl Transport for RefusingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::RequestResponse { synchronous: false }
    }

    async fn open(&self, _address: &Address, _inbound: InboundSender) -> Result<()> {
        Ok(())
    }

    async fn send(&self, _frame: Bytes, delivery: Delivery) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let err = RpcError::Transport("connection refused".into());
        if self.via_delivery {
            delivery.fail(err);
            Ok(())
        } else {
            Err(err)
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_transport_failure_routes_to_caller() -> Result<()> {
    // ---
    for via_delivery in [false, true] {
        let transport = Arc::new(RefusingTransport {
            via_delivery,
            sends: AtomicUsize::new(0),
        });
        let calculator =
            Calculator::connect(memory_builder(transport.clone(), Encoding::Binary)).await?;
        assert!(calculator.client().transport_kind().is_request_response());

        let (callback, mut rx) = collect::<AddResult>();
        calculator.add(&AddRequest { lhs: 1, rhs: 1 }, callback)?;

        match next(&mut rx).await {
            Err(RpcError::Transport(msg)) => assert_eq!(msg, "connection refused"),
            other => panic!("expected transport error, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
        assert_eq!(calculator.client().pending_count(), 0);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);

        // the session survives a failed call
        assert_eq!(calculator.client().state(), SessionState::Open);
        calculator.end_session().await?;
    }
    Ok(())
}

struct UnreachableTransport;

#[async_trait::async_trait]
impl Transport for UnreachableTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    async fn open(&self, address: &Address, _inbound: InboundSender) -> Result<()> {
        Err(RpcError::Transport(format!("{address} unreachable")))
    }

    async fn send(&self, _frame: Bytes, _delivery: Delivery) -> Result<()> {
        Err(RpcError::NotOpen)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_open_failure_fails_build() {
    // ---
    let result = Calculator::connect(memory_builder(
        Arc::new(UnreachableTransport),
        Encoding::Binary,
    ))
    .await;
    assert!(matches!(result, Err(RpcError::Transport(_))));
}

#[tokio::test]
async fn test_dropped_stream_forgets_call() -> Result<()> {
    // ---
    let (transport, peer) = memory::pair();
    let server = MemoryServer::start(peer, Encoding::Binary, Encoding::Binary);
    let ticker = Ticker::connect(memory_builder(transport, Encoding::Binary)).await?;

    let mut stream = ticker
        .client()
        .subscribe::<TickRequest, Tick>("ticks", &TickRequest { count: 1 })?;
    let id = stream.request_id();
    assert_eq!(stream.next().await.unwrap()?.seq, 1);
    assert_eq!(ticker.client().pending_count(), 1);

    drop(stream);
    assert_eq!(ticker.client().pending_count(), 0);

    // a late update for the dropped stream is inert
    let payload = Encoding::Binary.encode(&Tick { seq: 2 })?;
    server
        .sender()
        .send(encode_response(Encoding::Binary, id, payload)?);

    // a subscription that is never read is dropped the same way
    let idle = ticker
        .client()
        .subscribe::<TickRequest, Tick>("ticks", &TickRequest { count: 0 })?;
    assert_eq!(ticker.client().pending_count(), 1);
    drop(idle);
    assert_eq!(ticker.client().pending_count(), 0);

    ticker.end_session().await?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_weak_client_in_streaming_callback() -> Result<()> {
    // ---
    let (transport, peer) = memory::pair();
    let server = MemoryServer::start(peer, Encoding::Binary, Encoding::Binary);
    let ticker = Ticker::connect(memory_builder(transport, Encoding::Binary)).await?;

    let weak = ticker.client().downgrade();
    let (mut forward, mut rx) = collect::<(Tick, usize)>();
    ticker.ticks(&TickRequest { count: 1 }, move |result: Result<Tick>| {
        let pending = weak.upgrade().map_or(0, |client| client.pending_count());
        forward(result.map(|tick| (tick, pending)));
    })?;

    let (tick, pending) = next(&mut rx).await?;
    assert_eq!((tick.seq, pending), (1, 1));

    // the callback does not keep the session alive
    drop(ticker);
    assert!(matches!(next(&mut rx).await, Err(RpcError::SessionEnded)));

    server.shutdown().await;
    Ok(())
}

// --- transport that hands every delivery to the test

#[derive(Default)]
struct HeldTransport {
    inbound: std::sync::Mutex<Option<InboundSender>>,
    deliveries: std::sync::Mutex<Vec<Delivery>>,
}

impl HeldTransport {
    async fn next_delivery(&self) -> Delivery {
        // ---
        for _ in 0..500 {
            if let Some(delivery) = self.deliveries.lock().unwrap().pop() {
                return delivery;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("nothing was sent");
    }

    fn push<M: protomux::Payload>(&self, id: protomux::RequestId, msg: &M) {
        let payload = Encoding::Binary.encode(msg).unwrap();
        let frame = encode_response(Encoding::Binary, id, payload).unwrap();
        let inbound = self.inbound.lock().unwrap();
        inbound.as_ref().expect("not open").frame(frame);
    }
}

#[async_trait::async_trait]
impl Transport for HeldTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    async fn open(&self, _address: &Address, inbound: InboundSender) -> Result<()> {
        *self.inbound.lock().unwrap() = Some(inbound);
        Ok(())
    }

    async fn send(&self, _frame: Bytes, delivery: Delivery) -> Result<()> {
        self.deliveries.lock().unwrap().push(delivery);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_failed_call_ignores_later_responses() -> Result<()> {
    // ---
    let transport = Arc::new(HeldTransport::default());
    let client = ServiceClientBuilder::new()
        .descriptor(
            protomux::ServiceDescriptor::builder(".Mixed.Service")
                .unary::<AddRequest, AddResult>("add")
                .streaming::<TickRequest, Tick>("ticks")
                .build()?,
        )
        .address("memory://test")
        .transport(transport.clone())
        .build()
        .await?;

    // streaming: one update, then a transport error
    let (ticks, mut ticks_rx) = collect::<Tick>();
    let stream_id = client.invoke("ticks", &TickRequest { count: 0 }, ticks)?;
    let stream_delivery = transport.next_delivery().await;
    assert_eq!(stream_delivery.request_id(), stream_id);

    transport.push(stream_id, &Tick { seq: 1 });
    assert_eq!(next(&mut ticks_rx).await?.seq, 1);

    stream_delivery.fail(RpcError::Transport("stream reset".into()));
    match next(&mut ticks_rx).await {
        Err(RpcError::Transport(msg)) => assert_eq!(msg, "stream reset"),
        other => panic!("expected transport error, got {other:?}"),
    }

    // unary: fails before any reply
    let (add, mut add_rx) = collect::<AddResult>();
    let add_id = client.invoke("add", &AddRequest { lhs: 1, rhs: 1 }, add)?;
    transport
        .next_delivery()
        .await
        .fail(RpcError::Transport("refused".into()));
    assert!(matches!(next(&mut add_rx).await, Err(RpcError::Transport(_))));
    assert_eq!(client.pending_count(), 0);

    // stray replies for both failed ids
    transport.push(stream_id, &Tick { seq: 2 });
    transport.push(add_id, &AddResult { value: 2 });

    // a fresh call answered after the strays proves they were dispatched
    let (fresh, mut fresh_rx) = collect::<AddResult>();
    let fresh_id = client.invoke("add", &AddRequest { lhs: 3, rhs: 4 }, fresh)?;
    transport.next_delivery().await;
    transport.push(fresh_id, &AddResult { value: 7 });
    assert_eq!(next(&mut fresh_rx).await?.value, 7);

    assert_silent(&mut ticks_rx).await;
    assert_silent(&mut add_rx).await;
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.state(), SessionState::Open);

    client.end_session().await?;
    Ok(())
}
