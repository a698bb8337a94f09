use prost::Message;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use protomux::{
    // ---
    decode_request,
    encode_response,
    memory,
    Encoding,
    Result,
    ServiceClientBuilder,
};

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
struct TickRequest {
    #[prost(uint32, tag = "1")]
    count: u32,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
struct Tick {
    #[prost(uint32, tag = "1")]
    seq: u32,
}

protomux::rpc_service! {
    pub service Ticker(".Ticker.Service") {
        streaming fn ticks(TickRequest) -> Tick;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (transport, mut peer) = memory::pair();
    let updates = peer.sender();

    // push `count` ticks for each subscription, 100ms apart
    tokio::spawn(async move {
        while let Some(frame) = peer.recv().await {
            let Ok(request) = decode_request(Encoding::Text, &frame) else {
                continue;
            };
            let Ok(req) = Encoding::Text.decode::<TickRequest>(&request.data) else {
                continue;
            };
            let updates = updates.clone();
            tokio::spawn(async move {
                for seq in 1..=req.count {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    let Ok(payload) = Encoding::Text.encode(&Tick { seq }) else {
                        return;
                    };
                    let Ok(frame) = encode_response(Encoding::Text, request.request_id(), payload)
                    else {
                        return;
                    };
                    if !updates.send(frame) {
                        return;
                    }
                }
            });
        }
    });

    let ticker = Ticker::connect(
        ServiceClientBuilder::new()
            .address("memory://ticker")
            .transport(transport)
            .encoding(Encoding::Text),
    )
    .await?;

    let mut stream = ticker
        .client()
        .subscribe::<TickRequest, Tick>("ticks", &TickRequest { count: 5 })?;

    let mut received = 0;
    while let Some(tick) = stream.next().await {
        println!("tick {}", tick?.seq);
        received += 1;
        if received == 5 {
            break;
        }
    }

    ticker.end_session().await?;
    Ok(())
}
