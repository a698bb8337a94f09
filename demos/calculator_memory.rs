use prost::Message;
use serde::{Deserialize, Serialize};
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
struct AddRequest {
    #[prost(int32, tag = "1")]
    lhs: i32,
    #[prost(int32, tag = "2")]
    rhs: i32,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
struct AddResult {
    #[prost(int32, tag = "1")]
    value: i32,
}

protomux::rpc_service! {
    pub service Calculator(".Calculator.Service") {
        unary fn add(AddRequest) -> AddResult;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (transport, mut peer) = memory::pair();

    // the "server": answer every add request on the other end of the pair
    let server = tokio::spawn(async move {
        while let Some(frame) = peer.recv().await {
            let Ok(request) = decode_request(Encoding::Binary, &frame) else {
                continue;
            };
            let Ok(req) = Encoding::Binary.decode::<AddRequest>(&request.data) else {
                continue;
            };
            let reply = AddResult {
                value: req.lhs + req.rhs,
            };
            let payload = Encoding::Binary.encode(&reply).map(|payload| {
                encode_response(Encoding::Binary, request.request_id(), payload)
            });
            if let Ok(Ok(frame)) = payload {
                peer.send(frame);
            }
        }
    });

    let calculator = Calculator::connect(
        ServiceClientBuilder::new()
            .address("memory://calculator")
            .transport(transport),
    )
    .await?;

    calculator.add(&AddRequest { lhs: 20, rhs: 3 }, |result: Result<AddResult>| {
        match result {
            Ok(sum) => println!("20 + 3 = {}", sum.value),
            Err(err) => eprintln!("add failed: {err}"),
        }
    })?;

    let sum: AddResult = calculator
        .client()
        .call("add", &AddRequest { lhs: 2, rhs: 40 })
        .await?;
    println!("2 + 40 = {}", sum.value);

    calculator.end_session().await?;
    server.await.ok();
    Ok(())
}
