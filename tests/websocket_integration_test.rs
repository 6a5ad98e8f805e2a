use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use uuid::Uuid;

use express_relay_client::types::{BidCreate, BidEvm, BidStatus, Opportunity};
use express_relay_client::{
    Address, Bytes, ChannelState, Client, ClientConfig, ClientError, EventHandlers,
    WebSocketChannel, WsConfig, U256,
};

type RelaySocket = WebSocketStream<TcpStream>;

/// One-connection mock relay; returns its http base url and the captured
/// Authorization header
async fn spawn_relay<F, Fut>(script: F) -> (String, Arc<Mutex<Option<String>>>)
where
    F: FnOnce(RelaySocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let auth = Arc::new(Mutex::new(None));
    let captured = auth.clone();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            assert_eq!(request.uri().path(), "/v1/ws");
            *captured.lock() = request
                .headers()
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            Ok(response)
        };
        let ws = accept_hdr_async(stream, callback).await.unwrap();
        script(ws).await;
    });

    (format!("http://{addr}"), auth)
}

async fn next_request(ws: &mut RelaySocket) -> Value {
    while let Some(frame) = ws.next().await {
        if let Message::Text(text) = frame.unwrap() {
            return serde_json::from_str(&text).unwrap();
        }
    }
    panic!("client went away before sending a request");
}

async fn reply(ws: &mut RelaySocket, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Keep the socket open until the client hangs up
async fn drain(ws: &mut RelaySocket) {
    while let Some(Ok(_)) = ws.next().await {}
}

fn config(base: &str, response_timeout_ms: u64, ping_interval_ms: u64) -> ClientConfig {
    ClientConfig::new(base)
        .with_api_key("secret")
        .with_websocket(WsConfig {
            response_timeout_ms,
            ping_interval_ms,
        })
}

fn recording_close() -> (EventHandlers, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handlers = EventHandlers::new().on_websocket_close(move |reason| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(reason);
        }
    });
    (handlers, rx)
}

fn channel(config: &ClientConfig, handlers: EventHandlers) -> WebSocketChannel {
    WebSocketChannel::from_config(config, Arc::new(RwLock::new(handlers))).unwrap()
}

fn opportunity_push(opportunity_id: Uuid) -> Value {
    json!({
        "type": "new_opportunity",
        "opportunity": {
            "version": "v1",
            "chain_id": "op_sepolia",
            "opportunity_id": opportunity_id,
            "creation_time": 1_700_000_000_000_000i64,
            "permission_key": "0x0102",
            "target_contract": "0x63aa8ee2c3e1e2f9b3f04e1cbbe8aa4d33cb7d5f",
            "target_calldata": "0x",
            "target_call_value": "0",
            "sell_tokens": [],
            "buy_tokens": [],
        },
    })
}

#[tokio::test]
async fn test_out_of_order_responses_reach_their_callers() {
    let (base, _) = spawn_relay(|mut ws| async move {
        let first = next_request(&mut ws).await;
        let second = next_request(&mut ws).await;
        let first_id: u64 = first["id"].as_str().unwrap().parse().unwrap();
        let second_id: u64 = second["id"].as_str().unwrap().parse().unwrap();
        assert!(second_id > first_id);

        for request in [&second, &first] {
            reply(
                &mut ws,
                json!({ "id": request["id"], "status": "success", "result": request["method"] }),
            )
            .await;
        }
        drain(&mut ws).await;
    })
    .await;

    let (handlers, _closes) = recording_close();
    let channel = channel(&config(&base, 2_000, 30_000), handlers);
    let (a, b) = tokio::join!(
        channel.request("subscribe", json!({ "chain_ids": ["op_sepolia"] })),
        channel.request("unsubscribe", json!({ "chain_ids": ["op_sepolia"] })),
    );

    assert_eq!(a.unwrap(), json!("subscribe"));
    assert_eq!(b.unwrap(), json!("unsubscribe"));
    assert_eq!(channel.pending_requests(), 0);
    assert_eq!(channel.state(), ChannelState::Open);
    channel.close();
}

#[tokio::test]
async fn test_pushes_are_handled_in_server_order() {
    let bid_id = Uuid::new_v4();
    let (first_opp, second_opp) = (Uuid::new_v4(), Uuid::new_v4());
    let (base, _) = spawn_relay(move |mut ws| async move {
        let request = next_request(&mut ws).await;
        assert_eq!(request["method"], "subscribe");
        assert_eq!(request["params"], json!({ "chain_ids": ["op_sepolia"] }));
        reply(&mut ws, json!({ "id": request["id"], "status": "success", "result": null })).await;

        reply(&mut ws, opportunity_push(first_opp)).await;
        reply(
            &mut ws,
            json!({
                "type": "bid_status_update",
                "status": { "id": bid_id, "bid_status": { "type": "lost" } },
            }),
        )
        .await;
        reply(&mut ws, json!({ "type": "gossip" })).await;
        reply(&mut ws, opportunity_push(second_opp)).await;
        drain(&mut ws).await;
    })
    .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (handlers, _closes) = recording_close();
    let client = Client::new(config(&base, 2_000, 30_000), handlers).unwrap();

    let log = seen.clone();
    client.on_opportunity(move |opportunity| {
        let log = log.clone();
        async move {
            // A slow handler must not let the next push overtake it
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Opportunity::Evm(opp) = opportunity {
                log.lock().push(format!("opp:{}", opp.opportunity_id));
            }
        }
    });
    let log = seen.clone();
    client.on_bid_status(move |update| {
        let log = log.clone();
        async move {
            assert_eq!(update.bid_status, BidStatus::Lost { result: None, index: None });
            log.lock().push(format!("bid:{}", update.id));
        }
    });

    client.subscribe_chains(&["op_sepolia".to_string()]).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while seen.lock().len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pushes were not all handled");

    assert_eq!(
        *seen.lock(),
        vec![
            format!("opp:{first_opp}"),
            format!("bid:{bid_id}"),
            format!("opp:{second_opp}"),
        ]
    );
    client.close();
}

#[tokio::test]
async fn test_missing_heartbeat_closes_channel() {
    let (base, _) = spawn_relay(|mut ws| async move {
        drain(&mut ws).await;
    })
    .await;

    let (handlers, mut closes) = recording_close();
    let channel = channel(&config(&base, 2_000, 300), handlers);
    channel.connect().await.unwrap();
    assert_eq!(channel.state(), ChannelState::Open);

    let reason = tokio::time::timeout(Duration::from_secs(2), closes.recv())
        .await
        .expect("close handler did not run")
        .unwrap();
    assert!(reason.contains("no ping"), "unexpected reason: {reason}");
    assert_eq!(channel.state(), ChannelState::Closed);

    let later = channel.request("subscribe", json!({ "chain_ids": ["solana"] })).await;
    assert!(matches!(later, Err(ClientError::Transport(_))));

    channel.close();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(closes.try_recv().is_err(), "close handler ran twice");
}

#[tokio::test]
async fn test_pings_keep_channel_open() {
    let (base, _) = spawn_relay(|mut ws| async move {
        for _ in 0..10 {
            if ws.send(Message::Ping(Vec::new())).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        drain(&mut ws).await;
    })
    .await;

    let (handlers, mut closes) = recording_close();
    let channel = channel(&config(&base, 2_000, 300), handlers);
    channel.connect().await.unwrap();

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(channel.state(), ChannelState::Open);
    assert!(closes.try_recv().is_err());

    channel.close();
    let reason = tokio::time::timeout(Duration::from_secs(1), closes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, "closed by caller");
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let (base, _) = spawn_relay(|mut ws| async move {
        let _ignored = next_request(&mut ws).await;
        drain(&mut ws).await;
    })
    .await;

    let (handlers, _closes) = recording_close();
    let channel = channel(&config(&base, 200, 30_000), handlers);
    let result = channel.request("subscribe", json!({ "chain_ids": ["solana"] })).await;

    match result {
        Err(ClientError::CorrelationTimeout { request_id, timeout_ms }) => {
            assert_eq!(request_id, "1");
            assert_eq!(timeout_ms, 200);
        }
        other => panic!("expected a correlation timeout, got {other:?}"),
    }
    assert_eq!(channel.pending_requests(), 0);
    assert_eq!(channel.state(), ChannelState::Open);
    channel.close();
}

#[tokio::test]
async fn test_relay_error_response() {
    let (base, _) = spawn_relay(|mut ws| async move {
        let request = next_request(&mut ws).await;
        reply(
            &mut ws,
            json!({ "id": request["id"], "status": "error", "result": "Chain id not found" }),
        )
        .await;
        drain(&mut ws).await;
    })
    .await;

    let (handlers, _closes) = recording_close();
    let client = Client::new(config(&base, 2_000, 30_000), handlers.on_opportunity(|_| async {}))
        .unwrap();
    let result = client.subscribe_chains(&["nowhere".to_string()]).await;

    match result {
        Err(ClientError::Relay(message)) => assert_eq!(message, "Chain id not found"),
        other => panic!("expected a relay error, got {other:?}"),
    }
    assert_eq!(client.channel_state(), ChannelState::Open);
    client.close();
}

#[tokio::test]
async fn test_bid_over_websocket_is_authenticated() {
    let bid_id = Uuid::new_v4();
    let (base, auth) = spawn_relay(move |mut ws| async move {
        let request = next_request(&mut ws).await;
        assert_eq!(request["method"], "post_bid");
        assert_eq!(request["params"]["bid"]["chain_id"], "op_sepolia");
        assert_eq!(request["params"]["bid"]["amount"], "100");
        reply(
            &mut ws,
            json!({ "id": request["id"], "status": "success", "result": { "id": bid_id, "status": "OK" } }),
        )
        .await;
        drain(&mut ws).await;
    })
    .await;

    let (handlers, _closes) = recording_close();
    let client = Client::new(config(&base, 2_000, 30_000), handlers).unwrap();
    let bid = BidCreate::Evm(BidEvm {
        chain_id: "op_sepolia".to_string(),
        amount: U256::from(100u64),
        permission_key: Bytes::from(vec![1u8; 32]),
        target_contract: Address::from_low_u64_be(0x1234),
        target_calldata: Bytes::from(vec![0xde, 0xad]),
    });

    assert_eq!(client.submit_bid(&bid, true).await.unwrap(), bid_id);
    assert_eq!(auth.lock().as_deref(), Some("Bearer secret"));
    client.close();
}

#[tokio::test]
async fn test_closed_reports_heartbeat_loss_without_close_handler() {
    let (base, _) = spawn_relay(|mut ws| async move {
        drain(&mut ws).await;
    })
    .await;

    let client = Client::new(config(&base, 2_000, 300), EventHandlers::new()).unwrap();
    client.connect().await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), client.closed())
        .await
        .expect("channel did not close");
    match outcome {
        Err(ClientError::Transport(reason)) => {
            assert!(reason.contains("no ping"), "unexpected reason: {reason}")
        }
        other => panic!("expected a transport error, got {other:?}"),
    }
    assert_eq!(client.channel_state(), ChannelState::Closed);
}

#[tokio::test]
async fn test_abandoned_requests_release_their_entries() {
    let (base, _) = spawn_relay(|mut ws| async move {
        drain(&mut ws).await;
    })
    .await;

    let (handlers, _closes) = recording_close();
    let channel = channel(&config(&base, 30_000, 30_000), handlers);
    channel.connect().await.unwrap();

    for _ in 0..5 {
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            channel.request("subscribe", json!({ "chain_ids": ["solana"] })),
        )
        .await;
        assert!(abandoned.is_err());
    }
    assert_eq!(channel.pending_requests(), 0);
    assert_eq!(channel.state(), ChannelState::Open);
    channel.close();
}
