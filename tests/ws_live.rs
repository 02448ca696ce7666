//! End-to-end WebSocket tests against a local mock venue.
//!
//! The mock accepts the real control-frame shapes: it acknowledges login,
//! subscribe and unsubscribe, pushes one data frame per subscribed topic,
//! and answers bare-text pings. Each accepted connection gets a running
//! index so tests can tell which socket produced a push.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;

use okx_connect::ws::public::tickers_topic;
use okx_connect::{Credentials, Destination, Error, OkxClient, WsConfig};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerMode {
    /// Ack everything, push one frame per subscription.
    Normal,
    /// Like `Normal`, but the first connection closes right after its
    /// first push to force a reconnect.
    DropFirstConnection,
    /// Require a login before accepting subscribes.
    RequireLogin,
}

async fn spawn_server(mode: ServerMode) -> (String, Arc<AtomicUsize>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let conn_no = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    serve_conn(ws, mode, conn_no).await;
                }
            });
        }
    });
    (format!("ws://{addr}"), connections)
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) -> bool {
    ws.send(Message::Text(value.to_string())).await.is_ok()
}

async fn serve_conn(mut ws: WebSocketStream<TcpStream>, mode: ServerMode, conn_no: usize) {
    let mut logged_in = false;
    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        if text == "ping" {
            let _ = ws.send(Message::Text("pong".to_string())).await;
            continue;
        }
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        match frame["op"].as_str() {
            Some("login") => {
                let args = &frame["args"][0];
                // Reject empty keys so the auth-failure path is testable.
                if args["apiKey"].as_str().unwrap_or("").is_empty() {
                    let _ = send_json(
                        &mut ws,
                        json!({"event": "error", "code": "60009", "msg": "login failed"}),
                    )
                    .await;
                    continue;
                }
                logged_in = true;
                let _ =
                    send_json(&mut ws, json!({"event": "login", "code": "0", "msg": ""})).await;
            }
            Some("subscribe") => {
                if mode == ServerMode::RequireLogin && !logged_in {
                    let _ = send_json(
                        &mut ws,
                        json!({"event": "error", "code": "60011", "msg": "please log in"}),
                    )
                    .await;
                    continue;
                }
                let args = frame["args"].as_array().cloned().unwrap_or_default();
                for arg in args {
                    if arg["channel"] == "unknown-channel" {
                        if !send_json(
                            &mut ws,
                            json!({
                                "event": "error",
                                "code": "60018",
                                "msg": "channel doesn't exist",
                                "arg": arg,
                            }),
                        )
                        .await
                        {
                            return;
                        }
                        continue;
                    }
                    if !send_json(&mut ws, json!({"event": "subscribe", "arg": arg})).await {
                        return;
                    }
                    let push = json!({"arg": arg, "data": [payload_for(&arg, conn_no)]});
                    if !send_json(&mut ws, push).await {
                        return;
                    }
                }
                if mode == ServerMode::DropFirstConnection && conn_no == 0 {
                    let _ = ws.send(Message::Close(None)).await;
                    return;
                }
            }
            Some("unsubscribe") => {
                let args = frame["args"].as_array().cloned().unwrap_or_default();
                for arg in args {
                    if !send_json(&mut ws, json!({"event": "unsubscribe", "arg": arg})).await {
                        return;
                    }
                }
            }
            _ => {}
        }
    }
}

fn payload_for(arg: &Value, conn_no: usize) -> Value {
    match arg["channel"].as_str().unwrap_or("") {
        "account" => json!({"totalEq": "1000", "uTime": "1700000000000"}),
        _ => json!({
            "instId": arg["instId"].as_str().unwrap_or(""),
            "last": conn_no.to_string(),
        }),
    }
}

fn test_ws_config() -> WsConfig {
    WsConfig {
        connect_timeout: Duration::from_secs(5),
        ack_timeout: Duration::from_secs(5),
        ping_interval: Duration::from_secs(60),
        pong_timeout: Duration::from_secs(120),
        reconnect_delay: Duration::from_millis(50),
        max_reconnect_attempts: 5,
        login_timeout: Duration::from_secs(5),
    }
}

fn public_client(url: &str) -> OkxClient {
    OkxClient::builder()
        .public_ws_url(url)
        .ws_config(test_ws_config())
        .build()
        .unwrap()
}

#[tokio::test]
async fn subscribe_acks_and_delivers_pushes() {
    let (url, _) = spawn_server(ServerMode::Normal).await;
    let client = public_client(&url);

    let mut rx = client.public().tickers("BTC-USDT").await.unwrap();
    let push = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(push.arg, tickers_topic("BTC-USDT"));
    assert_eq!(push.data.len(), 1);
    assert_eq!(push.data[0].inst_id, "BTC-USDT");

    client.close();
}

#[tokio::test]
async fn venue_error_ack_fails_the_subscribe() {
    let (url, _) = spawn_server(ServerMode::Normal).await;
    let client = public_client(&url);

    // Drive the raw topic path so the mock can reject the channel name.
    let err = client
        .public()
        .connection()
        .subscribe(vec![okx_connect::Topic::new("unknown-channel")
            .arg("instId", "BTC-USDT")])
        .await
        .unwrap_err();
    match err {
        Error::Api { code, .. } => assert_eq!(code, 60018),
        other => panic!("expected Api error, got {other:?}"),
    }

    // The failed topic must not be replayed or block a retry.
    let mut rx = client.public().tickers("ETH-USDT").await.unwrap();
    assert!(timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().is_some());

    client.close();
}

#[tokio::test]
async fn private_connection_logs_in_before_subscribing() {
    let (url, _) = spawn_server(ServerMode::RequireLogin).await;
    let client = OkxClient::builder()
        .credentials(Credentials::new("key".into(), "secret".into(), "phrase".into()))
        .destination(Destination::Demo)
        .private_ws_url(&url)
        .ws_config(test_ws_config())
        .build()
        .unwrap();

    let mut rx = client.private().account(None).await.unwrap();
    let push = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(push.data.len(), 1);
    assert_eq!(push.data[0].total_eq, "1000");

    client.close();
}

#[tokio::test]
async fn login_rejection_surfaces_as_auth_error() {
    let (url, _) = spawn_server(ServerMode::RequireLogin).await;
    // Anonymous credentials make the mock reject the login frame.
    let client = OkxClient::builder()
        .private_ws_url(&url)
        .ws_config(test_ws_config())
        .build()
        .unwrap();

    let err = client.private().account(None).await.unwrap_err();
    assert!(
        matches!(err, Error::Auth(_) | Error::ConnectTimeout),
        "expected auth failure, got {err:?}"
    );

    client.close();
}

#[tokio::test]
async fn reconnect_replays_live_topics_on_the_same_receiver() {
    let (url, connections) = spawn_server(ServerMode::DropFirstConnection).await;
    let client = public_client(&url);

    let mut rx = client.public().tickers("BTC-USDT").await.unwrap();

    // Push from the first socket, which closes right after.
    let first = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.data[0].last, "0");

    // The replayed subscription delivers on the original receiver.
    let second = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(second.data[0].last, "1");
    assert!(connections.load(Ordering::SeqCst) >= 2);

    client.close();
}

#[tokio::test]
async fn unsubscribe_with_clear_sink_closes_the_receiver() {
    let (url, _) = spawn_server(ServerMode::Normal).await;
    let client = public_client(&url);

    let topic = tickers_topic("BTC-USDT");
    let mut rx = client.public().tickers("BTC-USDT").await.unwrap();
    assert!(timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().is_some());

    client
        .public()
        .unsubscribe(vec![topic.clone()], true)
        .await
        .unwrap();

    // Sink dropped on ack; the receiver drains then closes.
    let closed = timeout(RECV_TIMEOUT, async {
        while rx.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "receiver never observed the close");

    // Unsubscribing a topic that is no longer live is a no-op success.
    client.public().unsubscribe(vec![topic], true).await.unwrap();

    client.close();
}

#[tokio::test]
async fn close_before_first_subscribe_never_dials() {
    let (url, connections) = spawn_server(ServerMode::Normal).await;
    let client = public_client(&url);

    // No socket task exists yet; closing must still stick.
    client.close();

    let err = client.public().tickers("BTC-USDT").await.unwrap_err();
    assert!(matches!(err, Error::Closed), "got {err:?}");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        connections.load(Ordering::SeqCst),
        0,
        "closed client must not open a connection"
    );
}

#[tokio::test]
async fn close_makes_later_calls_fail_fast() {
    let (url, _) = spawn_server(ServerMode::Normal).await;
    let client = public_client(&url);

    let mut rx = client.public().tickers("BTC-USDT").await.unwrap();
    assert!(timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().is_some());

    client.close();

    // The receiver observes a terminal close.
    let drained = timeout(RECV_TIMEOUT, async {
        while rx.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());

    let err = client.public().tickers("ETH-USDT").await.unwrap_err();
    assert!(matches!(err, Error::Closed | Error::ConnectTimeout));
}
