use std::net::SocketAddr;
use std::time::Duration;

use cws_channel::frame::{PHX_JOIN, PHX_LEAVE, PHX_REPLY};
use cws_channel::{
    ChannelError, ConnectionState, JoinAck, PhoenixFrame, PhoenixSocket, RealtimeChannel, SHOUT,
    SocketConfig,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

type ServerWs = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

/// Accepts websocket connections and hands each one, with its request
/// URI, to the test body.
async fn spawn_server() -> (SocketAddr, mpsc::UnboundedReceiver<(String, ServerWs)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let (uri_tx, uri_rx) = oneshot::channel();
            let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                let _ = uri_tx.send(request.uri().to_string());
                Ok(response)
            };
            let Ok(ws) = accept_hdr_async(stream, callback).await else {
                continue;
            };
            let uri = uri_rx.await.unwrap_or_default();
            if tx.send((uri, ws)).is_err() {
                break;
            }
        }
    });
    (addr, rx)
}

async fn next_frame(ws: &mut ServerWs) -> PhoenixFrame {
    loop {
        let message = timeout(WAIT, ws.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .expect("read ok");
        if let Message::Text(text) = message {
            return PhoenixFrame::decode(text.as_str()).expect("phoenix frame");
        }
    }
}

async fn send(ws: &mut ServerWs, frame: PhoenixFrame) {
    ws.send(Message::Text(frame.encode().unwrap().into()))
        .await
        .unwrap();
}

async fn reply(ws: &mut ServerWs, request: &PhoenixFrame, status: &str, response: Value) {
    let frame = PhoenixFrame::new(
        request.topic.clone(),
        PHX_REPLY,
        json!({"status": status, "response": response}),
    )
    .with_refs(request.join_ref.clone(), request.reference.clone());
    send(ws, frame).await;
}

fn fast_config(addr: SocketAddr) -> SocketConfig {
    let mut config = SocketConfig::new(format!("ws://{addr}/socket"));
    config.join_timeout = Duration::from_millis(200);
    config.reconnect_base = Duration::from_millis(10);
    config.reconnect_max = Duration::from_millis(50);
    config
}

#[tokio::test]
async fn joins_receives_pushes_and_leaves() {
    let (addr, mut connections) = spawn_server().await;
    let socket = PhoenixSocket::connect(fast_config(addr)).unwrap();

    let mut sub = socket
        .subscribe("conversation:conv1", &[SHOUT])
        .await
        .unwrap();

    let (uri, mut ws) = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    assert_eq!(uri, "/socket/websocket?vsn=2.0.0");

    let join = next_frame(&mut ws).await;
    assert_eq!(join.event, PHX_JOIN);
    assert_eq!(join.topic, "conversation:conv1");
    assert!(join.join_ref.is_some());
    reply(&mut ws, &join, "ok", json!({"joined": true})).await;
    assert_eq!(
        timeout(WAIT, sub.ack).await.unwrap().unwrap(),
        JoinAck::Ok(json!({"joined": true}))
    );
    assert_eq!(socket.state(), ConnectionState::Open);

    send(
        &mut ws,
        PhoenixFrame::new("conversation:conv1", "presence_diff", json!({})),
    )
    .await;
    send(
        &mut ws,
        PhoenixFrame::new(
            "conversation:conv1",
            SHOUT,
            json!({"body": "hello from agent", "sender": "agent"}),
        ),
    )
    .await;
    let inbound = timeout(WAIT, sub.events.recv()).await.unwrap().unwrap();
    assert_eq!(inbound.event, SHOUT);
    assert_eq!(inbound.payload["body"], "hello from agent");

    socket
        .push("conversation:conv1", SHOUT, json!({"body": "hi"}))
        .await
        .unwrap();
    let pushed = next_frame(&mut ws).await;
    assert_eq!(pushed.event, SHOUT);
    assert_eq!(pushed.join_ref, join.join_ref);
    assert_eq!(pushed.payload["body"], "hi");

    socket.leave("conversation:conv1").await.unwrap();
    let left = next_frame(&mut ws).await;
    assert_eq!(left.event, PHX_LEAVE);
    assert_eq!(left.topic, "conversation:conv1");
    assert!(timeout(WAIT, sub.events.recv()).await.unwrap().is_none());

    socket.disconnect().await;
    assert_eq!(socket.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn push_to_unknown_topic_is_rejected() {
    let (addr, _connections) = spawn_server().await;
    let socket = PhoenixSocket::connect(fast_config(addr)).unwrap();

    let err = socket
        .push("conversation:nope", SHOUT, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::NotJoined(_)));
    assert!(matches!(
        socket.leave("conversation:nope").await,
        Err(ChannelError::NotJoined(_))
    ));
    socket.disconnect().await;
}

#[tokio::test]
async fn rejected_join_reports_error_ack() {
    let (addr, mut connections) = spawn_server().await;
    let socket = PhoenixSocket::connect(fast_config(addr)).unwrap();
    let sub = socket
        .subscribe("conversation:conv1", &[SHOUT])
        .await
        .unwrap();

    let (_, mut ws) = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    let join = next_frame(&mut ws).await;
    reply(&mut ws, &join, "error", json!({"reason": "unauthorized"})).await;

    assert_eq!(
        timeout(WAIT, sub.ack).await.unwrap().unwrap(),
        JoinAck::Error(json!({"reason": "unauthorized"}))
    );
    socket.disconnect().await;
}

#[tokio::test]
async fn unanswered_join_times_out_and_is_retried() {
    let (addr, mut connections) = spawn_server().await;
    let socket = PhoenixSocket::connect(fast_config(addr)).unwrap();
    let sub = socket
        .subscribe("conversation:conv1", &[SHOUT])
        .await
        .unwrap();

    let (_, mut ws) = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    let first = next_frame(&mut ws).await;
    assert_eq!(
        timeout(WAIT, sub.ack).await.unwrap().unwrap(),
        JoinAck::Timeout
    );

    let retry = next_frame(&mut ws).await;
    assert_eq!(retry.event, PHX_JOIN);
    assert_ne!(retry.join_ref, first.join_ref);
    socket.disconnect().await;
}

#[tokio::test]
async fn reconnects_rejoins_and_flushes_buffered_pushes() {
    let (addr, mut connections) = spawn_server().await;
    let mut config = fast_config(addr);
    config.reconnect_base = Duration::from_millis(300);
    config.reconnect_max = Duration::from_millis(600);
    config.join_timeout = Duration::from_secs(3);
    let socket = PhoenixSocket::connect(config).unwrap();
    let mut state = socket.watch_state();

    let mut sub = socket
        .subscribe("conversation:conv1", &[SHOUT])
        .await
        .unwrap();
    let (_, mut ws) = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    let join = next_frame(&mut ws).await;
    reply(&mut ws, &join, "ok", json!({})).await;
    timeout(WAIT, sub.ack).await.unwrap().unwrap();

    drop(ws);
    timeout(
        WAIT,
        state.wait_for(|state| matches!(state, ConnectionState::Reconnecting { .. })),
    )
    .await
    .unwrap()
    .unwrap();

    socket
        .push("conversation:conv1", SHOUT, json!({"body": "while offline"}))
        .await
        .unwrap();

    let (_, mut ws) = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    let rejoin = next_frame(&mut ws).await;
    assert_eq!(rejoin.event, PHX_JOIN);
    assert_eq!(rejoin.topic, "conversation:conv1");
    reply(&mut ws, &rejoin, "ok", json!({})).await;

    let flushed = next_frame(&mut ws).await;
    assert_eq!(flushed.event, SHOUT);
    assert_eq!(flushed.join_ref, rejoin.join_ref);
    assert_eq!(flushed.payload["body"], "while offline");

    send(
        &mut ws,
        PhoenixFrame::new("conversation:conv1", SHOUT, json!({"body": "back"})),
    )
    .await;
    let inbound = timeout(WAIT, sub.events.recv()).await.unwrap().unwrap();
    assert_eq!(inbound.payload["body"], "back");

    socket.disconnect().await;
}

#[tokio::test]
#[tracing_test::traced_test]
async fn pushes_to_a_rejected_topic_are_capped_and_expire() {
    let (addr, mut connections) = spawn_server().await;
    let mut config = fast_config(addr);
    config.max_buffered_pushes = 5;
    let socket = PhoenixSocket::connect(config).unwrap();
    let _sub = socket
        .subscribe("conversation:conv1", &[SHOUT])
        .await
        .unwrap();

    let (_, mut ws) = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let server = tokio::spawn(async move {
        loop {
            let frame = next_frame(&mut ws).await;
            if frame.event == PHX_JOIN {
                reply(&mut ws, &frame, "error", json!({"reason": "unauthorized"})).await;
            }
            if seen_tx.send(frame.event).is_err() {
                break;
            }
        }
    });

    for n in 0..5 {
        socket
            .push("conversation:conv1", SHOUT, json!({"body": n}))
            .await
            .unwrap();
    }
    let err = socket
        .push("conversation:conv1", SHOUT, json!({"body": "overflow"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::BufferFull(_)));

    // Two join retries later every buffered push has outlived the timeout.
    let mut joins = 0;
    while joins < 3 {
        let event = timeout(WAIT, seen.recv()).await.unwrap().unwrap();
        assert_eq!(event, PHX_JOIN, "nothing but joins reaches the server");
        joins += 1;
    }
    assert!(logs_contain("dropping buffered pushes older than the join timeout"));

    socket
        .push("conversation:conv1", SHOUT, json!({"body": "after expiry"}))
        .await
        .unwrap();

    socket.disconnect().await;
    server.abort();
}

#[tokio::test]
#[tracing_test::traced_test]
async fn connect_params_are_not_logged() {
    let (addr, mut connections) = spawn_server().await;
    let config = fast_config(addr).with_param("token", "super-secret-token");
    let socket = PhoenixSocket::connect(config).unwrap();

    let (uri, _ws) = timeout(WAIT, connections.recv()).await.unwrap().unwrap();
    assert!(uri.contains("token=super-secret-token"));
    socket.disconnect().await;

    logs_assert(|lines: &[&str]| {
        if !lines.iter().any(|line| line.contains("realtime socket connecting")) {
            return Err("missing connect log".into());
        }
        if lines.iter().any(|line| line.contains("super-secret-token")) {
            return Err("connect params leaked into logs".into());
        }
        Ok(())
    });
}
