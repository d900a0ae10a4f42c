//! The WebSocket connector against a local server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use ressync_client::{ConnectionOptions, ConnectionSync, Pipeline, Resource, WsConnector};
use ressync_types::{Message, Verb};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as Frame;

const WAIT: Duration = Duration::from_secs(5);

/// Encode a `got` frame the way a peer running the JSON pipeline would.
async fn got_frame(name: &str, type_name: &str, value: Value) -> String {
    let source = Resource::new(Vec::new(), name, type_name);
    let data = Pipeline::json()
        .preprocess(&source, Some(value))
        .await
        .unwrap()
        .unwrap();
    Message::new(Verb::Got, name)
        .with_type(type_name)
        .with_data(data)
        .to_value()
        .unwrap()
        .to_string()
}

/// Queued `get` goes out on open; the server's `got` lands in the resource;
/// the server hanging up schedules a reconnect.
#[tokio::test]
async fn get_reply_and_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}", listener.local_addr().unwrap());

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let first = socket.next().await.unwrap().unwrap();
        let text = first.into_text().unwrap();
        let request = Message::from_value(serde_json::from_str(&text).unwrap()).unwrap();
        seen_tx.send(request).unwrap();

        let reply = got_frame("todo", "note", json!({"title": "from server"})).await;
        socket.send(Frame::Text(reply)).await.unwrap();
        socket.close(None).await.unwrap();
    });

    let link = ConnectionSync::new(
        "ws",
        Pipeline::json(),
        Arc::new(WsConnector::new(address)),
        ConnectionOptions {
            reconnect_timeout: Duration::from_secs(600),
            ..Default::default()
        },
    );
    let todo = Resource::new(vec![link.backend()], "todo", "note");
    let (value_tx, mut value_rx) = mpsc::unbounded_channel();
    todo.register(Arc::new(move |v: Option<&Value>| {
        let _ = value_tx.send(v.cloned());
    }));

    todo.query().await.unwrap();
    assert_eq!(link.pending(), 1);

    link.connect().await.unwrap();

    let request = tokio::time::timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
    assert_eq!(request.verb(), Some(Verb::Get));
    assert_eq!(request.name, "todo");
    assert_eq!(request.type_name.as_deref(), Some("note"));

    let value = tokio::time::timeout(WAIT, value_rx.recv()).await.unwrap().unwrap();
    assert_eq!(value, Some(json!({"title": "from server"})));
    assert_eq!(todo.value(), Some(json!({"title": "from server"})));

    server.await.unwrap();
    tokio::time::timeout(WAIT, async {
        while !link.is_reconnecting() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

/// Connecting to nothing fails and schedules a reconnect.
#[tokio::test]
async fn refused_connection_schedules_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let link = ConnectionSync::new(
        "ws",
        Pipeline::json(),
        Arc::new(WsConnector::new(address)),
        ConnectionOptions {
            reconnect_timeout: Duration::from_secs(600),
            ..Default::default()
        },
    );

    assert!(link.connect().await.is_err());
    assert!(link.is_reconnecting());
    assert!(!link.is_connected());
}
