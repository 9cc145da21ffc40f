//! Session and transport tests against an in-process fake tool server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use petstore_mcp::{
    ConnectionState, Connector, FrameReader, FrameWriter, Invoker, LineReader, LineWriter,
    McpSession, McpTransport, TransportError,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, WriteHalf};
use tokio::sync::Mutex;

type ServerWriter = Arc<Mutex<WriteHalf<DuplexStream>>>;

async fn write_line<W: AsyncWrite + Unpin>(writer: &Mutex<W>, message: Value) {
    let mut writer = writer.lock().await;
    let _ = writer.write_all(format!("{}\n", message).as_bytes()).await;
    let _ = writer.flush().await;
}

async fn reply(writer: &ServerWriter, id: Value, result: Value) {
    write_line(writer, json!({"jsonrpc": "2.0", "id": id, "result": result})).await;
}

fn text(body: impl Into<String>) -> Value {
    json!([{"type": "text", "text": body.into()}])
}

fn first_page() -> Value {
    json!({
        "tools": [{
            "name": "get_pet_by_id",
            "description": "Find pet by ID",
            "inputSchema": {
                "type": "object",
                "properties": {"pet_id": {"type": "integer"}},
                "required": ["pet_id"]
            }
        }],
        "nextCursor": "page-2"
    })
}

fn second_page() -> Value {
    let tool = |name: &str| json!({"name": name, "inputSchema": {"type": "object", "properties": {}}});
    json!({
        "tools": [
            tool("slow_echo"),
            tool("never_reply"),
            tool("hang_up"),
            tool("failing"),
            tool("ping_me"),
            tool("noisy"),
        ]
    })
}

/// A minimal MCP server speaking over one end of a duplex pipe.
///
/// `calls` counts every `tools/call` request it receives.
async fn serve(stream: DuplexStream, calls: Arc<AtomicUsize>) {
    let (read, write) = tokio::io::split(stream);
    let writer: ServerWriter = Arc::new(Mutex::new(write));
    let mut lines = BufReader::new(read).lines();
    let mut waiting_for_pong: Option<Value> = None;

    while let Ok(Some(line)) = lines.next_line().await {
        let message: Value = serde_json::from_str(&line).unwrap();
        let Some(id) = message.get("id").cloned() else {
            continue; // notification
        };

        let method = message["method"].as_str().unwrap_or_default();
        if method.is_empty() {
            // Client answering our ping
            if id == json!("srv-1") && message.get("result").is_some() {
                if let Some(call_id) = waiting_for_pong.take() {
                    reply(&writer, call_id, json!({"content": text("pong received")})).await;
                }
            }
            continue;
        }

        match method {
            "initialize" => {
                reply(
                    &writer,
                    id,
                    json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "fake-petstore", "version": "0.0.1"}
                    }),
                )
                .await
            }
            "tools/list" => {
                let page = if message["params"]["cursor"].is_null() {
                    first_page()
                } else {
                    second_page()
                };
                reply(&writer, id, page).await
            }
            "tools/call" => {
                calls.fetch_add(1, Ordering::SeqCst);
                let name = message["params"]["name"].as_str().unwrap_or_default();
                let arguments = message["params"]["arguments"].clone();
                match name {
                    "get_pet_by_id" => {
                        let pet = json!({"id": arguments["pet_id"], "name": "Rex"});
                        reply(&writer, id, json!({"content": text(format!("Pet details: {}", pet))}))
                            .await
                    }
                    "slow_echo" => {
                        let writer = Arc::clone(&writer);
                        tokio::spawn(async move {
                            let delay = arguments["delay_ms"].as_u64().unwrap_or(0);
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                            reply(
                                &writer,
                                id,
                                json!({"content": text("echo"), "structuredContent": arguments}),
                            )
                            .await;
                        });
                    }
                    "never_reply" => {}
                    "hang_up" => {
                        let _ = writer.lock().await.shutdown().await;
                        return;
                    }
                    "failing" => {
                        reply(
                            &writer,
                            id,
                            json!({"content": text("Error getting pet: HTTP 404"), "isError": true}),
                        )
                        .await
                    }
                    "noisy" => {
                        {
                            let mut raw = writer.lock().await;
                            let _ = raw.write_all(b"\xff\xfe binary log line\n").await;
                            let _ = raw.flush().await;
                        }
                        reply(&writer, id, json!({"content": text("still here")})).await
                    }
                    "ping_me" => {
                        waiting_for_pong = Some(id);
                        write_line(&writer, json!({"jsonrpc": "2.0", "id": "srv-1", "method": "ping"}))
                            .await;
                    }
                    _ => {
                        write_line(
                            &writer,
                            json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Unknown tool"}}),
                        )
                        .await
                    }
                }
            }
            _ => {
                write_line(
                    &writer,
                    json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method not found"}}),
                )
                .await
            }
        }
    }
}

fn channel() -> (Box<dyn FrameWriter>, Box<dyn FrameReader>, Arc<AtomicUsize>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let calls = Arc::new(AtomicUsize::new(0));
    tokio::spawn(serve(server, Arc::clone(&calls)));

    let (read, write) = tokio::io::split(client);
    (
        Box::new(LineWriter::new(write)),
        Box::new(LineReader::new(BufReader::new(read))),
        calls,
    )
}

async fn open_session(timeout: Duration) -> (Arc<McpSession>, Arc<AtomicUsize>) {
    let (writer, reader, calls) = channel();
    let session = McpSession::establish("fake", writer, reader, None, timeout)
        .await
        .expect("handshake should succeed");
    (session, calls)
}

#[tokio::test]
async fn test_handshake_discovers_all_pages() {
    let (session, calls) = open_session(Duration::from_secs(5)).await;

    assert!(session.is_ready());
    assert_eq!(session.server_info().unwrap().name, "fake-petstore");
    assert!(session.capabilities().unwrap().tools.is_some());

    let names: Vec<String> = session.tools().into_iter().map(|t| t.name).collect();
    assert_eq!(
        names,
        vec!["failing", "get_pet_by_id", "hang_up", "never_reply", "noisy", "ping_me", "slow_echo"]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invoke_extracts_payload_from_text() {
    let (session, calls) = open_session(Duration::from_secs(5)).await;

    let result = session.invoke("get_pet_by_id", json!({"pet_id": 7})).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.payload(), &json!({"id": 7, "name": "Rex"}));
    assert!(result.summary().starts_with("Pet details:"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_tool_is_rejected_before_sending() {
    let (session, calls) = open_session(Duration::from_secs(5)).await;

    let result = session.invoke("launch_rocket", json!({})).await;
    assert!(matches!(result, Err(TransportError::ProtocolViolation(_))));

    let result = session.invoke("get_pet_by_id", json!({})).await;
    assert!(matches!(result, Err(TransportError::ProtocolViolation(m)) if m.contains("pet_id")));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn test_concurrent_calls_match_out_of_order_responses() {
    let (session, calls) = open_session(Duration::from_secs(5)).await;

    let slow = session.invoke("slow_echo", json!({"tag": "slow", "delay_ms": 150}));
    let fast = session.invoke("slow_echo", json!({"tag": "fast", "delay_ms": 0}));
    let (slow, fast) = tokio::join!(slow, fast);

    assert_eq!(slow.unwrap().payload()["tag"], "slow");
    assert_eq!(fast.unwrap().payload()["tag"], "fast");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn test_non_utf8_output_does_not_drop_session() {
    let (session, calls) = open_session(Duration::from_secs(5)).await;

    let result = session.invoke("noisy", json!({})).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.summary(), "still here");
    assert!(session.is_ready());

    let result = session.invoke("get_pet_by_id", json!({"pet_id": 3})).await.unwrap();
    assert_eq!(result.payload()["id"], 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_tool_error_is_failed_result() {
    let (session, _calls) = open_session(Duration::from_secs(5)).await;

    let result = session.invoke("failing", json!({})).await.unwrap();
    assert!(!result.is_success());
    assert_eq!(result.error().unwrap().code, "tool_error");
}

#[tokio::test]
async fn test_timeout_clears_pending_entry() {
    let (session, calls) = open_session(Duration::from_millis(200)).await;

    let result = session.invoke("never_reply", json!({})).await;
    assert!(matches!(result, Err(TransportError::Timeout(_))));
    assert_eq!(session.pending_requests(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The session stays usable
    assert!(session.invoke("get_pet_by_id", json!({"pet_id": 1})).await.is_ok());
}

#[tokio::test]
async fn test_abandoned_call_clears_pending_entry() {
    let (session, _calls) = open_session(Duration::from_secs(30)).await;

    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), session.invoke("never_reply", json!({}))).await;
    assert!(abandoned.is_err());
    assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn test_server_ping_is_answered() {
    let (session, _calls) = open_session(Duration::from_secs(5)).await;

    let result = session.invoke("ping_me", json!({})).await.unwrap();
    assert_eq!(result.summary(), "pong received");
}

#[tokio::test]
async fn test_eof_fails_pending_and_later_calls() {
    let (session, _calls) = open_session(Duration::from_secs(30)).await;

    let waiting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.invoke("never_reply", json!({})).await })
    };
    while session.pending_requests() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let result = session.invoke("hang_up", json!({})).await;
    assert!(matches!(result, Err(TransportError::ConnectionLost(_))));
    assert!(matches!(waiting.await.unwrap(), Err(TransportError::ConnectionLost(_))));

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.pending_requests(), 0);
    assert!(matches!(
        session.invoke("get_pet_by_id", json!({"pet_id": 1})).await,
        Err(TransportError::ConnectionLost(_))
    ));
}

#[tokio::test]
async fn test_rejected_handshake_is_an_error() {
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let (read, write) = tokio::io::split(server);
        let writer = Mutex::new(write);
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let message: Value = serde_json::from_str(&line).unwrap();
            write_line(
                &writer,
                json!({"jsonrpc": "2.0", "id": message["id"], "error": {"code": -32602, "message": "Unsupported protocol version"}}),
            )
            .await;
        }
    });

    let (read, write) = tokio::io::split(client);
    let result = McpSession::establish(
        "fake",
        Box::new(LineWriter::new(write)),
        Box::new(LineReader::new(BufReader::new(read))),
        None,
        Duration::from_secs(5),
    )
    .await;

    assert!(matches!(result, Err(TransportError::RemoteError { code: -32602, .. })));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (session, _calls) = open_session(Duration::from_secs(5)).await;
    session.close().await;
    session.close().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.invoke("get_pet_by_id", json!({"pet_id": 1})).await.is_err());
}

/// Opens sessions against fresh fake servers and counts them.
#[derive(Default)]
struct FakeConnector {
    opened: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self) -> Result<Arc<McpSession>, TransportError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (writer, reader, _calls) = channel();
        McpSession::establish("fake", writer, reader, None, Duration::from_secs(5)).await
    }
}

#[tokio::test]
async fn test_transport_reuses_live_session() {
    let connector = FakeConnector::default();
    let opened = Arc::clone(&connector.opened);
    let transport = McpTransport::with_connector(connector);

    let first = transport.connect().await.unwrap();
    let second = transport.connect().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    assert_eq!(transport.tools().await.unwrap().len(), 7);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transport_replaces_lost_session() {
    let connector = FakeConnector::default();
    let opened = Arc::clone(&connector.opened);
    let transport = McpTransport::with_connector(connector);

    assert!(transport.invoke("hang_up", json!({})).await.is_err());
    assert!(!transport.is_connected().await);

    let result = transport.invoke("get_pet_by_id", json!({"pet_id": 3})).await.unwrap();
    assert_eq!(result.payload()["id"], 3);
    assert_eq!(opened.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_scoped_disconnects_afterwards() {
    let transport = McpTransport::with_connector(FakeConnector::default());

    let payload = transport
        .scoped(|session| async move {
            session
                .invoke("get_pet_by_id", json!({"pet_id": 5}))
                .await
                .map(|r| r.into_payload())
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(payload["id"], 5);
    assert!(!transport.is_connected().await);
}
