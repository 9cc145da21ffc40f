//! A live, initialized connection to one tool server.
//!
//! Requests are multiplexed over the single channel: each request gets a
//! correlation id and a slot in the pending-response table, and a background
//! task routes responses back to their slot. The writer lock is held only
//! while a message is being written, never across the wait for a response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use petstore_core::{ErrorDescriptor, InvocationResult, ToolDescriptor};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::invoker::Invoker;
use crate::protocol::{
    CallToolParams, CallToolResult, Implementation, IncomingMessage, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListToolsParams, ListToolsResult, RequestId, ServerCapabilities, MCP_PROTOCOL_VERSION,
};
use crate::transport::{FrameReader, FrameWriter, StdioProcess};

/// Upper bound on discovery pages, in case a server keeps returning cursors.
const MAX_DISCOVERY_PAGES: usize = 64;

/// Connection state for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Channel open, handshake not finished.
    Connected,
    /// Handshake and discovery done; tools may be invoked.
    Ready,
    Closing,
    /// Closed, either explicitly or because the channel was lost.
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Connected => "connected",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Disconnected => "disconnected",
        })
    }
}

type Reply = Result<Value, TransportError>;

/// Requests waiting for a response, keyed by request id.
#[derive(Default)]
struct PendingTable {
    inner: Mutex<PendingInner>,
}

#[derive(Default)]
struct PendingInner {
    /// Set once the channel is gone; no new requests are accepted.
    closed: Option<String>,
    waiters: HashMap<u64, oneshot::Sender<Reply>>,
}

impl PendingTable {
    fn register(&self, id: u64) -> Result<oneshot::Receiver<Reply>, TransportError> {
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.closed {
            return Err(TransportError::connection_lost(reason.clone()));
        }
        let (tx, rx) = oneshot::channel();
        inner.waiters.insert(id, tx);
        Ok(rx)
    }

    fn remove(&self, id: u64) {
        self.inner.lock().waiters.remove(&id);
    }

    fn complete(&self, id: u64, reply: Reply) -> bool {
        let waiter = self.inner.lock().waiters.remove(&id);
        match waiter {
            // The caller may have gone away since; that is fine
            Some(tx) => {
                let _ = tx.send(reply);
                true
            }
            None => false,
        }
    }

    /// Refuse new requests and fail every waiting one.
    fn close(&self, reason: &str) {
        let waiters: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.closed.get_or_insert_with(|| reason.to_string());
            inner.waiters.drain().map(|(_, tx)| tx).collect()
        };
        for tx in waiters {
            let _ = tx.send(Err(TransportError::connection_lost(reason.to_string())));
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

/// Removes a pending slot on every exit path, including cancellation.
struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}

/// State shared between the session and its reader task.
struct Shared {
    server: String,
    writer: tokio::sync::Mutex<Box<dyn FrameWriter>>,
    pending: PendingTable,
    state: RwLock<ConnectionState>,
}

impl Shared {
    async fn send(&self, message: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.send(message).await
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    async fn read_loop(self: Arc<Self>, mut reader: Box<dyn FrameReader>) {
        loop {
            match reader.receive().await {
                Ok(line) => self.dispatch(&line).await,
                Err(e) => {
                    let was_closing = matches!(
                        *self.state.read(),
                        ConnectionState::Closing | ConnectionState::Disconnected
                    );
                    if !was_closing {
                        warn!(server = %self.server, error = %e, "Lost connection to MCP server");
                    }
                    self.set_state(ConnectionState::Disconnected);
                    self.pending.close(&e.to_string());
                    return;
                }
            }
        }
    }

    async fn dispatch(&self, line: &str) {
        let message: IncomingMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(_) => {
                // Not JSON-RPC; servers sometimes log to stdout
                debug!(server = %self.server, line = line, "Skipping non-protocol output");
                return;
            }
        };

        match (message.id, message.method) {
            (Some(id), None) => {
                let reply = match (message.error, message.result) {
                    (Some(error), _) => Err(TransportError::RemoteError {
                        code: error.code,
                        message: error.message,
                        detail: error.data,
                    }),
                    (None, Some(result)) => Ok(result),
                    (None, None) => Err(TransportError::protocol(
                        "response missing both result and error",
                    )),
                };
                let routed = id
                    .as_u64()
                    .map(|n| self.pending.complete(n, reply))
                    .unwrap_or(false);
                if !routed {
                    debug!(server = %self.server, id = %id, "Dropping response with no waiting request");
                }
            }
            (Some(id), Some(method)) => self.answer_server_request(id, &method).await,
            (None, Some(method)) => {
                if method == "notifications/tools/list_changed" {
                    info!(server = %self.server, "Server reported a change to its tool list");
                } else {
                    debug!(server = %self.server, method = %method, "Ignoring notification");
                }
            }
            (None, None) => {
                debug!(server = %self.server, line = line, "Skipping message without id or method");
            }
        }
    }

    async fn answer_server_request(&self, id: RequestId, method: &str) {
        let response = if method == "ping" {
            JsonRpcResponse::success(id, Value::Object(serde_json::Map::new()))
        } else {
            JsonRpcResponse::failure(
                id,
                JsonRpcError::METHOD_NOT_FOUND,
                format!("client does not handle '{}'", method),
            )
        };

        match serde_json::to_string(&response) {
            Ok(json) => {
                if let Err(e) = self.send(&json).await {
                    debug!(server = %self.server, error = %e, "Failed to answer server request");
                }
            }
            Err(e) => debug!(server = %self.server, error = %e, "Failed to encode reply"),
        }
    }
}

/// An initialized session with a tool server.
///
/// Built by [`McpSession::establish`], which performs the handshake and tool
/// discovery before handing the session out. Dropping the session stops its
/// reader task and kills a spawned server process.
pub struct McpSession {
    id: Uuid,
    shared: Arc<Shared>,
    timeout: Duration,
    request_counter: AtomicU64,
    tools: RwLock<HashMap<String, ToolDescriptor>>,
    server_info: RwLock<Option<Implementation>>,
    capabilities: RwLock<Option<ServerCapabilities>>,
    process: tokio::sync::Mutex<Option<StdioProcess>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl McpSession {
    /// Open a session over an already connected channel.
    ///
    /// Performs the initialize handshake and discovers the server's tools.
    /// On any failure the channel is closed (and `process`, if given, is
    /// terminated) before the error is returned.
    pub async fn establish(
        name: impl Into<String>,
        writer: Box<dyn FrameWriter>,
        reader: Box<dyn FrameReader>,
        process: Option<StdioProcess>,
        timeout: Duration,
    ) -> Result<Arc<Self>, TransportError> {
        let shared = Arc::new(Shared {
            server: name.into(),
            writer: tokio::sync::Mutex::new(writer),
            pending: PendingTable::default(),
            state: RwLock::new(ConnectionState::Connected),
        });

        let reader_task = tokio::spawn(Arc::clone(&shared).read_loop(reader));

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            shared,
            timeout,
            request_counter: AtomicU64::new(1),
            tools: RwLock::new(HashMap::new()),
            server_info: RwLock::new(None),
            capabilities: RwLock::new(None),
            process: tokio::sync::Mutex::new(process),
            reader_task: Mutex::new(Some(reader_task)),
        });

        if let Err(e) = session.initialize().await {
            warn!(server = %session.name(), error = %e, "MCP session setup failed");
            session.close().await;
            return Err(e);
        }

        Ok(session)
    }

    /// Session identifier, for logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.shared.server
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Check if the session can invoke tools.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Server information from the handshake.
    pub fn server_info(&self) -> Option<Implementation> {
        self.server_info.read().clone()
    }

    /// Server capabilities from the handshake.
    pub fn capabilities(&self) -> Option<ServerCapabilities> {
        self.capabilities.read().clone()
    }

    /// Discovered tools, sorted by name.
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<ToolDescriptor> = self.tools.read().values().cloned().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Look up one discovered tool.
    pub fn tool(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.read().get(name).cloned()
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    fn next_request_id(&self) -> u64 {
        self.request_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a request and wait for the matching response.
    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R, TransportError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let message = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let rx = self.shared.pending.register(id)?;
        let _guard = PendingGuard {
            table: &self.shared.pending,
            id,
        };

        self.shared.send(&message).await?;

        let value = match tokio::time::timeout(self.timeout, rx).await {
            Err(_) => {
                warn!(server = %self.name(), method = method, id = id, "Request timed out");
                return Err(TransportError::Timeout(self.timeout));
            }
            Ok(Err(_)) => {
                return Err(TransportError::connection_lost(
                    "session dropped before the response arrived",
                ))
            }
            Ok(Ok(reply)) => reply?,
        };

        serde_json::from_value(value).map_err(|e| {
            TransportError::protocol(format!("malformed '{}' result: {}", method, e))
        })
    }

    /// Send a notification (no response expected).
    async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<(), TransportError>
    where
        P: Serialize,
    {
        let message = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.shared.send(&message).await
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        debug!(server = %self.name(), session = %self.id, "Initializing MCP session");

        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;

        if result.protocol_version != MCP_PROTOCOL_VERSION {
            warn!(
                server = %self.name(),
                offered = MCP_PROTOCOL_VERSION,
                accepted = %result.protocol_version,
                "Server negotiated a different protocol version"
            );
        }
        if result.capabilities.tools.is_none() {
            warn!(server = %self.name(), "Server did not advertise the tools capability");
        }

        *self.capabilities.write() = Some(result.capabilities);
        *self.server_info.write() = Some(result.server_info.clone());

        self.notify::<()>("notifications/initialized", None).await?;

        let tool_count = self.refresh_tools().await?;
        self.shared.set_state(ConnectionState::Ready);

        info!(
            server = %self.name(),
            session = %self.id,
            server_name = %result.server_info.name,
            protocol_version = %result.protocol_version,
            tool_count = tool_count,
            "MCP session ready"
        );

        Ok(())
    }

    /// Re-run tool discovery, replacing the known tool set.
    ///
    /// Returns the number of tools discovered.
    pub async fn refresh_tools(&self) -> Result<usize, TransportError> {
        let mut discovered = HashMap::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_DISCOVERY_PAGES {
            let page: ListToolsResult = self
                .request("tools/list", Some(ListToolsParams { cursor: cursor.take() }))
                .await?;

            for tool in page.tools {
                discovered.insert(tool.name.clone(), tool);
            }

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        if cursor.is_some() {
            return Err(TransportError::protocol(format!(
                "tool discovery did not finish within {} pages",
                MAX_DISCOVERY_PAGES
            )));
        }

        let count = discovered.len();
        debug!(server = %self.name(), tool_count = count, "Discovered tools");
        *self.tools.write() = discovered;
        Ok(count)
    }

    /// Close the session.
    ///
    /// Idempotent. Fails every request still waiting for a response.
    pub async fn close(&self) {
        if self.state() == ConnectionState::Disconnected && self.process.lock().await.is_none() {
            return;
        }

        self.shared.set_state(ConnectionState::Closing);
        debug!(server = %self.name(), session = %self.id, "Closing MCP session");

        if let Err(e) = self.shared.writer.lock().await.close().await {
            debug!(server = %self.name(), error = %e, "Channel already closed");
        }

        if let Some(mut process) = self.process.lock().await.take() {
            process.terminate().await;
        }

        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }

        self.shared.pending.close("session closed");
        self.shared.set_state(ConnectionState::Disconnected);

        info!(server = %self.name(), session = %self.id, "MCP session closed");
    }
}

impl Drop for McpSession {
    fn drop(&mut self) {
        // kill_on_drop on the child process handles the server itself
        if let Some(task) = self.reader_task.get_mut().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Invoker for McpSession {
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<InvocationResult, TransportError> {
        let state = self.state();
        if state != ConnectionState::Ready {
            return Err(TransportError::connection_lost(format!(
                "session is {}, not ready",
                state
            )));
        }

        let descriptor = self
            .tool(tool)
            .ok_or_else(|| TransportError::protocol(format!("unknown tool '{}'", tool)))?;

        let arguments = if arguments.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            arguments
        };

        descriptor
            .check_arguments(&arguments)
            .map_err(TransportError::ProtocolViolation)?;

        debug!(server = %self.name(), tool = tool, "Calling tool");

        let result: CallToolResult = self
            .request(
                "tools/call",
                Some(CallToolParams {
                    name: tool.to_string(),
                    arguments,
                }),
            )
            .await?;

        if result.is_error {
            warn!(server = %self.name(), tool = tool, "Tool returned error");
        }

        Ok(to_invocation_result(tool, result))
    }
}

/// Map a raw tool result onto an [`InvocationResult`].
fn to_invocation_result(tool: &str, result: CallToolResult) -> InvocationResult {
    let summary = result.text();

    if result.is_error {
        let descriptor = ErrorDescriptor::new("tool_error", summary.clone())
            .with_detail(serde_json::json!({ "tool": tool }));
        return InvocationResult::failure(descriptor, summary);
    }

    let payload = result
        .structured_content
        .or_else(|| embedded_json(&summary))
        .unwrap_or(Value::Null);

    InvocationResult::success(payload, summary)
}

/// Extract the first JSON object or array embedded in tool output text,
/// e.g. `Pets found: [{"id": 1}]`.
fn embedded_json(text: &str) -> Option<Value> {
    let start = text.find(|c| c == '{' || c == '[')?;
    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
}
