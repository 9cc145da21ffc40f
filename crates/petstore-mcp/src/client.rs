//! Lazily connecting transport to the Petstore tool server.
//!
//! [`McpTransport`] owns at most one live [`McpSession`]. The first
//! invocation connects; a session that has been lost is replaced on the
//! next use.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use petstore_core::{InvocationResult, ServerConfig, ToolDescriptor};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::invoker::Invoker;
use crate::session::McpSession;
use crate::transport::StdioProcess;

/// Server name used in logs.
const SERVER_NAME: &str = "petstore";

/// Opens new sessions for a transport.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open and initialize a new session.
    async fn open(&self) -> Result<Arc<McpSession>, TransportError>;
}

/// Spawns the configured server command and talks to it over stdio.
pub struct StdioConnector {
    config: ServerConfig,
}

impl StdioConnector {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for StdioConnector {
    async fn open(&self) -> Result<Arc<McpSession>, TransportError> {
        info!(
            server = SERVER_NAME,
            command = %self.config.command,
            "Connecting to MCP server"
        );

        let (process, writer, reader) = StdioProcess::spawn(
            &self.config.command,
            &self.config.args,
            &self.config.env,
            self.config.cwd.as_deref(),
        )?;

        McpSession::establish(
            SERVER_NAME,
            Box::new(writer),
            Box::new(reader),
            Some(process),
            self.config.timeout(),
        )
        .await
    }
}

/// Transport that connects on first use and reconnects after a loss.
pub struct McpTransport {
    connector: Box<dyn Connector>,
    session: Mutex<Option<Arc<McpSession>>>,
}

impl McpTransport {
    /// Transport for a server spawned from `config`.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_connector(StdioConnector::new(config))
    }

    /// Transport using a custom way of opening sessions.
    pub fn with_connector(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            session: Mutex::new(None),
        }
    }

    /// Return the live session, opening one if needed.
    ///
    /// A second call while a session is live returns the same session.
    pub async fn connect(&self) -> Result<Arc<McpSession>, TransportError> {
        let mut slot = self.session.lock().await;

        if let Some(session) = slot.as_ref() {
            if session.is_ready() {
                return Ok(Arc::clone(session));
            }
            debug!(
                session = %session.id(),
                state = %session.state(),
                "Replacing session that is no longer ready"
            );
        }

        if let Some(stale) = slot.take() {
            stale.close().await;
        }

        let session = self.connector.open().await?;
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Close the live session, if any. Idempotent.
    pub async fn disconnect(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.close().await;
        }
    }

    /// Whether a ready session is currently held.
    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.is_ready())
            .unwrap_or(false)
    }

    /// Tools discovered on the server, connecting if needed.
    pub async fn tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        Ok(self.connect().await?.tools())
    }

    /// Run `f` against a connected session and disconnect afterwards.
    ///
    /// Teardown also happens when `f` panics; the panic is then resumed.
    pub async fn scoped<F, Fut, T>(&self, f: F) -> Result<T, TransportError>
    where
        F: FnOnce(Arc<McpSession>) -> Fut,
        Fut: Future<Output = T>,
    {
        let session = self.connect().await?;
        let outcome = AssertUnwindSafe(f(session)).catch_unwind().await;
        self.disconnect().await;

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[async_trait]
impl Invoker for McpTransport {
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<InvocationResult, TransportError> {
        let session = self.connect().await?;
        session.invoke(tool, arguments).await
    }
}
