//! # petstore-mcp
//!
//! MCP (Model Context Protocol) client for the Petstore tool server.
//!
//! This crate provides:
//! - JSON-RPC/MCP protocol types
//! - Line-framed stdio channel to a spawned server process
//! - Sessions with handshake, tool discovery and multiplexed calls
//! - A lazily connecting transport
//! - Retry and cache decorators over the [`Invoker`] seam

pub mod cache;
pub mod client;
pub mod error;
pub mod invoker;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod stack;
pub mod transport;

pub use cache::{Caching, ResultCache, DEFAULT_CACHEABLE_TOOLS};
pub use client::{Connector, McpTransport, StdioConnector};
pub use error::{TransportError, TransportErrorKind};
pub use invoker::Invoker;
pub use retry::{RetryPolicy, Retrying};
pub use session::{ConnectionState, McpSession};
pub use stack::{build, InvokerStack};
pub use transport::{FrameReader, FrameWriter, LineReader, LineWriter, StdioProcess};
