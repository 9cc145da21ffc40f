//! The `invoke`-shaped interface every layer of the client stack implements.

use std::sync::Arc;

use async_trait::async_trait;
use petstore_core::InvocationResult;
use serde_json::Value;

use crate::error::TransportError;

/// Anything that can invoke a named tool with JSON arguments.
///
/// Implemented by the session, the lazily-connecting transport, and the
/// retry and cache decorators wrapped around them.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invoke `tool` with `arguments` and wait for its result.
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<InvocationResult, TransportError>;
}

#[async_trait]
impl<I> Invoker for Arc<I>
where
    I: Invoker + ?Sized,
{
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<InvocationResult, TransportError> {
        (**self).invoke(tool, arguments).await
    }
}

#[async_trait]
impl<I> Invoker for Box<I>
where
    I: Invoker + ?Sized,
{
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<InvocationResult, TransportError> {
        (**self).invoke(tool, arguments).await
    }
}
