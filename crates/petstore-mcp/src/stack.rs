//! Assemble the invoker stack described by a [`ClientConfig`].

use std::sync::Arc;

use petstore_core::ClientConfig;
use tracing::debug;

use crate::cache::Caching;
use crate::client::McpTransport;
use crate::invoker::Invoker;
use crate::retry::{RetryPolicy, Retrying};

/// The assembled stack plus a handle on its transport for lifecycle control.
pub struct InvokerStack {
    pub invoker: Arc<dyn Invoker>,
    pub transport: Arc<McpTransport>,
}

/// Build Retry → Cache → Transport, skipping the cache when it is disabled.
pub fn build(config: &ClientConfig) -> InvokerStack {
    build_with(config, McpTransport::new(config.server.clone()))
}

/// Like [`build`], around an existing transport.
pub fn build_with(config: &ClientConfig, transport: McpTransport) -> InvokerStack {
    let transport = Arc::new(transport);
    let policy = RetryPolicy::from_config(config);

    debug!(
        retry_attempts = policy.max_attempts,
        caching = config.enable_caching,
        cache_ttl_secs = config.cache_ttl,
        "Building invoker stack"
    );

    let invoker: Arc<dyn Invoker> = if config.enable_caching {
        Arc::new(Retrying::new(
            Caching::from_config(Arc::clone(&transport), config),
            policy,
        ))
    } else {
        Arc::new(Retrying::new(Arc::clone(&transport), policy))
    };

    InvokerStack { invoker, transport }
}
