//! List the server's tools.

use petstore_mcp::McpTransport;
use serde_json::json;

use super::{checked_config, print_json};
use crate::AppContext;

pub async fn run(ctx: &AppContext) -> anyhow::Result<()> {
    let config = checked_config(&ctx.config)?;
    let transport = McpTransport::new(config.server.clone());
    let tools = transport.tools().await;
    transport.disconnect().await;

    let listing: Vec<_> = tools?
        .into_iter()
        .map(|tool| {
            let required: Vec<String> = tool
                .fields()
                .into_iter()
                .filter(|f| f.required)
                .map(|f| f.name)
                .collect();
            json!({
                "name": tool.name,
                "description": tool.description,
                "required": required,
            })
        })
        .collect();

    print_json(&listing)
}
