//! Run an agent task.

use std::sync::Arc;

use serde_json::{Map, Value};

use petstore_agent::{PetstoreClient, TaskRouter};

use super::{checked_config, parse_key_value, print_json};
use crate::AppContext;

pub async fn run(
    ctx: &AppContext,
    name: &str,
    args: &[String],
    json: Option<&str>,
) -> anyhow::Result<()> {
    let config = checked_config(&ctx.config)?;

    let mut kwargs = match json {
        Some(text) => match serde_json::from_str(text)? {
            Value::Object(map) => map,
            _ => anyhow::bail!("--json must be a JSON object"),
        },
        None => Map::new(),
    };

    for pair in args {
        let (key, value) = parse_key_value(pair)?;
        kwargs.insert(key, value);
    }

    let stack = petstore_mcp::build(config);
    let router = TaskRouter::with_defaults(PetstoreClient::from_shared(Arc::clone(&stack.invoker)));

    let response = router.execute(name, kwargs).await;
    stack.transport.disconnect().await;

    print_json(&response)?;

    if !response.success {
        anyhow::bail!("Task '{}' failed: {}", name, response.message);
    }
    Ok(())
}
