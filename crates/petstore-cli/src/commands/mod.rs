//! CLI command implementations.

pub mod config;
pub mod prompt;
pub mod sampling;
pub mod task;
pub mod tools;

use anyhow::Context;
use petstore_core::ClientConfig;
use serde::Serialize;
use serde_json::Value;

/// The configuration, if it is fit to start a server with.
///
/// Error-level issues fail; warnings are logged.
pub fn checked_config(config: &ClientConfig) -> anyhow::Result<&ClientConfig> {
    config.ensure_valid()?;
    Ok(config)
}

/// Split `key=value`, reading the value as JSON and falling back to a plain string.
pub fn parse_key_value(pair: &str) -> anyhow::Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got '{}'", pair))?;

    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("empty key in '{}'", pair);
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
