//! Render a prompt template.

use std::collections::HashMap;

use petstore_core::PromptRegistry;

use super::{parse_key_value, print_json};

pub fn run(name: &str, vars: &[String]) -> anyhow::Result<()> {
    let vars = vars
        .iter()
        .map(|pair| parse_key_value(pair))
        .collect::<anyhow::Result<HashMap<_, _>>>()?;

    let registry = PromptRegistry::with_defaults();
    let rendered = registry.get(name, &vars).map_err(|e| {
        anyhow::anyhow!("{} (templates: {})", e, registry.names().join(", "))
    })?;

    print_json(&rendered)
}
