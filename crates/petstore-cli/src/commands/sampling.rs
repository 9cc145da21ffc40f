//! Show sampling presets.

use petstore_core::SamplingRegistry;

use super::print_json;

pub fn run(preset: Option<&str>) -> anyhow::Result<()> {
    let registry = SamplingRegistry::with_defaults();

    match preset {
        Some(name) => print_json(registry.get(name)?),
        None => print_json(&registry.names()),
    }
}
