//! Configuration management commands.

use petstore_core::config::IssueSeverity;

use crate::{AppContext, ConfigAction};

pub fn handle(action: ConfigAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(&ctx.config)?);
        }
        ConfigAction::Validate => {
            let result = ctx.config.validate();
            for issue in &result.issues {
                let label = match issue.severity {
                    IssueSeverity::Error => "error",
                    IssueSeverity::Warning => "warning",
                };
                println!("{}: {}: {}", label, issue.field, issue.message);
            }

            if !result.is_ok() {
                anyhow::bail!("Configuration is invalid");
            }
            println!("Configuration is valid");
        }
    }
    Ok(())
}
