//! Site command handler

use anyhow::Result;

use vellum_core::{ensure_site, Config, GateOutcome};

use super::{open_client, Context};

/// Make sure a site exists, offering to create it
///
/// Without a slug the configured default site is used.
pub async fn ensure(ctx: &Context, config: &Config, slug: Option<&str>) -> Result<()> {
    let slug = config.target_site(slug)?;
    let client = open_client(config)?;
    let prompt = ctx.prompt();

    match ensure_site(&client, &prompt, || config.credentials(), &slug).await? {
        GateOutcome::Proceed { created: true } => {
            ctx.output.success(&format!("Created site '{}'", slug))
        }
        GateOutcome::Proceed { created: false } => {
            ctx.output.success(&format!("Site '{}' exists", slug))
        }
        GateOutcome::Cancelled => ctx.output.message(&format!(
            "Site '{}' was not created. Pushes to it will ask again.",
            slug
        )),
    }
    Ok(())
}
