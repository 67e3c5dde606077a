//! Hash command handler

use std::path::Path;

use anyhow::Result;

use vellum_core::content_address;

use super::{absolute, open_vault, Context};
use crate::output::OutputFormat;

/// Print the content address a resource is stored under
///
/// Files inside the vault are hashed by their vault-relative path; any
/// other argument is hashed as given.
pub fn hash(ctx: &Context, target: &str) -> Result<()> {
    let vault = open_vault(&ctx.config)?;
    let candidate = absolute(Path::new(target))?;
    let logical_path = if candidate.exists() {
        vault
            .logical_path(&candidate)
            .unwrap_or_else(|_| target.to_string())
    } else {
        target.to_string()
    };
    let digest = content_address(&logical_path);

    match ctx.output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({"path": logical_path, "path_hash": digest})
            );
        }
        OutputFormat::Quiet => println!("{}", digest),
        OutputFormat::Human => println!("{}  {}", digest, logical_path),
    }
    Ok(())
}
