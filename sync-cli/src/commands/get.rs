//! Get command - print a stored resource.

use anyhow::{Context, Result};
use ressync_client::Resource;

use crate::config::Workspace;

/// Print the value of `name` as JSON, or `null` if it has none.
pub async fn run(workspace: &Workspace, name: &str, type_name: &str) -> Result<()> {
    let resource = Resource::builder(name, type_name)
        .sync(workspace.store_backend())
        .policy(workspace.settings.resource.update_policy)
        .build();

    let value = resource
        .query_primary()
        .await
        .with_context(|| format!("Failed to read {}", name))?;

    match value {
        Some(value) => println!("{}", value),
        None => println!("null"),
    }
    Ok(())
}
