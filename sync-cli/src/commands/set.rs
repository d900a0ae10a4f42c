//! Set command - write a resource to the store.

use anyhow::{Context, Result};
use ressync_client::Resource;

use crate::config::{parse_value, Workspace};

/// Store `raw` as the value of `name`.
pub async fn run(workspace: &Workspace, name: &str, type_name: &str, raw: &str) -> Result<()> {
    let value = parse_value(raw);
    let resource = Resource::builder(name, type_name)
        .sync(workspace.store_backend())
        .policy(workspace.settings.resource.update_policy)
        .build();

    resource
        .update(value)
        .await
        .with_context(|| format!("Failed to write {}", name))?;

    println!("Stored {}", name);
    Ok(())
}
