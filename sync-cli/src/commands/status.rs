//! Status command - show settings and store contents.

use anyhow::Result;

use crate::config::Workspace;

/// Print the data directory, settings source and stored keys.
pub fn run(workspace: &Workspace) -> Result<()> {
    let settings = &workspace.settings;

    println!("ressync status");
    println!("==============");
    println!();
    println!("Data dir:  {}", workspace.data_dir.display());
    match &workspace.settings_path {
        Some(path) => println!("Settings:  {}", path.display()),
        None => println!("Settings:  (defaults)"),
    }
    println!("Peer:      {}", settings.connection.address);
    println!("Policy:    {:?}", settings.resource.update_policy);
    println!();

    let keys = workspace.store().keys()?;
    println!("Store:     {} ({} keys)", workspace.store_path.display(), keys.len());
    for key in keys {
        println!("  {}", key);
    }

    Ok(())
}
