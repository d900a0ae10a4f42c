//! List commands - maintain a dict of resource keys.

use anyhow::{Context, Result};
use ressync_client::{Children, Dict};

use crate::config::Workspace;

/// Type recorded for list resources.
const LIST_TYPE: &str = "list";

fn open(workspace: &Workspace, name: &str) -> Dict {
    Dict::new(vec![workspace.store_backend()], name, LIST_TYPE)
}

/// Append `key` to the list.
pub async fn add(workspace: &Workspace, name: &str, key: &str) -> Result<()> {
    let dict = open(workspace, name);
    dict.query_primary()
        .await
        .with_context(|| format!("Failed to read list {}", name))?;
    let children = dict
        .add(key, None)
        .await
        .with_context(|| format!("Failed to add {} to {}", key, name))?;
    println!("{} now has {} entries", name, children.len());
    Ok(())
}

/// Remove `key` from the list.
pub async fn remove(workspace: &Workspace, name: &str, key: &str) -> Result<()> {
    let dict = open(workspace, name);
    dict.query_primary()
        .await
        .with_context(|| format!("Failed to read list {}", name))?;
    if !dict.contains(key) {
        println!("{} is not in {}", key, name);
        return Ok(());
    }
    let children = dict
        .remove(key)
        .await
        .with_context(|| format!("Failed to remove {} from {}", key, name))?;
    println!("{} now has {} entries", name, children.len());
    Ok(())
}

/// Print every key with its value.
pub async fn show(workspace: &Workspace, name: &str) -> Result<()> {
    let dict = open(workspace, name);
    let children = dict
        .query_primary()
        .await
        .with_context(|| format!("Failed to read list {}", name))?;
    print_children(name, &children);
    Ok(())
}

fn print_children(name: &str, children: &Children) {
    if children.is_empty() {
        println!("{} is empty", name);
        return;
    }
    for (key, child) in children {
        match child.value() {
            Some(value) => println!("{}\t{}", key, value),
            None => println!("{}\tnull", key),
        }
    }
}
