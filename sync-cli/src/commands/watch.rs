//! Watch command - follow a resource on a WebSocket peer.
//!
//! The resource is bound to the peer link first and the local store
//! second. Requests from the peer are answered from the local store.

use anyhow::{Context, Result};
use ressync_client::{ConnectionSync, Pipeline, Resource, WsConnector};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Workspace;

/// Print every value `name` takes until interrupted or `count` values are seen.
pub async fn run(
    workspace: &Workspace,
    name: &str,
    type_name: &str,
    url: Option<String>,
    count: Option<usize>,
) -> Result<()> {
    let settings = &workspace.settings;
    let address = url.unwrap_or_else(|| settings.connection.address.clone());
    let store = workspace.store_backend();

    let link = ConnectionSync::new(
        settings.connection.name.clone(),
        Pipeline::json().with_relay(vec![Arc::clone(&store)]),
        Arc::new(WsConnector::new(address.clone())),
        settings.connection.options(),
    );
    let resource = Resource::builder(name, type_name)
        .sync(link.backend())
        .sync(store)
        .policy(settings.resource.update_policy)
        .build();

    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    resource.register(Arc::new(move |value: Option<&Value>| {
        if let Some(value) = value {
            let _ = tx.send(value.clone());
        }
    }));

    if let Err(err) = link.connect().await {
        tracing::warn!("Could not reach {} yet: {}", address, err);
    }
    resource
        .query()
        .await
        .with_context(|| format!("Failed to query {}", name))?;

    tracing::info!("Watching {} on {} (Ctrl-C to stop)", name, address);
    let mut seen = 0usize;
    loop {
        tokio::select! {
            value = rx.recv() => {
                let Some(value) = value else { break };
                println!("{}", value);
                seen += 1;
                if count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
