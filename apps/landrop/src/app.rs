//! Wires the running node to the interactive shell and the progress
//! printer.

use std::collections::HashMap;

use anyhow::Context;
use landrop_node::Node;
use landrop_transfer::ProgressEvent;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::shell;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let node = Node::start(config.into_node_config())
        .await
        .context("node startup failed")?;

    let identity = node.identity();
    println!(
        "landrop node '{}' at {}:{} (type 'help' for commands)",
        identity.name, identity.ip, identity.port
    );

    let progress_rx = node
        .take_progress()
        .context("progress stream already taken")?;
    let printer = tokio::spawn(print_progress(progress_rx));

    shell::run(&node).await?;

    node.shutdown().await;
    printer.abort();
    println!("bye");
    Ok(())
}

/// Prints transfer progress, one line per crossed 10% step, so large
/// files do not flood the shell.
async fn print_progress(mut rx: mpsc::Receiver<ProgressEvent>) {
    let mut last_decile: HashMap<u64, u8> = HashMap::new();
    while let Some(event) = rx.recv().await {
        let decile = (event.percentage() / 10.0) as u8;
        let previous = last_decile.insert(event.session_id, decile);
        if previous == Some(decile) {
            continue;
        }
        println!(
            "[{}] {:.0}% ({}/{})",
            event.direction,
            event.percentage(),
            shell::format_size(event.bytes),
            shell::format_size(event.total),
        );
        if event.bytes >= event.total {
            last_decile.remove(&event.session_id);
        }
    }
}
