//! Interactive command shell: `peers`, `send`, `name`, `help`, `quit`.
//!
//! The shell owns stdin. Incoming transfer offers interrupt the prompt,
//! are answered inline, and the command loop resumes.

use std::io::Write as _;
use std::path::PathBuf;
use std::time::Instant;

use landrop_discovery::PeerRecord;
use landrop_node::Node;
use landrop_transfer::{PendingOffer, SendOutcome, Verdict};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

enum Flow {
    Continue,
    Quit,
}

pub async fn run(node: &Node) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        tokio::select! {
            pending = node.next_confirmation() => {
                answer_confirmation(&mut lines, pending).await?;
            }
            line = lines.next_line() => {
                match line? {
                    None => break, // stdin closed
                    Some(line) => {
                        if let Flow::Quit = handle_command(node, line.trim()).await {
                            break;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Prompts for a verdict on one pending offer and resolves it.
///
/// The receive session auto-rejects after its own timeout; a late answer
/// is simply dropped.
async fn answer_confirmation(
    lines: &mut Lines<BufReader<Stdin>>,
    pending: PendingOffer,
) -> anyhow::Result<()> {
    let offer = pending.offer();
    print!(
        "\nincoming file '{}' ({}) from {}, accept? [y/N] ",
        offer.filename,
        format_size(offer.size),
        offer.peer
    );
    std::io::stdout().flush()?;

    let verdict = match lines.next_line().await? {
        Some(answer) if matches!(answer.trim(), "y" | "Y" | "yes") => Verdict::Accept,
        _ => Verdict::Reject,
    };
    pending.resolve(verdict);
    Ok(())
}

async fn handle_command(node: &Node, line: &str) -> Flow {
    let mut parts = line.splitn(3, char::is_whitespace);
    match parts.next().unwrap_or("") {
        "" => {}
        "peers" => {
            print!("{}", render_peers(&node.peers_snapshot(), Instant::now()));
        }
        "send" => match (parts.next(), parts.next()) {
            (Some(target), Some(path)) => submit_send(node, target, path),
            _ => println!("usage: send <peer-name|ip:port> <file>"),
        },
        "name" => {
            let identity = node.identity();
            println!("{} ({}:{})", identity.name, identity.ip, identity.port);
        }
        "help" => print_help(),
        "quit" | "exit" => return Flow::Quit,
        other => println!("unknown command '{other}' (try 'help')"),
    }
    Flow::Continue
}

fn submit_send(node: &Node, target: &str, path: &str) {
    match node.submit_send(target, PathBuf::from(path)) {
        Ok(handle) => {
            let target = target.to_string();
            tokio::spawn(async move {
                match handle.await {
                    Ok(Ok(SendOutcome::Delivered)) => {
                        println!("transfer to {target} complete");
                    }
                    Ok(Ok(SendOutcome::Rejected { reason })) => match reason {
                        Some(reason) => println!("{target} rejected the transfer: {reason}"),
                        None => println!("{target} rejected the transfer"),
                    },
                    Ok(Ok(SendOutcome::VerifyFailed { .. })) => {
                        println!("transfer to {target} failed verification, peer discarded it");
                    }
                    Ok(Err(e)) => println!("transfer to {target} failed: {e}"),
                    Err(_) => {} // aborted at shutdown
                }
            });
        }
        Err(e) => println!("cannot send: {e}"),
    }
}

fn print_help() {
    println!("commands:");
    println!("  peers                        list discovered peers");
    println!("  send <peer|ip:port> <file>   push a file to a peer");
    println!("  name                         show this node's identity");
    println!("  quit                         leave");
}

/// Renders the peer table as aligned columns.
fn render_peers(records: &[PeerRecord], now: Instant) -> String {
    let mut out = String::new();
    if records.is_empty() {
        out.push_str("no peers discovered yet\n");
        return out;
    }

    out.push_str(&format!(
        "{:<18} {:<21} {:<9} {}\n",
        "NAME", "ADDRESS", "OS", "LAST SEEN"
    ));
    for record in records {
        let identity = &record.identity;
        out.push_str(&format!(
            "{:<18} {:<21} {:<9} {}s ago\n",
            identity.name,
            format!("{}:{}", identity.ip, identity.port),
            identity.os,
            record.age(now).as_secs(),
        ));
    }
    out.push_str(&format!("{} peer(s) online\n", records.len()));
    out
}

/// Human-readable byte counts, one decimal from KB up.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let bytes_f = bytes as f64;
    if bytes_f < KB {
        format!("{bytes} B")
    } else if bytes_f < MB {
        format!("{:.1} KB", bytes_f / KB)
    } else if bytes_f < GB {
        format!("{:.1} MB", bytes_f / MB)
    } else {
        format!("{:.1} GB", bytes_f / GB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landrop_discovery::NodeIdentity;

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(200 * 1024), "200.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn render_peers_empty() {
        assert_eq!(render_peers(&[], Instant::now()), "no peers discovered yet\n");
    }

    #[test]
    fn render_peers_columns() {
        let now = Instant::now();
        let records = vec![PeerRecord {
            identity: NodeIdentity {
                name: "node_7_12001".into(),
                ip: "192.168.1.7".parse().unwrap(),
                port: 12001,
                os: "linux".into(),
            },
            last_seen: now,
        }];
        let table = render_peers(&records, now);
        assert!(table.contains("node_7_12001"));
        assert!(table.contains("192.168.1.7:12001"));
        assert!(table.contains("0s ago"));
        assert!(table.contains("1 peer(s) online"));
    }
}
