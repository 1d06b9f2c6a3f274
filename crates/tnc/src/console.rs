//! Stdio front-end: one operator user, line-in / text-out.
//!
//! Real chat front-ends attach to the gateway the same way: feed text in,
//! drain the outbound channel.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use tnc_core::{
    domain::{Outbound, UserId},
    gateway::Gateway,
};

pub async fn run(
    gateway: Gateway,
    mut outbound: UnboundedReceiver<Outbound>,
    operator: UserId,
) -> anyhow::Result<()> {
    let printer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            println!("{}", msg.text);
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim() == "/quit" {
            break;
        }
        if let Err(e) = gateway.handle_input(operator, &line).await {
            eprintln!("error: {e}");
        }
    }

    printer.abort();
    Ok(())
}
