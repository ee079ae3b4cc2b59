//! loghook-listen
//!
//! Creates the notification resources and prints every notification a
//! producer sends until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use loghook_shared_memory::{NotificationHost, ResourceNames, BUFFER_SIZE, DEFAULT_PREFIX};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "loghook-listen", version, about = "Print notifications sent by a loghook producer")]
struct Cli {
    /// Prefix of the shared resource names
    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// How often to check for shutdown, in milliseconds
    #[arg(long, default_value_t = 5000)]
    poll_ms: u64,

    /// Print notifications as JSON lines
    #[arg(long)]
    json: bool,

    /// Log level filter, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let names = ResourceNames::with_prefix(&cli.prefix);
    let host = NotificationHost::create(names, BUFFER_SIZE)
        .with_context(|| format!("creating notification resources for {}", cli.prefix))?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    info!("Waiting for notifications on {}", host.names().buffer);

    let json = cli.json;
    host.listen(&stop, Duration::from_millis(cli.poll_ms), |notification| {
        if json {
            match serde_json::to_string(&notification) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize notification: {}", e),
            }
        } else {
            println!("{}", notification);
        }
    })?;

    info!("Listener stopped");
    Ok(())
}
