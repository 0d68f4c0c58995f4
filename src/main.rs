//! quakeview - Recent earthquakes on an interactive world map.
//!
//! Fetches a USGS summary feed, ranks events by recency, color-codes them
//! by magnitude, and keeps a ranked list and a camera-following map in sync.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

mod cli;
mod client;
mod errors;
mod models;
mod output;
mod ranking;
mod selection;
mod server;
mod sidebar;
mod view;
mod viewmodel;

use cli::{Cli, Command, FeedArgs};
use client::{FeedClient, FeedSource};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Ui(args) => cmd_ui(args),
        Command::List(args) => cmd_list(args),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Build the feed client for the selected feed or explicit URL.
fn feed_client(args: &FeedArgs) -> Result<FeedClient> {
    let client = match &args.feed_url {
        Some(url) => FeedClient::with_url(url.clone()),
        None => FeedClient::new(args.feed),
    };
    client.context("failed to create feed client")
}

/// Execute the `list` command - one-shot fetch of the most recent earthquakes.
fn cmd_list(args: cli::ListArgs) -> Result<()> {
    let client = feed_client(&args.feed)?;

    let events = client
        .fetch_events()
        .context("failed to fetch earthquake feed")?;

    let ranked = ranking::rank(events);
    let top = ranking::top_n(&ranked, args.limit);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_events(&mut handle, top, args.format)?;

    Ok(())
}

/// Execute the `ui` command - serve the interactive map.
fn cmd_ui(args: cli::UiArgs) -> Result<()> {
    // The blocking client must be built outside the async runtime.
    let client = feed_client(&args.feed)?;
    let feed_url = client.url().to_string();
    let source: Arc<dyn FeedSource> = Arc::new(client);

    let config = server::ServerConfig {
        port: args.port,
        host: args.host.clone(),
    };

    let url = format!("http://{}:{}", args.host, args.port);
    println!("\x1b[1m🌍 quakeview\x1b[0m");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("  Local:   \x1b[96m{url}\x1b[0m");
    println!("  Feed:    {feed_url}");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("\x1b[2mPress Ctrl+C to stop\x1b[0m\n");

    // Open browser if requested (using xdg-open/open command)
    if args.open {
        #[cfg(target_os = "linux")]
        let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
        #[cfg(target_os = "macos")]
        let _ = std::process::Command::new("open").arg(&url).spawn();
        #[cfg(target_os = "windows")]
        let _ = std::process::Command::new("cmd").args(["/c", "start", &url]).spawn();
    }

    tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")?
        .block_on(server::run_server(config, source))
}
