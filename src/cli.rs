//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing.

use clap::{Parser, Subcommand};

use crate::client::FeedType;
use crate::output::Format;
use crate::ranking::LIST_LIMIT;

/// Recent earthquakes on an interactive world map.
#[derive(Parser, Debug)]
#[command(name = "quakeview")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the interactive map
    Ui(UiArgs),

    /// Print the most recent earthquakes and exit
    List(ListArgs),
}

/// Feed selection shared by every command.
#[derive(clap::Args, Debug, Clone)]
pub struct FeedArgs {
    /// USGS summary feed, e.g. all_day or 4.5_week
    #[arg(long, default_value = "all_day", value_parser = parse_feed_type)]
    pub feed: FeedType,

    /// Fetch from this URL instead of the USGS summary feed
    #[arg(long)]
    pub feed_url: Option<String>,
}

/// Arguments for the `ui` command.
#[derive(Parser, Debug)]
pub struct UiArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,
}

/// Arguments for the `list` command.
#[derive(Parser, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    /// Maximum number of events to show
    #[arg(long, short = 'n', default_value_t = LIST_LIMIT)]
    pub limit: usize,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Parse a feed type from string.
fn parse_feed_type(s: &str) -> Result<FeedType, String> {
    s.parse()
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}
