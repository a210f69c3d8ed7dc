use clap::{Parser, Subcommand};
use std::path::PathBuf;
use toolbox::offline::{Destination, Method};

#[derive(Parser)]
#[command(name = "toolbox")]
#[command(about = "Task text parser and offline cache controller", long_about = None)]
pub struct Cli {
    /// JSON config file (defaults to $TOOLBOX_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse task text and print the result as JSON
    Parse {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Start the background daemon
    Daemon,

    /// Stop the background daemon
    Stop,

    /// Check daemon status
    Status,

    /// Resolve a request through the daemon's controller
    Fetch {
        /// Absolute URL, or a path relative to the configured origin
        url: String,

        #[arg(long, default_value = "GET")]
        method: Method,

        /// document, image, script, style, font or manifest
        #[arg(long, value_parser = parse_destination)]
        destination: Option<Destination>,
    },

    /// Queue a mutation for replay on the next sync
    Enqueue {
        url: String,

        #[arg(long, default_value = "POST")]
        method: Method,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,
    },

    /// Fire a background-sync trigger
    Sync {
        #[arg(long)]
        tag: Option<String>,

        /// Fire the periodic refresh instead of draining the queue
        #[arg(long)]
        periodic: bool,
    },

    /// List queued offline mutations
    Queue,
}

fn parse_destination(value: &str) -> Result<Destination, String> {
    serde_json::from_value(serde_json::Value::String(value.to_ascii_lowercase()))
        .map_err(|_| format!("unknown destination: {value}"))
}
