mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use toolbox::config::ToolboxConfig;
use toolbox::daemon::{self, Daemon, DaemonRequest, DaemonResponse};
use toolbox::nlp::TaskParser;
use toolbox::offline::{OfflineQueue, Request};
use toolbox::{db, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ToolboxConfig::load(cli.config.as_deref())?;

    let is_daemon = matches!(cli.command, Commands::Daemon);
    let log_dir = if is_daemon { config.log_dir.as_deref() } else { None };
    let _guard = logging::init(if is_daemon { "info" } else { "warn" }, log_dir)?;

    let socket = config.socket_path.as_path();

    match cli.command {
        Commands::Parse { text } => {
            let parser = TaskParser::new(config.keywords.clone());
            print_json(&parser.parse(&text.join(" ")))?;
        }

        Commands::Daemon => {
            if daemon::is_daemon_running(socket).await {
                anyhow::bail!("daemon already running at {}", socket.display());
            }
            Daemon::from_config(&config).await?.run().await?;
        }

        Commands::Stop => {
            daemon::stop_daemon(socket).await?;
            eprintln!("✓ Daemon stopped");
        }

        Commands::Status => match daemon::send_to_daemon(socket, &DaemonRequest::Health).await {
            Ok(DaemonResponse::Health {
                state,
                version,
                queued,
            }) => {
                println!("✓ Daemon running at {}", socket.display());
                println!("  state:   {state:?}");
                println!("  version: {version}");
                println!("  queued:  {queued}");
            }
            Ok(other) => anyhow::bail!("unexpected reply: {other:?}"),
            Err(_) => println!("✗ Daemon not running"),
        },

        Commands::Fetch {
            url,
            method,
            destination,
        } => {
            let absolute = reqwest::Url::parse(&config.offline.origin)
                .and_then(|origin| origin.join(&url))
                .with_context(|| format!("bad url {url}"))?;
            let mut request = Request::new(method, absolute.as_str())?;
            if let Some(destination) = destination {
                request = request.with_destination(destination);
            }

            let response = expect_daemon(socket, DaemonRequest::Fetch { request }).await?;
            match response {
                DaemonResponse::Fetched(response) => {
                    eprintln!("{} ({:?})", response.status, response.source);
                    println!("{}", response.text());
                }
                other => report_unexpected(other)?,
            }
        }

        Commands::Enqueue { url, method, data } => {
            let data: serde_json::Value = match data {
                Some(text) => serde_json::from_str(&text).context("--data is not valid JSON")?,
                None => serde_json::Value::Null,
            };

            // Without a daemon, write straight to the database it will read.
            if daemon::is_daemon_running(socket).await {
                match daemon::send_to_daemon(socket, &DaemonRequest::Enqueue { url, method, data })
                    .await?
                {
                    DaemonResponse::Queued { id } => println!("✓ Queued #{id}"),
                    other => report_unexpected(other)?,
                }
            } else {
                let id = local_queue(&config).await?.enqueue(&url, method, &data).await?;
                println!("✓ Queued #{id}");
            }
        }

        Commands::Sync { tag, periodic } => {
            let request = if periodic {
                DaemonRequest::PeriodicSync { tag }
            } else {
                DaemonRequest::Sync { tag }
            };
            match expect_daemon(socket, request).await? {
                DaemonResponse::Drained(report) => print_json(&report)?,
                DaemonResponse::Refreshed { updated } => println!("updated: {updated}"),
                other => report_unexpected(other)?,
            }
        }

        Commands::Queue => {
            let entries = if daemon::is_daemon_running(socket).await {
                match daemon::send_to_daemon(socket, &DaemonRequest::Queue).await? {
                    DaemonResponse::QueueEntries(entries) => entries,
                    other => return report_unexpected(other),
                }
            } else {
                local_queue(&config).await?.entries().await?
            };
            print_json(&entries)?;
        }
    }

    Ok(())
}

async fn expect_daemon(socket: &std::path::Path, request: DaemonRequest) -> Result<DaemonResponse> {
    daemon::send_to_daemon(socket, &request)
        .await
        .context("daemon not running; start it with `toolbox daemon`")
}

async fn local_queue(config: &ToolboxConfig) -> Result<OfflineQueue> {
    let pool = db::open(&config.database_path).await?;
    Ok(OfflineQueue::new(pool, config.offline.queue_lease))
}

fn report_unexpected(response: DaemonResponse) -> Result<()> {
    match response {
        DaemonResponse::Error(message) => anyhow::bail!("daemon error: {message}"),
        other => anyhow::bail!("unexpected reply: {other:?}"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
