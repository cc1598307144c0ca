mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sidegig_notify::{HttpNotificationsApi, NotificationsApi, StaticSession};

use crate::cli::config;

#[derive(Parser)]
#[command(name = "sidegig-notify")]
#[command(about = "Notification sync tool for Sidegig")]
struct Cli {
    /// Path to JSON config file (contains apiUrl, token, userId)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// API base URL (overrides SIDEGIG_API_URL and the config file)
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer token (overrides SIDEGIG_TOKEN and the config file)
    #[arg(long)]
    token: Option<String>,

    /// User id the subscription is scoped to (overrides SIDEGIG_USER_ID and
    /// the config file)
    #[arg(long)]
    user_id: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print the notification list
    List {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,
        /// Print JSON instead of the human-readable listing
        #[arg(long)]
        json: bool,
    },

    /// Mark one notification read
    MarkRead {
        /// Notification id
        id: String,
    },

    /// Mark every notification read
    MarkAllRead,

    /// Delete one notification
    Delete {
        /// Notification id
        id: String,
    },

    /// Run the sync engine in the foreground and stream view updates
    Watch {
        /// Seconds between forced resyncs
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let settings = config::resolve(
        args.config.as_deref(),
        args.api_url,
        args.token,
        args.user_id,
    )?;
    let session = Arc::new(StaticSession::new(
        settings.user_id.clone(),
        settings.token.clone(),
    ));
    let api = HttpNotificationsApi::new(settings.api_url.clone(), session.clone());

    match args.command {
        Commands::List { unread, json } => list(&api, unread, json, args.pretty).await,
        Commands::MarkRead { id } => {
            api.mark_read(&id).await?;
            println!("marked {id} read");
            Ok(())
        }
        Commands::MarkAllRead => {
            api.mark_all_read().await?;
            println!("marked all notifications read");
            Ok(())
        }
        Commands::Delete { id } => {
            api.delete(&id).await?;
            println!("deleted {id}");
            Ok(())
        }
        Commands::Watch { interval } => cli::watch::run(settings, session, interval).await,
    }
}

async fn list(
    api: &HttpNotificationsApi,
    unread_only: bool,
    json: bool,
    pretty: bool,
) -> Result<()> {
    let snapshot = api.list().await?;
    let rows: Vec<_> = snapshot
        .notifications
        .into_iter()
        .filter(|n| !unread_only || !n.is_read)
        .collect();

    if json {
        let out = if pretty {
            serde_json::to_string_pretty(&rows)?
        } else {
            serde_json::to_string(&rows)?
        };
        println!("{out}");
        return Ok(());
    }

    println!("{} shown, {} unread total", rows.len(), snapshot.unread_count);
    for notification in &rows {
        println!("{}", cli::notification_line(notification));
    }
    Ok(())
}
