mod api;
mod commands;
mod config;
mod download;
mod error;
mod extract;
mod poll;
mod reconcile;
mod record;
mod sink;
mod snapshot;

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use commands::NotionSyncArgs;
use config::Config;

#[derive(Parser)]
#[command(name = "link_sync", about = "Mirror bookmarks, playlists and mail into JSON snapshots or Notion")]
struct Cli {
    /// Worker threads for batched reconciliation (default: one per core)
    #[arg(long, global = true)]
    jobs: Option<usize>,

    /// Split the new collection into this many batches reconciled in parallel
    #[arg(long, global = true)]
    batches: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract bookmark exports and sync them into a JSON snapshot
    Bookmarks {
        #[arg(short, long, default_value = "./bookmarks")]
        dir: PathBuf,
        #[arg(short, long, default_value = "bookmarks-*.html")]
        pattern: String,
        #[arg(short, long, default_value = "output_links.json")]
        snapshot: PathBuf,
    },
    /// Notion database operations
    Notion {
        #[command(subcommand)]
        action: NotionAction,
    },
    /// List created and saved YouTube playlists
    Playlists {
        /// Reconcile the playlists against this snapshot and persist it
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },
    /// Gmail operations
    Mail {
        #[command(subcommand)]
        action: MailAction,
    },
    /// Download a file over HTTP
    Download {
        url: String,
        #[arg(short, long, default_value = "downloads")]
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum NotionAction {
    /// Sync bookmark exports into the database (create new, archive removed)
    Sync {
        #[arg(short, long, default_value = "./bookmarks")]
        dir: PathBuf,
        #[arg(short, long, default_value = "bookmarks-*.html")]
        pattern: String,
        /// Also write every extracted link to this JSON file
        #[arg(long)]
        dump: Option<PathBuf>,
        /// Update title/time of existing rows when the export changed them
        #[arg(long)]
        refresh_metadata: bool,
    },
    /// Archive every row of the database
    Purge,
    /// Check whether a row with PROPERTY == VALUE exists
    Exists {
        #[arg(long, default_value = "url")]
        property: String,
        #[arg(long)]
        value: String,
    },
}

#[derive(Subcommand)]
enum MailAction {
    /// List messages from a sender
    List {
        #[arg(long)]
        sender: String,
        /// Reconcile the messages against this snapshot and persist it
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },
    /// Poll until a message from the sender has attachments, then save them
    Watch {
        #[arg(long, default_value = "noreply@medium.com")]
        sender: String,
        #[arg(short, long, default_value = "downloads")]
        download_dir: PathBuf,
        /// Seconds between checks (default: POLL_INTERVAL_SECS)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

fn init_tracing(log_dir: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let file = std::fs::create_dir_all(log_dir).and_then(|_| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("link_sync.log"))
    });
    let (file_layer, file_err) = match file {
        Ok(f) => (
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(f))),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    if let Some(e) = file_err {
        warn!("File logging disabled ({}): {}", log_dir.display(), e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();
    let cfg = Config::from_env();
    init_tracing(&cfg.log_dir);

    let t0 = Instant::now();
    let cli = Cli::parse();

    if let Some(n) = cli.jobs {
        rayon::ThreadPoolBuilder::new().num_threads(n).build_global()?;
    }
    let batches = cli.batches;

    let result = match cli.command {
        Commands::Bookmarks { dir, pattern, snapshot } => {
            commands::sync_bookmarks(&dir, &pattern, &snapshot, batches).await
        }
        Commands::Notion { action } => match action {
            NotionAction::Sync {
                dir,
                pattern,
                dump,
                refresh_metadata,
            } => {
                let args = NotionSyncArgs {
                    dir: &dir,
                    pattern: &pattern,
                    dump: dump.as_deref(),
                    refresh_metadata,
                    batches,
                };
                commands::notion_sync(&cfg, args).await
            }
            NotionAction::Purge => commands::notion_purge(&cfg).await,
            NotionAction::Exists { property, value } => {
                commands::notion_exists(&cfg, &property, &value).await.map(|_| ())
            }
        },
        Commands::Playlists { snapshot } => {
            commands::playlists(&cfg, snapshot.as_deref(), batches).await
        }
        Commands::Mail { action } => match action {
            MailAction::List { sender, snapshot } => {
                commands::mail_list(&cfg, &sender, snapshot.as_deref(), batches).await
            }
            MailAction::Watch {
                sender,
                download_dir,
                interval_secs,
            } => {
                let interval = interval_secs
                    .map(Duration::from_secs)
                    .unwrap_or(cfg.poll_interval);
                let (cancel_tx, cancel_rx) = watch::channel(false);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        let _ = cancel_tx.send(true);
                    }
                });
                commands::mail_watch(&cfg, &sender, &download_dir, interval, cancel_rx).await
            }
        },
        Commands::Download { url, dir } => commands::download_url(&url, &dir).await,
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", human_elapsed(elapsed));
    }

    result
}

fn human_elapsed(d: Duration) -> String {
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
    match (h, m) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{}m {}s", m, s),
        _ => format!("{}h {}m {}s", h, m, s),
    }
}
