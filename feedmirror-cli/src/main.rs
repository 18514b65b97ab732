mod commands;
mod render;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use feedmirror_core::{FeedConfig, FeedMirror};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feedmirror")]
#[command(about = "Mirror iCalendar feeds locally and check the mirror against its feed")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured feeds and their sync state
    Feeds,
    /// Fetch feeds and upsert their events into the mirror
    Sync {
        /// Only operate on this feed (by id)
        #[arg(short, long)]
        feed: Option<String>,
    },
    /// Rebuild a feed's mirror from a fresh fetch
    Resync {
        /// Feed to rebuild (by id)
        #[arg(short, long)]
        feed: String,

        /// Upsert without clearing first (stale rows stay)
        #[arg(long)]
        keep_existing: bool,
    },
    /// Compare feeds with their mirror without changing anything
    Validate {
        /// Only operate on this feed (by id)
        #[arg(short, long)]
        feed: Option<String>,

        /// Print the raw validation results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `validate --json` stays machine readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let feedmirror = FeedMirror::load()?;
    feedmirror.scheduler().restore_states().await?;

    match cli.command {
        Commands::Feeds => commands::feeds::run(&feedmirror),
        Commands::Sync { feed } => {
            let feeds = resolve_feeds(&feedmirror, feed.as_deref())?;
            commands::sync::run(&feedmirror, feeds).await
        }
        Commands::Resync {
            feed,
            keep_existing,
        } => {
            let feed = resolve_feeds(&feedmirror, Some(feed.as_str()))?.remove(0);
            commands::resync::run(&feedmirror, feed, keep_existing).await
        }
        Commands::Validate { feed, json } => {
            let feeds = resolve_feeds(&feedmirror, feed.as_deref())?;
            commands::validate::run(&feedmirror, feeds, json).await
        }
    }
}

fn resolve_feeds(feedmirror: &FeedMirror, feed_filter: Option<&str>) -> Result<Vec<FeedConfig>> {
    let all_feeds = feedmirror.feeds();

    if all_feeds.is_empty() {
        let path = feedmirror_core::FeedMirrorConfig::config_path()?;
        anyhow::bail!(
            "No feeds configured.\n\n\
            Add one to {}:\n  \
            [[feeds]]\n  \
            id = \"team\"\n  \
            url = \"webcal://calendar.example.com/team.ics\"",
            path.display()
        );
    }

    match feed_filter {
        Some(id) => match all_feeds.iter().find(|f| f.id == id) {
            Some(feed) => Ok(vec![feed.clone()]),
            None => {
                let available: Vec<_> = all_feeds.iter().map(|f| f.id.as_str()).collect();
                anyhow::bail!("Feed '{}' not found. Available: {}", id, available.join(", "));
            }
        },
        None => Ok(all_feeds.to_vec()),
    }
}
