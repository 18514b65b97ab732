use anyhow::Result;
use owo_colors::OwoColorize;

use super::create_spinner;
use crate::render::Render;
use feedmirror_core::{FeedConfig, FeedMirror, SyncMode};

pub async fn run(feedmirror: &FeedMirror, feed: FeedConfig, keep_existing: bool) -> Result<()> {
    let mode = if keep_existing {
        SyncMode::Incremental
    } else {
        SyncMode::ForcedResync
    };

    let spinner = create_spinner(format!("{} ({})", feed.render(), mode));
    let result = feedmirror.sync(&feed.id, mode).await;
    spinner.finish_and_clear();

    println!("{}", feed.render());

    match result {
        Ok(report) => {
            println!("{}", report.render());
            Ok(())
        }
        Err(e) => {
            println!("   {}", e.to_string().red());
            anyhow::bail!("Resync of feed '{}' failed", feed.id)
        }
    }
}
