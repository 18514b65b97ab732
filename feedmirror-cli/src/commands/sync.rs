use anyhow::Result;
use owo_colors::OwoColorize;

use super::create_spinner;
use crate::render::Render;
use feedmirror_core::{FeedConfig, FeedMirror};

pub async fn run(feedmirror: &FeedMirror, feeds: Vec<FeedConfig>) -> Result<()> {
    let scheduler = feedmirror.scheduler();
    let mut total_upserted = 0;
    let mut failures = 0;

    for (i, feed) in feeds.iter().enumerate() {
        // A feed left half-rebuilt gets a forced resync instead
        let mode = scheduler.state(&feed.id).next_mode();

        let spinner = create_spinner(feed.render());
        let result = feedmirror.sync(&feed.id, mode).await;
        spinner.finish_and_clear();

        println!("{}", feed.render());

        match result {
            Ok(report) => {
                total_upserted += report.upserted;
                println!("{}", report.render());
            }
            Err(e) => {
                failures += 1;
                println!("   {}", e.to_string().red());
            }
        }

        if i < feeds.len() - 1 {
            println!();
        }
    }

    if feeds.len() > 1 {
        println!("\nUpserted {} events", total_upserted);
    }

    if failures > 0 {
        anyhow::bail!("{} of {} feeds failed to sync", failures, feeds.len());
    }

    Ok(())
}
