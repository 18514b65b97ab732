use anyhow::Result;
use owo_colors::OwoColorize;

use super::create_spinner;
use crate::render::Render;
use feedmirror_core::{FeedConfig, FeedMirror};

pub async fn run(feedmirror: &FeedMirror, feeds: Vec<FeedConfig>, json: bool) -> Result<()> {
    if json {
        let mut results = Vec::new();
        for feed in &feeds {
            results.push(feedmirror.validate(&feed.id).await?);
        }
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    let mut drifted = 0;

    for (i, feed) in feeds.iter().enumerate() {
        let spinner = create_spinner(feed.render());
        let result = feedmirror.validate(&feed.id).await;
        spinner.finish_and_clear();

        println!("{}", feed.render());

        match result {
            Ok(validation) => {
                if !validation.is_clean() {
                    drifted += 1;
                }
                println!("{}", validation.render());

                if !validation.sample_comparison.ics_events.is_empty() {
                    println!("   {}", "Feed sample:".dimmed());
                    for sample in &validation.sample_comparison.ics_events {
                        println!("     {}", sample.render());
                    }
                }
                if !validation.sample_comparison.db_events.is_empty() {
                    println!("   {}", "Mirror sample:".dimmed());
                    for sample in &validation.sample_comparison.db_events {
                        println!("     {}", sample.render());
                    }
                }
            }
            Err(e) => println!("   {}", e.to_string().red()),
        }

        if i < feeds.len() - 1 {
            println!();
        }
    }

    if drifted > 0 {
        println!("\n{}", drift_hint(drifted));
    }

    Ok(())
}

fn drift_hint(drifted: usize) -> String {
    let subject = if drifted == 1 {
        "1 mirror has".to_string()
    } else {
        format!("{} mirrors have", drifted)
    };
    format!("{subject} drifted from the feed; run `feedmirror resync --feed <id>` to rebuild")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_drift_hint_names_a_command_that_parses() {
        let hint = drift_hint(2);
        assert!(hint.starts_with("2 mirrors have"));

        let command = hint.split('`').nth(1).unwrap().replace("<id>", "team");
        let cli = Cli::try_parse_from(command.split_whitespace()).unwrap();
        assert!(matches!(cli.command, Commands::Resync { ref feed, .. } if feed == "team"));
    }
}
