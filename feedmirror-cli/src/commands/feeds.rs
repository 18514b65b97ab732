use anyhow::Result;

use crate::render::Render;
use feedmirror_core::FeedMirror;

pub fn run(feedmirror: &FeedMirror) -> Result<()> {
    let statuses = feedmirror.status();

    if statuses.is_empty() {
        println!("No feeds configured.");
        return Ok(());
    }

    for (i, status) in statuses.iter().enumerate() {
        println!("{}", status.render());

        if i < statuses.len() - 1 {
            println!();
        }
    }

    Ok(())
}
