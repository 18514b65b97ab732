//! Colored terminal rendering for feedmirror-core types.

use feedmirror_core::diff::SampleEvent;
use feedmirror_core::scheduler::FeedStatus;
use feedmirror_core::{FeedConfig, FeedState, SyncMode, SyncReport, ValidationResult};
use owo_colors::OwoColorize;

use crate::utils::tui::pluralize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for FeedConfig {
    fn render(&self) -> String {
        format!("📅 {}", self.id)
    }
}

impl Render for FeedState {
    fn render(&self) -> String {
        match self {
            FeedState::Idle => self.label().green().to_string(),
            FeedState::Syncing { mode, .. } => format!("{} ({})", self.label(), mode)
                .yellow()
                .to_string(),
            FeedState::Failed { error, .. } => {
                format!("{}: {}", self.label(), error).red().to_string()
            }
            FeedState::ResyncIncomplete { error } => format!(
                "{}: {} (next sync rebuilds the mirror)",
                self.label(),
                error
            )
            .red()
            .to_string(),
        }
    }
}

impl Render for FeedStatus {
    fn render(&self) -> String {
        let mut lines = vec![
            format!("📅 {}", self.feed_id),
            format!("   {}", self.url.dimmed()),
            format!("   {}", self.state.render()),
        ];

        if let Some(run) = &self.last_run {
            let when = run.finished_at.format("%Y-%m-%d %H:%M UTC");
            let outcome = if run.succeeded() {
                "ok".green().to_string()
            } else {
                "failed".red().to_string()
            };
            lines.push(format!(
                "   last {} run {} at {}",
                run.mode,
                outcome,
                when.dimmed()
            ));
        }

        if let Some(validation) = &self.last_validation {
            let summary = if validation.is_clean() {
                "in sync".green().to_string()
            } else {
                format!(
                    "{} missing, {} extra",
                    validation.missing, validation.extra
                )
                .yellow()
                .to_string()
            };
            lines.push(format!("   last check: {}", summary));
        }

        lines.join("\n")
    }
}

impl Render for SyncReport {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        if self.mode == SyncMode::ForcedResync {
            lines.push(format!(
                "   {} {}",
                "-".red(),
                format!("cleared {}", pluralize("row", self.cleared)).red()
            ));
        }
        lines.push(format!(
            "   {} {}",
            "+".green(),
            format!("upserted {}", pluralize("event", self.upserted)).green()
        ));

        let mut notes = Vec::new();
        if self.dropped > 0 {
            notes.push(format!("{} unreadable", self.dropped));
        }
        if self.synthetic > 0 {
            notes.push(format!("{} without UID", self.synthetic));
        }
        if self.truncated {
            notes.push(format!("capped at {}", self.upserted));
        }
        if !notes.is_empty() {
            lines.push(format!("   {}", notes.join(", ").dimmed()));
        }

        lines.join("\n")
    }
}

impl Render for SampleEvent {
    fn render(&self) -> String {
        format!("{} {}", self.title, self.start.dimmed())
    }
}

/// UIDs listed before switching to a count
const COMPACT_THRESHOLD: usize = 5;

fn render_uid_list(symbol: &str, label: &str, uids: &[String], lines: &mut Vec<String>) {
    if uids.len() <= COMPACT_THRESHOLD {
        for uid in uids {
            lines.push(format!("   {} {}", symbol, uid));
        }
    } else {
        lines.push(format!("   {} ({} {})", symbol, uids.len(), label));
    }
}

impl Render for ValidationResult {
    fn render(&self) -> String {
        let mut lines = vec![format!(
            "   {} in feed, {} in mirror ({} to {})",
            self.ics_event_count,
            self.db_event_count,
            self.date_range_start.format("%Y-%m-%d"),
            self.date_range_end.format("%Y-%m-%d"),
        )];

        if self.is_clean() {
            lines.push(format!("   {}", "Mirror matches the feed".green()));
        } else {
            let mut missing = Vec::new();
            render_uid_list("+", "missing from mirror", &self.missing_uids, &mut missing);
            lines.extend(missing.into_iter().map(|l| l.green().to_string()));

            let mut extra = Vec::new();
            render_uid_list("-", "no longer in feed", &self.extra_uids, &mut extra);
            lines.extend(extra.into_iter().map(|l| l.red().to_string()));
        }

        if self.dropped_object_count > 0 {
            lines.push(format!(
                "   {}",
                format!(
                    "{} unreadable in the feed",
                    pluralize("object", self.dropped_object_count)
                )
                .dimmed()
            ));
        }

        for recommendation in &self.recommendations {
            lines.push(format!("   {} {}", "→".yellow(), recommendation));
        }

        lines.join("\n")
    }
}
