use std::io::{self, IsTerminal};

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::init::InitReport;
use crate::pair::SyncAction;
use crate::reconcile::{EntryOutcome, RunReport, SyncStats};

pub fn print_sync_report(report: &RunReport, verbose: bool, dry_run: bool) {
    let palette = Palette::auto();
    let title = if dry_run { "Sync (dry run)" } else { "Sync" };
    println!("{}", palette.heading(title));

    for outcome in &report.outcomes {
        if verbose || is_failure(outcome) {
            println!("{}", format_outcome(outcome, &palette));
        }
    }

    if report.persisted {
        println!(
            "{}",
            palette.dim(&format!("app map updated ({} entries)", report.map.len()))
        );
    }
    if let Some(err) = &report.persist_error {
        println!("{}", palette.error(&format!("failed to save app map: {err}")));
    }
    println!("{}", format_summary(&report.stats, &palette));
}

pub fn print_init_report(report: &InitReport, dry_run: bool) {
    let palette = Palette::auto();
    let title = if dry_run { "Init (dry run)" } else { "Init" };
    println!("{}", palette.heading(title));
    for entry in &report.map.apps {
        println!(
            "{} {}",
            palette.id(&entry.app_id),
            entry.filename
        );
    }
    for warning in &report.warnings {
        println!("{}", palette.warn(&format!("warning: {warning}")));
    }
    if report.saved {
        println!("{}", palette.dim("app map saved"));
    }
    println!(
        "{}",
        palette.dim(&format!(
            "{} app(s) mapped, {} downloaded",
            report.map.len(),
            report.downloaded.len()
        ))
    );
}

fn is_failure(outcome: &EntryOutcome) -> bool {
    match outcome {
        EntryOutcome::Failed { .. } => true,
        EntryOutcome::Synced(result) => !result.success,
        EntryOutcome::Deleted { .. } | EntryOutcome::Renamed { .. } => false,
    }
}

fn format_outcome(outcome: &EntryOutcome, palette: &Palette) -> String {
    match outcome {
        EntryOutcome::Deleted { filename, app_id } => format!(
            "{} {} {}",
            palette.action("deleted"),
            filename,
            palette.dim(app_id)
        ),
        EntryOutcome::Renamed { app_id, from, to } => format!(
            "{} {} -> {} {}",
            palette.action("renamed"),
            from,
            to,
            palette.dim(app_id)
        ),
        EntryOutcome::Synced(result) => {
            let mut line = format!(
                "{} {} {}",
                palette.action(result.action.as_str()),
                result.filename,
                palette.dim(&result.app_id)
            );
            if let Some(err) = &result.error {
                line.push(' ');
                line.push_str(&palette.error(&err.to_string()));
            }
            line
        }
        EntryOutcome::Failed {
            filename,
            app_id,
            error,
        } => format!(
            "{} {} {} {}",
            palette.action(SyncAction::Error.as_str()),
            filename,
            palette.dim(app_id),
            palette.error(&error.to_string())
        ),
    }
}

fn format_summary(stats: &SyncStats, palette: &Palette) -> String {
    let line = format!(
        "{} total, {} downloaded, {} uploaded, {} unchanged, {} renamed, {} deleted, {} error(s) in {:.2}s",
        stats.total,
        stats.downloads,
        stats.uploads,
        stats.no_action,
        stats.renamed,
        stats.deleted,
        stats.errors,
        stats.duration.as_secs_f64()
    );
    if stats.errors > 0 {
        palette.error(&line)
    } else {
        palette.dim(&line)
    }
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    pub total: usize,
    pub downloads: usize,
    pub uploads: usize,
    pub no_action: usize,
    pub errors: usize,
    pub deleted: usize,
    pub renamed: usize,
    pub start_time: String,
    pub end_time: String,
    pub duration_ms: u64,
    pub map_persisted: bool,
}

impl StatsView {
    pub fn from_report(report: &RunReport) -> Self {
        let stats = &report.stats;
        Self {
            total: stats.total,
            downloads: stats.downloads,
            uploads: stats.uploads,
            no_action: stats.no_action,
            errors: stats.errors,
            deleted: stats.deleted,
            renamed: stats.renamed,
            start_time: rfc3339(stats.start_time),
            end_time: rfc3339(stats.end_time),
            duration_ms: u64::try_from(stats.duration.as_millis()).unwrap_or(u64::MAX),
            map_persisted: report.persisted,
        }
    }
}

fn rfc3339(instant: OffsetDateTime) -> String {
    instant.format(&Rfc3339).unwrap_or_default()
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn warn(&self, text: &str) -> String {
        self.paint("33", text)
    }

    fn error(&self, text: &str) -> String {
        self.paint("31", text)
    }

    fn action(&self, action: &str) -> String {
        let upper = action.to_ascii_uppercase();
        self.paint(action_color_code(action), &format!("[{upper}]"))
    }
}

fn action_color_code(action: &str) -> &'static str {
    match action {
        "download" => "34",
        "upload" => "35",
        "renamed" => "36",
        "deleted" => "33",
        "error" => "31",
        _ => "37",
    }
}

#[cfg(test)]
#[path = "ui_tests_ext.rs"]
mod tests;
