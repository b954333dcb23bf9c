use std::time::Duration;

use time::OffsetDateTime;

use super::{action_color_code, format_outcome, format_summary, is_failure, Palette, StatsView};
use crate::mapping::AppMap;
use crate::pair::{PairError, SyncAction, SyncResult};
use crate::reconcile::{EntryError, EntryOutcome, RunReport, SyncStats};

fn plain() -> Palette {
    Palette { enabled: false }
}

fn stats(errors: usize) -> SyncStats {
    let start = OffsetDateTime::from_unix_timestamp(1_672_531_200).expect("valid epoch");
    SyncStats {
        total: 4,
        downloads: 2,
        uploads: 0,
        no_action: 1,
        errors,
        deleted: 1,
        renamed: 1,
        start_time: start,
        end_time: start,
        duration: Duration::from_millis(1500),
    }
}

fn synced(action: SyncAction, error: Option<PairError>) -> EntryOutcome {
    EntryOutcome::Synced(SyncResult {
        filename: "Flow.yaml".to_string(),
        app_id: "app-1".to_string(),
        action,
        success: error.is_none(),
        error,
        timestamp: OffsetDateTime::now_utc(),
    })
}

#[test]
fn outcome_lines_name_action_file_and_app() {
    let palette = plain();
    assert_eq!(
        format_outcome(&synced(SyncAction::Download, None), &palette),
        "[DOWNLOAD] Flow.yaml app-1"
    );
    assert_eq!(
        format_outcome(
            &EntryOutcome::Renamed {
                app_id: "app-2".to_string(),
                from: "Old.yaml".to_string(),
                to: "New.yaml".to_string(),
            },
            &palette
        ),
        "[RENAMED] Old.yaml -> New.yaml app-2"
    );
    assert_eq!(
        format_outcome(
            &EntryOutcome::Deleted {
                filename: "Gone.yaml".to_string(),
                app_id: "app-3".to_string(),
            },
            &palette
        ),
        "[DELETED] Gone.yaml app-3"
    );
}

#[test]
fn failures_include_the_error_message() {
    let palette = plain();
    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let line = format_outcome(
        &synced(SyncAction::Error, Some(PairError::StatLocal(err))),
        &palette,
    );
    assert!(line.starts_with("[ERROR] Flow.yaml"));
    assert!(line.contains("failed to stat local file"));

    let failed = EntryOutcome::Failed {
        filename: "Flow.yaml".to_string(),
        app_id: "app-1".to_string(),
        error: EntryError::Remove(std::io::Error::other("busy")),
    };
    assert!(is_failure(&failed));
    assert!(format_outcome(&failed, &palette).contains("failed to remove local file"));
    assert!(!is_failure(&synced(SyncAction::None, None)));
}

#[test]
fn summary_lists_every_counter() {
    let summary = format_summary(&stats(0), &plain());
    assert_eq!(
        summary,
        "4 total, 2 downloaded, 0 uploaded, 1 unchanged, 1 renamed, 1 deleted, 0 error(s) in 1.50s"
    );
}

#[test]
fn palette_paints_only_when_enabled() {
    let colored = Palette { enabled: true };
    assert_eq!(colored.action("upload"), "\x1b[35m[UPLOAD]\x1b[0m");
    assert_eq!(plain().action("upload"), "[UPLOAD]");
    assert_eq!(action_color_code("error"), "31");
    assert_eq!(action_color_code("none"), "37");
}

#[test]
fn stats_view_serializes_times_as_rfc3339() {
    let report = RunReport {
        stats: stats(1),
        map: AppMap::default(),
        outcomes: Vec::new(),
        persisted: true,
        persist_error: None,
    };
    let value = serde_json::to_value(StatsView::from_report(&report)).expect("json");
    assert_eq!(value["start_time"], "2023-01-01T00:00:00Z");
    assert_eq!(value["errors"], 1);
    assert_eq!(value["duration_ms"], 1500);
    assert_eq!(value["map_persisted"], true);
}
