use time::{Duration, OffsetDateTime};

use super::{decide_action, PairError, PairSync, SyncAction, SyncResult};
use crate::config::{SyncConfig, SyncMode, Transfer};
use crate::mapping::AppMapping;
use crate::remote::{RemoteApps, RemoteRecord};
use crate::test_support::{mtime_secs, sync_config, unique_dir, write_with_mtime, FakeRemote, Op};
use crate::timestamp::{NormalizedTimestamp, RawTimestamp};

const OLD: u64 = 1_600_000_000;
const REMOTE: i64 = 1_672_531_200;
const NEWER: u64 = 1_700_000_000;

fn at(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(secs).expect("valid epoch")
}

struct Fixture {
    root: std::path::PathBuf,
    config: SyncConfig,
    entry: AppMapping,
}

impl Fixture {
    fn new(prefix: &str, local_mtime: u64) -> Self {
        let root = unique_dir(prefix);
        let config = sync_config(&root);
        let entry = AppMapping::new("Flow.yaml", "app-1");
        write_with_mtime(&config.dsl_directory.join("Flow.yaml"), "local: v1\n", local_mtime);
        Self { root, config, entry }
    }

    fn path(&self) -> std::path::PathBuf {
        self.config.dsl_directory.join(&self.entry.filename)
    }

    fn read(&self) -> String {
        std::fs::read_to_string(self.path()).expect("local file readable")
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn remote_with(updated_at: RawTimestamp) -> FakeRemote {
    FakeRemote::new().with_app("app-1", "Flow", updated_at, "remote: v2\n")
}

fn sync(remote: &FakeRemote, config: &SyncConfig, entry: &AppMapping) -> SyncResult {
    let record = remote.fetch_record(&entry.app_id).expect("record should exist");
    PairSync::new(remote, config).sync(entry, &record)
}

#[test]
fn decide_action_uses_strict_inequality() {
    let remote = NormalizedTimestamp::At(at(REMOTE));
    let mode = SyncMode::Bidirectional;

    assert_eq!(decide_action(at(REMOTE), remote, mode, None), None);
    assert_eq!(
        decide_action(at(REMOTE - 1), remote, mode, None),
        Some(Transfer::Download)
    );
    assert_eq!(
        decide_action(at(REMOTE + 1), remote, mode, None),
        Some(Transfer::Upload)
    );
    assert_eq!(
        decide_action(at(REMOTE + 1), remote, SyncMode::DownloadOnly, None),
        None
    );
}

#[test]
fn decide_action_ignores_sub_second_differences() {
    let remote = NormalizedTimestamp::At(at(REMOTE));
    let local = at(REMOTE) + Duration::milliseconds(750);
    assert_eq!(decide_action(local, remote, SyncMode::Bidirectional, None), None);
}

#[test]
fn decide_action_unknown_never_moves_unless_forced() {
    for mode in [SyncMode::DownloadOnly, SyncMode::Bidirectional] {
        assert_eq!(
            decide_action(at(0), NormalizedTimestamp::Unknown, mode, None),
            None
        );
        assert_eq!(
            decide_action(at(0), NormalizedTimestamp::Unknown, mode, Some(Transfer::Download)),
            Some(Transfer::Download)
        );
    }
    assert_eq!(
        decide_action(
            at(REMOTE + 10),
            NormalizedTimestamp::At(at(REMOTE)),
            SyncMode::DownloadOnly,
            Some(Transfer::Upload)
        ),
        Some(Transfer::Upload)
    );
}

#[test]
fn older_local_file_downloads_remote_content() {
    let fixture = Fixture::new("dslsync-pair-download", OLD);
    let remote = remote_with(RawTimestamp::Int(REMOTE));

    let result = sync(&remote, &fixture.config, &fixture.entry);
    assert_eq!(result.action, SyncAction::Download);
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.filename, "Flow.yaml");
    assert_eq!(result.app_id, "app-1");
    assert_eq!(fixture.read(), "remote: v2\n");
    assert_eq!(mtime_secs(&fixture.path()), REMOTE as u64);
}

#[test]
fn repeated_runs_without_changes_settle_to_none() {
    let fixture = Fixture::new("dslsync-pair-idempotent", OLD);
    let remote = remote_with(RawTimestamp::Text("2023-01-01T00:00:00Z".to_string()));

    assert_eq!(
        sync(&remote, &fixture.config, &fixture.entry).action,
        SyncAction::Download
    );
    let second = sync(&remote, &fixture.config, &fixture.entry);
    let third = sync(&remote, &fixture.config, &fixture.entry);
    assert_eq!(second.action, SyncAction::None);
    assert_eq!(third.action, SyncAction::None);
    assert_eq!(remote.count(Op::FetchContent), 1);
}

#[test]
fn equal_timestamps_do_nothing_in_either_mode() {
    let mut fixture = Fixture::new("dslsync-pair-tie", REMOTE as u64);
    let remote = remote_with(RawTimestamp::Float(REMOTE as f64 + 0.9));

    for mode in [SyncMode::DownloadOnly, SyncMode::Bidirectional] {
        fixture.config.mode = mode;
        let result = sync(&remote, &fixture.config, &fixture.entry);
        assert_eq!(result.action, SyncAction::None);
        assert!(result.success);
    }
    assert_eq!(remote.count(Op::FetchContent), 0);
    assert_eq!(remote.count(Op::PushContent), 0);
}

#[test]
fn unusable_remote_timestamp_skips_sync() {
    let mut fixture = Fixture::new("dslsync-pair-unknown", NEWER);
    fixture.config.mode = SyncMode::Bidirectional;

    for raw in [
        RawTimestamp::Null,
        RawTimestamp::EmptyString,
        RawTimestamp::Text("yesterday-ish".to_string()),
        RawTimestamp::Other,
    ] {
        let remote = remote_with(raw);
        let result = sync(&remote, &fixture.config, &fixture.entry);
        assert_eq!(result.action, SyncAction::None);
        assert!(result.success);
        assert_eq!(remote.count(Op::PushContent), 0);
    }
    assert_eq!(fixture.read(), "local: v1\n");
}

#[test]
fn download_only_mode_never_uploads_newer_local_edits() {
    let fixture = Fixture::new("dslsync-pair-download-only", NEWER);
    let remote = remote_with(RawTimestamp::Int(REMOTE));

    let result = sync(&remote, &fixture.config, &fixture.entry);
    assert_eq!(result.action, SyncAction::None);
    assert_eq!(remote.count(Op::PushContent), 0);
}

#[test]
fn bidirectional_uploads_newer_local_file_and_settles() {
    let mut fixture = Fixture::new("dslsync-pair-upload", NEWER);
    fixture.config.mode = SyncMode::Bidirectional;
    let remote = remote_with(RawTimestamp::Int(REMOTE));
    remote.stamp_pushes_with(RawTimestamp::Int(NEWER as i64 + 5));

    let result = sync(&remote, &fixture.config, &fixture.entry);
    assert_eq!(result.action, SyncAction::Upload);
    assert!(result.success, "{:?}", result.error);
    assert_eq!(remote.content("app-1"), Some(b"local: v1\n".to_vec()));
    assert_eq!(mtime_secs(&fixture.path()), NEWER + 5);

    assert_eq!(
        sync(&remote, &fixture.config, &fixture.entry).action,
        SyncAction::None
    );
    assert_eq!(remote.count(Op::PushContent), 1);
}

#[test]
fn forced_direction_overrides_timestamps() {
    let mut fixture = Fixture::new("dslsync-pair-forced", NEWER);
    let remote = remote_with(RawTimestamp::Null);

    fixture.config.force = Some(Transfer::Download);
    let down = sync(&remote, &fixture.config, &fixture.entry);
    assert_eq!(down.action, SyncAction::Download);
    assert_eq!(fixture.read(), "remote: v2\n");

    std::fs::write(fixture.path(), "local: v3\n").expect("rewrite local");
    fixture.config.force = Some(Transfer::Upload);
    let up = sync(&remote, &fixture.config, &fixture.entry);
    assert_eq!(up.action, SyncAction::Upload);
    assert_eq!(remote.content("app-1"), Some(b"local: v3\n".to_vec()));
}

#[test]
fn missing_local_file_is_an_error_before_any_remote_call() {
    let fixture = Fixture::new("dslsync-pair-missing-local", OLD);
    std::fs::remove_file(fixture.path()).expect("remove local");
    let remote = remote_with(RawTimestamp::Int(REMOTE));
    let record = RemoteRecord::new("app-1", "Flow", RawTimestamp::Int(REMOTE));

    let result = PairSync::new(&remote, &fixture.config).sync(&fixture.entry, &record);
    assert_eq!(result.action, SyncAction::Error);
    assert!(!result.success);
    assert!(matches!(result.error, Some(PairError::StatLocal(_))));
    assert!(result
        .error
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default()
        .starts_with("failed to stat local file"));
    assert!(remote.calls().is_empty());
}

#[test]
fn transfer_failures_keep_their_action() {
    let mut fixture = Fixture::new("dslsync-pair-transfer-fail", OLD);
    let remote = remote_with(RawTimestamp::Int(REMOTE));
    remote.fail(Op::FetchContent, "app-1");
    remote.fail(Op::PushContent, "app-1");

    let down = sync(&remote, &fixture.config, &fixture.entry);
    assert_eq!(down.action, SyncAction::Download);
    assert!(!down.success);
    assert!(matches!(down.error, Some(PairError::FetchContent(_))));
    assert_eq!(fixture.read(), "local: v1\n");

    fixture.config.force = Some(Transfer::Upload);
    let up = sync(&remote, &fixture.config, &fixture.entry);
    assert_eq!(up.action, SyncAction::Upload);
    assert!(!up.success);
    assert!(matches!(up.error, Some(PairError::PushContent(_))));
}

#[test]
fn dry_run_reports_success_without_mutating() {
    let mut fixture = Fixture::new("dslsync-pair-dry-run", OLD);
    fixture.config.dry_run = true;
    let remote = remote_with(RawTimestamp::Int(REMOTE));

    let down = sync(&remote, &fixture.config, &fixture.entry);
    assert_eq!(down.action, SyncAction::Download);
    assert!(down.success);
    assert_eq!(fixture.read(), "local: v1\n");
    assert_eq!(mtime_secs(&fixture.path()), OLD);

    fixture.config.force = Some(Transfer::Upload);
    let up = sync(&remote, &fixture.config, &fixture.entry);
    assert_eq!(up.action, SyncAction::Upload);
    assert!(up.success);
    assert_eq!(remote.count(Op::PushContent), 0);
    assert_eq!(remote.content("app-1"), Some(b"remote: v2\n".to_vec()));
}

#[test]
fn sync_uses_the_given_record_without_lookups() {
    let fixture = Fixture::new("dslsync-pair-known", OLD);
    let remote = remote_with(RawTimestamp::Int(REMOTE));
    let record = RemoteRecord::new("app-1", "Flow", RawTimestamp::Int(REMOTE));

    let result = PairSync::new(&remote, &fixture.config).sync(&fixture.entry, &record);
    assert_eq!(result.action, SyncAction::Download);
    assert_eq!(remote.count(Op::RecordExists), 0);
    assert_eq!(remote.count(Op::FetchRecord), 0);
}
