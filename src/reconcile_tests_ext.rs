use std::path::{Path, PathBuf};

use super::{EntryError, EntryOutcome, Reconciler, RunReport};
use crate::config::SyncConfig;
use crate::mapping::{self, AppMap, AppMapping, MappingError, SaveMode};
use crate::pair::SyncAction;
use crate::remote::RemoteApps;
use crate::test_support::{sync_config, unique_dir, write_with_mtime, FakeRemote, Op};
use crate::timestamp::RawTimestamp;

const REMOTE: i64 = 1_672_531_200;
const SETTLED: u64 = REMOTE as u64;
const STALE: u64 = 1_600_000_000;

struct Workspace {
    root: PathBuf,
    config: SyncConfig,
}

impl Workspace {
    fn new(prefix: &str) -> Self {
        let root = unique_dir(prefix);
        let config = sync_config(&root);
        std::fs::create_dir_all(&config.dsl_directory).expect("dsl dir");
        Self { root, config }
    }

    fn file(&self, name: &str) -> PathBuf {
        self.config.dsl_directory.join(name)
    }

    fn write(&self, name: &str, content: &str, mtime: u64) {
        write_with_mtime(&self.file(name), content, mtime);
    }

    fn save_map(&self, entries: &[(&str, &str)]) -> AppMap {
        let map = map_of(entries);
        mapping::save(&self.config.mapping_file, &map, SaveMode::CreateParents)
            .expect("map should save");
        map
    }

    fn saved_map(&self) -> AppMap {
        mapping::load(&self.config.mapping_file).expect("map should load")
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn map_of(entries: &[(&str, &str)]) -> AppMap {
    AppMap {
        apps: entries
            .iter()
            .map(|(filename, app_id)| AppMapping::new(*filename, *app_id))
            .collect(),
    }
}

fn filenames(map: &AppMap) -> Vec<&str> {
    map.apps.iter().map(|entry| entry.filename.as_str()).collect()
}

fn run(remote: &dyn RemoteApps, config: &SyncConfig) -> Result<RunReport, MappingError> {
    let map = mapping::load(&config.mapping_file)?;
    Ok(Reconciler::new(remote, config).run_with(map))
}

fn exists(path: &Path) -> bool {
    path.exists()
}

#[test]
fn missing_map_is_fatal_and_points_to_init() {
    let ws = Workspace::new("dslsync-reconcile-no-map");
    let remote = FakeRemote::new();

    let err = run(&remote, &ws.config).expect_err("missing map should be fatal");
    assert!(matches!(err, MappingError::NotFound(_)));
    assert!(err.to_string().contains("dslsync init"), "{err}");
    assert!(remote.calls().is_empty());
    assert!(!exists(&ws.config.mapping_file));
}

#[test]
fn deleted_remote_removes_local_file_and_entry() {
    let ws = Workspace::new("dslsync-reconcile-delete");
    ws.write("Gone.yaml", "gone\n", SETTLED);
    ws.write("Kept.yaml", "kept\n", SETTLED);
    ws.save_map(&[("Gone.yaml", "app-1"), ("Kept.yaml", "app-2")]);
    let remote = FakeRemote::new().with_app("app-2", "Kept", RawTimestamp::Int(REMOTE), "kept\n");

    let report = run(&remote, &ws.config).expect("run");

    assert!(!exists(&ws.file("Gone.yaml")));
    assert!(exists(&ws.file("Kept.yaml")));
    assert_eq!(report.stats.total, 2);
    assert_eq!(report.stats.downloads, 1);
    assert_eq!(report.stats.deleted, 1);
    assert_eq!(report.stats.no_action, 1);
    assert_eq!(report.stats.errors, 0);
    assert!(report.persisted);
    assert!(report.is_success());
    assert_eq!(filenames(&ws.saved_map()), vec!["Kept.yaml"]);
}

#[test]
fn deletion_with_local_file_already_missing_still_drops_entry() {
    let ws = Workspace::new("dslsync-reconcile-delete-missing");
    ws.save_map(&[("Gone.yaml", "app-1")]);
    let remote = FakeRemote::new();

    let report = run(&remote, &ws.config).expect("run");
    assert_eq!(report.stats.deleted, 1);
    assert_eq!(report.stats.errors, 0);
    assert!(ws.saved_map().is_empty());
}

#[test]
fn removal_failure_keeps_entry_and_counts_error() {
    let ws = Workspace::new("dslsync-reconcile-delete-fail");
    std::fs::create_dir_all(ws.file("Stuck.yaml").join("nested")).expect("blocking dir");
    let original = ws.save_map(&[("Stuck.yaml", "app-1")]);
    let remote = FakeRemote::new();

    let report = run(&remote, &ws.config).expect("run");
    assert_eq!(report.stats.errors, 1);
    assert_eq!(report.stats.deleted, 0);
    assert!(matches!(
        report.outcomes[0],
        EntryOutcome::Failed {
            error: EntryError::Remove(_),
            ..
        }
    ));
    assert!(!report.persisted);
    assert_eq!(report.map, original);
    assert!(!report.is_success());
}

#[test]
fn renamed_remote_renames_local_file_without_content_sync() {
    let ws = Workspace::new("dslsync-reconcile-rename");
    ws.write("Original_App.yaml", "v1\n", STALE);
    ws.save_map(&[("Original_App.yaml", "app-id-1")]);
    let remote =
        FakeRemote::new().with_app("app-id-1", "Changed App", RawTimestamp::Int(REMOTE), "v2\n");

    let report = run(&remote, &ws.config).expect("run");

    assert!(!exists(&ws.file("Original_App.yaml")));
    assert_eq!(
        std::fs::read_to_string(ws.file("Changed_App.yaml")).expect("renamed file"),
        "v1\n"
    );
    assert_eq!(report.stats.renamed, 1);
    assert_eq!(report.stats.downloads, 0);
    assert_eq!(remote.count(Op::FetchContent), 0);
    assert_eq!(filenames(&ws.saved_map()), vec!["Changed_App.yaml"]);

    // The content catches up on the next pass.
    let next = run(&remote, &ws.config).expect("second run");
    assert_eq!(next.stats.downloads, 1);
    assert_eq!(next.stats.renamed, 0);
}

#[test]
fn rename_handles_non_latin_names_and_keeps_extension() {
    let ws = Workspace::new("dslsync-reconcile-rename-unicode");
    ws.write("日本語アプリ.yaml", "ja\n", SETTLED);
    ws.write("legacy.yml", "yml\n", SETTLED);
    ws.save_map(&[("日本語アプリ.yaml", "app-ja"), ("legacy.yml", "app-yml")]);
    let remote = FakeRemote::new()
        .with_app("app-ja", "変更された日本語アプリ", RawTimestamp::Int(REMOTE), "ja\n")
        .with_app("app-yml", "New Name", RawTimestamp::Int(REMOTE), "yml\n");

    let report = run(&remote, &ws.config).expect("run");
    assert_eq!(report.stats.renamed, 2);
    assert!(exists(&ws.file("変更された日本語アプリ.yaml")));
    assert!(exists(&ws.file("New_Name.yml")));
    assert_eq!(
        filenames(&ws.saved_map()),
        vec!["変更された日本語アプリ.yaml", "New_Name.yml"]
    );
}

#[test]
fn duplicate_names_get_distinct_suffixes_around_unrelated_file() {
    let ws = Workspace::new("dslsync-reconcile-duplicates");
    ws.write("Duplicate_App.yaml", "unrelated\n", SETTLED);
    ws.write("first.yaml", "one\n", SETTLED);
    ws.write("second.yaml", "two\n", SETTLED);
    ws.save_map(&[("first.yaml", "app-1"), ("second.yaml", "app-2")]);
    let remote = FakeRemote::new()
        .with_app("app-1", "Duplicate App", RawTimestamp::Int(REMOTE), "one\n")
        .with_app("app-2", "Duplicate App", RawTimestamp::Int(REMOTE), "two\n");

    let report = run(&remote, &ws.config).expect("run");

    assert_eq!(
        filenames(&report.map),
        vec!["Duplicate_App_1.yaml", "Duplicate_App_2.yaml"]
    );
    assert_eq!(
        std::fs::read_to_string(ws.file("Duplicate_App.yaml")).expect("unrelated file"),
        "unrelated\n"
    );
    assert_eq!(
        std::fs::read_to_string(ws.file("Duplicate_App_2.yaml")).expect("second file"),
        "two\n"
    );
}

#[test]
fn settled_duplicates_are_not_shuffled() {
    let ws = Workspace::new("dslsync-reconcile-stable");
    ws.write("Duplicate_App_1.yaml", "one\n", SETTLED);
    ws.write("Duplicate_App.yaml", "two\n", SETTLED);
    ws.save_map(&[("Duplicate_App_1.yaml", "app-1"), ("Duplicate_App.yaml", "app-2")]);
    let remote = FakeRemote::new()
        .with_app("app-1", "Duplicate App", RawTimestamp::Int(REMOTE), "one\n")
        .with_app("app-2", "Duplicate App", RawTimestamp::Int(REMOTE), "two\n");

    let report = run(&remote, &ws.config).expect("run");
    assert_eq!(report.stats.renamed, 0);
    assert_eq!(report.stats.no_action, 2);
    assert!(!report.persisted);
}

#[test]
fn entry_errors_do_not_stop_the_run() {
    let ws = Workspace::new("dslsync-reconcile-continue");
    ws.write("Broken.yaml", "b\n", STALE);
    ws.write("Fine.yaml", "f\n", STALE);
    ws.save_map(&[("Broken.yaml", "app-1"), ("Fine.yaml", "app-2")]);
    let remote = FakeRemote::new()
        .with_app("app-1", "Broken", RawTimestamp::Int(REMOTE), "b2\n")
        .with_app("app-2", "Fine", RawTimestamp::Int(REMOTE), "f2\n");
    remote.fail(Op::FetchRecord, "app-1");

    let report = run(&remote, &ws.config).expect("run");
    match &report.outcomes[0] {
        EntryOutcome::Failed { error, .. } => {
            assert!(matches!(error, EntryError::AppInfo(_)));
            assert!(error.to_string().starts_with("failed to get app info"));
        }
        other => panic!("expected entry failure, got {other:?}"),
    }
    assert_eq!(report.stats.errors, 1);
    assert_eq!(report.stats.downloads, 1);
    assert_eq!(
        std::fs::read_to_string(ws.file("Fine.yaml")).expect("fine file"),
        "f2\n"
    );
    assert_eq!(filenames(&report.map), vec!["Broken.yaml", "Fine.yaml"]);
    assert!(!report.is_success());
}

#[test]
fn failed_transfers_count_as_errors_not_downloads() {
    let ws = Workspace::new("dslsync-reconcile-failed-transfer");
    ws.write("Flow.yaml", "old\n", STALE);
    ws.save_map(&[("Flow.yaml", "app-1")]);
    let remote = FakeRemote::new().with_app("app-1", "Flow", RawTimestamp::Int(REMOTE), "new\n");
    remote.fail(Op::FetchContent, "app-1");

    let report = run(&remote, &ws.config).expect("run");
    assert_eq!(report.stats.errors, 1);
    assert_eq!(report.stats.downloads, 0);
    match &report.outcomes[0] {
        EntryOutcome::Synced(result) => assert_eq!(result.action, SyncAction::Download),
        other => panic!("expected sync outcome, got {other:?}"),
    }
}

#[test]
fn dry_run_classifies_everything_but_touches_nothing() {
    let mut ws = Workspace::new("dslsync-reconcile-dry-run");
    ws.config.dry_run = true;
    ws.write("Gone.yaml", "gone\n", SETTLED);
    ws.write("Old_Name.yaml", "rename\n", SETTLED);
    ws.write("Stale.yaml", "stale\n", STALE);
    let original = ws.save_map(&[
        ("Gone.yaml", "app-1"),
        ("Old_Name.yaml", "app-2"),
        ("Stale.yaml", "app-3"),
    ]);
    let remote = FakeRemote::new()
        .with_app("app-2", "New Name", RawTimestamp::Int(REMOTE), "rename\n")
        .with_app("app-3", "Stale", RawTimestamp::Int(REMOTE), "fresh\n");

    let report = run(&remote, &ws.config).expect("run");

    assert_eq!(report.stats.deleted, 1);
    assert_eq!(report.stats.renamed, 1);
    assert_eq!(report.stats.downloads, 2);
    assert_eq!(report.stats.errors, 0);
    assert!(!report.persisted);
    assert!(exists(&ws.file("Gone.yaml")));
    assert!(exists(&ws.file("Old_Name.yaml")));
    assert!(!exists(&ws.file("New_Name.yaml")));
    assert_eq!(
        std::fs::read_to_string(ws.file("Stale.yaml")).expect("stale file"),
        "stale\n"
    );
    assert_eq!(ws.saved_map(), original);
}

#[test]
fn persist_failure_is_reported_after_processing() {
    let ws = Workspace::new("dslsync-reconcile-persist-fail");
    let mut config = ws.config.clone();
    config.mapping_file = ws.root.join("missing-dir").join("app_map.json");
    let remote = FakeRemote::new();

    let report = Reconciler::new(&remote, &config).run_with(map_of(&[("Gone.yaml", "app-1")]));
    assert_eq!(report.stats.deleted, 1);
    assert!(!report.persisted);
    assert!(report.persist_error.is_some());
    assert!(!report.is_success());
    assert!(!exists(&config.mapping_file));
}

// (renamed, deleted, no_action, filenames) for a real run and a dry run of
// the same fixture.
fn real_and_dry(
    prefix: &str,
    files: &[&str],
    entries: &[(&str, &str)],
    remote: impl Fn() -> FakeRemote,
) -> [(usize, usize, usize, Vec<String>); 2] {
    [false, true].map(|dry_run| {
        let mut ws = Workspace::new(prefix);
        ws.config.dry_run = dry_run;
        for name in files {
            ws.write(name, "body\n", SETTLED);
        }
        ws.save_map(entries);
        let report = run(&remote(), &ws.config).expect("run");
        (
            report.stats.renamed,
            report.stats.deleted,
            report.stats.no_action,
            filenames(&report.map).into_iter().map(str::to_string).collect(),
        )
    })
}

#[test]
fn dry_run_treats_names_freed_earlier_in_the_run_as_free() {
    // app-1 moves off X.yaml, so app-2 can take it.
    let [real, dry] = real_and_dry(
        "dslsync-reconcile-freed-by-rename",
        &["X.yaml", "X_1.yaml"],
        &[("X.yaml", "app-1"), ("X_1.yaml", "app-2")],
        || {
            FakeRemote::new()
                .with_app("app-1", "Y", RawTimestamp::Int(REMOTE), "body\n")
                .with_app("app-2", "X", RawTimestamp::Int(REMOTE), "body\n")
        },
    );
    assert_eq!(real, (2, 0, 0, vec!["Y.yaml".to_string(), "X.yaml".to_string()]));
    assert_eq!(dry, real);

    // app-1 is gone remotely, so Flow.yaml is free for app-2.
    let [real, dry] = real_and_dry(
        "dslsync-reconcile-freed-by-delete",
        &["Flow.yaml", "Flow_1.yaml"],
        &[("Flow.yaml", "app-1"), ("Flow_1.yaml", "app-2")],
        || FakeRemote::new().with_app("app-2", "Flow", RawTimestamp::Int(REMOTE), "body\n"),
    );
    assert_eq!(real, (1, 1, 0, vec!["Flow.yaml".to_string()]));
    assert_eq!(dry, real);
}
