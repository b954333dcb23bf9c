use super::{initialize, InitError};
use crate::mapping;
use crate::test_support::{mtime_secs, sync_config, unique_dir, FakeRemote, Op};
use crate::timestamp::RawTimestamp;

const REMOTE: i64 = 1_672_531_200;

fn filenames(map: &mapping::AppMap) -> Vec<String> {
    map.apps.iter().map(|entry| entry.filename.clone()).collect()
}

#[test]
fn builds_map_and_downloads_every_app() {
    let root = unique_dir("dslsync-init-basic");
    let config = sync_config(&root);
    let remote = FakeRemote::new()
        .with_app("app-1", "Customer Support", RawTimestamp::Int(REMOTE), "a: 1\n")
        .with_app("app-2", "日本語アプリ", RawTimestamp::Null, "b: 2\n")
        .with_app("app-3", "a/b:c", RawTimestamp::Int(REMOTE), "c: 3\n");

    let report = initialize(&remote, &config, false).expect("init should succeed");

    assert!(report.saved);
    assert!(report.warnings.is_empty());
    assert_eq!(
        filenames(&report.map),
        vec!["Customer_Support.yaml", "日本語アプリ.yaml", "abc.yaml"]
    );
    assert_eq!(report.downloaded.len(), 3);
    let saved = mapping::load(&config.mapping_file).expect("map should load");
    assert_eq!(saved, report.map);

    let support = config.dsl_directory.join("Customer_Support.yaml");
    assert_eq!(
        std::fs::read_to_string(&support).expect("downloaded"),
        "a: 1\n"
    );
    assert_eq!(mtime_secs(&support), REMOTE as u64);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn duplicate_names_avoid_each_other_and_existing_files() {
    let root = unique_dir("dslsync-init-duplicates");
    let config = sync_config(&root);
    std::fs::create_dir_all(&config.dsl_directory).expect("dsl dir");
    std::fs::write(config.dsl_directory.join("Duplicate_App.yaml"), "mine\n")
        .expect("unrelated file");
    let remote = FakeRemote::new()
        .with_app("app-1", "Duplicate App", RawTimestamp::Int(REMOTE), "one\n")
        .with_app("app-2", "Duplicate App", RawTimestamp::Int(REMOTE), "two\n");

    let report = initialize(&remote, &config, false).expect("init should succeed");

    assert_eq!(
        filenames(&report.map),
        vec!["Duplicate_App_1.yaml", "Duplicate_App_2.yaml"]
    );
    assert_eq!(
        std::fs::read_to_string(config.dsl_directory.join("Duplicate_App.yaml"))
            .expect("unrelated file"),
        "mine\n"
    );

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn download_failures_are_warnings() {
    let root = unique_dir("dslsync-init-warnings");
    let config = sync_config(&root);
    let remote = FakeRemote::new()
        .with_app("app-1", "Broken", RawTimestamp::Int(REMOTE), "x\n")
        .with_app("app-2", "Fine", RawTimestamp::Int(REMOTE), "y\n");
    remote.fail(Op::FetchContent, "app-1");

    let report = initialize(&remote, &config, false).expect("init should succeed");
    assert_eq!(report.map.len(), 2);
    assert_eq!(report.downloaded, vec!["Fine.yaml".to_string()]);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("Broken"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn refuses_to_overwrite_existing_map_without_force() {
    let root = unique_dir("dslsync-init-existing");
    let config = sync_config(&root);
    let remote = FakeRemote::new().with_app("app-1", "Flow", RawTimestamp::Int(REMOTE), "x\n");
    initialize(&remote, &config, false).expect("first init");

    let err = initialize(&remote, &config, false).expect_err("second init should refuse");
    assert!(matches!(err, InitError::AlreadyInitialized(_)));
    assert!(err.to_string().contains("--force-init"));

    remote.insert("app-2", "Second", RawTimestamp::Int(REMOTE), "y\n");
    let rebuilt = initialize(&remote, &config, true).expect("forced init");
    assert_eq!(filenames(&rebuilt.map), vec!["Flow.yaml", "Second.yaml"]);
    assert_eq!(rebuilt.downloaded, vec!["Second.yaml".to_string()]);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn empty_account_is_an_error() {
    let root = unique_dir("dslsync-init-empty");
    let config = sync_config(&root);
    let remote = FakeRemote::new();

    let err = initialize(&remote, &config, false).expect_err("no apps should fail");
    assert!(matches!(err, InitError::NoApps));
    assert!(!config.mapping_file.exists());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn list_failure_surfaces_api_error() {
    let root = unique_dir("dslsync-init-list-fail");
    let config = sync_config(&root);
    let remote = FakeRemote::new().with_app("app-1", "Flow", RawTimestamp::Int(REMOTE), "x\n");
    remote.fail(Op::ListRecords, "");

    let err = initialize(&remote, &config, false).expect_err("list failure");
    assert!(matches!(err, InitError::Api(_)));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn dry_run_reads_content_but_writes_nothing() {
    let root = unique_dir("dslsync-init-dry-run");
    let mut config = sync_config(&root);
    config.dry_run = true;
    let remote = FakeRemote::new().with_app("app-1", "Flow", RawTimestamp::Int(REMOTE), "x\n");

    let report = initialize(&remote, &config, false).expect("dry run init");
    assert!(!report.saved);
    assert_eq!(filenames(&report.map), vec!["Flow.yaml"]);
    assert!(!config.dsl_directory.exists());
    assert!(!config.mapping_file.exists());
    assert_eq!(remote.count(Op::FetchContent), 1);
    assert_eq!(report.downloaded, vec!["Flow.yaml".to_string()]);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn app_listed_twice_is_mapped_once() {
    let root = unique_dir("dslsync-init-repeated-listing");
    let config = sync_config(&root);
    let remote = FakeRemote::new()
        .with_app("app-1", "Flow", RawTimestamp::Int(REMOTE), "x\n")
        .with_app("app-2", "Other", RawTimestamp::Int(REMOTE), "y\n")
        .with_app("app-1", "Flow", RawTimestamp::Int(REMOTE), "x\n");

    let report = initialize(&remote, &config, false).expect("init should succeed");
    assert_eq!(filenames(&report.map), vec!["Flow.yaml", "Other.yaml"]);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("app-1"), "{:?}", report.warnings);
    assert!(!config.dsl_directory.join("Flow_1.yaml").exists());

    let saved = mapping::load(&config.mapping_file).expect("saved map should load");
    assert_eq!(saved, report.map);

    let _ = std::fs::remove_dir_all(root);
}
