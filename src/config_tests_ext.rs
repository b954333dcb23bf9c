use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{
    load_file_config, Config, ConfigError, ConfigInputs, FileConfig, SyncMode, Transfer,
    DEFAULT_CONFIG_FILE,
};

fn unique_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn credentials() -> ConfigInputs {
    ConfigInputs {
        base_url: Some("https://dify.example.com/".to_string()),
        email: Some("ops@example.com".to_string()),
        password: Some("secret".to_string()),
        ..ConfigInputs::default()
    }
}

#[test]
fn defaults_apply_when_nothing_else_is_set() {
    let cwd = Path::new("/work");
    let config =
        Config::resolve(&credentials(), FileConfig::default(), cwd).expect("config resolves");

    assert_eq!(config.remote.base_url, "https://dify.example.com");
    assert_eq!(config.remote.timeout, Duration::from_secs(30));
    assert_eq!(config.sync.dsl_directory, PathBuf::from("/work/dsl"));
    assert_eq!(config.sync.mapping_file, PathBuf::from("/work/app_map.json"));
    assert_eq!(config.sync.mode, SyncMode::DownloadOnly);
    assert_eq!(config.sync.force, None);
    assert!(!config.sync.dry_run);
}

#[test]
fn flags_override_file_values() {
    let file = FileConfig {
        base_url: Some("https://from-file.example.com".to_string()),
        dsl_dir: Some(PathBuf::from("flows")),
        app_map: Some(PathBuf::from("/etc/dslsync/map.json")),
        mode: Some(SyncMode::Bidirectional),
        force: Some(Transfer::Download),
        timeout_secs: Some(5),
    };
    let inputs = ConfigInputs {
        dsl_dir: Some(PathBuf::from("/abs/dsl")),
        force: Some(Transfer::Upload),
        dry_run: true,
        ..credentials()
    };

    let config = Config::resolve(&inputs, file, Path::new("/work")).expect("config resolves");
    assert_eq!(config.remote.base_url, "https://dify.example.com");
    assert_eq!(config.sync.dsl_directory, PathBuf::from("/abs/dsl"));
    assert_eq!(config.sync.mapping_file, PathBuf::from("/etc/dslsync/map.json"));
    assert_eq!(config.sync.mode, SyncMode::Bidirectional);
    assert_eq!(config.sync.force, Some(Transfer::Upload));
    assert_eq!(config.remote.timeout, Duration::from_secs(5));
    assert!(config.sync.dry_run);
}

#[test]
fn file_base_url_fills_in_when_flag_absent() {
    let inputs = ConfigInputs {
        base_url: None,
        ..credentials()
    };
    let file = FileConfig {
        base_url: Some("https://from-file.example.com".to_string()),
        ..FileConfig::default()
    };
    let config = Config::resolve(&inputs, file, Path::new("/work")).expect("config resolves");
    assert_eq!(config.remote.base_url, "https://from-file.example.com");
}

#[test]
fn bidirectional_flag_selects_mode() {
    let inputs = ConfigInputs {
        bidirectional: true,
        ..credentials()
    };
    let config = Config::resolve(&inputs, FileConfig::default(), Path::new("/work"))
        .expect("config resolves");
    assert_eq!(config.sync.mode, SyncMode::Bidirectional);
}

#[test]
fn missing_required_values_name_flag_and_env() {
    let cases = [
        (
            ConfigInputs {
                base_url: None,
                ..credentials()
            },
            "DIFY_BASE_URL",
        ),
        (
            ConfigInputs {
                email: Some("   ".to_string()),
                ..credentials()
            },
            "DIFY_EMAIL",
        ),
        (
            ConfigInputs {
                password: None,
                ..credentials()
            },
            "DIFY_PASSWORD",
        ),
    ];

    for (inputs, env) in cases {
        let err = Config::resolve(&inputs, FileConfig::default(), Path::new("/work"))
            .expect_err("missing value should fail");
        assert!(matches!(err, ConfigError::Missing { .. }));
        assert!(err.to_string().contains(env), "{err}");
    }
}

#[test]
fn password_is_redacted_from_debug_output() {
    let config = Config::resolve(&credentials(), FileConfig::default(), Path::new("/work"))
        .expect("config resolves");
    let debug = format!("{:?}", config.remote);
    assert!(!debug.contains("secret"));
    assert!(debug.contains("<redacted>"));
}

#[test]
fn default_config_file_is_optional_but_explicit_one_is_not() {
    let dir = unique_dir("dslsync-config-optional");

    let absent = load_file_config(None, &dir).expect("absent default file is fine");
    assert_eq!(absent, FileConfig::default());

    let err = load_file_config(Some(Path::new("missing.toml")), &dir)
        .expect_err("explicit missing file should fail");
    assert!(matches!(err, ConfigError::Read { .. }));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn parses_toml_file_and_rejects_unknown_keys() {
    let dir = unique_dir("dslsync-config-toml");
    std::fs::write(
        dir.join(DEFAULT_CONFIG_FILE),
        "base_url = \"https://dify.internal\"\ndsl_dir = \"flows\"\nmode = \"bidirectional\"\nforce = \"download\"\ntimeout_secs = 12\n",
    )
    .expect("config should be writable");

    let file = load_file_config(None, &dir).expect("config should parse");
    assert_eq!(file.base_url.as_deref(), Some("https://dify.internal"));
    assert_eq!(file.dsl_dir, Some(PathBuf::from("flows")));
    assert_eq!(file.mode, Some(SyncMode::Bidirectional));
    assert_eq!(file.force, Some(Transfer::Download));
    assert_eq!(file.timeout_secs, Some(12));

    std::fs::write(dir.join("bad.toml"), "password = \"leak\"\n").expect("writable");
    let err = load_file_config(Some(Path::new("bad.toml")), &dir)
        .expect_err("credentials are not accepted from the file");
    assert!(matches!(err, ConfigError::Parse { .. }));

    let _ = std::fs::remove_dir_all(dir);
}
