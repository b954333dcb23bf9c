use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::thread;
use std::time::{Duration, UNIX_EPOCH};

use serde_json::Value;
use uuid::Uuid;

fn unique_workspace(prefix: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&path).expect("workspace should be creatable");
    path
}

fn dslsync(workspace: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_dslsync"));
    command
        .current_dir(workspace)
        .env_remove("DIFY_BASE_URL")
        .env_remove("DIFY_EMAIL")
        .env_remove("DIFY_PASSWORD")
        .env_remove("DSL_DIRECTORY")
        .env_remove("APP_MAP_FILE")
        .env_remove("DSLSYNC_CONFIG")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    command
}

fn with_credentials<'a>(command: &'a mut Command, base_url: &str) -> &'a mut Command {
    command
        .env("DIFY_BASE_URL", base_url)
        .env("DIFY_EMAIL", "ops@example.com")
        .env("DIFY_PASSWORD", "secret")
        .env("NO_PROXY", "127.0.0.1")
        .env("no_proxy", "127.0.0.1")
}

fn run(command: &mut Command) -> Output {
    command.output().expect("dslsync command should run")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "expected success but failed.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_failure(output: &Output) {
    assert!(
        !output.status.success(),
        "expected failure but command succeeded.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn write_map(workspace: &Path, entries: &[(&str, &str)]) {
    let apps: Vec<Value> = entries
        .iter()
        .map(|(filename, app_id)| serde_json::json!({"filename": filename, "app_id": app_id}))
        .collect();
    let doc = serde_json::json!({ "apps": apps });
    std::fs::write(
        workspace.join("app_map.json"),
        serde_json::to_string_pretty(&doc).expect("json"),
    )
    .expect("map should be writable");
}

/// Minimal app API answering one request per connection.
fn start_api(routes: fn(&str, &str) -> (u16, String)) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let addr = listener.local_addr().expect("listener address");
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let mut reader = BufReader::new(stream.try_clone().expect("stream clone"));
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
                continue;
            }
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or_default().to_string();
            let target = parts.next().unwrap_or_default().to_string();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut body);

            let (status, payload) = routes(&method, &target);
            let mut stream = stream;
            let response = format!(
                "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                payload.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    format!("http://{addr}")
}

#[test]
fn help_lists_subcommands() {
    let workspace = unique_workspace("dslsync-cli-help");
    let output = run(dslsync(&workspace).arg("--help"));
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("init"));
    assert!(stdout.contains("--bidirectional"));
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn completions_print_script() {
    let workspace = unique_workspace("dslsync-cli-completions");
    let output = run(dslsync(&workspace).args(["completions", "bash"]));
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("dslsync"));
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn missing_base_url_fails_with_hint() {
    let workspace = unique_workspace("dslsync-cli-no-url");
    let output = run(dslsync(&workspace)
        .env("DIFY_EMAIL", "ops@example.com")
        .env("DIFY_PASSWORD", "secret"));
    assert_failure(&output);
    assert!(stderr(&output).contains("DIFY_BASE_URL"), "{}", stderr(&output));
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn missing_map_points_to_init() {
    let workspace = unique_workspace("dslsync-cli-no-map");
    let output = run(with_credentials(&mut dslsync(&workspace), "http://127.0.0.1:9"));
    assert_failure(&output);
    let err = stderr(&output);
    assert!(err.starts_with("error: "), "{err}");
    assert!(err.contains("dslsync init"), "{err}");
    assert!(!workspace.join("app_map.json").exists());
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_config_key_is_rejected() {
    let workspace = unique_workspace("dslsync-cli-bad-config");
    std::fs::write(workspace.join("dslsync.toml"), "colour = \"blue\"\n").expect("config");
    let output = run(with_credentials(&mut dslsync(&workspace), "http://127.0.0.1:9"));
    assert_failure(&output);
    assert!(stderr(&output).contains("invalid config"), "{}", stderr(&output));
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn explicit_missing_config_file_fails() {
    let workspace = unique_workspace("dslsync-cli-missing-config");
    let output = run(
        with_credentials(&mut dslsync(&workspace), "http://127.0.0.1:9")
            .args(["--config", "nope.toml"]),
    );
    assert_failure(&output);
    assert!(stderr(&output).contains("nope.toml"), "{}", stderr(&output));
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn init_refuses_existing_map() {
    let workspace = unique_workspace("dslsync-cli-init-existing");
    write_map(&workspace, &[("Flow.yaml", "app-1")]);
    let output = run(with_credentials(&mut dslsync(&workspace), "http://127.0.0.1:9").arg("init"));
    assert_failure(&output);
    assert!(stderr(&output).contains("--force-init"), "{}", stderr(&output));
    let _ = std::fs::remove_dir_all(workspace);
}

fn sync_routes(_method: &str, target: &str) -> (u16, String) {
    match target {
        "/console/api/login" => (
            200,
            r#"{"result":"success","data":{"access_token":"cli-token"}}"#.to_string(),
        ),
        "/console/api/apps/app-1" => (
            200,
            r#"{"id":"app-1","name":"Flow","updated_at":1672531200}"#.to_string(),
        ),
        "/console/api/apps/app-1/export?include_secret=false" => {
            (200, r#"{"data":"app:\n  name: Flow\n"}"#.to_string())
        }
        "/console/api/apps/app-gone" => (404, r#"{"code":"not_found"}"#.to_string()),
        _ => (500, "{}".to_string()),
    }
}

#[test]
fn sync_downloads_deletes_and_reports_json() {
    let workspace = unique_workspace("dslsync-cli-sync");
    let dsl = workspace.join("dsl");
    std::fs::create_dir_all(&dsl).expect("dsl dir");
    std::fs::write(dsl.join("Flow.yaml"), "stale\n").expect("local file");
    std::fs::File::options()
        .write(true)
        .open(dsl.join("Flow.yaml"))
        .and_then(|file| file.set_modified(UNIX_EPOCH + Duration::from_secs(1_600_000_000)))
        .expect("mtime");
    std::fs::write(dsl.join("Gone.yaml"), "gone\n").expect("gone file");
    write_map(&workspace, &[("Flow.yaml", "app-1"), ("Gone.yaml", "app-gone")]);
    let base_url = start_api(sync_routes);

    let output = run(with_credentials(&mut dslsync(&workspace), &base_url).arg("--json"));
    assert_success(&output);

    let stats: Value = serde_json::from_slice(&output.stdout).expect("stats JSON");
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["downloads"], 2);
    assert_eq!(stats["deleted"], 1);
    assert_eq!(stats["errors"], 0);
    assert_eq!(stats["map_persisted"], true);

    assert_eq!(
        std::fs::read_to_string(dsl.join("Flow.yaml")).expect("downloaded"),
        "app:\n  name: Flow\n"
    );
    assert!(!dsl.join("Gone.yaml").exists());
    let map: Value = serde_json::from_str(
        &std::fs::read_to_string(workspace.join("app_map.json")).expect("map"),
    )
    .expect("map JSON");
    assert_eq!(map["apps"].as_array().map(Vec::len), Some(1));

    // Nothing left to do on the second pass.
    let again = run(with_credentials(&mut dslsync(&workspace), &base_url).arg("--json"));
    assert_success(&again);
    let stats: Value = serde_json::from_slice(&again.stdout).expect("stats JSON");
    assert_eq!(stats["no_action"], 1);
    assert_eq!(stats["downloads"], 0);

    let _ = std::fs::remove_dir_all(workspace);
}
