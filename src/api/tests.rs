use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;

use super::{ApiError, DifyClient};
use crate::remote::RemoteApps;
use crate::timestamp::RawTimestamp;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    target: String,
    authorization: Option<String>,
    body: String,
}

type Handler = dyn Fn(&str, &str) -> (u16, String) + Send + Sync;

struct TestServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, &str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                serve_one(stream, handler.as_ref(), &recorded);
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("request log lock").clone()
    }
}

fn serve_one(stream: TcpStream, handler: &Handler, log: &Mutex<Vec<Recorded>>) {
    let mut reader = BufReader::new(stream.try_clone().expect("stream should clone"));
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut authorization = None;
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
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("authorization") {
                authorization = Some(value.to_string());
            }
        }
    }
    let mut body = vec![0u8; content_length];
    let _ = reader.read_exact(&mut body);
    let body = String::from_utf8_lossy(&body).to_string();

    let (status, payload) = handler(&method, &target);
    log.lock().expect("request log lock").push(Recorded {
        method,
        target,
        authorization,
        body,
    });

    let mut stream = stream;
    let response = format!(
        "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn login_ok() -> (u16, String) {
    (
        200,
        r#"{"result":"success","data":{"access_token":"test-token"}}"#.to_string(),
    )
}

fn local_client(base_url: &str) -> DifyClient {
    let http = reqwest::blocking::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("http client should build");
    DifyClient::with_http(http, base_url)
}

fn logged_in(server: &TestServer) -> DifyClient {
    let mut client = local_client(&server.base_url);
    client
        .login("ops@example.com", "secret")
        .expect("login should succeed");
    client
}

#[test]
fn login_stores_token_and_sends_credentials() {
    let server = TestServer::start(|_, target| match target {
        "/console/api/login" => login_ok(),
        _ => (404, "{}".to_string()),
    });

    let client = logged_in(&server);
    assert_eq!(client.token.as_deref(), Some("test-token"));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    let body: Value = serde_json::from_str(&requests[0].body).expect("login body is JSON");
    assert_eq!(body["email"], "ops@example.com");
    assert_eq!(body["password"], "secret");
}

#[test]
fn login_failure_reports_status_and_body() {
    let server = TestServer::start(|_, _| (401, r#"{"message":"bad credentials"}"#.to_string()));
    let mut client = local_client(&server.base_url);

    let err = client
        .login("ops@example.com", "wrong")
        .expect_err("login should fail");
    match &err {
        ApiError::Status { status, body, .. } => {
            assert_eq!(*status, 401);
            assert!(body.contains("bad credentials"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert!(client.token.is_none());
}

#[test]
fn calls_before_login_are_rejected() {
    let client =
        DifyClient::new("http://127.0.0.1:9", Duration::from_secs(1)).expect("client should build");
    assert!(matches!(
        client.fetch_record("app-1"),
        Err(ApiError::NotAuthenticated)
    ));
    assert!(matches!(
        client.push_content("app-1", b"x"),
        Err(ApiError::NotAuthenticated)
    ));
}

#[test]
fn fetch_record_reads_wrapped_and_bare_payloads() {
    let server = TestServer::start(|_, target| match target {
        "/console/api/login" => login_ok(),
        "/console/api/apps/wrapped" => (
            200,
            r#"{"data":{"id":"wrapped","name":"Wrapped App","updated_at":"2023-01-02T15:04:05Z"}}"#
                .to_string(),
        ),
        "/console/api/apps/bare" => (
            200,
            r#"{"id":"bare","name":"Bare App","updated_at":1672531200}"#.to_string(),
        ),
        _ => (404, "{}".to_string()),
    });
    let client = logged_in(&server);

    let wrapped = client.fetch_record("wrapped").expect("wrapped record");
    assert_eq!(wrapped.name, "Wrapped App");
    assert_eq!(
        wrapped.updated_at,
        RawTimestamp::Text("2023-01-02T15:04:05Z".to_string())
    );

    let bare = client.fetch_record("bare").expect("bare record");
    assert_eq!(bare.id, "bare");
    assert_eq!(bare.updated_at, RawTimestamp::Int(1_672_531_200));

    let requests = server.requests();
    assert_eq!(
        requests[1].authorization.as_deref(),
        Some("Bearer test-token")
    );
}

#[test]
fn fetch_content_unwraps_export_payload() {
    let server = TestServer::start(|_, target| match target {
        "/console/api/login" => login_ok(),
        "/console/api/apps/app-1/export?include_secret=false" => (
            200,
            r#"{"data":"app:\n  name: Flow\n"}"#.to_string(),
        ),
        _ => (404, "{}".to_string()),
    });
    let client = logged_in(&server);

    let content = client.fetch_content("app-1").expect("content should download");
    assert_eq!(content, b"app:\n  name: Flow\n");
}

#[test]
fn record_exists_maps_404_to_false_and_other_errors_through() {
    let server = TestServer::start(|_, target| match target {
        "/console/api/login" => login_ok(),
        "/console/api/apps/present" => (200, r#"{"id":"present"}"#.to_string()),
        "/console/api/apps/gone" => (404, r#"{"code":"not_found"}"#.to_string()),
        _ => (500, "boom".to_string()),
    });
    let client = logged_in(&server);

    assert!(client.record_exists("present").expect("exists check"));
    assert!(!client.record_exists("gone").expect("exists check"));
    let err = client
        .record_exists("broken")
        .expect_err("500 should be an error");
    assert!(matches!(err, ApiError::Status { status: 500, .. }));
}

#[test]
fn push_content_posts_yaml_import() {
    let server = TestServer::start(|method, target| match (method, target) {
        (_, "/console/api/login") => login_ok(),
        ("POST", "/console/api/apps/imports") => {
            (200, r#"{"id":"imp-1","status":"completed"}"#.to_string())
        }
        _ => (404, "{}".to_string()),
    });
    let client = logged_in(&server);

    client
        .push_content("app-1", b"app:\n  name: Flow\n")
        .expect("push should succeed");

    let requests = server.requests();
    let push = requests.last().expect("push request recorded");
    let body: Value = serde_json::from_str(&push.body).expect("push body is JSON");
    assert_eq!(body["mode"], "yaml-content");
    assert_eq!(body["app_id"], "app-1");
    assert_eq!(body["yaml_content"], "app:\n  name: Flow\n");
}

#[test]
fn push_content_surfaces_failed_import_status() {
    let server = TestServer::start(|_, target| match target {
        "/console/api/login" => login_ok(),
        _ => (
            200,
            r#"{"status":"failed","error":"invalid DSL version"}"#.to_string(),
        ),
    });
    let client = logged_in(&server);

    let err = client
        .push_content("app-1", b"garbage")
        .expect_err("failed import should surface");
    assert!(err.to_string().contains("invalid DSL version"));
}

#[test]
fn list_records_follows_pagination_and_skips_non_objects() {
    let server = TestServer::start(|_, target| match target {
        "/console/api/login" => login_ok(),
        "/console/api/apps?page=1&limit=100" => (
            200,
            r#"{"page":1,"has_more":true,"data":[{"id":"a","name":"A","updated_at":null},"junk"]}"#
                .to_string(),
        ),
        "/console/api/apps?page=2&limit=100" => (
            200,
            r#"{"page":2,"has_more":false,"data":[{"id":"b","name":"B","updated_at":1.5}]}"#
                .to_string(),
        ),
        _ => (404, "{}".to_string()),
    });
    let client = logged_in(&server);

    let records = client.list_records().expect("list should succeed");
    let ids: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(records[0].updated_at, RawTimestamp::Null);
    assert_eq!(records[1].updated_at, RawTimestamp::Float(1.5));
}

#[test]
fn list_records_requires_data_array() {
    let server = TestServer::start(|_, target| match target {
        "/console/api/login" => login_ok(),
        _ => (200, r#"{"items":[]}"#.to_string()),
    });
    let client = logged_in(&server);

    let err = client.list_records().expect_err("missing data should fail");
    assert!(matches!(err, ApiError::InvalidResponse { .. }));
}
