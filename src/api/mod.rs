use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

mod error;

pub use error::ApiError;

use crate::config::RemoteSettings;
use crate::remote::{RemoteApps, RemoteRecord};

const LIST_PAGE_LIMIT: u32 = 100;

pub struct DifyClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    data: LoginData,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(default)]
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ExportResponse {
    data: String,
}

impl DifyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http(http, base_url))
    }

    pub fn with_http(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn connect(settings: &RemoteSettings) -> Result<Self, ApiError> {
        let mut client = Self::new(&settings.base_url, settings.timeout)?;
        client.login(&settings.email, &settings.password)?;
        tracing::info!(base_url = %client.base_url, "authenticated against app API");
        Ok(client)
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<(), ApiError> {
        let url = self.url("/console/api/login");
        tracing::debug!(url = %url, "POST login");
        let response = self
            .http
            .post(&url)
            .json(&json!({ "email": email, "password": password }))
            .send()?;
        let login: LoginResponse = read_json(ensure_success(response, &url)?, &url)?;
        if login.data.access_token.is_empty() {
            return Err(invalid(&url, "login response carried no access token"));
        }
        self.token = Some(login.data.access_token);
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<&str, ApiError> {
        self.token.as_deref().ok_or(ApiError::NotAuthenticated)
    }

    fn get(&self, url: &str) -> Result<Response, ApiError> {
        let token = self.bearer()?;
        tracing::debug!(url = %url, "GET");
        Ok(self.http.get(url).bearer_auth(token).send()?)
    }
}

impl RemoteApps for DifyClient {
    fn fetch_record(&self, app_id: &str) -> Result<RemoteRecord, ApiError> {
        let url = self.url(&format!("/console/api/apps/{app_id}"));
        let value: Value = read_json(ensure_success(self.get(&url)?, &url)?, &url)?;
        // Newer servers wrap the app in `data`; older ones return it bare.
        let object = match value.get("data") {
            Some(data) if data.is_object() => data,
            _ => &value,
        };
        let record = RemoteRecord::from_json(object);
        tracing::debug!(app_id, name = %record.name, updated_at = ?record.updated_at, "fetched app info");
        Ok(record)
    }

    fn fetch_content(&self, app_id: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.url(&format!(
            "/console/api/apps/{app_id}/export?include_secret=false"
        ));
        let export: ExportResponse = read_json(ensure_success(self.get(&url)?, &url)?, &url)?;
        Ok(export.data.into_bytes())
    }

    fn push_content(&self, app_id: &str, content: &[u8]) -> Result<(), ApiError> {
        let token = self.bearer()?;
        let url = self.url("/console/api/apps/imports");
        tracing::debug!(url = %url, app_id, bytes = content.len(), "POST import");
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "mode": "yaml-content",
                "yaml_content": String::from_utf8_lossy(content),
                "app_id": app_id,
            }))
            .send()?;
        let value: Value = read_json(ensure_success(response, &url)?, &url)?;
        if value.get("status").and_then(Value::as_str) == Some("failed") {
            let reason = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("import failed");
            return Err(invalid(&url, reason));
        }
        Ok(())
    }

    fn record_exists(&self, app_id: &str) -> Result<bool, ApiError> {
        let url = self.url(&format!("/console/api/apps/{app_id}"));
        let response = self.get(&url)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(response, &url)?;
        Ok(true)
    }

    fn list_records(&self) -> Result<Vec<RemoteRecord>, ApiError> {
        let mut records = Vec::new();
        let mut page = 1u32;
        loop {
            let url = self.url(&format!(
                "/console/api/apps?page={page}&limit={LIST_PAGE_LIMIT}"
            ));
            let value: Value = read_json(ensure_success(self.get(&url)?, &url)?, &url)?;
            let items = value
                .get("data")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid(&url, "response does not contain a 'data' array"))?;
            records.extend(
                items
                    .iter()
                    .filter(|item| item.is_object())
                    .map(RemoteRecord::from_json),
            );

            let has_more = value
                .get("has_more")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !has_more || items.is_empty() {
                break;
            }
            page += 1;
        }
        tracing::debug!(count = records.len(), "listed remote apps");
        Ok(records)
    }
}

fn ensure_success(response: Response, url: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

fn read_json<T>(response: Response, url: &str) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    let text = response.text()?;
    serde_json::from_str(&text).map_err(|err| invalid(url, &format!("failed to decode JSON: {err}")))
}

fn invalid(url: &str, message: &str) -> ApiError {
    ApiError::InvalidResponse {
        url: url.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests;
