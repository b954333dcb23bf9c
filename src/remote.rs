use serde_json::Value;

use crate::api::ApiError;
use crate::timestamp::RawTimestamp;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteRecord {
    pub id: String,
    pub name: String,
    pub updated_at: RawTimestamp,
}

impl RemoteRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, updated_at: RawTimestamp) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            updated_at,
        }
    }

    pub fn from_json(object: &Value) -> Self {
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let updated_at = object
            .get("updated_at")
            .map(RawTimestamp::from)
            .unwrap_or_default();
        Self::new(text("id"), text("name"), updated_at)
    }
}

pub trait RemoteApps {
    fn fetch_record(&self, app_id: &str) -> Result<RemoteRecord, ApiError>;
    fn fetch_content(&self, app_id: &str) -> Result<Vec<u8>, ApiError>;
    fn push_content(&self, app_id: &str, content: &[u8]) -> Result<(), ApiError>;
    fn record_exists(&self, app_id: &str) -> Result<bool, ApiError>;
    fn list_records(&self) -> Result<Vec<RemoteRecord>, ApiError>;
}
