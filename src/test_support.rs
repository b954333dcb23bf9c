use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::api::ApiError;
use crate::config::{SyncConfig, SyncMode};
use crate::remote::{RemoteApps, RemoteRecord};
use crate::timestamp::RawTimestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FetchRecord,
    FetchContent,
    PushContent,
    RecordExists,
    ListRecords,
}

#[derive(Default)]
pub struct FakeRemote {
    records: RefCell<Vec<RemoteRecord>>,
    contents: RefCell<HashMap<String, Vec<u8>>>,
    failures: RefCell<HashSet<(Op, String)>>,
    calls: RefCell<Vec<(Op, String)>>,
    push_stamp: RefCell<Option<RawTimestamp>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(self, id: &str, name: &str, updated_at: RawTimestamp, content: &str) -> Self {
        self.insert(id, name, updated_at, content);
        self
    }

    pub fn insert(&self, id: &str, name: &str, updated_at: RawTimestamp, content: &str) {
        self.records
            .borrow_mut()
            .push(RemoteRecord::new(id, name, updated_at));
        self.contents
            .borrow_mut()
            .insert(id.to_string(), content.as_bytes().to_vec());
    }

    pub fn remove(&self, id: &str) {
        self.records.borrow_mut().retain(|record| record.id != id);
        self.contents.borrow_mut().remove(id);
    }

    pub fn rename(&self, id: &str, name: &str) {
        if let Some(record) = self.records.borrow_mut().iter_mut().find(|r| r.id == id) {
            record.name = name.to_string();
        }
    }

    pub fn set_updated_at(&self, id: &str, updated_at: RawTimestamp) {
        if let Some(record) = self.records.borrow_mut().iter_mut().find(|r| r.id == id) {
            record.updated_at = updated_at;
        }
    }

    pub fn stamp_pushes_with(&self, updated_at: RawTimestamp) {
        *self.push_stamp.borrow_mut() = Some(updated_at);
    }

    pub fn fail(&self, op: Op, id: &str) {
        self.failures.borrow_mut().insert((op, id.to_string()));
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.contents.borrow().get(id).cloned()
    }

    pub fn calls(&self) -> Vec<(Op, String)> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls.borrow().iter().filter(|(o, _)| *o == op).count()
    }

    fn record_call(&self, op: Op, id: &str) -> Result<(), ApiError> {
        self.calls.borrow_mut().push((op, id.to_string()));
        if self.failures.borrow().contains(&(op, id.to_string())) {
            return Err(ApiError::Status {
                status: 500,
                url: format!("fake://{op:?}/{id}"),
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn missing(id: &str) -> ApiError {
        ApiError::Status {
            status: 404,
            url: format!("fake://apps/{id}"),
            body: "app not found".to_string(),
        }
    }
}

impl RemoteApps for FakeRemote {
    fn fetch_record(&self, app_id: &str) -> Result<RemoteRecord, ApiError> {
        self.record_call(Op::FetchRecord, app_id)?;
        self.records
            .borrow()
            .iter()
            .find(|record| record.id == app_id)
            .cloned()
            .ok_or_else(|| Self::missing(app_id))
    }

    fn fetch_content(&self, app_id: &str) -> Result<Vec<u8>, ApiError> {
        self.record_call(Op::FetchContent, app_id)?;
        self.content(app_id).ok_or_else(|| Self::missing(app_id))
    }

    fn push_content(&self, app_id: &str, content: &[u8]) -> Result<(), ApiError> {
        self.record_call(Op::PushContent, app_id)?;
        if !self.contents.borrow().contains_key(app_id) {
            return Err(Self::missing(app_id));
        }
        self.contents
            .borrow_mut()
            .insert(app_id.to_string(), content.to_vec());
        if let Some(stamp) = self.push_stamp.borrow().clone() {
            self.set_updated_at(app_id, stamp);
        }
        Ok(())
    }

    fn record_exists(&self, app_id: &str) -> Result<bool, ApiError> {
        self.record_call(Op::RecordExists, app_id)?;
        Ok(self.records.borrow().iter().any(|record| record.id == app_id))
    }

    fn list_records(&self) -> Result<Vec<RemoteRecord>, ApiError> {
        self.record_call(Op::ListRecords, "")?;
        Ok(self.records.borrow().clone())
    }
}

pub fn unique_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

pub fn sync_config(root: &Path) -> SyncConfig {
    SyncConfig {
        dsl_directory: root.join("dsl"),
        mapping_file: root.join("app_map.json"),
        dry_run: false,
        mode: SyncMode::DownloadOnly,
        force: None,
        verbose: false,
    }
}

pub fn write_with_mtime(path: &Path, content: &str, epoch_secs: u64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("parent dir should be creatable");
    }
    std::fs::write(path, content).expect("file should be writable");
    set_mtime(path, epoch_secs);
}

pub fn set_mtime(path: &Path, epoch_secs: u64) {
    let file = File::options()
        .write(true)
        .open(path)
        .expect("file should open for mtime update");
    file.set_modified(UNIX_EPOCH + Duration::from_secs(epoch_secs))
        .expect("mtime should be settable");
}

pub fn mtime_secs(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(|modified: SystemTime| {
            modified
                .duration_since(UNIX_EPOCH)
                .expect("mtime after epoch")
                .as_secs()
        })
        .expect("mtime should be readable")
}
