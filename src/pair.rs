use std::error::Error;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use time::OffsetDateTime;

use crate::api::ApiError;
use crate::config::{SyncConfig, SyncMode, Transfer};
use crate::mapping::AppMapping;
use crate::remote::{RemoteApps, RemoteRecord};
use crate::timestamp::{normalize, NormalizedTimestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    None,
    Download,
    Upload,
    Error,
}

impl SyncAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncAction::None => "none",
            SyncAction::Download => "download",
            SyncAction::Upload => "upload",
            SyncAction::Error => "error",
        }
    }
}

#[derive(Debug)]
pub struct SyncResult {
    pub filename: String,
    pub app_id: String,
    pub action: SyncAction,
    pub success: bool,
    pub error: Option<PairError>,
    pub timestamp: OffsetDateTime,
}

impl SyncResult {
    fn ok(entry: &AppMapping, action: SyncAction) -> Self {
        Self {
            filename: entry.filename.clone(),
            app_id: entry.app_id.clone(),
            action,
            success: true,
            error: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    fn failed(entry: &AppMapping, action: SyncAction, error: PairError) -> Self {
        tracing::warn!(
            filename = %entry.filename,
            app_id = %entry.app_id,
            action = action.as_str(),
            error = %error,
            "sync failed"
        );
        Self {
            filename: entry.filename.clone(),
            app_id: entry.app_id.clone(),
            action,
            success: false,
            error: Some(error),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Decides the transfer for one pair, or `None` when nothing should move.
///
/// A forced direction wins outright. Otherwise an unknown remote timestamp
/// never moves anything, and only a strictly newer side does. Both sides are
/// compared at whole-second precision.
pub fn decide_action(
    local_modified: OffsetDateTime,
    remote: NormalizedTimestamp,
    mode: SyncMode,
    force: Option<Transfer>,
) -> Option<Transfer> {
    if force.is_some() {
        return force;
    }
    let remote = remote.instant()?;
    let local_secs = local_modified.unix_timestamp();
    let remote_secs = remote.unix_timestamp();

    match mode {
        SyncMode::DownloadOnly if remote_secs > local_secs => Some(Transfer::Download),
        SyncMode::DownloadOnly => None,
        SyncMode::Bidirectional if local_secs > remote_secs => Some(Transfer::Upload),
        SyncMode::Bidirectional if remote_secs > local_secs => Some(Transfer::Download),
        SyncMode::Bidirectional => None,
    }
}

pub struct PairSync<'a, R: RemoteApps + ?Sized> {
    remote: &'a R,
    config: &'a SyncConfig,
}

impl<'a, R: RemoteApps + ?Sized> PairSync<'a, R> {
    pub fn new(remote: &'a R, config: &'a SyncConfig) -> Self {
        Self { remote, config }
    }

    pub fn local_path(&self, entry: &AppMapping) -> PathBuf {
        self.config.dsl_directory.join(&entry.filename)
    }

    pub fn sync(&self, entry: &AppMapping, record: &RemoteRecord) -> SyncResult {
        let path = self.local_path(entry);
        match local_modified(&path) {
            Ok(modified) => self.compare_and_apply(entry, &path, modified, record),
            Err(err) => SyncResult::failed(entry, SyncAction::Error, PairError::StatLocal(err)),
        }
    }

    fn compare_and_apply(
        &self,
        entry: &AppMapping,
        path: &Path,
        local_modified: OffsetDateTime,
        record: &RemoteRecord,
    ) -> SyncResult {
        let remote_time = normalize(&record.updated_at);
        let decision = decide_action(local_modified, remote_time, self.config.mode, self.config.force);
        tracing::debug!(
            filename = %entry.filename,
            app_id = %entry.app_id,
            local = %local_modified,
            remote = ?remote_time,
            forced = self.config.force.map(Transfer::as_str),
            decision = decision.map(Transfer::as_str).unwrap_or("none"),
            "compared timestamps"
        );

        match decision {
            None => SyncResult::ok(entry, SyncAction::None),
            Some(Transfer::Download) => self.download(entry, path, remote_time),
            Some(Transfer::Upload) => self.upload(entry, path),
        }
    }

    fn download(&self, entry: &AppMapping, path: &Path, remote_time: NormalizedTimestamp) -> SyncResult {
        let content = match self.remote.fetch_content(&entry.app_id) {
            Ok(content) => content,
            Err(err) => {
                return SyncResult::failed(entry, SyncAction::Download, PairError::FetchContent(err))
            }
        };
        if self.config.dry_run {
            tracing::info!(filename = %entry.filename, bytes = content.len(), "dry run: would download");
            return SyncResult::ok(entry, SyncAction::Download);
        }

        if let Err(err) = fs::write(path, &content) {
            return SyncResult::failed(entry, SyncAction::Download, PairError::WriteLocal(err));
        }
        if let Some(remote) = remote_time.instant() {
            align_mtime(path, remote);
        }
        tracing::info!(filename = %entry.filename, bytes = content.len(), "downloaded");
        SyncResult::ok(entry, SyncAction::Download)
    }

    fn upload(&self, entry: &AppMapping, path: &Path) -> SyncResult {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(err) => return SyncResult::failed(entry, SyncAction::Upload, PairError::ReadLocal(err)),
        };
        if self.config.dry_run {
            tracing::info!(filename = %entry.filename, bytes = content.len(), "dry run: would upload");
            return SyncResult::ok(entry, SyncAction::Upload);
        }

        if let Err(err) = self.remote.push_content(&entry.app_id, &content) {
            return SyncResult::failed(entry, SyncAction::Upload, PairError::PushContent(err));
        }
        // The import bumps the remote timestamp; mirror it locally so the
        // next run sees the pair as settled.
        match self.remote.fetch_record(&entry.app_id) {
            Ok(record) => {
                if let Some(remote) = normalize(&record.updated_at).instant() {
                    align_mtime(path, remote);
                }
            }
            Err(err) => {
                tracing::warn!(app_id = %entry.app_id, error = %err, "could not re-read app after upload");
            }
        }
        tracing::info!(filename = %entry.filename, bytes = content.len(), "uploaded");
        SyncResult::ok(entry, SyncAction::Upload)
    }
}

fn local_modified(path: &Path) -> io::Result<OffsetDateTime> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(OffsetDateTime::from(modified))
}

pub(crate) fn align_mtime(path: &Path, instant: OffsetDateTime) {
    let result = File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(SystemTime::from(instant)));
    if let Err(err) = result {
        tracing::warn!(path = %path.display(), error = %err, "failed to set local modification time");
    }
}

#[derive(Debug)]
pub enum PairError {
    StatLocal(io::Error),
    FetchContent(ApiError),
    WriteLocal(io::Error),
    ReadLocal(io::Error),
    PushContent(ApiError),
}

impl fmt::Display for PairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairError::StatLocal(err) => write!(f, "failed to stat local file: {}", err),
            PairError::FetchContent(err) => write!(f, "failed to download app DSL: {}", err),
            PairError::WriteLocal(err) => write!(f, "failed to write local file: {}", err),
            PairError::ReadLocal(err) => write!(f, "failed to read local file: {}", err),
            PairError::PushContent(err) => write!(f, "failed to upload app DSL: {}", err),
        }
    }
}

impl Error for PairError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PairError::StatLocal(err) | PairError::WriteLocal(err) | PairError::ReadLocal(err) => {
                Some(err)
            }
            PairError::FetchContent(err)
            | PairError::PushContent(err) => Some(err),
        }
    }
}

#[cfg(test)]
#[path = "pair_tests_ext.rs"]
mod tests;
