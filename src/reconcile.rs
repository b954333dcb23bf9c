use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use time::OffsetDateTime;

use crate::api::ApiError;
use crate::config::SyncConfig;
use crate::mapping::{self, AppMap, AppMapping, MappingError, SaveMode};
use crate::naming::{self, DSL_EXTENSION};
use crate::pair::{PairSync, SyncAction, SyncResult};
use crate::remote::RemoteApps;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub total: usize,
    pub downloads: usize,
    pub uploads: usize,
    pub no_action: usize,
    pub errors: usize,
    pub deleted: usize,
    pub renamed: usize,
    pub start_time: OffsetDateTime,
    pub end_time: OffsetDateTime,
    pub duration: Duration,
}

impl SyncStats {
    fn started(total: usize) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            total,
            downloads: 0,
            uploads: 0,
            no_action: 0,
            errors: 0,
            deleted: 0,
            renamed: 0,
            start_time: now,
            end_time: now,
            duration: Duration::ZERO,
        }
    }

    fn record(&mut self, outcome: &EntryOutcome) {
        match outcome {
            // A removal mirrors remote state downward.
            EntryOutcome::Deleted { .. } => {
                self.deleted += 1;
                self.downloads += 1;
            }
            EntryOutcome::Renamed { .. } => self.renamed += 1,
            EntryOutcome::Failed { .. } => self.errors += 1,
            EntryOutcome::Synced(result) if !result.success => self.errors += 1,
            EntryOutcome::Synced(result) => match result.action {
                SyncAction::None => self.no_action += 1,
                SyncAction::Download => self.downloads += 1,
                SyncAction::Upload => self.uploads += 1,
                SyncAction::Error => self.errors += 1,
            },
        }
    }

    pub fn changed_mapping(&self) -> bool {
        self.deleted > 0 || self.renamed > 0
    }
}

#[derive(Debug)]
pub enum EntryOutcome {
    Deleted {
        filename: String,
        app_id: String,
    },
    Renamed {
        app_id: String,
        from: String,
        to: String,
    },
    Synced(SyncResult),
    Failed {
        filename: String,
        app_id: String,
        error: EntryError,
    },
}

#[derive(Debug)]
pub struct RunReport {
    pub stats: SyncStats,
    pub map: AppMap,
    pub outcomes: Vec<EntryOutcome>,
    pub persisted: bool,
    pub persist_error: Option<MappingError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.stats.errors == 0 && self.persist_error.is_none()
    }
}

pub struct Reconciler<'a, R: RemoteApps + ?Sized> {
    remote: &'a R,
    config: &'a SyncConfig,
}

impl<'a, R: RemoteApps + ?Sized> Reconciler<'a, R> {
    pub fn new(remote: &'a R, config: &'a SyncConfig) -> Self {
        Self { remote, config }
    }

    pub fn run_with(&self, map: AppMap) -> RunReport {
        let clock = Instant::now();
        let mut stats = SyncStats::started(map.len());
        if map.is_empty() {
            tracing::warn!(path = %self.config.mapping_file.display(), "app map has no entries");
        }
        let pair = PairSync::new(self.remote, self.config);
        let pending = map.apps;
        let mut kept = Vec::with_capacity(pending.len());
        let mut reserved = HashSet::new();
        // Names given up this run. A dry run leaves those files on disk.
        let mut vacated = HashSet::new();
        let mut outcomes = Vec::with_capacity(pending.len());

        tracing::info!(
            entries = stats.total,
            dry_run = self.config.dry_run,
            mode = ?self.config.mode,
            "starting reconciliation"
        );

        for (index, entry) in pending.iter().enumerate() {
            let later = &pending[index + 1..];
            let (outcome, survivor) =
                self.reconcile_entry(&pair, entry, later, &reserved, &vacated);
            match &outcome {
                EntryOutcome::Deleted { filename, .. } => {
                    vacated.insert(filename.clone());
                }
                EntryOutcome::Renamed { from, .. } => {
                    vacated.insert(from.clone());
                }
                EntryOutcome::Synced(_) | EntryOutcome::Failed { .. } => {}
            }
            if let Some(survivor) = survivor {
                reserved.insert(survivor.filename.clone());
                kept.push(survivor);
            }
            stats.record(&outcome);
            outcomes.push(outcome);
        }

        let map = AppMap { apps: kept };
        let mut persisted = false;
        let mut persist_error = None;
        if stats.changed_mapping() && !self.config.dry_run {
            match mapping::save(&self.config.mapping_file, &map, SaveMode::ExistingParent) {
                Ok(()) => {
                    persisted = true;
                    tracing::info!(path = %self.config.mapping_file.display(), "updated app map");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to persist app map");
                    persist_error = Some(err);
                }
            }
        }

        stats.end_time = OffsetDateTime::now_utc();
        stats.duration = clock.elapsed();
        RunReport {
            stats,
            map,
            outcomes,
            persisted,
            persist_error,
        }
    }

    fn reconcile_entry(
        &self,
        pair: &PairSync<'_, R>,
        entry: &AppMapping,
        later: &[AppMapping],
        reserved: &HashSet<String>,
        vacated: &HashSet<String>,
    ) -> (EntryOutcome, Option<AppMapping>) {
        let exists = match self.remote.record_exists(&entry.app_id) {
            Ok(exists) => exists,
            Err(err) => return self.failed(entry, EntryError::CheckExists(err)),
        };
        if !exists {
            return self.delete_local(entry);
        }

        let record = match self.remote.fetch_record(&entry.app_id) {
            Ok(record) => record,
            Err(err) => return self.failed(entry, EntryError::AppInfo(err)),
        };

        let extension = Path::new(&entry.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(DSL_EXTENSION);
        let stem = naming::sanitize(&record.name);
        let expected = naming::deduplicate(&stem, extension, reserved, |candidate| {
            candidate != entry.filename
                && (later.iter().any(|other| other.filename == candidate)
                    || (!vacated.contains(candidate)
                        && self.config.dsl_directory.join(candidate).exists()))
        });

        if expected != entry.filename {
            return self.rename_local(entry, expected);
        }

        let result = pair.sync(entry, &record);
        tracing::debug!(
            filename = %result.filename,
            action = result.action.as_str(),
            success = result.success,
            at = %result.timestamp,
            "pair synced"
        );
        (EntryOutcome::Synced(result), Some(entry.clone()))
    }

    fn delete_local(&self, entry: &AppMapping) -> (EntryOutcome, Option<AppMapping>) {
        let path = self.config.dsl_directory.join(&entry.filename);
        tracing::info!(filename = %entry.filename, app_id = %entry.app_id, "remote app deleted; removing local file");
        if !self.config.dry_run {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "local file already gone");
                }
                Err(err) => return self.failed(entry, EntryError::Remove(err)),
            }
        }
        let outcome = EntryOutcome::Deleted {
            filename: entry.filename.clone(),
            app_id: entry.app_id.clone(),
        };
        (outcome, None)
    }

    fn rename_local(&self, entry: &AppMapping, to: String) -> (EntryOutcome, Option<AppMapping>) {
        tracing::info!(app_id = %entry.app_id, from = %entry.filename, to = %to, "remote app renamed");
        if !self.config.dry_run {
            let from_path = self.config.dsl_directory.join(&entry.filename);
            let to_path = self.config.dsl_directory.join(&to);
            if let Err(source) = fs::rename(&from_path, &to_path) {
                return self.failed(entry, EntryError::Rename { to, source });
            }
        }
        let renamed = AppMapping::new(to.clone(), entry.app_id.clone());
        let outcome = EntryOutcome::Renamed {
            app_id: entry.app_id.clone(),
            from: entry.filename.clone(),
            to,
        };
        (outcome, Some(renamed))
    }

    fn failed(&self, entry: &AppMapping, error: EntryError) -> (EntryOutcome, Option<AppMapping>) {
        tracing::warn!(filename = %entry.filename, app_id = %entry.app_id, error = %error, "entry failed");
        let outcome = EntryOutcome::Failed {
            filename: entry.filename.clone(),
            app_id: entry.app_id.clone(),
            error,
        };
        (outcome, Some(entry.clone()))
    }
}

#[derive(Debug)]
pub enum EntryError {
    CheckExists(ApiError),
    AppInfo(ApiError),
    Remove(io::Error),
    Rename { to: String, source: io::Error },
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryError::CheckExists(err) => write!(f, "failed to check app existence: {}", err),
            EntryError::AppInfo(err) => write!(f, "failed to get app info: {}", err),
            EntryError::Remove(err) => write!(f, "failed to remove local file: {}", err),
            EntryError::Rename { to, source } => {
                write!(f, "failed to rename local file to '{}': {}", to, source)
            }
        }
    }
}

impl Error for EntryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EntryError::CheckExists(err) | EntryError::AppInfo(err) => Some(err),
            EntryError::Remove(err) => Some(err),
            EntryError::Rename { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
#[path = "reconcile_tests_ext.rs"]
mod tests;
