use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::api::ApiError;
use crate::config::SyncConfig;
use crate::mapping::{self, AppMap, AppMapping, MappingError, SaveMode};
use crate::naming;
use crate::pair::align_mtime;
use crate::remote::RemoteApps;
use crate::timestamp::normalize;

#[derive(Debug, Default)]
pub struct InitReport {
    pub map: AppMap,
    pub downloaded: Vec<String>,
    pub warnings: Vec<String>,
    pub saved: bool,
}

pub fn initialize<R: RemoteApps + ?Sized>(
    remote: &R,
    config: &SyncConfig,
    overwrite: bool,
) -> Result<InitReport, InitError> {
    if !overwrite && config.mapping_file.exists() {
        return Err(InitError::AlreadyInitialized(config.mapping_file.clone()));
    }

    // A rebuild lets each app keep the file the old map gave it.
    let previous = if overwrite {
        mapping::load(&config.mapping_file).unwrap_or_default()
    } else {
        AppMap::default()
    };

    let records = remote.list_records()?;
    if records.is_empty() {
        return Err(InitError::NoApps);
    }

    let dsl_dir = &config.dsl_directory;
    if !config.dry_run {
        fs::create_dir_all(dsl_dir).map_err(|source| InitError::Io {
            path: dsl_dir.clone(),
            source,
        })?;
    }

    let mut report = InitReport::default();
    let mut reserved = HashSet::new();
    for record in &records {
        if record.id.is_empty() {
            report
                .warnings
                .push(format!("skipping app '{}' without an id", record.name));
            continue;
        }
        // Page-based listing can return an app twice if apps are created
        // mid-listing.
        if report.map.apps.iter().any(|entry| entry.app_id == record.id) {
            tracing::warn!(app_id = %record.id, "app listed twice, keeping the first");
            report.warnings.push(format!(
                "skipping repeated listing of app '{}' ({})",
                record.name, record.id
            ));
            continue;
        }

        let owned = previous
            .apps
            .iter()
            .find(|entry| entry.app_id == record.id)
            .map(|entry| entry.filename.as_str());
        let filename = naming::allocate(&record.name, &mut reserved, |candidate| {
            owned != Some(candidate) && dsl_dir.join(candidate).exists()
        });
        tracing::debug!(app_id = %record.id, name = %record.name, filename = %filename, "mapped app");
        report
            .map
            .apps
            .push(AppMapping::new(filename.clone(), record.id.clone()));

        let path = dsl_dir.join(&filename);
        if path.exists() {
            continue;
        }
        let content = match remote.fetch_content(&record.id) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(app_id = %record.id, error = %err, "initial download failed");
                report
                    .warnings
                    .push(format!("failed to download DSL for {}: {}", record.name, err));
                continue;
            }
        };
        if config.dry_run {
            tracing::info!(filename = %filename, bytes = content.len(), "dry run: would download");
            report.downloaded.push(filename);
            continue;
        }
        if let Err(err) = fs::write(&path, &content) {
            tracing::warn!(path = %path.display(), error = %err, "initial write failed");
            report
                .warnings
                .push(format!("failed to write DSL file for {}: {}", record.name, err));
            continue;
        }
        // Start settled so the first sync has nothing to pull.
        if let Some(updated) = normalize(&record.updated_at).instant() {
            align_mtime(&path, updated);
        }
        report.downloaded.push(filename);
    }

    if !config.dry_run {
        mapping::save(&config.mapping_file, &report.map, SaveMode::CreateParents)?;
        report.saved = true;
    }
    tracing::info!(
        apps = report.map.len(),
        downloaded = report.downloaded.len(),
        warnings = report.warnings.len(),
        "initialized app map"
    );
    Ok(report)
}

#[derive(Debug)]
pub enum InitError {
    AlreadyInitialized(PathBuf),
    NoApps,
    Api(ApiError),
    Io { path: PathBuf, source: std::io::Error },
    Mapping(MappingError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::AlreadyInitialized(path) => write!(
                f,
                "app map already exists at {}; pass --force-init to rebuild it",
                path.display()
            ),
            InitError::NoApps => write!(f, "no applications found in the remote account"),
            InitError::Api(err) => write!(f, "failed to get app list from API: {}", err),
            InitError::Io { path, source } => {
                write!(f, "failed to create DSL directory {}: {}", path.display(), source)
            }
            InitError::Mapping(err) => write!(f, "{}", err),
        }
    }
}

impl Error for InitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InitError::AlreadyInitialized(_) | InitError::NoApps => None,
            InitError::Api(err) => Some(err),
            InitError::Io { source, .. } => Some(source),
            InitError::Mapping(err) => Some(err),
        }
    }
}

impl From<ApiError> for InitError {
    fn from(value: ApiError) -> Self {
        InitError::Api(value)
    }
}

impl From<MappingError> for InitError {
    fn from(value: MappingError) -> Self {
        InitError::Mapping(value)
    }
}

#[cfg(test)]
#[path = "init_tests_ext.rs"]
mod tests;
