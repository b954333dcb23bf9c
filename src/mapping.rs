use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppMap {
    pub apps: Vec<AppMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppMapping {
    pub filename: String,
    pub app_id: String,
}

impl AppMapping {
    pub fn new(filename: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            app_id: app_id.into(),
        }
    }
}

impl AppMap {
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut filenames = HashSet::new();
        let mut app_ids = HashSet::new();
        for entry in &self.apps {
            if entry.filename.trim().is_empty() {
                return Err(format!("entry for app '{}' has an empty filename", entry.app_id));
            }
            if entry.app_id.trim().is_empty() {
                return Err(format!("entry '{}' has an empty app_id", entry.filename));
            }
            if !filenames.insert(entry.filename.as_str()) {
                return Err(format!("duplicate filename '{}'", entry.filename));
            }
            if !app_ids.insert(entry.app_id.as_str()) {
                return Err(format!("duplicate app_id '{}'", entry.app_id));
            }
        }
        Ok(())
    }
}

/// Whether `save` may create missing parent directories. Only the explicit
/// initialization entry point passes `CreateParents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    ExistingParent,
    CreateParents,
}

pub fn load(path: &Path) -> Result<AppMap, MappingError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(MappingError::NotFound(path.to_path_buf()));
        }
        Err(err) => return Err(MappingError::Io(err)),
    };

    let map: AppMap = serde_json::from_slice(&bytes).map_err(|source| MappingError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    map.validate().map_err(|message| MappingError::Invalid {
        path: path.to_path_buf(),
        message,
    })?;
    tracing::debug!(path = %path.display(), entries = map.len(), "loaded app map");
    Ok(map)
}

pub fn save(path: &Path, map: &AppMap, mode: SaveMode) -> Result<(), MappingError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if mode == SaveMode::CreateParents {
        fs::create_dir_all(parent)?;
    }

    let mut payload = serde_json::to_vec_pretty(map).map_err(MappingError::Encode)?;
    payload.push(b'\n');

    let tmp_path = temp_path_for(path);
    let written = write_and_sync(&tmp_path, &payload).and_then(|()| fs::rename(&tmp_path, path));
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(MappingError::Io(err));
    }
    tracing::debug!(path = %path.display(), entries = map.len(), "saved app map");
    Ok(())
}

fn write_and_sync(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(payload)?;
    file.sync_all()
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[derive(Debug)]
pub enum MappingError {
    NotFound(PathBuf),
    Io(std::io::Error),
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    Encode(serde_json::Error),
    Invalid {
        path: PathBuf,
        message: String,
    },
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingError::NotFound(path) => write!(
                f,
                "app map file not found at {}. Please run 'dslsync init' first to initialize the app map",
                path.display()
            ),
            MappingError::Io(err) => write!(f, "I/O error on app map: {}", err),
            MappingError::Decode { path, source } => {
                write!(f, "failed to decode app map '{}': {}", path.display(), source)
            }
            MappingError::Encode(err) => write!(f, "failed to encode app map: {}", err),
            MappingError::Invalid { path, message } => {
                write!(f, "invalid app map '{}': {}", path.display(), message)
            }
        }
    }
}

impl Error for MappingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MappingError::Io(err) => Some(err),
            MappingError::Decode { source, .. } => Some(source),
            MappingError::Encode(err) => Some(err),
            MappingError::NotFound(_) => None,
            MappingError::Invalid { .. } => None,
        }
    }
}

impl From<std::io::Error> for MappingError {
    fn from(value: std::io::Error) -> Self {
        MappingError::Io(value)
    }
}
