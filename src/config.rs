use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "dslsync.toml";
pub const DEFAULT_DSL_DIR: &str = "dsl";
pub const DEFAULT_APP_MAP: &str = "app_map.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SyncMode {
    #[default]
    #[serde(rename = "download")]
    DownloadOnly,
    #[serde(rename = "bidirectional")]
    Bidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transfer {
    Upload,
    Download,
}

impl Transfer {
    pub fn as_str(self) -> &'static str {
        match self {
            Transfer::Upload => "upload",
            Transfer::Download => "download",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub dsl_directory: PathBuf,
    pub mapping_file: PathBuf,
    pub dry_run: bool,
    pub mode: SyncMode,
    pub force: Option<Transfer>,
    pub verbose: bool,
}

#[derive(Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub base_url: String,
    pub email: String,
    pub password: String,
    pub timeout: Duration,
}

impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub sync: SyncConfig,
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub dsl_dir: Option<PathBuf>,
    pub app_map: Option<PathBuf>,
    pub mode: Option<SyncMode>,
    pub force: Option<Transfer>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigInputs {
    pub base_url: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub dsl_dir: Option<PathBuf>,
    pub app_map: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub dry_run: bool,
    pub verbose: bool,
    pub bidirectional: bool,
    pub force: Option<Transfer>,
}

impl Config {
    pub fn load(inputs: &ConfigInputs) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
        let file = load_file_config(inputs.config_file.as_deref(), &cwd)?;
        Self::resolve(inputs, file, &cwd)
    }

    pub fn resolve(
        inputs: &ConfigInputs,
        file: FileConfig,
        cwd: &Path,
    ) -> Result<Self, ConfigError> {
        let base_url = required(
            inputs.base_url.clone().or(file.base_url),
            "base URL",
            "--base-url",
            "DIFY_BASE_URL",
        )?;
        let email = required(inputs.email.clone(), "email", "--email", "DIFY_EMAIL")?;
        let password = required(
            inputs.password.clone(),
            "password",
            "--password",
            "DIFY_PASSWORD",
        )?;

        let dsl_dir = inputs
            .dsl_dir
            .clone()
            .or(file.dsl_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DSL_DIR));
        let app_map = inputs
            .app_map
            .clone()
            .or(file.app_map)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_APP_MAP));

        let mode = if inputs.bidirectional {
            SyncMode::Bidirectional
        } else {
            file.mode.unwrap_or_default()
        };

        Ok(Self {
            sync: SyncConfig {
                dsl_directory: absolutize(cwd, dsl_dir),
                mapping_file: absolutize(cwd, app_map),
                dry_run: inputs.dry_run,
                mode,
                force: inputs.force.or(file.force),
                verbose: inputs.verbose,
            },
            remote: RemoteSettings {
                base_url: base_url.trim_end_matches('/').to_string(),
                email,
                password,
                timeout: Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            },
        })
    }
}

pub fn load_file_config(explicit: Option<&Path>, cwd: &Path) -> Result<FileConfig, ConfigError> {
    let (path, must_exist) = match explicit {
        Some(path) => (absolutize(cwd, path.to_path_buf()), true),
        None => (cwd.join(DEFAULT_CONFIG_FILE), false),
    };

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !must_exist => {
            return Ok(FileConfig::default());
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    tracing::debug!(path = %path.display(), "loading config file");
    toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
}

fn required(
    value: Option<String>,
    field: &'static str,
    flag: &'static str,
    env: &'static str,
) -> Result<String, ConfigError> {
    match value.map(|value| value.trim().to_string()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing { field, flag, env }),
    }
}

fn absolutize(cwd: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing {
        field: &'static str,
        flag: &'static str,
        env: &'static str,
    },
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    CurrentDir(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing { field, flag, env } => write!(
                f,
                "{} is required. Set with {} or the {} env var",
                field, flag, env
            ),
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config '{}': {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config '{}': {}", path.display(), source)
            }
            ConfigError::CurrentDir(err) => {
                write!(f, "failed to resolve working directory: {}", err)
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Missing { .. } => None,
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::CurrentDir(err) => Some(err),
        }
    }
}

#[cfg(test)]
#[path = "config_tests_ext.rs"]
mod tests;
