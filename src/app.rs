use std::error::Error;
use std::fmt;

use crate::api::{ApiError, DifyClient};
use crate::config::{Config, ConfigError};
use crate::init::{self, InitError, InitReport};
use crate::mapping::{self, MappingError};
use crate::reconcile::{Reconciler, RunReport};
use crate::remote::RemoteApps;

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sync(&self) -> Result<RunReport, AppError> {
        let map = mapping::load(&self.config.sync.mapping_file)?;
        let client = DifyClient::connect(&self.config.remote)?;
        Ok(Reconciler::new(&client, &self.config.sync).run_with(map))
    }

    pub fn init(&self, overwrite: bool) -> Result<InitReport, AppError> {
        if !overwrite && self.config.sync.mapping_file.exists() {
            return Err(InitError::AlreadyInitialized(self.config.sync.mapping_file.clone()).into());
        }
        let client = DifyClient::connect(&self.config.remote)?;
        self.init_with(&client, overwrite)
    }

    pub fn init_with<R: RemoteApps + ?Sized>(
        &self,
        remote: &R,
        overwrite: bool,
    ) -> Result<InitReport, AppError> {
        Ok(init::initialize(remote, &self.config.sync, overwrite)?)
    }
}

pub fn ensure_run_succeeded(report: &RunReport) -> Result<(), AppError> {
    if report.is_success() {
        return Ok(());
    }
    Err(AppError::RunFailed {
        errors: report.stats.errors,
        persist_failed: report.persist_error.is_some(),
    })
}

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Config(ConfigError),
    Mapping(MappingError),
    Api(ApiError),
    Init(InitError),
    InvalidArgument(String),
    RunFailed { errors: usize, persist_failed: bool },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Json(err) => write!(f, "JSON error: {}", err),
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Mapping(err) => write!(f, "{}", err),
            AppError::Api(err) => write!(f, "API error: {}", err),
            AppError::Init(err) => write!(f, "init failed: {}", err),
            AppError::InvalidArgument(message) => write!(f, "{}", message),
            AppError::RunFailed {
                errors,
                persist_failed: true,
            } => write!(
                f,
                "sync finished with {} error(s) and the app map could not be saved",
                errors
            ),
            AppError::RunFailed { errors, .. } => {
                write!(f, "sync finished with {} error(s)", errors)
            }
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Json(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::Mapping(err) => Some(err),
            AppError::Api(err) => Some(err),
            AppError::Init(err) => Some(err),
            AppError::InvalidArgument(_) => None,
            AppError::RunFailed { .. } => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::Json(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<MappingError> for AppError {
    fn from(value: MappingError) -> Self {
        AppError::Mapping(value)
    }
}

impl From<ApiError> for AppError {
    fn from(value: ApiError) -> Self {
        AppError::Api(value)
    }
}

impl From<InitError> for AppError {
    fn from(value: InitError) -> Self {
        AppError::Init(value)
    }
}
