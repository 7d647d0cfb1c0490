use camino::Utf8PathBuf;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum BeaconError {
    #[error("{0}")]
    #[diagnostic(code(beacon::validation))]
    Validation(String),

    #[error("dataset not found: {0}")]
    #[diagnostic(code(beacon::not_found))]
    DatasetNotFound(String),

    #[error("field not found: {0}")]
    #[diagnostic(code(beacon::not_found))]
    FieldNotFound(String),

    #[error("{0}")]
    #[diagnostic(code(beacon::unauthorized))]
    Unauthorized(String),

    #[error("{0}")]
    #[diagnostic(code(beacon::unsupported))]
    Unsupported(String),

    #[error("{backend} request failed: {message}")]
    #[diagnostic(code(beacon::backend))]
    BackendHttp { backend: String, message: String },

    #[error("{backend} returned status {status}: {message}")]
    #[diagnostic(code(beacon::backend))]
    BackendStatus {
        backend: String,
        status: u16,
        message: String,
    },

    #[error("{backend} did not answer within {seconds}s")]
    #[diagnostic(code(beacon::backend))]
    BackendTimeout { backend: String, seconds: u64 },

    #[error("annotation lookup failed: {0}")]
    #[diagnostic(code(beacon::enrichment))]
    Enrichment(String),

    #[error("missing config file beacon.json in current directory")]
    #[diagnostic(help("pass --config <path> or create beacon.json"))]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to load variant file {path}: {message}")]
    VariantFile { path: Utf8PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    Unsupported,
    BackendFailure,
    EnrichmentFailure,
    Config,
}

impl ErrorKind {
    pub fn code(self) -> u16 {
        match self {
            ErrorKind::Validation | ErrorKind::Config => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::BackendFailure | ErrorKind::EnrichmentFailure => 503,
            ErrorKind::Unsupported => 501,
        }
    }
}

impl BeaconError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BeaconError::Validation(_) => ErrorKind::Validation,
            BeaconError::DatasetNotFound(_) | BeaconError::FieldNotFound(_) => ErrorKind::NotFound,
            BeaconError::Unauthorized(_) => ErrorKind::Unauthorized,
            BeaconError::Unsupported(_) => ErrorKind::Unsupported,
            BeaconError::BackendHttp { .. }
            | BeaconError::BackendStatus { .. }
            | BeaconError::BackendTimeout { .. } => ErrorKind::BackendFailure,
            BeaconError::Enrichment(_) => ErrorKind::EnrichmentFailure,
            BeaconError::MissingConfig
            | BeaconError::ConfigRead(_)
            | BeaconError::ConfigParse(_)
            | BeaconError::InvalidConfig(_)
            | BeaconError::VariantFile { .. } => ErrorKind::Config,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        BeaconError::Validation(message.into())
    }

    pub fn http(backend: &str, err: impl ToString) -> Self {
        BeaconError::BackendHttp {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_code: u16,
    pub message: String,
}

impl From<&BeaconError> for ErrorPayload {
    fn from(value: &BeaconError) -> Self {
        Self {
            error_code: value.kind().code(),
            message: value.to_string(),
        }
    }
}
