//! Error types of the ingest path.
use thiserror::Error;

/// Failures reported by a storage backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The (station, remote identifier) pair already has a sensor row.
    #[error("sensor already exists for this station and remote identifier")]
    UniqueViolation,

    /// A row that must exist was not found.
    #[error("sensor row not found")]
    Missing,

    /// The report deadline ran out before or during the call.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The backend failed its health check.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<postgres::Error> for StoreError {
    fn from(err: postgres::Error) -> Self {
        match err.code() {
            Some(code) if *code == postgres::error::SqlState::UNIQUE_VIOLATION => StoreError::UniqueViolation,
            Some(code) if *code == postgres::error::SqlState::QUERY_CANCELED => StoreError::DeadlineExceeded,
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// Errors surfaced by adapters, the reconciler and the ingest pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("no adapter registered for station type '{0}'")]
    UnknownStationType(String),

    /// Only raised when the strict field policy is configured.
    #[error("malformed value '{value}' for field '{key}'")]
    MalformedField { key: String, value: String },

    #[error("report carries no station authentication token")]
    UnidentifiedStation,

    /// The health check ahead of the first storage call of a report failed.
    #[error("storage backend not usable for station '{station}': {source}")]
    BackendUnavailable {
        station: String,
        source: StoreError,
    },

    #[error("{operation} failed for station '{station}' sensor '{remote_id}': {source}")]
    Persistence {
        operation: &'static str,
        station: String,
        remote_id: String,
        source: StoreError,
    },
}

impl IngestError {
    pub fn persistence(operation: &'static str, station: &str, remote_id: &str, source: StoreError) -> Self {
        IngestError::Persistence {
            operation,
            station: station.to_string(),
            remote_id: remote_id.to_string(),
            source,
        }
    }
}

/// Errors of the adapter registry lifecycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("the adapter registry has already been installed")]
    AlreadyInstalled,

    #[error("the adapter registry has not been installed yet")]
    NotInstalled,
}
