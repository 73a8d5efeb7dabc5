use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use thiserror::Error as ThisError;

use super::IsRetryable;
use crate::db::RepositoryId;

#[derive(Debug, ThisError)]
pub enum VaultError {
    /// The host's request budget is spent until `reset_at`.
    #[error("Host rate limit exceeded; resets at {reset_at}")]
    RateLimitExceeded { reset_at: DateTime<Utc> },

    /// The limiter would have to hold requests past the accepted wait; not worth retrying.
    #[error("Host rate limit resets at {reset_at}, beyond the accepted wait")]
    RateLimitWaitTooLong { reset_at: DateTime<Utc> },

    /// Network failure, timeout or 5xx from the host or the object store.
    #[error("Transient host error: {0}")]
    TransientHost(String),

    /// Non-retryable, non-404 error status from the host.
    #[error("Host error with status {status}: {body}")]
    HostStatus { status: StatusCode, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Catalog and Blob Store disagree; always a bug, never an absent file.
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Request budget exhausted")]
    BudgetExhausted,

    #[error("Collection cancelled")]
    Cancelled,

    #[error("Watermark for repository {repository_id} moved (expected {expected:?})")]
    WatermarkConflict {
        repository_id: RepositoryId,
        expected: Option<String>,
    },

    #[error("Repository {0} is already being collected")]
    RepositoryBusy(RepositoryId),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Object store error with status {status}: {message}")]
    ObjectStore { status: StatusCode, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl VaultError {
    /// Short stable label used in collection reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            VaultError::RateLimitWaitTooLong { .. } => "rate_limit_wait",
            VaultError::TransientHost(_) | VaultError::ReqwestError(_) => "transient_host",
            VaultError::HostStatus { .. } => "host_status",
            VaultError::NotFound(_) => "not_found",
            VaultError::Integrity(_) => "integrity",
            VaultError::BudgetExhausted => "budget_exhausted",
            VaultError::Cancelled => "cancelled",
            VaultError::WatermarkConflict { .. } => "watermark_conflict",
            VaultError::RepositoryBusy(_) => "repository_busy",
            VaultError::InvalidPath(_) => "invalid_path",
            VaultError::ObjectStore { .. } => "object_store",
            VaultError::Config(_) => "config",
            VaultError::JsonError(_) => "json",
            VaultError::IoError(_) => "io",
            VaultError::UrlError(_) => "url",
            VaultError::RactorError(_) => "ractor",
            VaultError::DatabaseError(_) => "database",
        }
    }
}

impl IsRetryable for VaultError {
    fn is_retryable(&self) -> bool {
        match self {
            VaultError::TransientHost(_) | VaultError::RateLimitExceeded { .. } => true,
            VaultError::ReqwestError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
