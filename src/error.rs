//! Error taxonomy for platform calls and invite runs.
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Failure reported by the platform client for a single remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("rate limited{}", .retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },
    #[error("privacy settings prevent this action")]
    PrivacyRestricted,
    #[error("user is already a member")]
    AlreadyMember,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("admin rights required")]
    AdminRequired,
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

impl PlatformError {
    /// Short machine-readable classification, stored with failed statuses.
    pub fn code(&self) -> &'static str {
        match self {
            PlatformError::RateLimited { .. } => "rate_limited",
            PlatformError::PrivacyRestricted => "privacy_restricted",
            PlatformError::AlreadyMember => "already_member",
            PlatformError::NotFound(_) => "not_found",
            PlatformError::AdminRequired => "admin_required",
            PlatformError::Timeout => "timeout",
            PlatformError::Transport(_) => "transport",
            PlatformError::Rejected(_) => "rejected",
        }
    }
}

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("failed to read source {source_ref}: {error}")]
    SourceRead {
        source_ref: String,
        error: PlatformError,
    },
    #[error("destination {destination} unreachable: {error}")]
    DestinationUnreachable {
        destination: String,
        error: PlatformError,
    },
    #[error("no contact bridge available for recipient {recipient_id}")]
    BridgeUnavailable { recipient_id: i64 },
    #[error("enrollment of recipient {recipient_id} rejected: {error}")]
    DispatchRejected {
        recipient_id: i64,
        error: PlatformError,
    },
    #[error("ledger persistence failed: {0}")]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Other(String),
}
