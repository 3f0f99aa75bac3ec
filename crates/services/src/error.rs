//! Shared error types for the services crate.

use thiserror::Error;

use progress_core::model::DailyGoalError;
use storage::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse classification of a failed operation, for callers deciding whether
/// to retry, degrade, or report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NotFound,
    StorageUnavailable,
    MalformedPersistedState,
    TransientIo,
    Conflict,
    InvalidInput,
}

impl FailureReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::NotFound => "not_found",
            FailureReason::StorageUnavailable => "storage_unavailable",
            FailureReason::MalformedPersistedState => "malformed_persisted_state",
            FailureReason::TransientIo => "transient_io",
            FailureReason::Conflict => "conflict",
            FailureReason::InvalidInput => "invalid_input",
        }
    }
}

impl From<&StorageError> for FailureReason {
    fn from(err: &StorageError) -> Self {
        match err {
            StorageError::NotFound => FailureReason::NotFound,
            StorageError::Conflict => FailureReason::Conflict,
            StorageError::Unavailable => FailureReason::StorageUnavailable,
            StorageError::Serialization(_) => FailureReason::MalformedPersistedState,
            StorageError::Connection(_) => FailureReason::TransientIo,
            _ => FailureReason::TransientIo,
        }
    }
}

/// Errors emitted by `ProgressService` and `StatsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("gave up after {attempts} conflicting writes")]
    WriteContention { attempts: u32 },
    #[error(transparent)]
    DailyGoal(#[from] DailyGoalError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressServiceError {
    #[must_use]
    pub fn reason(&self) -> FailureReason {
        match self {
            ProgressServiceError::WriteContention { .. } => FailureReason::Conflict,
            ProgressServiceError::DailyGoal(_) => FailureReason::InvalidInput,
            ProgressServiceError::Storage(err) => FailureReason::from(err),
        }
    }

    /// Whether repeating the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.reason(),
            FailureReason::TransientIo | FailureReason::Conflict
        )
    }

    pub(crate) fn is_unavailable(&self) -> bool {
        self.reason() == FailureReason::StorageUnavailable
    }
}

/// Errors emitted while opening a progress session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionInitError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
