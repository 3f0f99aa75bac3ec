use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{
    DailyGoal, FlashcardId, MasteryLevel, Owner, ProgressPatch, ProgressRecord, ProgressStats,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A conditional write lost against a concurrent writer.
    #[error("conflict")]
    Conflict,

    /// The backing medium is disabled or absent.
    #[error("storage unavailable")]
    Unavailable,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Storage contract for per-owner flashcard progress.
///
/// Implementations must agree on semantics so the services never need to
/// know which one is active.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch a record if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get(
        &self,
        flashcard_id: FlashcardId,
        owner: &Owner,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Insert a fresh record unless one already exists; returns the stored
    /// record either way.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn create(
        &self,
        flashcard_id: FlashcardId,
        owner: &Owner,
        initial_level: MasteryLevel,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError>;

    /// Overwrite the mutable state of an existing record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn update(
        &self,
        flashcard_id: FlashcardId,
        owner: &Owner,
        patch: &ProgressPatch,
    ) -> Result<ProgressRecord, StorageError>;

    /// Apply `patch` only if the stored record still carries the answer
    /// counters of `expected`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the record changed since it was
    /// read, or `StorageError::NotFound` if it is gone.
    async fn compare_and_update(
        &self,
        expected: &ProgressRecord,
        patch: &ProgressPatch,
    ) -> Result<ProgressRecord, StorageError>;

    /// Bucket counts over `flashcard_ids`; duplicates are counted once and
    /// missing records count as untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn stats_for(
        &self,
        flashcard_ids: &[FlashcardId],
        owner: &Owner,
    ) -> Result<ProgressStats, StorageError>;

    /// Records due at or before `now`, earliest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn due_flashcards(
        &self,
        owner: &Owner,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ProgressRecord>, StorageError>;

    /// Number of answered records whose last review falls in `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn reviewed_between(
        &self,
        owner: &Owner,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StorageError>;

    /// Delete every record of `owner`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn clear_all(&self, owner: &Owner) -> Result<(), StorageError>;

    /// Whether the backing medium can currently be used.
    fn is_available(&self) -> bool;
}

/// Per-owner daily review goal, stored next to the progress records.
#[async_trait]
pub trait DailyGoalRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_daily_goal(&self, owner: &Owner) -> Result<Option<DailyGoal>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn set_daily_goal(&self, owner: &Owner, goal: DailyGoal) -> Result<(), StorageError>;
}

/// Deduplicate ids, keeping a stable order for queries.
#[must_use]
pub fn unique_ids(flashcard_ids: &[FlashcardId]) -> Vec<FlashcardId> {
    flashcard_ids
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Aggregate storage wiring.
///
/// Built once per session; the same backend serves records and the goal.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub goals: Arc<dyn DailyGoalRepository>,
}

impl Storage {
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressRepository>, goals: Arc<dyn DailyGoalRepository>) -> Self {
        Self { progress, goals }
    }
}
