use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use progress_core::{
    model::{FlashcardId, MasteryLevel, Owner, ProgressRecord},
    time::Clock,
};
use storage::repository::{ProgressRepository, StorageError, unique_ids};

use crate::config::ProgressConfig;
use crate::error::ProgressServiceError;

/// Turns answers into progress updates and keeps records in the store.
///
/// The service is backend-agnostic: it only talks to the store through
/// `ProgressRepository`.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    config: ProgressConfig,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn ProgressRepository>) -> Self {
        Self {
            clock,
            config: ProgressConfig::default(),
            progress,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ProgressConfig) -> Self {
        self.config = config;
        self
    }

    /// Current time according to the service's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.progress.is_available()
    }

    /// Record one answer and return the updated record.
    ///
    /// - Reads the record, creating a zeroed one on first contact.
    /// - Computes counters, level and next review from the answer.
    /// - Writes back conditionally; if another writer got there first the
    ///   round is repeated on fresh state.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::WriteContention` if every attempt lost
    /// to a concurrent writer, or `ProgressServiceError::Storage` for store
    /// failures (including an unavailable medium).
    pub async fn record_answer(
        &self,
        flashcard_id: FlashcardId,
        owner: &Owner,
        is_correct: bool,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let attempts = self.config.max_write_attempts.max(1);

        for attempt in 1..=attempts {
            let now = self.clock.now();
            let current = match self.progress.get(flashcard_id, owner).await? {
                Some(record) => record,
                None => {
                    self.progress
                        .create(flashcard_id, owner, MasteryLevel::MIN, now)
                        .await?
                }
            };

            let patch = current.answered(is_correct, now);
            match self.progress.compare_and_update(&current, &patch).await {
                Ok(updated) => {
                    debug!(
                        %flashcard_id,
                        %owner,
                        is_correct,
                        level = %updated.mastery_level(),
                        "answer recorded"
                    );
                    return Ok(updated);
                }
                // Someone answered or cleared in between; start over from the store.
                Err(StorageError::Conflict | StorageError::NotFound) => {
                    debug!(%flashcard_id, %owner, attempt, "progress changed underneath; retrying");
                }
                Err(err) => {
                    warn!(%flashcard_id, %owner, error = %err, "failed to record answer");
                    return Err(err.into());
                }
            }
        }

        warn!(%flashcard_id, %owner, attempts, "giving up on contended progress record");
        Err(ProgressServiceError::WriteContention { attempts })
    }

    /// Create zeroed records for freshly generated flashcards.
    ///
    /// Existing records are left untouched, so seeding can race with a
    /// learner's first answer without losing it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if any record cannot be created;
    /// records created before the failure stay in place.
    pub async fn seed_new_flashcards(
        &self,
        flashcard_ids: &[FlashcardId],
        owner: &Owner,
    ) -> Result<Vec<ProgressRecord>, ProgressServiceError> {
        let now = self.clock.now();
        let ids = unique_ids(flashcard_ids);
        let mut seeded = Vec::with_capacity(ids.len());
        for id in ids {
            seeded.push(
                self.progress
                    .create(id, owner, MasteryLevel::MIN, now)
                    .await?,
            );
        }
        info!(%owner, count = seeded.len(), "seeded progress for new flashcards");
        Ok(seeded)
    }

    /// Current record for one flashcard, if any.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on store failures.
    pub async fn progress_for(
        &self,
        flashcard_id: FlashcardId,
        owner: &Owner,
    ) -> Result<Option<ProgressRecord>, ProgressServiceError> {
        Ok(self.progress.get(flashcard_id, owner).await?)
    }

    /// Records due for review now, earliest first.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on store failures.
    pub async fn due_flashcards(
        &self,
        owner: &Owner,
        limit: u32,
    ) -> Result<Vec<ProgressRecord>, ProgressServiceError> {
        Ok(self
            .progress
            .due_flashcards(owner, self.clock.now(), limit)
            .await?)
    }

    /// Drop every record of `owner`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on store failures.
    pub async fn clear_progress(&self, owner: &Owner) -> Result<(), ProgressServiceError> {
        self.progress.clear_all(owner).await?;
        info!(%owner, "cleared all progress");
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use progress_core::model::{ProgressPatch, ProgressStats};
    use progress_core::time::fixed_now;
    use std::sync::atomic::{AtomicU32, Ordering};
    use storage::local::{LocalProgressStore, MemoryMedium};

    fn local_service() -> ProgressService {
        let store = LocalProgressStore::new(Arc::new(MemoryMedium::new()));
        ProgressService::new(Clock::fixed(fixed_now()), Arc::new(store))
    }

    #[tokio::test]
    async fn first_correct_answer_jumps_to_level_two() {
        let service = local_service();
        let record = service
            .record_answer(FlashcardId::new(1), &Owner::Anonymous, true)
            .await
            .unwrap();
        assert_eq!(record.mastery_level().value(), 2);
        assert_eq!(record.correct_answers(), 1);
        assert_eq!(record.incorrect_answers(), 0);
        assert_eq!(record.next_review_at(), fixed_now() + Duration::hours(24));
        assert_eq!(record.last_reviewed_at(), fixed_now());
    }

    #[tokio::test]
    async fn seeding_skips_duplicates_and_keeps_answers() {
        let service = local_service();
        let owner = Owner::Anonymous;
        service
            .record_answer(FlashcardId::new(5), &owner, true)
            .await
            .unwrap();

        let seeded = service
            .seed_new_flashcards(&[5, 6, 6].map(FlashcardId::new), &owner)
            .await
            .unwrap();
        assert_eq!(seeded.len(), 2);
        assert_eq!(seeded[0].mastery_level().value(), 2);
        assert_eq!(seeded[1].mastery_level(), MasteryLevel::MIN);
    }

    /// Store that loses the first `conflicts` conditional writes, as if another
    /// device answered the same card in between.
    struct ContendedStore {
        inner: LocalProgressStore,
        conflicts: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ProgressRepository for ContendedStore {
        async fn get(
            &self,
            id: FlashcardId,
            owner: &Owner,
        ) -> Result<Option<ProgressRecord>, StorageError> {
            self.inner.get(id, owner).await
        }

        async fn create(
            &self,
            id: FlashcardId,
            owner: &Owner,
            level: MasteryLevel,
            now: DateTime<Utc>,
        ) -> Result<ProgressRecord, StorageError> {
            self.inner.create(id, owner, level, now).await
        }

        async fn update(
            &self,
            id: FlashcardId,
            owner: &Owner,
            patch: &ProgressPatch,
        ) -> Result<ProgressRecord, StorageError> {
            self.inner.update(id, owner, patch).await
        }

        async fn compare_and_update(
            &self,
            expected: &ProgressRecord,
            patch: &ProgressPatch,
        ) -> Result<ProgressRecord, StorageError> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                // The competing writer records a wrong answer.
                let competing = expected.answered(false, expected.last_reviewed_at());
                self.inner.compare_and_update(expected, &competing).await?;
            }
            self.inner.compare_and_update(expected, patch).await
        }

        async fn stats_for(
            &self,
            ids: &[FlashcardId],
            owner: &Owner,
        ) -> Result<ProgressStats, StorageError> {
            self.inner.stats_for(ids, owner).await
        }

        async fn due_flashcards(
            &self,
            owner: &Owner,
            now: DateTime<Utc>,
            limit: u32,
        ) -> Result<Vec<ProgressRecord>, StorageError> {
            self.inner.due_flashcards(owner, now, limit).await
        }

        async fn reviewed_between(
            &self,
            owner: &Owner,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<u32, StorageError> {
            self.inner.reviewed_between(owner, start, end).await
        }

        async fn clear_all(&self, owner: &Owner) -> Result<(), StorageError> {
            self.inner.clear_all(owner).await
        }

        fn is_available(&self) -> bool {
            self.inner.is_available()
        }
    }

    fn contended_service(conflicts: u32) -> ProgressService {
        let store = ContendedStore {
            inner: LocalProgressStore::new(Arc::new(MemoryMedium::new())),
            conflicts: AtomicU32::new(conflicts),
        };
        ProgressService::new(Clock::fixed(fixed_now()), Arc::new(store))
    }

    #[tokio::test]
    async fn lost_update_is_retried_on_fresh_state() {
        let service = contended_service(1);
        let record = service
            .record_answer(FlashcardId::new(1), &Owner::Anonymous, true)
            .await
            .unwrap();
        // Both the competing wrong answer and ours are counted.
        assert_eq!(record.incorrect_answers(), 1);
        assert_eq!(record.correct_answers(), 1);
        assert_eq!(record.mastery_level().value(), 2);
    }

    #[tokio::test]
    async fn persistent_contention_is_reported() {
        let service = contended_service(10).with_config(ProgressConfig {
            max_write_attempts: 2,
        });
        let err = service
            .record_answer(FlashcardId::new(1), &Owner::Anonymous, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProgressServiceError::WriteContention { attempts: 2 }
        ));
        assert!(err.is_retryable());
    }
}
