//! Single-profile progress store kept in one JSON blob.
//!
//! There is exactly one implicit (anonymous) owner per medium, so the owner
//! argument of the repository calls is only echoed back into the returned
//! records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{
    DailyGoal, FlashcardId, MasteryLevel, Owner, ProgressPatch, ProgressRecord, ProgressStats,
};
use tracing::{debug, warn};

use crate::repository::{
    DailyGoalRepository, ProgressRepository, Storage, StorageError, unique_ids,
};

mod blob;
mod medium;

use blob::{ProgressMap, StoredProgress};
pub use medium::{FileMedium, KeyValueMedium, MediumError, MemoryMedium};

/// Medium key holding the progress blob.
pub const PROGRESS_KEY: &str = "flashcard_progress";
/// Medium key holding the daily goal as a plain integer string.
pub const DAILY_GOAL_KEY: &str = "daily_goal";

/// Every read-modify-write of the blob runs inside the medium's own atomic
/// update, so any number of stores on one medium stay consistent.
#[derive(Clone)]
pub struct LocalProgressStore {
    medium: Arc<dyn KeyValueMedium>,
}

impl LocalProgressStore {
    #[must_use]
    pub fn new(medium: Arc<dyn KeyValueMedium>) -> Self {
        Self { medium }
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.medium.is_available() {
            Ok(())
        } else {
            Err(StorageError::Unavailable)
        }
    }

    fn load(&self) -> Result<ProgressMap, StorageError> {
        match self.medium.read(PROGRESS_KEY)? {
            Some(raw) => Ok(blob::decode(&raw)),
            None => Ok(ProgressMap::new()),
        }
    }

    /// Run `f` on a snapshot of the blob without writing it back.
    fn read_with<R>(&self, f: impl FnOnce(&ProgressMap) -> R) -> Result<R, StorageError> {
        self.ensure_available()?;
        let map = self.load()?;
        Ok(f(&map))
    }

    /// Run `f` on the blob inside the medium's atomic update; the blob is
    /// written back only when `f` reports a change.
    fn modify_with<R>(
        &self,
        f: impl FnOnce(&mut ProgressMap) -> Result<(R, bool), StorageError>,
    ) -> Result<R, StorageError> {
        self.ensure_available()?;
        let mut f = Some(f);
        let mut outcome: Option<Result<R, StorageError>> = None;
        self.medium.update(PROGRESS_KEY, &mut |raw: Option<&str>| -> Option<String> {
            let f = f.take()?;
            let mut map = raw.map_or_else(ProgressMap::new, blob::decode);
            let (out, changed) = match f(&mut map) {
                Ok(done) => done,
                Err(err) => {
                    outcome = Some(Err(err));
                    return None;
                }
            };
            if !changed {
                outcome = Some(Ok(out));
                return None;
            }
            match blob::encode(&map) {
                Ok(raw) => {
                    outcome = Some(Ok(out));
                    Some(raw)
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    None
                }
            }
        })?;
        outcome.unwrap_or_else(|| {
            Err(StorageError::Connection(
                "medium finished without running the update".into(),
            ))
        })
    }
}

fn patched(entry: &mut StoredProgress, patch: &ProgressPatch) {
    entry.mastery_level = patch.mastery_level;
    entry.correct_answers = patch.correct_answers;
    entry.incorrect_answers = patch.incorrect_answers;
    entry.last_reviewed = patch.last_reviewed_at;
    entry.next_review_date = Some(patch.next_review_at);
}

#[async_trait]
impl ProgressRepository for LocalProgressStore {
    async fn get(
        &self,
        flashcard_id: FlashcardId,
        owner: &Owner,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        self.read_with(|map| {
            map.get(&flashcard_id.value())
                .map(|entry| entry.to_record(owner))
        })
    }

    async fn create(
        &self,
        flashcard_id: FlashcardId,
        owner: &Owner,
        initial_level: MasteryLevel,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError> {
        self.modify_with(|map| {
            if let Some(existing) = map.get(&flashcard_id.value()) {
                debug!(%flashcard_id, "progress already exists; create is a no-op");
                return Ok((existing.to_record(owner), false));
            }
            let record = ProgressRecord::new(flashcard_id, owner.clone(), initial_level, now);
            map.insert(flashcard_id.value(), StoredProgress::from_record(&record));
            Ok((record, true))
        })
    }

    async fn update(
        &self,
        flashcard_id: FlashcardId,
        owner: &Owner,
        patch: &ProgressPatch,
    ) -> Result<ProgressRecord, StorageError> {
        self.modify_with(|map| {
            let entry = map
                .get_mut(&flashcard_id.value())
                .ok_or(StorageError::NotFound)?;
            patched(entry, patch);
            Ok((entry.to_record(owner), true))
        })
    }

    async fn compare_and_update(
        &self,
        expected: &ProgressRecord,
        patch: &ProgressPatch,
    ) -> Result<ProgressRecord, StorageError> {
        self.modify_with(|map| {
            let entry = map
                .get_mut(&expected.flashcard_id().value())
                .ok_or(StorageError::NotFound)?;
            if !entry.same_version(expected) {
                return Err(StorageError::Conflict);
            }
            patched(entry, patch);
            Ok((entry.to_record(expected.owner()), true))
        })
    }

    async fn stats_for(
        &self,
        flashcard_ids: &[FlashcardId],
        _owner: &Owner,
    ) -> Result<ProgressStats, StorageError> {
        let ids = unique_ids(flashcard_ids);
        self.read_with(|map| {
            ProgressStats::from_levels(ids.iter().map(|id| {
                map.get(&id.value())
                    .map_or(MasteryLevel::MIN, |entry| entry.mastery_level)
            }))
        })
    }

    async fn due_flashcards(
        &self,
        owner: &Owner,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        self.read_with(|map| {
            let mut due: Vec<ProgressRecord> = map
                .values()
                .map(|entry| entry.to_record(owner))
                .filter(|record| record.is_due(now))
                .collect();
            due.sort_by_key(|record| (record.next_review_at(), record.flashcard_id()));
            due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            due
        })
    }

    async fn reviewed_between(
        &self,
        _owner: &Owner,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        self.read_with(|map| {
            let count = map
                .values()
                .filter(|entry| entry.correct_answers > 0 || entry.incorrect_answers > 0)
                .filter(|entry| entry.last_reviewed >= start && entry.last_reviewed < end)
                .count();
            u32::try_from(count).unwrap_or(u32::MAX)
        })
    }

    async fn clear_all(&self, _owner: &Owner) -> Result<(), StorageError> {
        self.ensure_available()?;
        self.medium.remove(PROGRESS_KEY)?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.medium.is_available()
    }
}

#[async_trait]
impl DailyGoalRepository for LocalProgressStore {
    async fn get_daily_goal(&self, _owner: &Owner) -> Result<Option<DailyGoal>, StorageError> {
        self.ensure_available()?;
        let Some(raw) = self.medium.read(DAILY_GOAL_KEY)? else {
            return Ok(None);
        };
        match DailyGoal::parse(&raw) {
            Ok(goal) => Ok(Some(goal)),
            Err(err) => {
                warn!(error = %err, "ignoring malformed local daily goal");
                Ok(None)
            }
        }
    }

    async fn set_daily_goal(&self, _owner: &Owner, goal: DailyGoal) -> Result<(), StorageError> {
        self.ensure_available()?;
        self.medium.write(DAILY_GOAL_KEY, &goal.to_string())?;
        Ok(())
    }
}

impl Storage {
    /// Build a `Storage` backed by a single-profile key-value medium.
    #[must_use]
    pub fn local(medium: Arc<dyn KeyValueMedium>) -> Self {
        let store = LocalProgressStore::new(medium);
        let progress: Arc<dyn ProgressRepository> = Arc::new(store.clone());
        let goals: Arc<dyn DailyGoalRepository> = Arc::new(store);
        Self { progress, goals }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use progress_core::time::fixed_now;

    fn store() -> (LocalProgressStore, MemoryMedium) {
        let medium = MemoryMedium::new();
        (LocalProgressStore::new(Arc::new(medium.clone())), medium)
    }

    fn id(v: u64) -> FlashcardId {
        FlashcardId::new(v)
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let (store, _) = store();
        let owner = Owner::Anonymous;
        let first = store
            .create(id(1), &owner, MasteryLevel::MIN, fixed_now())
            .await
            .unwrap();
        let answered = first.answered(true, fixed_now());
        store.update(id(1), &owner, &answered).await.unwrap();

        let again = store
            .create(id(1), &owner, MasteryLevel::MIN, fixed_now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(again.correct_answers(), 1);
        assert_eq!(again.mastery_level().value(), 2);
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let (store, _) = store();
        let record = ProgressRecord::new(id(9), Owner::Anonymous, MasteryLevel::MIN, fixed_now());
        let err = store
            .update(id(9), &Owner::Anonymous, &record.to_patch())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn stale_compare_and_update_conflicts() {
        let (store, _) = store();
        let owner = Owner::Anonymous;
        let snapshot = store
            .create(id(3), &owner, MasteryLevel::MIN, fixed_now())
            .await
            .unwrap();

        store
            .compare_and_update(&snapshot, &snapshot.answered(true, fixed_now()))
            .await
            .unwrap();
        let err = store
            .compare_and_update(&snapshot, &snapshot.answered(false, fixed_now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn every_write_replaces_the_whole_blob() {
        let (store, medium) = store();
        let owner = Owner::Anonymous;
        for v in [1, 2] {
            store
                .create(id(v), &owner, MasteryLevel::MIN, fixed_now())
                .await
                .unwrap();
        }
        let raw = medium.read(PROGRESS_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn corrupt_blob_reads_as_empty_and_is_replaced_on_write() {
        let (store, medium) = store();
        medium.write(PROGRESS_KEY, "{{{").unwrap();
        let owner = Owner::Anonymous;

        assert!(store.get(id(1), &owner).await.unwrap().is_none());
        let stats = store.stats_for(&[id(1)], &owner).await.unwrap();
        assert_eq!(stats.untouched, 1);

        store
            .create(id(1), &owner, MasteryLevel::MIN, fixed_now())
            .await
            .unwrap();
        assert!(store.get(id(1), &owner).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn disabled_medium_reports_unavailable() {
        let medium = MemoryMedium::disabled();
        let store = LocalProgressStore::new(Arc::new(medium));
        assert!(!store.is_available());
        let err = store
            .stats_for(&[id(1)], &Owner::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable));
    }

    #[tokio::test]
    async fn daily_goal_is_a_plain_integer_string() {
        let (store, medium) = store();
        let owner = Owner::Anonymous;
        assert_eq!(store.get_daily_goal(&owner).await.unwrap(), None);

        store
            .set_daily_goal(&owner, DailyGoal::new(25).unwrap())
            .await
            .unwrap();
        assert_eq!(medium.read(DAILY_GOAL_KEY).unwrap().as_deref(), Some("25"));
        assert_eq!(
            store.get_daily_goal(&owner).await.unwrap(),
            Some(DailyGoal::new(25).unwrap())
        );

        medium.write(DAILY_GOAL_KEY, "abc").unwrap();
        assert_eq!(store.get_daily_goal(&owner).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_all_is_idempotent() {
        let (store, _) = store();
        let owner = Owner::Anonymous;
        store
            .create(id(1), &owner, MasteryLevel::MIN, fixed_now())
            .await
            .unwrap();
        store.clear_all(&owner).await.unwrap();
        store.clear_all(&owner).await.unwrap();
        assert!(store.get(id(1), &owner).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn stores_sharing_a_medium_never_lose_updates() {
        let medium = MemoryMedium::new();
        let owner = Owner::Anonymous;
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = LocalProgressStore::new(Arc::new(medium.clone()));
            let owner = owner.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    loop {
                        let current = store
                            .create(id(7), &owner, MasteryLevel::MIN, fixed_now())
                            .await
                            .unwrap();
                        let patch = current.answered(true, fixed_now());
                        match store.compare_and_update(&current, &patch).await {
                            Ok(_) => break,
                            Err(StorageError::Conflict) => {}
                            Err(err) => panic!("unexpected error: {err}"),
                        }
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let store = LocalProgressStore::new(Arc::new(medium));
        let record = store.get(id(7), &owner).await.unwrap().unwrap();
        assert_eq!(record.correct_answers(), 800);
    }

    #[tokio::test]
    async fn saturated_counters_still_count_as_reviewed() {
        let (store, medium) = store();
        let raw = format!(
            r#"{{"1":{{"flashcardId":1,"correctAnswers":{max},"incorrectAnswers":{max},"lastReviewed":"2023-11-14T22:13:20Z","masteryLevel":5}}}}"#,
            max = u32::MAX
        );
        medium.write(PROGRESS_KEY, &raw).unwrap();

        let reviewed = store
            .reviewed_between(
                &Owner::Anonymous,
                fixed_now() - Duration::hours(1),
                fixed_now() + Duration::hours(1),
            )
            .await
            .unwrap();
        assert_eq!(reviewed, 1);
    }
}
