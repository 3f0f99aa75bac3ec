use chrono::{DateTime, Utc};
use progress_core::model::{
    FlashcardId, MasteryLevel, Owner, ProgressPatch, ProgressRecord, ProgressStats,
};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{conn, flashcard_id_to_i64, map_progress_row, ser, u32_from_i64},
};
use crate::repository::{ProgressRepository, StorageError, unique_ids};

// Stay well below SQLite's bound-parameter limit.
const STATS_CHUNK: usize = 500;

const PROGRESS_COLUMNS: &str = "flashcard_id, owner, mastery_level, correct_answers, \
    incorrect_answers, next_review_at, last_reviewed_at";

impl SqliteRepository {
    async fn stats_chunk(
        &self,
        ids: &[FlashcardId],
        owner: &Owner,
    ) -> Result<ProgressStats, StorageError> {
        let mut sql = String::from(
            r"
            SELECT
                COALESCE(SUM(CASE WHEN mastery_level >= 4 THEN 1 ELSE 0 END), 0) AS mastered,
                COALESCE(SUM(CASE WHEN mastery_level BETWEEN 1 AND 3 THEN 1 ELSE 0 END), 0)
                    AS in_progress,
                COALESCE(SUM(mastery_level), 0) AS mastery_sum
            FROM flashcard_progress
            WHERE owner = ?1 AND flashcard_id IN (
            ",
        );
        for i in 0..ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 2).to_string());
        }
        sql.push_str(")\n");

        let mut q = sqlx::query(&sql).bind(owner.storage_key());
        for id in ids {
            q = q.bind(flashcard_id_to_i64(*id)?);
        }
        let row = q.fetch_one(&self.pool).await.map_err(conn)?;

        let mastered = u32_from_i64("mastered", row.try_get::<i64, _>("mastered").map_err(ser)?)?;
        let in_progress = u32_from_i64(
            "in_progress",
            row.try_get::<i64, _>("in_progress").map_err(ser)?,
        )?;
        let mastery_sum = u64::try_from(row.try_get::<i64, _>("mastery_sum").map_err(ser)?)
            .map_err(ser)?;
        let total = u32::try_from(ids.len()).map_err(ser)?;
        let untouched = total
            .checked_sub(mastered + in_progress)
            .ok_or_else(|| StorageError::Serialization("bucket counts exceed total".into()))?;

        Ok(ProgressStats {
            total,
            mastered,
            in_progress,
            untouched,
            mastery_sum,
        })
    }

    async fn exists(&self, flashcard_id: FlashcardId, owner: &Owner) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT 1 FROM flashcard_progress WHERE flashcard_id = ?1 AND owner = ?2",
        )
        .bind(flashcard_id_to_i64(flashcard_id)?)
        .bind(owner.storage_key())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        Ok(row.is_some())
    }
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get(
        &self,
        flashcard_id: FlashcardId,
        owner: &Owner,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM flashcard_progress \
             WHERE flashcard_id = ?1 AND owner = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(flashcard_id_to_i64(flashcard_id)?)
            .bind(owner.storage_key())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn create(
        &self,
        flashcard_id: FlashcardId,
        owner: &Owner,
        initial_level: MasteryLevel,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError> {
        let fresh = ProgressRecord::new(flashcard_id, owner.clone(), initial_level, now);
        let id = flashcard_id_to_i64(flashcard_id)?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO flashcard_progress (
                flashcard_id, owner, mastery_level, correct_answers, incorrect_answers,
                next_review_at, last_reviewed_at
            )
            VALUES (?1, ?2, ?3, 0, 0, ?4, ?5)
            ON CONFLICT(flashcard_id, owner) DO NOTHING
            ",
        )
        .bind(id)
        .bind(owner.storage_key())
        .bind(i64::from(initial_level.value()))
        .bind(fresh.next_review_at())
        .bind(fresh.last_reviewed_at())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM flashcard_progress \
             WHERE flashcard_id = ?1 AND owner = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(owner.storage_key())
            .fetch_one(&mut *tx)
            .await
            .map_err(conn)?;
        let stored = map_progress_row(&row)?;

        tx.commit().await.map_err(conn)?;
        Ok(stored)
    }

    async fn update(
        &self,
        flashcard_id: FlashcardId,
        owner: &Owner,
        patch: &ProgressPatch,
    ) -> Result<ProgressRecord, StorageError> {
        let res = sqlx::query(
            r"
            UPDATE flashcard_progress SET
                mastery_level = ?1,
                correct_answers = ?2,
                incorrect_answers = ?3,
                next_review_at = ?4,
                last_reviewed_at = ?5
            WHERE flashcard_id = ?6 AND owner = ?7
            ",
        )
        .bind(i64::from(patch.mastery_level.value()))
        .bind(i64::from(patch.correct_answers))
        .bind(i64::from(patch.incorrect_answers))
        .bind(patch.next_review_at)
        .bind(patch.last_reviewed_at)
        .bind(flashcard_id_to_i64(flashcard_id)?)
        .bind(owner.storage_key())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(ProgressRecord::from_persisted(
            flashcard_id,
            owner.clone(),
            patch.clone(),
        ))
    }

    async fn compare_and_update(
        &self,
        expected: &ProgressRecord,
        patch: &ProgressPatch,
    ) -> Result<ProgressRecord, StorageError> {
        let res = sqlx::query(
            r"
            UPDATE flashcard_progress SET
                mastery_level = ?1,
                correct_answers = ?2,
                incorrect_answers = ?3,
                next_review_at = ?4,
                last_reviewed_at = ?5
            WHERE flashcard_id = ?6
              AND owner = ?7
              AND correct_answers = ?8
              AND incorrect_answers = ?9
            ",
        )
        .bind(i64::from(patch.mastery_level.value()))
        .bind(i64::from(patch.correct_answers))
        .bind(i64::from(patch.incorrect_answers))
        .bind(patch.next_review_at)
        .bind(patch.last_reviewed_at)
        .bind(flashcard_id_to_i64(expected.flashcard_id())?)
        .bind(expected.owner().storage_key())
        .bind(i64::from(expected.correct_answers()))
        .bind(i64::from(expected.incorrect_answers()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return if self.exists(expected.flashcard_id(), expected.owner()).await? {
                Err(StorageError::Conflict)
            } else {
                Err(StorageError::NotFound)
            };
        }

        Ok(ProgressRecord::from_persisted(
            expected.flashcard_id(),
            expected.owner().clone(),
            patch.clone(),
        ))
    }

    async fn stats_for(
        &self,
        flashcard_ids: &[FlashcardId],
        owner: &Owner,
    ) -> Result<ProgressStats, StorageError> {
        let ids = unique_ids(flashcard_ids);
        let mut stats = ProgressStats::default();
        for chunk in ids.chunks(STATS_CHUNK) {
            stats = stats.merged(self.stats_chunk(chunk, owner).await?);
        }
        Ok(stats)
    }

    async fn due_flashcards(
        &self,
        owner: &Owner,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM flashcard_progress \
             WHERE owner = ?1 AND next_review_at <= ?2 \
             ORDER BY next_review_at ASC, flashcard_id ASC \
             LIMIT ?3"
        );
        let rows = sqlx::query(&sql)
            .bind(owner.storage_key())
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_progress_row(&row)?);
        }
        Ok(out)
    }

    async fn reviewed_between(
        &self,
        owner: &Owner,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS reviewed
            FROM flashcard_progress
            WHERE owner = ?1
              AND last_reviewed_at >= ?2
              AND last_reviewed_at < ?3
              AND (correct_answers + incorrect_answers) > 0
            ",
        )
        .bind(owner.storage_key())
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        u32_from_i64("reviewed", row.try_get::<i64, _>("reviewed").map_err(ser)?)
    }

    async fn clear_all(&self, owner: &Owner) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM flashcard_progress WHERE owner = ?1")
            .bind(owner.storage_key())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        !self.pool.is_closed()
    }
}
