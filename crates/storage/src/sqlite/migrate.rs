use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs pending schema migrations.
///
/// Version 1 creates the progress table, the daily goal table and the
/// per-owner scheduling indexes.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS flashcard_progress (
                    flashcard_id INTEGER NOT NULL,
                    owner TEXT NOT NULL,
                    mastery_level INTEGER NOT NULL CHECK (mastery_level BETWEEN 0 AND 5),
                    correct_answers INTEGER NOT NULL CHECK (correct_answers >= 0),
                    incorrect_answers INTEGER NOT NULL CHECK (incorrect_answers >= 0),
                    next_review_at TEXT NOT NULL,
                    last_reviewed_at TEXT NOT NULL,
                    PRIMARY KEY (flashcard_id, owner)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS daily_goals (
                    owner TEXT PRIMARY KEY,
                    goal INTEGER NOT NULL CHECK (goal >= 1)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_owner_next_review
                    ON flashcard_progress (owner, next_review_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_owner_last_reviewed
                    ON flashcard_progress (owner, last_reviewed_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
