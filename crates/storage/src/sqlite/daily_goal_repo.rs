use async_trait::async_trait;
use progress_core::model::{DailyGoal, Owner};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{conn, ser, u32_from_i64},
};
use crate::repository::{DailyGoalRepository, StorageError};

#[async_trait]
impl DailyGoalRepository for SqliteRepository {
    async fn get_daily_goal(&self, owner: &Owner) -> Result<Option<DailyGoal>, StorageError> {
        let row = sqlx::query("SELECT goal FROM daily_goals WHERE owner = ?1")
            .bind(owner.storage_key())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let goal = u32_from_i64("goal", row.try_get::<i64, _>("goal").map_err(ser)?)?;
        DailyGoal::new(goal).map(Some).map_err(ser)
    }

    async fn set_daily_goal(&self, owner: &Owner, goal: DailyGoal) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO daily_goals (owner, goal)
            VALUES (?1, ?2)
            ON CONFLICT(owner) DO UPDATE SET
                goal = excluded.goal
            ",
        )
        .bind(owner.storage_key())
        .bind(i64::from(goal.value()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
