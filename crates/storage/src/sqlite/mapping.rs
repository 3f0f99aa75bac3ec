use progress_core::model::{
    FlashcardId, MasteryLevel, Owner, ProgressPatch, ProgressRecord,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Map driver errors; a closed pool means the store is gone, not flaky.
pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::PoolClosed => StorageError::Unavailable,
        other => StorageError::Connection(other.to_string()),
    }
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn flashcard_id_from_i64(v: i64) -> Result<FlashcardId, StorageError> {
    Ok(FlashcardId::new(i64_to_u64("flashcard_id", v)?))
}

pub(crate) fn flashcard_id_to_i64(id: FlashcardId) -> Result<i64, StorageError> {
    i64::try_from(id.value())
        .map_err(|_| StorageError::Serialization("flashcard_id overflow".into()))
}

pub(crate) fn map_progress_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProgressRecord, StorageError> {
    let flashcard_id = flashcard_id_from_i64(row.try_get::<i64, _>("flashcard_id").map_err(ser)?)?;
    let owner = Owner::from_storage_key(&row.try_get::<String, _>("owner").map_err(ser)?)
        .map_err(ser)?;
    let mastery_level =
        MasteryLevel::try_from(row.try_get::<i64, _>("mastery_level").map_err(ser)?)
            .map_err(ser)?;
    let correct_answers = u32_from_i64(
        "correct_answers",
        row.try_get::<i64, _>("correct_answers").map_err(ser)?,
    )?;
    let incorrect_answers = u32_from_i64(
        "incorrect_answers",
        row.try_get::<i64, _>("incorrect_answers").map_err(ser)?,
    )?;

    Ok(ProgressRecord::from_persisted(
        flashcard_id,
        owner,
        ProgressPatch {
            mastery_level,
            correct_answers,
            incorrect_answers,
            next_review_at: row.try_get("next_review_at").map_err(ser)?,
            last_reviewed_at: row.try_get("last_reviewed_at").map_err(ser)?,
        },
    ))
}
