//! JSON shape of the local progress blob.
//!
//! The blob is one object keyed by the decimal flashcard id:
//!
//! ```json
//! {
//!   "101": {
//!     "flashcardId": 101,
//!     "correctAnswers": 1,
//!     "incorrectAnswers": 0,
//!     "lastReviewed": "2023-11-14T22:13:20Z",
//!     "masteryLevel": 2,
//!     "nextReviewDate": "2023-11-15T22:13:20Z"
//!   }
//! }
//! ```
//!
//! `nextReviewDate` is optional on read; entries written without it are
//! rescheduled from `lastReviewed` and their level.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use progress_core::mastery;
use progress_core::model::{FlashcardId, MasteryLevel, Owner, ProgressPatch, ProgressRecord};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::repository::StorageError;

/// Decoded blob, keyed by flashcard id.
pub(crate) type ProgressMap = BTreeMap<u64, StoredProgress>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredProgress {
    pub flashcard_id: u64,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    pub last_reviewed: DateTime<Utc>,
    pub mastery_level: MasteryLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_review_date: Option<DateTime<Utc>>,
}

impl StoredProgress {
    pub(crate) fn from_record(record: &ProgressRecord) -> Self {
        Self {
            flashcard_id: record.flashcard_id().value(),
            correct_answers: record.correct_answers(),
            incorrect_answers: record.incorrect_answers(),
            last_reviewed: record.last_reviewed_at(),
            mastery_level: record.mastery_level(),
            next_review_date: Some(record.next_review_at()),
        }
    }

    pub(crate) fn to_record(&self, owner: &Owner) -> ProgressRecord {
        let next_review_at = self
            .next_review_date
            .unwrap_or_else(|| mastery::next_review_date(self.mastery_level, self.last_reviewed));
        ProgressRecord::from_persisted(
            FlashcardId::new(self.flashcard_id),
            owner.clone(),
            ProgressPatch {
                mastery_level: self.mastery_level,
                correct_answers: self.correct_answers,
                incorrect_answers: self.incorrect_answers,
                next_review_at,
                last_reviewed_at: self.last_reviewed,
            },
        )
    }

    pub(crate) fn same_version(&self, record: &ProgressRecord) -> bool {
        self.correct_answers == record.correct_answers()
            && self.incorrect_answers == record.incorrect_answers()
    }
}

/// Decode a blob, dropping whatever cannot be read.
///
/// A blob that is not a JSON object decodes to an empty map; individual
/// entries that fail to parse are skipped.
pub(crate) fn decode(raw: &str) -> ProgressMap {
    let entries: BTreeMap<String, serde_json::Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(error = %err, "local progress blob is corrupt; starting from empty progress");
            return ProgressMap::new();
        }
    };

    let mut map = ProgressMap::new();
    for (key, value) in entries {
        match serde_json::from_value::<StoredProgress>(value) {
            Ok(entry) => {
                if key != entry.flashcard_id.to_string() {
                    warn!(key = %key, flashcard_id = entry.flashcard_id, "local progress entry key does not match its id");
                }
                map.insert(entry.flashcard_id, entry);
            }
            Err(err) => {
                warn!(key = %key, error = %err, "skipping malformed local progress entry");
            }
        }
    }
    map
}

/// Encode the full map; every write replaces the whole blob.
pub(crate) fn encode(map: &ProgressMap) -> Result<String, StorageError> {
    let keyed: BTreeMap<String, &StoredProgress> =
        map.iter().map(|(id, entry)| (id.to_string(), entry)).collect();
    serde_json::to_string(&keyed).map_err(|e| StorageError::Serialization(e.to_string()))
}
