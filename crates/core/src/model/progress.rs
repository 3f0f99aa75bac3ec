use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::mastery;
use crate::model::ids::{FlashcardId, Owner};

//
// ─── MASTERY LEVEL ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MasteryLevelError {
    #[error("mastery level must be between 0 and 5, got {provided}")]
    OutOfRange { provided: i64 },
}

/// Bounded 0..=5 rating of how well a flashcard is known.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct MasteryLevel(u8);

impl MasteryLevel {
    pub const MIN: MasteryLevel = MasteryLevel(0);
    pub const MAX: MasteryLevel = MasteryLevel(5);
    /// Lowest level counted as mastered.
    pub const MASTERED: MasteryLevel = MasteryLevel(4);

    /// # Errors
    ///
    /// Returns `MasteryLevelError::OutOfRange` for values above 5.
    pub fn new(value: u8) -> Result<Self, MasteryLevelError> {
        Self::try_from(i64::from(value))
    }

    /// Saturating constructor for arithmetic that must stay within bounds.
    #[must_use]
    pub fn clamped(value: u8) -> Self {
        Self(value.min(Self::MAX.0))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn bucket(self) -> MasteryBucket {
        MasteryBucket::of(self)
    }

    #[must_use]
    pub fn is_mastered(self) -> bool {
        self >= Self::MASTERED
    }

    #[must_use]
    pub fn is_in_progress(self) -> bool {
        self > Self::MIN && self < Self::MASTERED
    }

    #[must_use]
    pub fn is_untouched(self) -> bool {
        self == Self::MIN
    }

    /// Every valid level, lowest first.
    pub fn all() -> impl Iterator<Item = MasteryLevel> {
        (Self::MIN.0..=Self::MAX.0).map(MasteryLevel)
    }
}

impl TryFrom<i64> for MasteryLevel {
    type Error = MasteryLevelError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX.0)
            .map(MasteryLevel)
            .ok_or(MasteryLevelError::OutOfRange { provided: value })
    }
}

impl From<MasteryLevel> for u8 {
    fn from(level: MasteryLevel) -> Self {
        level.0
    }
}

impl fmt::Debug for MasteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasteryLevel({})", self.0)
    }
}

impl fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three mutually exclusive stats buckets a level falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MasteryBucket {
    Untouched,
    InProgress,
    Mastered,
}

impl MasteryBucket {
    #[must_use]
    pub fn of(level: MasteryLevel) -> Self {
        if level.is_mastered() {
            Self::Mastered
        } else if level.is_untouched() {
            Self::Untouched
        } else {
            Self::InProgress
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MasteryBucket::Untouched => "untouched",
            MasteryBucket::InProgress => "in_progress",
            MasteryBucket::Mastered => "mastered",
        }
    }
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Per-flashcard, per-owner learning state.
///
/// Counters only grow, so `answer_count()` doubles as a version number for
/// conditional writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    flashcard_id: FlashcardId,
    owner: Owner,
    mastery_level: MasteryLevel,
    correct_answers: u32,
    incorrect_answers: u32,
    next_review_at: DateTime<Utc>,
    last_reviewed_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Fresh record at `initial_level` with no answers, scheduled from `now`.
    #[must_use]
    pub fn new(
        flashcard_id: FlashcardId,
        owner: Owner,
        initial_level: MasteryLevel,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            flashcard_id,
            owner,
            mastery_level: initial_level,
            correct_answers: 0,
            incorrect_answers: 0,
            next_review_at: mastery::next_review_date(initial_level, now),
            last_reviewed_at: now,
        }
    }

    /// Rehydrate a record loaded from storage.
    #[must_use]
    pub fn from_persisted(
        flashcard_id: FlashcardId,
        owner: Owner,
        patch: ProgressPatch,
    ) -> Self {
        Self {
            flashcard_id,
            owner,
            mastery_level: patch.mastery_level,
            correct_answers: patch.correct_answers,
            incorrect_answers: patch.incorrect_answers,
            next_review_at: patch.next_review_at,
            last_reviewed_at: patch.last_reviewed_at,
        }
    }

    #[must_use]
    pub fn flashcard_id(&self) -> FlashcardId {
        self.flashcard_id
    }

    #[must_use]
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    #[must_use]
    pub fn mastery_level(&self) -> MasteryLevel {
        self.mastery_level
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    #[must_use]
    pub fn incorrect_answers(&self) -> u32 {
        self.incorrect_answers
    }

    #[must_use]
    pub fn next_review_at(&self) -> DateTime<Utc> {
        self.next_review_at
    }

    #[must_use]
    pub fn last_reviewed_at(&self) -> DateTime<Utc> {
        self.last_reviewed_at
    }

    #[must_use]
    pub fn answer_count(&self) -> u64 {
        u64::from(self.correct_answers) + u64::from(self.incorrect_answers)
    }

    #[must_use]
    pub fn has_answers(&self) -> bool {
        self.answer_count() > 0
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }

    #[must_use]
    pub fn bucket(&self) -> MasteryBucket {
        self.mastery_level.bucket()
    }

    /// Current mutable state, in the shape `update` accepts.
    #[must_use]
    pub fn to_patch(&self) -> ProgressPatch {
        ProgressPatch {
            mastery_level: self.mastery_level,
            correct_answers: self.correct_answers,
            incorrect_answers: self.incorrect_answers,
            next_review_at: self.next_review_at,
            last_reviewed_at: self.last_reviewed_at,
        }
    }

    /// State after answering this card at `now`.
    ///
    /// Counters saturate instead of wrapping.
    #[must_use]
    pub fn answered(&self, is_correct: bool, now: DateTime<Utc>) -> ProgressPatch {
        let mastery_level = mastery::next_level(self.mastery_level, is_correct);
        let (correct_answers, incorrect_answers) = if is_correct {
            (self.correct_answers.saturating_add(1), self.incorrect_answers)
        } else {
            (self.correct_answers, self.incorrect_answers.saturating_add(1))
        };
        ProgressPatch {
            mastery_level,
            correct_answers,
            incorrect_answers,
            next_review_at: mastery::next_review_date(mastery_level, now),
            last_reviewed_at: now,
        }
    }

    /// Overwrite the mutable state in place.
    pub fn apply(&mut self, patch: &ProgressPatch) {
        self.mastery_level = patch.mastery_level;
        self.correct_answers = patch.correct_answers;
        self.incorrect_answers = patch.incorrect_answers;
        self.next_review_at = patch.next_review_at;
        self.last_reviewed_at = patch.last_reviewed_at;
    }
}

/// Full mutable state of a `ProgressRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressPatch {
    pub mastery_level: MasteryLevel,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    pub next_review_at: DateTime<Utc>,
    pub last_reviewed_at: DateTime<Utc>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
