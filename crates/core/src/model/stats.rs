use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::FlashcardId;
use crate::model::progress::{MasteryBucket, MasteryLevel};

//
// ─── PROGRESS STATS ────────────────────────────────────────────────────────────
//

/// Bucket counts over a set of flashcards.
///
/// Flashcards without a stored record count as untouched and contribute 0 to
/// `mastery_sum`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStats {
    pub total: u32,
    pub mastered: u32,
    pub in_progress: u32,
    pub untouched: u32,
    pub mastery_sum: u64,
}

impl ProgressStats {
    /// Count one flashcard at `level`.
    pub fn record(&mut self, level: MasteryLevel) {
        self.total += 1;
        self.mastery_sum += u64::from(level.value());
        match level.bucket() {
            MasteryBucket::Mastered => self.mastered += 1,
            MasteryBucket::InProgress => self.in_progress += 1,
            MasteryBucket::Untouched => self.untouched += 1,
        }
    }

    /// Build stats from one level per flashcard.
    #[must_use]
    pub fn from_levels(levels: impl IntoIterator<Item = MasteryLevel>) -> Self {
        let mut stats = Self::default();
        for level in levels {
            stats.record(level);
        }
        stats
    }

    /// Sum two disjoint tallies.
    #[must_use]
    pub fn merged(self, other: Self) -> Self {
        Self {
            total: self.total + other.total,
            mastered: self.mastered + other.mastered,
            in_progress: self.in_progress + other.in_progress,
            untouched: self.untouched + other.untouched,
            mastery_sum: self.mastery_sum + other.mastery_sum,
        }
    }

    /// `sum(level) / total`, or 0 for an empty set.
    #[must_use]
    pub fn average_mastery_level(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        // Both values are small enough for exact f64 representation.
        #[allow(clippy::cast_precision_loss)]
        let avg = self.mastery_sum as f64 / f64::from(self.total);
        avg
    }

    /// True when the three buckets add up to `total`.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        u64::from(self.mastered) + u64::from(self.in_progress) + u64::from(self.untouched)
            == u64::from(self.total)
    }
}

//
// ─── CATEGORIES ────────────────────────────────────────────────────────────────
//

/// One category of the catalog together with the flashcards it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFlashcards {
    pub name: String,
    pub flashcard_ids: Vec<FlashcardId>,
}

impl CategoryFlashcards {
    #[must_use]
    pub fn new(name: impl Into<String>, flashcard_ids: Vec<FlashcardId>) -> Self {
        Self {
            name: name.into(),
            flashcard_ids,
        }
    }
}

/// Derived per-category view. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRollup {
    pub name: String,
    pub total: u32,
    pub mastered: u32,
    pub in_progress: u32,
    pub untouched: u32,
    pub average_mastery_level: f64,
}

impl CategoryRollup {
    #[must_use]
    pub fn from_stats(name: impl Into<String>, stats: &ProgressStats) -> Self {
        Self {
            name: name.into(),
            total: stats.total,
            mastered: stats.mastered,
            in_progress: stats.in_progress,
            untouched: stats.untouched,
            average_mastery_level: stats.average_mastery_level(),
        }
    }
}

/// Everything a dashboard needs in one read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub overall: ProgressStats,
    pub categories: Vec<CategoryRollup>,
    pub reviewed_today: u32,
    pub daily_goal: DailyGoal,
}

impl StatsReport {
    /// Report for a session whose storage cannot be read.
    #[must_use]
    pub fn empty(daily_goal: DailyGoal) -> Self {
        Self {
            overall: ProgressStats::default(),
            categories: Vec::new(),
            reviewed_today: 0,
            daily_goal,
        }
    }

    #[must_use]
    pub fn goal_reached(&self) -> bool {
        self.reviewed_today >= self.daily_goal.value()
    }
}

//
// ─── DAILY GOAL ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DailyGoalError {
    #[error("daily goal must be at least 1")]
    Zero,
    #[error("invalid daily goal: {0}")]
    Unparseable(String),
}

/// Number of reviews a learner aims for per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct DailyGoal(u32);

impl DailyGoal {
    pub const DEFAULT: DailyGoal = DailyGoal(10);

    /// # Errors
    ///
    /// Returns `DailyGoalError::Zero` for a goal of 0.
    pub fn new(value: u32) -> Result<Self, DailyGoalError> {
        if value == 0 {
            return Err(DailyGoalError::Zero);
        }
        Ok(Self(value))
    }

    /// Parse the plain integer string used by the local store.
    ///
    /// # Errors
    ///
    /// Returns `DailyGoalError` if the text is not a positive integer.
    pub fn parse(raw: &str) -> Result<Self, DailyGoalError> {
        let value = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| DailyGoalError::Unparseable(raw.to_owned()))?;
        Self::new(value)
    }

    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for DailyGoal {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for DailyGoal {
    type Error = DailyGoalError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DailyGoal> for u32 {
    fn from(goal: DailyGoal) -> Self {
        goal.0
    }
}

impl fmt::Display for DailyGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
