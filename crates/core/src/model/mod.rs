mod ids;
mod progress;
mod stats;

pub use ids::{FlashcardId, Owner, OwnerError, ParseIdError, UserId};
pub use progress::{MasteryBucket, MasteryLevel, MasteryLevelError, ProgressPatch, ProgressRecord};
pub use stats::{
    CategoryFlashcards, CategoryRollup, DailyGoal, DailyGoalError, ProgressStats, StatsReport,
};
