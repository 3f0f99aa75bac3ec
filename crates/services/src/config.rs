use chrono::{FixedOffset, Offset, Utc};

use progress_core::Clock;
use progress_core::model::DailyGoal;

/// Tuning for answer processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressConfig {
    /// How many read-compute-write rounds `record_answer` attempts before
    /// giving up on a contended record.
    pub max_write_attempts: u32,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: 3,
        }
    }
}

/// Tuning for stats aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsConfig {
    /// Goal reported when the owner never set one.
    pub default_daily_goal: DailyGoal,
    /// Offset of the caller's local clock; decides where "today" starts.
    pub utc_offset: FixedOffset,
}

impl StatsConfig {
    /// Same config with the day boundary shifted by `minutes` east of UTC.
    ///
    /// Returns `None` if the offset is a day or more.
    #[must_use]
    pub fn with_offset_minutes(self, minutes: i32) -> Option<Self> {
        let utc_offset = FixedOffset::east_opt(minutes.checked_mul(60)?)?;
        Some(Self { utc_offset, ..self })
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            default_daily_goal: DailyGoal::DEFAULT,
            utc_offset: Utc.fix(),
        }
    }
}

/// Everything a session needs besides its storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub clock: Clock,
    pub progress: ProgressConfig,
    pub stats: StatsConfig,
}
