//! Mastery rating and review scheduling.
//!
//! Pure functions: the next level after an answer, and how long until the
//! card should be reviewed again at a given level.
//!
//! Only one promotion rule exists. A wrong answer never lowers the level; a
//! correct answer jumps the first two levels (0 -> 2, 1 -> 3) and then climbs
//! one step at a time up to 5. An older +1/-1 stepping rule is
//! not supported.

use chrono::{DateTime, Duration, Utc};

use crate::model::MasteryLevel;

/// Level reached after answering a card currently at `current`.
///
/// # Examples
///
/// ```
/// # use progress_core::mastery::next_level;
/// # use progress_core::model::MasteryLevel;
/// let zero = MasteryLevel::new(0).unwrap();
/// assert_eq!(next_level(zero, true).value(), 2);
/// assert_eq!(next_level(zero, false).value(), 0);
/// ```
#[must_use]
pub fn next_level(current: MasteryLevel, is_correct: bool) -> MasteryLevel {
    if !is_correct {
        return current;
    }
    match current.value() {
        0 => MasteryLevel::clamped(2),
        1 => MasteryLevel::clamped(3),
        n => MasteryLevel::clamped(n.saturating_add(1)),
    }
}

/// Delay before a card at `level` is due again.
#[must_use]
pub fn review_interval(level: MasteryLevel) -> Duration {
    match level.value() {
        0 => Duration::hours(1),
        1 => Duration::hours(6),
        2 => Duration::hours(24),
        3 => Duration::days(3),
        4 => Duration::days(7),
        _ => Duration::days(30),
    }
}

/// Timestamp at which a card answered at `now` and left at `level` is due.
#[must_use]
pub fn next_review_date(level: MasteryLevel, now: DateTime<Utc>) -> DateTime<Utc> {
    now + review_interval(level)
}
