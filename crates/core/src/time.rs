use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Returns true if this clock is fixed.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

/// Half-open UTC range `[start, end)` covering the calendar day that contains
/// `at` in the given local offset.
#[must_use]
pub fn local_day_bounds(at: DateTime<Utc>, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = at
        .with_timezone(&offset)
        .date_naive()
        .and_time(NaiveTime::MIN);
    let start = (local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc();
    (start, start + Duration::days(1))
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), fixed_now() + Duration::hours(2));
        assert!(clock.is_fixed());
    }

    #[test]
    fn utc_day_bounds_start_at_midnight() {
        // 2023-11-14T22:13:20Z
        let (start, end) = local_day_bounds(fixed_now(), FixedOffset::east_opt(0).unwrap());
        assert_eq!(start.to_rfc3339(), "2023-11-14T00:00:00+00:00");
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn positive_offset_rolls_into_next_local_day() {
        // 22:13Z is 00:13 on the 15th at UTC+2.
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let (start, end) = local_day_bounds(fixed_now(), offset);
        assert_eq!(start.to_rfc3339(), "2023-11-14T22:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2023-11-15T22:00:00+00:00");
        assert!(start <= fixed_now() && fixed_now() < end);
    }

    #[test]
    fn negative_offset_bounds_contain_instant() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let (start, end) = local_day_bounds(fixed_now(), offset);
        assert_eq!(start.to_rfc3339(), "2023-11-14T05:00:00+00:00");
        assert!(start <= fixed_now() && fixed_now() < end);
    }
}
