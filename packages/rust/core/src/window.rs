//! Inclusive day window for a fetch run.

use chrono::{Days, NaiveDate};
use tracing::info;

use bodacc_shared::{BodaccError, Result};

/// Inclusive range of days to fetch, ending no later than yesterday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DayWindow {
    /// Resolve the window from optional bounds relative to `today`.
    ///
    /// Missing bounds default to the `depth` days ending yesterday. An end on
    /// or after `today` is clamped to yesterday: the current day's feed is
    /// still growing and a day artifact is never refetched.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        depth: u32,
        today: NaiveDate,
    ) -> Result<Self> {
        let yesterday = today
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| BodaccError::validation(format!("no day before {today}")))?;

        let mut end = end.unwrap_or(yesterday);
        if end >= today {
            info!(requested = %end, %today, "end date not yet complete, clamping to yesterday");
            end = yesterday;
        }

        let start = match start {
            Some(start) => start,
            None => yesterday
                .checked_sub_days(Days::new(u64::from(depth.max(1) - 1)))
                .ok_or_else(|| BodaccError::validation(format!("depth {depth} out of range")))?,
        };

        if start > end {
            return Err(BodaccError::InvalidRange { start, end });
        }

        Ok(Self { start, end })
    }

    /// Days in ascending order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }

    /// Number of days in the window (at least one).
    pub fn day_count(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn default_window_ends_yesterday() {
        let window = DayWindow::resolve(None, None, 7, date(2024, 3, 10)).unwrap();
        assert_eq!(window.start, date(2024, 3, 3));
        assert_eq!(window.end, date(2024, 3, 9));
        assert_eq!(window.day_count(), 7);
    }

    #[test]
    fn end_today_or_later_is_clamped() {
        let today = date(2024, 3, 10);
        let window = DayWindow::resolve(Some(date(2024, 3, 1)), Some(today), 7, today).unwrap();
        assert_eq!(window.end, date(2024, 3, 9));

        let window =
            DayWindow::resolve(Some(date(2024, 3, 1)), Some(date(2024, 4, 1)), 7, today).unwrap();
        assert_eq!(window.end, date(2024, 3, 9));
    }

    #[test]
    fn past_end_is_kept() {
        let window = DayWindow::resolve(
            Some(date(2024, 2, 27)),
            Some(date(2024, 3, 2)),
            7,
            date(2024, 3, 10),
        )
        .unwrap();
        let days: Vec<_> = window.days().collect();
        assert_eq!(
            days,
            vec![
                date(2024, 2, 27),
                date(2024, 2, 28),
                date(2024, 2, 29),
                date(2024, 3, 1),
                date(2024, 3, 2)
            ]
        );
    }

    #[test]
    fn start_after_end_is_invalid() {
        let err = DayWindow::resolve(
            Some(date(2024, 3, 5)),
            Some(date(2024, 3, 4)),
            7,
            date(2024, 3, 10),
        )
        .unwrap_err();
        assert!(matches!(err, BodaccError::InvalidRange { .. }));

        // Start today: the clamped end falls before it.
        let today = date(2024, 3, 10);
        let err = DayWindow::resolve(Some(today), None, 7, today).unwrap_err();
        assert!(matches!(err, BodaccError::InvalidRange { .. }));
    }

    #[test]
    fn single_day_window() {
        let window = DayWindow::resolve(None, None, 1, date(2024, 3, 10)).unwrap();
        assert_eq!(window.start, window.end);
        assert_eq!(window.days().count(), 1);
    }
}
