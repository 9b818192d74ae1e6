// crates/core/src/streak.rs
//! Streak transition arithmetic.
//!
//! A streak continues when activity lands on the same day or the next day
//! (in the user's timezone; callers resolve dates before arriving here).
//! A gap of more than one day resets the current streak to 1. Activity in
//! the past is ignored so backdated syncs cannot manipulate streaks.

use chrono::NaiveDate;

/// Apply one activity date to a streak, returning
/// `(current_streak, longest_streak)`.
pub fn advance(
    current_streak: i64,
    longest_streak: i64,
    last_active_date: Option<NaiveDate>,
    activity_date: NaiveDate,
) -> (i64, i64) {
    let Some(last) = last_active_date else {
        // First activity ever.
        return (1, longest_streak.max(1));
    };

    if activity_date == last {
        return (current_streak, longest_streak);
    }

    let day_diff = (activity_date - last).num_days();
    if day_diff == 1 {
        let current = current_streak + 1;
        (current, longest_streak.max(current))
    } else if day_diff > 1 {
        (1, longest_streak)
    } else {
        (current_streak, longest_streak)
    }
}

/// True when an active streak has lapsed: more than one full day between
/// the last active date and today (both in the user's timezone).
pub fn is_broken(current_streak: i64, last_active_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    let Some(last) = last_active_date else {
        return false;
    };
    current_streak > 0 && (today - last).num_days() > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn first_activity_starts_at_one() {
        assert_eq!(advance(0, 0, None, d("2024-01-15")), (1, 1));
    }

    #[test]
    fn first_activity_keeps_a_higher_historical_longest() {
        assert_eq!(advance(0, 9, None, d("2024-01-15")), (1, 9));
    }

    #[test]
    fn same_day_is_a_no_op() {
        assert_eq!(advance(5, 8, Some(d("2024-01-15")), d("2024-01-15")), (5, 8));
    }

    #[test]
    fn next_day_extends() {
        assert_eq!(advance(5, 8, Some(d("2024-01-15")), d("2024-01-16")), (6, 8));
        assert_eq!(advance(8, 8, Some(d("2024-01-15")), d("2024-01-16")), (9, 9));
    }

    #[test]
    fn gap_resets_current_but_keeps_longest() {
        assert_eq!(advance(5, 8, Some(d("2024-01-15")), d("2024-01-17")), (1, 8));
        assert_eq!(advance(5, 8, Some(d("2024-01-15")), d("2024-03-01")), (1, 8));
    }

    #[test]
    fn past_activity_is_ignored() {
        assert_eq!(advance(5, 8, Some(d("2024-01-15")), d("2024-01-10")), (5, 8));
    }

    #[test]
    fn continues_across_month_boundary() {
        assert_eq!(
            advance(20, 25, Some(d("2024-01-31")), d("2024-02-01")),
            (21, 25)
        );
    }

    #[test]
    fn continues_across_leap_february() {
        assert_eq!(
            advance(3, 3, Some(d("2024-02-28")), d("2024-02-29")),
            (4, 4)
        );
        assert_eq!(
            advance(4, 4, Some(d("2024-02-29")), d("2024-03-01")),
            (5, 5)
        );
    }

    #[test]
    fn break_detection() {
        assert!(!is_broken(0, Some(d("2024-01-10")), d("2024-01-20")));
        assert!(!is_broken(3, None, d("2024-01-20")));
        assert!(!is_broken(3, Some(d("2024-01-19")), d("2024-01-20")));
        assert!(is_broken(3, Some(d("2024-01-18")), d("2024-01-20")));
    }
}
