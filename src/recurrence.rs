//! Recurrence engine: computes the next occurrence of a recurring task.
//!
//! Pure functions only; callers pass the evaluation base time so results
//! are deterministic and testable.

use chrono::{DateTime, Duration, Utc};
use croner::Cron;

use crate::db::models::Frequency;
use crate::error::{AppError, AppResult};

/// Compute the next occurrence strictly after `base`.
///
/// Fixed frequencies use flat offsets: `daily` adds `interval` days,
/// `weekly` adds `interval` weeks, `monthly` adds `interval * 30` days
/// (a documented approximation, kept for determinism). `custom` evaluates
/// the 5-field cron expression and returns its next firing strictly after
/// `base` -- an expression firing exactly at `base` yields the following
/// occurrence.
pub fn next_occurrence(
    frequency: Frequency,
    interval: u32,
    cron_expression: Option<&str>,
    base: DateTime<Utc>,
) -> AppResult<DateTime<Utc>> {
    let interval = interval as i64;

    match frequency {
        Frequency::Daily => Ok(base + Duration::days(interval)),
        Frequency::Weekly => Ok(base + Duration::weeks(interval)),
        Frequency::Monthly => Ok(base + Duration::days(30 * interval)),
        Frequency::Custom => {
            let expr = cron_expression.ok_or_else(|| {
                AppError::Validation("Cron expression required for custom frequency".to_string())
            })?;
            let cron = parse_cron(expr)?;
            cron.find_next_occurrence(&base, false)
                .map_err(|e| AppError::Validation(format!("Invalid cron expression: {}", e)))
        }
    }
}

/// Parse and validate a 5-field cron expression.
///
/// Used both by the engine and by the API layer so a bad expression is
/// rejected at rule-creation time rather than at first evaluation.
pub fn parse_cron(expr: &str) -> AppResult<Cron> {
    Cron::new(expr)
        .parse()
        .map_err(|e| AppError::Validation(format!("Invalid cron expression: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn daily_interval_is_exact_days() {
        let base = at(2026, 2, 2, 9, 0, 0);
        for k in 1..=5u32 {
            let next = next_occurrence(Frequency::Daily, k, None, base).unwrap();
            assert_eq!((next - base).num_seconds(), k as i64 * 86_400);
        }
    }

    #[test]
    fn weekly_interval_one_is_seven_days() {
        let base = at(2026, 2, 2, 9, 0, 0);
        let next = next_occurrence(Frequency::Weekly, 1, None, base).unwrap();
        assert_eq!(next, at(2026, 2, 9, 9, 0, 0));
    }

    #[test]
    fn monthly_uses_thirty_day_approximation() {
        let base = at(2026, 1, 15, 12, 30, 0);
        let next = next_occurrence(Frequency::Monthly, 2, None, base).unwrap();
        assert_eq!((next - base).num_days(), 60);
    }

    #[test]
    fn cron_monday_nine_advances_a_week_from_monday_nine() {
        // 2026-02-02 is a Monday.
        let base = at(2026, 2, 2, 9, 0, 0);
        let next = next_occurrence(Frequency::Custom, 1, Some("0 9 * * 1"), base).unwrap();
        assert_eq!(next, at(2026, 2, 9, 9, 0, 0));
    }

    #[test]
    fn cron_firing_at_base_is_skipped() {
        let base = at(2026, 2, 2, 9, 0, 0);
        let next = next_occurrence(Frequency::Custom, 1, Some("0 * * * *"), base).unwrap();
        assert_eq!(next, at(2026, 2, 2, 10, 0, 0));
    }

    #[test]
    fn cron_result_is_strictly_after_base() {
        let base = at(2026, 2, 2, 8, 59, 59);
        let next = next_occurrence(Frequency::Custom, 1, Some("0 9 * * *"), base).unwrap();
        assert!(next > base);
        assert_eq!(next, at(2026, 2, 2, 9, 0, 0));
    }

    #[test]
    fn custom_without_expression_is_rejected() {
        let base = at(2026, 2, 2, 9, 0, 0);
        let err = next_occurrence(Frequency::Custom, 1, None, base).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn invalid_cron_is_rejected() {
        let base = at(2026, 2, 2, 9, 0, 0);
        let err = next_occurrence(Frequency::Custom, 1, Some("not a cron"), base).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
