//! Recurrence rules and scheduling.
//!
//! Pure, deterministic date arithmetic over a [`RecurrencePattern`]. Every
//! date that enters or leaves the public operations is an ISO-8601 string;
//! `chrono` types are only used internally and by the crate's own services.
//!
//! All scheduler operations share one step function, [`advance`], so a
//! preview, a "next occurrence" answer and a generation decision can never
//! disagree about when a pattern fires.

use crate::db::models::{Frequency, RecurrencePattern};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Answer of a "when is the next one" query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextOccurrence {
    pub date: String,
    pub occurrence_number: u32,
    pub is_last_occurrence: bool,
}

/// Lifecycle of a recurrence template. `Exhausted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceState {
    Active,
    Exhausted,
}

/// Parse an ISO-8601 date-time (`2026-01-31T09:00:00Z`), a naive date-time
/// (taken as UTC) or a plain date (midnight UTC).
pub fn parse_iso(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

/// Render a timestamp the way the storage layer and clients expect it.
pub fn format_iso(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Check a pattern before it is stored or handed to the scheduler.
pub fn validate_rule(pattern: &RecurrencePattern) -> Result<()> {
    if pattern.interval < 1 {
        return Err(EngineError::InvalidPattern(
            "interval must be at least 1".to_string(),
        ));
    }

    if pattern.frequency == Frequency::Weekly {
        if pattern.days_of_week.is_empty() {
            return Err(EngineError::InvalidPattern(
                "weekly recurrence requires at least one day of the week".to_string(),
            ));
        }
        if let Some(day) = pattern.days_of_week.iter().find(|d| **d > 6) {
            return Err(EngineError::InvalidPattern(format!(
                "day of week must be between 0 (Sunday) and 6 (Saturday), got {}",
                day
            )));
        }
    }

    if pattern.frequency == Frequency::Monthly {
        if let Some(day) = pattern.day_of_month {
            if !(1..=31).contains(&day) {
                return Err(EngineError::InvalidPattern(format!(
                    "day of month must be between 1 and 31, got {}",
                    day
                )));
            }
        }
    }

    if pattern.end_date.is_some() && pattern.max_occurrences.is_some() {
        return Err(EngineError::InvalidPattern(
            "endDate and maxOccurrences are mutually exclusive".to_string(),
        ));
    }

    if pattern.max_occurrences == Some(0) {
        return Err(EngineError::InvalidPattern(
            "maxOccurrences must be at least 1".to_string(),
        ));
    }

    if let Some(end_date) = &pattern.end_date {
        parse_iso(end_date).map_err(|_| {
            EngineError::InvalidPattern(format!("endDate '{}' is not an ISO date", end_date))
        })?;
    }

    Ok(())
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn add_days(from: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    from.checked_add_signed(Duration::try_days(days)?)
}

/// Move `months` calendar months ahead, landing on `day` (or the anchor's
/// day) clamped to the length of the resulting month.
fn add_months_clamped(from: DateTime<Utc>, months: u32, day: Option<u32>) -> Option<DateTime<Utc>> {
    let total = i64::from(from.year()) * 12 + i64::from(from.month0()) + i64::from(months);
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;

    let wanted = day.unwrap_or_else(|| from.day());
    let day = wanted.min(days_in_month(year, month));

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.and_time(from.time()).and_utc())
}

/// Next selected weekday. Scans the rest of the anchor's week first, then
/// jumps `interval` weeks from the start of that week. Never lands more than
/// `7 * interval` days ahead.
fn next_selected_weekday(from: DateTime<Utc>, days: &[u8], interval: u32) -> Option<DateTime<Utc>> {
    let current = i64::from(from.weekday().num_days_from_sunday());
    let selected = |weekday: i64| days.iter().any(|d| i64::from(*d) == weekday);

    for weekday in (current + 1)..7 {
        if selected(weekday) {
            return add_days(from, weekday - current);
        }
    }

    let next_week_start = 7 * i64::from(interval) - current;
    (0..7)
        .find(|weekday| selected(*weekday))
        .and_then(|weekday| add_days(from, next_week_start + weekday))
}

/// One step of the pattern from `from`. Time of day is preserved.
///
/// Returns `None` only when the calendar arithmetic overflows or the
/// pattern names an impossible day (e.g. `day_of_month = 0`).
pub fn advance(pattern: &RecurrencePattern, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let interval = pattern.interval.max(1);

    match pattern.frequency {
        Frequency::Daily => add_days(from, i64::from(interval)),
        Frequency::Weekly => {
            if pattern.days_of_week.iter().any(|d| *d <= 6) {
                next_selected_weekday(from, &pattern.days_of_week, interval)
            } else {
                add_days(from, 7 * i64::from(interval))
            }
        },
        Frequency::Biweekly => add_days(from, 14 * i64::from(interval)),
        Frequency::Monthly => add_months_clamped(from, interval, pattern.day_of_month),
        Frequency::Quarterly => add_months_clamped(from, interval.saturating_mul(3), None),
        Frequency::Yearly => add_months_clamped(from, interval.saturating_mul(12), None),
    }
}

/// True when `date` falls on a calendar day after the pattern's `endDate`.
pub fn is_after_end(pattern: &RecurrencePattern, date: DateTime<Utc>) -> Result<bool> {
    match &pattern.end_date {
        Some(end_date) => Ok(date.date_naive() > parse_iso(end_date)?.date_naive()),
        None => Ok(false),
    }
}

/// Next occurrence after `from`, numbered after `completed_occurrences`
/// already-generated ones.
pub fn calculate_occurrence_after(
    pattern: &RecurrencePattern,
    from: DateTime<Utc>,
    completed_occurrences: u32,
) -> Result<Option<NextOccurrence>> {
    let Some(next) = advance(pattern, from) else {
        return Ok(None);
    };

    let occurrence_number = completed_occurrences.saturating_add(1);
    let past_end = is_after_end(pattern, next)?;
    let reached_max = pattern
        .max_occurrences
        .is_some_and(|max| occurrence_number >= max);

    tracing::debug!(
        frequency = pattern.frequency.as_str(),
        from = %from,
        next = %next,
        past_end,
        reached_max,
        "Calculated next occurrence"
    );

    Ok(Some(NextOccurrence {
        date: format_iso(next),
        occurrence_number,
        is_last_occurrence: past_end || reached_max,
    }))
}

/// Next occurrence after `from_date`, or after now when no date is given.
///
/// `is_last_occurrence` flags a date past `endDate`; callers must not
/// materialize an instance for it.
pub fn calculate_next_occurrence(
    pattern: &RecurrencePattern,
    from_date: Option<&str>,
) -> Result<Option<NextOccurrence>> {
    let from = match from_date {
        Some(value) => parse_iso(value)?,
        None => Utc::now(),
    };
    calculate_occurrence_after(pattern, from, 0)
}

/// Where a template sits in its lifecycle after `generated_count` instances,
/// given the date its next instance would land on.
pub fn recurrence_state(
    pattern: &RecurrencePattern,
    generated_count: u32,
    next_date: Option<&str>,
) -> Result<RecurrenceState> {
    if pattern
        .max_occurrences
        .is_some_and(|max| generated_count >= max)
    {
        return Ok(RecurrenceState::Exhausted);
    }

    if let Some(next_date) = next_date {
        if is_after_end(pattern, parse_iso(next_date)?)? {
            return Ok(RecurrenceState::Exhausted);
        }
    }

    Ok(RecurrenceState::Active)
}

/// Whether a new instance is due at `now`.
pub fn should_generate_instance_at(
    pattern: &RecurrencePattern,
    last_generated_date: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let Some(last_generated_date) = last_generated_date else {
        return Ok(true);
    };

    let last = parse_iso(last_generated_date)?;
    let Some(next) = advance(pattern, last) else {
        return Ok(false);
    };

    if is_after_end(pattern, next)? {
        return Ok(false);
    }

    Ok(now >= next)
}

pub fn should_generate_instance(
    pattern: &RecurrencePattern,
    last_generated_date: Option<&str>,
) -> Result<bool> {
    should_generate_instance_at(pattern, last_generated_date, Utc::now())
}

/// Whether `date` is a day the pattern can fire on by itself.
///
/// Weekly patterns with selected days and monthly patterns pinned to a day
/// of the month constrain the calendar day; every other pattern is anchored
/// wherever it starts.
fn lands_on_schedule(pattern: &RecurrencePattern, date: DateTime<Utc>) -> bool {
    match pattern.frequency {
        Frequency::Weekly if pattern.days_of_week.iter().any(|d| *d <= 6) => {
            let weekday = date.weekday().num_days_from_sunday();
            pattern.days_of_week.iter().any(|d| u32::from(*d) == weekday)
        },
        Frequency::Monthly => match pattern.day_of_month {
            Some(day) => date.day() == day.min(days_in_month(date.year(), date.month())),
            None => true,
        },
        _ => true,
    }
}

/// The earliest date at or after `start` the pattern fires on.
fn first_on_or_after(pattern: &RecurrencePattern, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if lands_on_schedule(pattern, start) {
        return Some(start);
    }

    if let (Frequency::Monthly, Some(day)) = (pattern.frequency, pattern.day_of_month) {
        let this_month = add_months_clamped(start, 0, Some(day))?;
        if this_month > start {
            return Some(this_month);
        }
    }

    advance(pattern, start)
}

/// Occurrence dates from `from_date` through `look_ahead_days` days later,
/// truncated by `maxOccurrences` or `endDate`.
///
/// `from_date` itself is the first date only when the pattern fires on it;
/// a Tuesday preview of a Monday/Wednesday rule starts on Wednesday.
pub fn get_upcoming_instances(
    pattern: &RecurrencePattern,
    from_date: &str,
    look_ahead_days: u32,
) -> Result<Vec<String>> {
    let start = parse_iso(from_date)?;
    let horizon = add_days(start, i64::from(look_ahead_days))
        .ok_or_else(|| EngineError::InvalidInput("look-ahead window overflows".to_string()))?;
    let end = pattern.end_date.as_deref().map(parse_iso).transpose()?;
    let max = pattern.max_occurrences.map(|max| max as usize);

    let mut dates = Vec::new();
    let Some(mut current) = first_on_or_after(pattern, start) else {
        return Ok(dates);
    };

    loop {
        if current > horizon {
            break;
        }
        if end.is_some_and(|end| current.date_naive() > end.date_naive()) {
            break;
        }
        if max.is_some_and(|max| dates.len() >= max) {
            break;
        }

        dates.push(format_iso(current));

        match advance(pattern, current) {
            Some(next) if next > current => current = next,
            _ => break,
        }
    }

    Ok(dates)
}

fn every(count: u32, unit: &str) -> String {
    if count == 1 {
        format!("Every {}", unit)
    } else {
        format!("Every {} {}s", count, unit)
    }
}

/// Human sentence for a pattern, e.g.
/// "Every 2 weeks on Monday, Wednesday until Jan 1, 2026".
pub fn get_pattern_description(pattern: &RecurrencePattern) -> String {
    let interval = pattern.interval.max(1);

    let mut text = match pattern.frequency {
        Frequency::Daily => every(interval, "day"),
        Frequency::Weekly => every(interval, "week"),
        Frequency::Biweekly => every(interval.saturating_mul(2), "week"),
        Frequency::Monthly => every(interval, "month"),
        Frequency::Quarterly => every(interval, "quarter"),
        Frequency::Yearly => every(interval, "year"),
    };

    if pattern.frequency == Frequency::Weekly {
        let mut days: Vec<u8> = pattern
            .days_of_week
            .iter()
            .copied()
            .filter(|d| *d <= 6)
            .collect();
        days.sort_unstable();
        days.dedup();

        if !days.is_empty() {
            let names: Vec<&str> = days.iter().map(|d| WEEKDAY_NAMES[*d as usize]).collect();
            text.push_str(" on ");
            text.push_str(&names.join(", "));
        }
    }

    if pattern.frequency == Frequency::Monthly {
        if let Some(day) = pattern.day_of_month {
            text.push_str(&format!(" on day {}", day));
            if day > 28 {
                text.push_str(" (or last day of month)");
            }
        }
    }

    if let Some(end_date) = &pattern.end_date {
        match parse_iso(end_date) {
            Ok(end) => text.push_str(&format!(" until {}", end.format("%b %-d, %Y"))),
            Err(_) => text.push_str(&format!(" until {}", end_date)),
        }
    } else if let Some(max) = pattern.max_occurrences {
        if max == 1 {
            text.push_str(", once");
        } else {
            text.push_str(&format!(", {} times", max));
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_date(pattern: &RecurrencePattern, from: &str) -> String {
        calculate_next_occurrence(pattern, Some(from))
            .unwrap()
            .unwrap()
            .date
    }

    #[test]
    fn test_parse_iso_accepts_dates_and_date_times() {
        assert_eq!(
            format_iso(parse_iso("2026-03-01").unwrap()),
            "2026-03-01T00:00:00.000Z"
        );
        assert_eq!(
            format_iso(parse_iso("2026-03-01T09:30:00+02:00").unwrap()),
            "2026-03-01T07:30:00.000Z"
        );
        assert_eq!(
            format_iso(parse_iso("2026-03-01T09:30:00").unwrap()),
            "2026-03-01T09:30:00.000Z"
        );
        assert!(parse_iso("next tuesday").is_err());
    }

    #[test]
    fn test_daily_interval() {
        let pattern = RecurrencePattern::new(Frequency::Daily).every(3);
        assert_eq!(next_date(&pattern, "2026-01-30"), "2026-02-02T00:00:00.000Z");
    }

    #[test]
    fn test_monthly_day_of_month_clamps_to_february() {
        let pattern = RecurrencePattern::new(Frequency::Monthly).on_day_of_month(31);
        assert_eq!(next_date(&pattern, "2026-01-31"), "2026-02-28T00:00:00.000Z");
        assert_eq!(next_date(&pattern, "2024-01-31"), "2024-02-29T00:00:00.000Z");
    }

    #[test]
    fn test_monthly_day_of_month_recovers_after_short_month() {
        let pattern = RecurrencePattern::new(Frequency::Monthly).on_day_of_month(31);
        assert_eq!(next_date(&pattern, "2026-02-28"), "2026-03-31T00:00:00.000Z");
        assert_eq!(next_date(&pattern, "2026-03-31"), "2026-04-30T00:00:00.000Z");
    }

    #[test]
    fn test_monthly_without_day_keeps_anchor_day() {
        let pattern = RecurrencePattern::new(Frequency::Monthly).every(2);
        assert_eq!(
            next_date(&pattern, "2026-11-15T08:00:00Z"),
            "2027-01-15T08:00:00.000Z"
        );
    }

    #[test]
    fn test_quarterly_and_yearly_clamp() {
        let quarterly = RecurrencePattern::new(Frequency::Quarterly);
        assert_eq!(next_date(&quarterly, "2025-11-30"), "2026-02-28T00:00:00.000Z");

        let yearly = RecurrencePattern::new(Frequency::Yearly);
        assert_eq!(next_date(&yearly, "2024-02-29"), "2025-02-28T00:00:00.000Z");
    }

    #[test]
    fn test_biweekly_adds_two_weeks_per_interval() {
        let pattern = RecurrencePattern::new(Frequency::Biweekly);
        assert_eq!(next_date(&pattern, "2026-01-05"), "2026-01-19T00:00:00.000Z");
    }

    #[test]
    fn test_weekly_days_of_week_sequence() {
        // 2026-01-05 is a Monday.
        let pattern = RecurrencePattern::new(Frequency::Weekly).on_days(&[1, 3, 5]);

        let wednesday = next_date(&pattern, "2026-01-05");
        assert_eq!(wednesday, "2026-01-07T00:00:00.000Z");

        let friday = next_date(&pattern, &wednesday);
        assert_eq!(friday, "2026-01-09T00:00:00.000Z");

        let monday = next_date(&pattern, &friday);
        assert_eq!(monday, "2026-01-12T00:00:00.000Z");
    }

    #[test]
    fn test_weekly_interval_skips_weeks() {
        let pattern = RecurrencePattern::new(Frequency::Weekly)
            .every(2)
            .on_days(&[1, 3]);

        assert_eq!(next_date(&pattern, "2026-01-05"), "2026-01-07T00:00:00.000Z");
        assert_eq!(next_date(&pattern, "2026-01-07"), "2026-01-19T00:00:00.000Z");
    }

    #[test]
    fn test_weekly_without_days_adds_weeks() {
        let pattern = RecurrencePattern::new(Frequency::Weekly).every(3);
        assert_eq!(next_date(&pattern, "2026-01-05"), "2026-01-26T00:00:00.000Z");
    }

    #[test]
    fn test_weekly_scan_stays_within_interval_bound() {
        // Only Sunday selected, anchored on a Sunday: a full 7 * interval jump.
        let pattern = RecurrencePattern::new(Frequency::Weekly)
            .every(2)
            .on_days(&[0]);
        let from = parse_iso("2026-01-04").unwrap();
        let next = advance(&pattern, from).unwrap();
        assert_eq!((next - from).num_days(), 14);
    }

    #[test]
    fn test_calculate_next_occurrence_is_deterministic() {
        let pattern = RecurrencePattern::new(Frequency::Weekly)
            .on_days(&[2, 4])
            .until("2026-12-31");
        let first = calculate_next_occurrence(&pattern, Some("2026-06-10T12:00:00Z")).unwrap();
        let second = calculate_next_occurrence(&pattern, Some("2026-06-10T12:00:00Z")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_is_last_occurrence_past_end_date() {
        let pattern = RecurrencePattern::new(Frequency::Daily).until("2026-01-10");

        let inside = calculate_next_occurrence(&pattern, Some("2026-01-09")).unwrap().unwrap();
        assert!(!inside.is_last_occurrence);

        let outside = calculate_next_occurrence(&pattern, Some("2026-01-10")).unwrap().unwrap();
        assert!(outside.is_last_occurrence);
    }

    #[test]
    fn test_occurrence_after_counts_toward_max() {
        let pattern = RecurrencePattern::new(Frequency::Daily).times(3);
        let from = parse_iso("2026-01-01").unwrap();

        let second = calculate_occurrence_after(&pattern, from, 1).unwrap().unwrap();
        assert_eq!(second.occurrence_number, 2);
        assert!(!second.is_last_occurrence);

        let third = calculate_occurrence_after(&pattern, from, 2).unwrap().unwrap();
        assert_eq!(third.occurrence_number, 3);
        assert!(third.is_last_occurrence);
    }

    #[test]
    fn test_impossible_day_of_month_yields_none() {
        let pattern = RecurrencePattern::new(Frequency::Monthly).on_day_of_month(0);
        assert!(calculate_next_occurrence(&pattern, Some("2026-01-01"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_should_generate_first_instance() {
        let pattern = RecurrencePattern::new(Frequency::Daily);
        assert!(should_generate_instance(&pattern, None).unwrap());
    }

    #[test]
    fn test_should_generate_gate_flips_at_next_date() {
        let pattern = RecurrencePattern::new(Frequency::Daily);
        let last = "2026-01-01T09:00:00Z";

        let just_after = parse_iso("2026-01-01T09:00:01Z").unwrap();
        assert!(!should_generate_instance_at(&pattern, Some(last), just_after).unwrap());
        assert!(!should_generate_instance_at(&pattern, Some(last), just_after).unwrap());

        let before_due = parse_iso("2026-01-02T08:59:59Z").unwrap();
        assert!(!should_generate_instance_at(&pattern, Some(last), before_due).unwrap());

        let due = parse_iso("2026-01-02T09:00:00Z").unwrap();
        assert!(should_generate_instance_at(&pattern, Some(last), due).unwrap());
    }

    #[test]
    fn test_should_generate_false_past_end_date() {
        let pattern = RecurrencePattern::new(Frequency::Daily).until("2026-01-01");
        let now = parse_iso("2026-06-01").unwrap();
        assert!(!should_generate_instance_at(&pattern, Some("2026-01-01"), now).unwrap());
    }

    #[test]
    fn test_recurrence_state_transitions() {
        let capped = RecurrencePattern::new(Frequency::Daily).times(2);
        assert_eq!(recurrence_state(&capped, 1, None).unwrap(), RecurrenceState::Active);
        assert_eq!(
            recurrence_state(&capped, 2, None).unwrap(),
            RecurrenceState::Exhausted
        );

        let dated = RecurrencePattern::new(Frequency::Daily).until("2026-01-31");
        assert_eq!(
            recurrence_state(&dated, 10, Some("2026-01-31T23:00:00Z")).unwrap(),
            RecurrenceState::Active
        );
        assert_eq!(
            recurrence_state(&dated, 10, Some("2026-02-01")).unwrap(),
            RecurrenceState::Exhausted
        );
    }

    #[test]
    fn test_upcoming_instances_within_window() {
        let pattern = RecurrencePattern::new(Frequency::Daily).every(2);
        let dates = get_upcoming_instances(&pattern, "2026-01-01", 6).unwrap();
        assert_eq!(
            dates,
            vec![
                "2026-01-01T00:00:00.000Z",
                "2026-01-03T00:00:00.000Z",
                "2026-01-05T00:00:00.000Z",
                "2026-01-07T00:00:00.000Z",
            ]
        );
    }

    #[test]
    fn test_upcoming_instances_stop_at_max_occurrences() {
        let pattern = RecurrencePattern::new(Frequency::Daily).times(3);
        let dates = get_upcoming_instances(&pattern, "2026-01-01", 30).unwrap();
        assert_eq!(dates.len(), 3);
    }

    #[test]
    fn test_upcoming_instances_stop_at_end_date() {
        let pattern = RecurrencePattern::new(Frequency::Weekly)
            .on_days(&[1, 3, 5])
            .until("2026-01-09");
        let dates = get_upcoming_instances(&pattern, "2026-01-05", 30).unwrap();
        assert_eq!(
            dates,
            vec![
                "2026-01-05T00:00:00.000Z",
                "2026-01-07T00:00:00.000Z",
                "2026-01-09T00:00:00.000Z",
            ]
        );
    }

    #[test]
    fn test_upcoming_instances_skip_off_schedule_start() {
        // 2026-01-06 is a Tuesday.
        let weekly = RecurrencePattern::new(Frequency::Weekly).on_days(&[1, 3, 5]);
        let dates = get_upcoming_instances(&weekly, "2026-01-06", 6).unwrap();
        assert_eq!(
            dates,
            vec![
                "2026-01-07T00:00:00.000Z",
                "2026-01-09T00:00:00.000Z",
                "2026-01-12T00:00:00.000Z",
            ]
        );

        let monthly = RecurrencePattern::new(Frequency::Monthly).on_day_of_month(31);
        let dates = get_upcoming_instances(&monthly, "2026-02-10", 50).unwrap();
        assert_eq!(
            dates,
            vec!["2026-02-28T00:00:00.000Z", "2026-03-31T00:00:00.000Z"]
        );
    }

    #[test]
    fn test_validate_rule_rejects_both_end_conditions() {
        let pattern = RecurrencePattern::new(Frequency::Daily)
            .until("2026-01-01")
            .times(5);
        let err = validate_rule(&pattern).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern(_)));
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_validate_rule_boundaries() {
        assert!(validate_rule(&RecurrencePattern::new(Frequency::Daily).every(0)).is_err());
        assert!(validate_rule(&RecurrencePattern::new(Frequency::Weekly)).is_err());
        assert!(validate_rule(&RecurrencePattern::new(Frequency::Weekly).on_days(&[7])).is_err());
        assert!(
            validate_rule(&RecurrencePattern::new(Frequency::Monthly).on_day_of_month(32))
                .is_err()
        );
        assert!(validate_rule(&RecurrencePattern::new(Frequency::Daily).times(0)).is_err());
        assert!(validate_rule(&RecurrencePattern::new(Frequency::Daily).until("soon")).is_err());

        assert!(validate_rule(&RecurrencePattern::new(Frequency::Weekly).on_days(&[0, 6])).is_ok());
        assert!(
            validate_rule(&RecurrencePattern::new(Frequency::Monthly).on_day_of_month(31)).is_ok()
        );
        assert!(validate_rule(&RecurrencePattern::new(Frequency::Yearly)).is_ok());
    }

    #[test]
    fn test_pattern_description() {
        let weekly = RecurrencePattern::new(Frequency::Weekly)
            .every(2)
            .on_days(&[3, 1])
            .until("2026-01-01");
        assert_eq!(
            get_pattern_description(&weekly),
            "Every 2 weeks on Monday, Wednesday until Jan 1, 2026"
        );

        assert_eq!(
            get_pattern_description(&RecurrencePattern::new(Frequency::Daily)),
            "Every day"
        );
        assert_eq!(
            get_pattern_description(&RecurrencePattern::new(Frequency::Daily).every(3).times(4)),
            "Every 3 days, 4 times"
        );
        assert_eq!(
            get_pattern_description(&RecurrencePattern::new(Frequency::Biweekly)),
            "Every 2 weeks"
        );
        assert_eq!(
            get_pattern_description(&RecurrencePattern::new(Frequency::Monthly).on_day_of_month(31)),
            "Every month on day 31 (or last day of month)"
        );
        assert_eq!(
            get_pattern_description(&RecurrencePattern::new(Frequency::Quarterly).times(1)),
            "Every quarter, once"
        );
        assert_eq!(
            get_pattern_description(&RecurrencePattern::new(Frequency::Yearly).every(2)),
            "Every 2 years"
        );
    }
}
