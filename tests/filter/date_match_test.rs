use chrono::{NaiveDate, Weekday};

use semantic_sql::filter::date_match::resolve;

fn reference() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 28).unwrap() // a Tuesday
}

#[test]
fn last_week_is_the_full_prior_week_starting_monday() {
    let (start, end) = resolve("last week", reference(), Weekday::Mon).unwrap();
    assert_eq!(start.date(), NaiveDate::from_ymd_opt(2026, 7, 20).unwrap());
    assert_eq!(end.date(), NaiveDate::from_ymd_opt(2026, 7, 26).unwrap());
}

#[test]
fn week_start_day_shifts_the_boundary() {
    let (sunday_start, _) = resolve("this week", reference(), Weekday::Sun).unwrap();
    let (monday_start, _) = resolve("this week", reference(), Weekday::Mon).unwrap();
    assert_eq!(sunday_start.date(), NaiveDate::from_ymd_opt(2026, 7, 26).unwrap());
    assert_eq!(monday_start.date(), NaiveDate::from_ymd_opt(2026, 7, 27).unwrap());
}

#[test]
fn next_quarter_spans_the_following_calendar_quarter() {
    let (start, end) = resolve("next quarter", reference(), Weekday::Mon).unwrap();
    assert_eq!(start.date(), NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
    assert_eq!(end.date(), NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());
}

#[test]
fn today_and_yesterday_are_single_day_ranges() {
    let (start, end) = resolve("today", reference(), Weekday::Mon).unwrap();
    assert_eq!(start.date(), reference());
    assert_eq!(end.date(), reference());

    let (start, end) = resolve("yesterday", reference(), Weekday::Mon).unwrap();
    assert_eq!(start.date(), NaiveDate::from_ymd_opt(2026, 7, 27).unwrap());
    assert_eq!(end.date(), start.date());
}

#[test]
fn quarter_to_date_starts_at_the_current_quarters_first_month() {
    let (start, end) = resolve("quarter to date", reference(), Weekday::Mon).unwrap();
    assert_eq!(start.date(), NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
    assert_eq!(end.date(), reference());
}

#[test]
fn an_unrecognized_phrase_is_a_parse_error() {
    let err = resolve("fortnight before last", reference(), Weekday::Mon).unwrap_err();
    assert!(matches!(err, semantic_sql::CompileError::Parse(_)));
}

#[test]
fn last_n_days_is_case_insensitive_and_tolerates_surrounding_whitespace() {
    let (start, end) = resolve("  LAST 7 Days  ", reference(), Weekday::Mon).unwrap();
    assert_eq!(start.date(), reference() - chrono::Duration::days(7));
    assert_eq!(end.date(), reference() - chrono::Duration::days(1));
}
