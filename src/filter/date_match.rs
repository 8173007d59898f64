//! Natural-language `matches` date grammar (§4.4, §9 design note): a small
//! hand-rolled recursive-descent parser over phrases like "last week",
//! "last year", "month to date", "last 30 days" — resolved to a `[start,
//! end]` interval in the project timezone (§9: no parser-combinator
//! dependency is justified for this alone, since `chumsky`/`ariadne` exist
//! in the teacher only for the out-of-scope DSL surface grammar).

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CompileError, CompileResult};

static LAST_N_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^last (\d+) (day|week|month|quarter|year)s?$").unwrap());

/// Resolve a `matches` phrase to an inclusive `[start, end]` datetime range,
/// relative to `reference_date` (so `compile` stays pure — §8 Idempotence —
/// rather than consulting the wall clock internally).
pub fn resolve(
    phrase: &str,
    reference_date: NaiveDate,
    week_start_day: Weekday,
) -> CompileResult<(NaiveDateTime, NaiveDateTime)> {
    let phrase = phrase.trim().to_ascii_lowercase();

    if let Some(caps) = LAST_N_RE.captures(&phrase) {
        let n: i64 = caps[1].parse().map_err(|_| {
            CompileError::Parse(format!("invalid 'matches' phrase '{phrase}'"))
        })?;
        let unit = &caps[2];
        let (start, end) = match unit {
            "day" => (reference_date - Duration::days(n), reference_date - Duration::days(1)),
            "week" => (
                reference_date - Duration::weeks(n),
                reference_date - Duration::days(1),
            ),
            "month" => (add_months(reference_date, -n), reference_date - Duration::days(1)),
            "quarter" => (
                add_months(reference_date, -3 * n),
                reference_date - Duration::days(1),
            ),
            "year" => (add_years(reference_date, -n), reference_date - Duration::days(1)),
            _ => unreachable!(),
        };
        return Ok(bounds(start, end));
    }

    if let Some(unit) = phrase.strip_suffix(" to date") {
        let start = period_start(unit, reference_date, week_start_day).ok_or_else(|| {
            CompileError::Parse(format!("unrecognized 'matches' phrase '{phrase}'"))
        })?;
        return Ok(bounds(start, reference_date));
    }

    match phrase.as_str() {
        "today" => Ok(bounds(reference_date, reference_date)),
        "yesterday" => {
            let d = reference_date - Duration::days(1);
            Ok(bounds(d, d))
        }
        "tomorrow" => {
            let d = reference_date + Duration::days(1);
            Ok(bounds(d, d))
        }
        _ => {
            for (prefix, delta) in [("this", 0i64), ("last", -1), ("next", 1)] {
                for (unit, _) in [("day", ()), ("week", ()), ("month", ()), ("quarter", ()), ("year", ())] {
                    if phrase == format!("{prefix} {unit}") {
                        return Ok(period_range(unit, reference_date, week_start_day, delta));
                    }
                }
            }
            Err(CompileError::Parse(format!(
                "unrecognized 'matches' phrase '{phrase}'"
            )))
        }
    }
}

fn bounds(start: NaiveDate, end: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    (
        start.and_hms_opt(0, 0, 0).unwrap(),
        end.and_hms_opt(23, 59, 59).unwrap(),
    )
}

fn period_start(unit: &str, reference_date: NaiveDate, week_start_day: Weekday) -> Option<NaiveDate> {
    Some(match unit {
        "day" => reference_date,
        "week" => week_start(reference_date, week_start_day),
        "month" => reference_date.with_day(1).unwrap(),
        "quarter" => quarter_start(reference_date),
        "year" => reference_date.with_month(1).unwrap().with_day(1).unwrap(),
        _ => return None,
    })
}

fn period_range(
    unit: &str,
    reference_date: NaiveDate,
    week_start_day: Weekday,
    delta: i64,
) -> (NaiveDateTime, NaiveDateTime) {
    match unit {
        "day" => {
            let d = reference_date + Duration::days(delta);
            bounds(d, d)
        }
        "week" => {
            let this_start = week_start(reference_date, week_start_day);
            let start = this_start + Duration::weeks(delta);
            bounds(start, start + Duration::days(6))
        }
        "month" => {
            let this_start = reference_date.with_day(1).unwrap();
            let start = add_months(this_start, delta);
            let end = add_months(start, 1) - Duration::days(1);
            bounds(start, end)
        }
        "quarter" => {
            let this_start = quarter_start(reference_date);
            let start = add_months(this_start, 3 * delta);
            let end = add_months(start, 3) - Duration::days(1);
            bounds(start, end)
        }
        "year" => {
            let this_start = reference_date.with_month(1).unwrap().with_day(1).unwrap();
            let start = add_years(this_start, delta);
            let end = add_years(start, 1) - Duration::days(1);
            bounds(start, end)
        }
        _ => unreachable!(),
    }
}

fn week_start(date: NaiveDate, week_start_day: Weekday) -> NaiveDate {
    let offset = (date.weekday().num_days_from_monday() as i64
        - week_start_day.num_days_from_monday() as i64
        + 7)
        % 7;
    date - Duration::days(offset)
}

fn quarter_start(date: NaiveDate) -> NaiveDate {
    let quarter_month = ((date.month0() / 3) * 3) + 1;
    NaiveDate::from_ymd_opt(date.year(), quarter_month, 1).unwrap()
}

fn add_months(date: NaiveDate, delta: i64) -> NaiveDate {
    let total = date.year() as i64 * 12 + date.month0() as i64 + delta;
    let year = total.div_euclid(12) as i32;
    let month = total.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn add_years(date: NaiveDate, delta: i64) -> NaiveDate {
    add_months(date, delta * 12)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .unwrap();
    (next - NaiveDate::from_ymd_opt(year, month, 1).unwrap()).num_days() as u32
}
