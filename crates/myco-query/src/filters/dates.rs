//! Date and timestamp ranges at mixed granularity.
//!
//! A bound may name a year (`2005`), a month of a year (`2005-03`) or a day.
//! `date` additionally accepts a bare month (`05`) or month-day (`08-22`),
//! which match every year and wrap around New Year when the low bound is
//! later than the high one. Timestamps go down to seconds and use any
//! non-digit as separator (`2005-03-04-12-30-00`, `2005-03-04T12:30:00`).

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use super::common::{list_value, text_value};
use super::{field_column, FilterCx, FilterName};
use crate::error::{QueryError, Result};
use crate::op::Op;
use crate::param::ParamValue;
use crate::predicate::{Column, DatePart, Predicate};
use crate::schema::RecordType;

/// One parsed `date` bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateBound {
    /// Calendar span, inclusive on both ends.
    Span(NaiveDate, NaiveDate),
    Month(u32),
    MonthDay(u32, u32),
}

fn numbers(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .collect()
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

fn parse_date(text: &str) -> Option<DateBound> {
    let parts = numbers(text);
    let num = |i: usize| parts.get(i).and_then(|p| p.parse::<u32>().ok());
    let year_first = parts.first().is_some_and(|p| p.len() == 4);

    match (parts.len(), year_first) {
        (1, true) => {
            let year = num(0)? as i32;
            Some(DateBound::Span(
                NaiveDate::from_ymd_opt(year, 1, 1)?,
                NaiveDate::from_ymd_opt(year, 12, 31)?,
            ))
        }
        (1, false) => {
            let month = num(0)?;
            (1..=12).contains(&month).then_some(DateBound::Month(month))
        }
        (2, true) => {
            let (year, month) = (num(0)? as i32, num(1)?);
            Some(DateBound::Span(
                NaiveDate::from_ymd_opt(year, month, 1)?,
                last_day_of_month(year, month)?,
            ))
        }
        (2, false) => {
            let (month, day) = (num(0)?, num(1)?);
            // Leap year, so 02-29 is accepted.
            NaiveDate::from_ymd_opt(2000, month, day)?;
            Some(DateBound::MonthDay(month, day))
        }
        (3, true) => {
            let day = NaiveDate::from_ymd_opt(num(0)? as i32, num(1)?, num(2)?)?;
            Some(DateBound::Span(day, day))
        }
        _ => None,
    }
}

fn bounds<'v>(name: FilterName, value: &'v ParamValue) -> Result<(&'v str, &'v str)> {
    match list_value(name, value)? {
        [low, high] => Ok((text_value(name, low)?, text_value(name, high)?)),
        _ => Err(QueryError::shape(name.as_str(), "a pair of dates", value)),
    }
}

/// `(month, day) >= (m, d)` or `<=`, lexicographically.
fn month_day_cmp(column: &'static str, op: Op, month: u32, day: u32) -> Predicate {
    let month_col = Column::Part(column, DatePart::Month);
    let day_col = Column::Part(column, DatePart::Day);
    let strict = if op == Op::Gte { Op::Gt } else { Op::Lt };
    Predicate::or([
        Predicate::compare(month_col, strict, month as i64),
        Predicate::and([
            Predicate::compare(month_col, Op::Eq, month as i64),
            Predicate::compare(day_col, op, day as i64),
        ]),
    ])
}

/// Low and high conditions, wrapped around the year when `low > high`.
fn cyclic(low_cond: Predicate, high_cond: Predicate, wraps: bool) -> Predicate {
    if wraps {
        Predicate::or([low_cond, high_cond])
    } else {
        Predicate::and([low_cond, high_cond])
    }
}

/// `date` on the `when` column.
pub(super) fn date_range(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let column = field_column(name, rt, "when")?;
    let (low_text, high_text) = bounds(name, value)?;
    let fail = || QueryError::shape(name.as_str(), "dates of the same granularity", value);
    let low = parse_date(low_text).ok_or_else(fail)?;
    let high = parse_date(high_text).ok_or_else(fail)?;

    match (low, high) {
        (DateBound::Span(a_start, a_end), DateBound::Span(b_start, b_end)) => Ok(Predicate::and([
            Predicate::compare(column, Op::Gte, a_start.min(b_start)),
            Predicate::compare(column, Op::Lte, a_end.max(b_end)),
        ])),
        (DateBound::Month(low), DateBound::Month(high)) => {
            let month = Column::Part(column, DatePart::Month);
            Ok(cyclic(
                Predicate::compare(month, Op::Gte, low as i64),
                Predicate::compare(month, Op::Lte, high as i64),
                low > high,
            ))
        }
        (DateBound::MonthDay(lm, ld), DateBound::MonthDay(hm, hd)) => Ok(cyclic(
            month_day_cmp(column, Op::Gte, lm, ld),
            month_day_cmp(column, Op::Lte, hm, hd),
            (lm, ld) > (hm, hd),
        )),
        _ => Err(fail()),
    }
}

/// Start of the period a timestamp bound names, and the start of the next.
fn parse_time(text: &str) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let parts = numbers(text);
    if parts.is_empty() || parts.len() > 6 || parts[0].len() != 4 {
        return None;
    }
    let values = parts
        .iter()
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    let get = |i: usize, default: u32| values.get(i).copied().unwrap_or(default);

    let year = get(0, 0) as i32;
    let start = NaiveDate::from_ymd_opt(year, get(1, 1), get(2, 1))?.and_hms_opt(get(3, 0), get(4, 0), get(5, 0))?;

    let next = match values.len() {
        1 => NaiveDate::from_ymd_opt(year + 1, 1, 1)?.and_hms_opt(0, 0, 0)?,
        2 => last_day_of_month(year, start.month())?.succ_opt()?.and_hms_opt(0, 0, 0)?,
        3 => start.checked_add_signed(Duration::days(1))?,
        4 => start.checked_add_signed(Duration::hours(1))?,
        5 => start.checked_add_signed(Duration::minutes(1))?,
        _ => start.checked_add_signed(Duration::seconds(1))?,
    };
    Some((start, next))
}

/// `created_at` and `updated_at`: a half-open interval from the start of the
/// earlier bound to the end of the later one.
pub(super) fn time_range(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let column = field_column(name, rt, name.as_str())?;
    let (low_text, high_text) = bounds(name, value)?;
    let fail = || QueryError::shape(name.as_str(), "a time or a pair of times", value);
    let (a_start, a_next) = parse_time(low_text).ok_or_else(fail)?;
    let (b_start, b_next) = parse_time(high_text).ok_or_else(fail)?;

    Ok(Predicate::and([
        Predicate::compare(column, Op::Gte, a_start.min(b_start)),
        Predicate::compare(column, Op::Lt, a_next.max(b_next)),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_granularities() {
        assert_eq!(parse_date("2005"), Some(DateBound::Span(date(2005, 1, 1), date(2005, 12, 31))));
        assert_eq!(parse_date("2008-02"), Some(DateBound::Span(date(2008, 2, 1), date(2008, 2, 29))));
        assert_eq!(parse_date("2007-05-03"), Some(DateBound::Span(date(2007, 5, 3), date(2007, 5, 3))));
        assert_eq!(parse_date("05"), Some(DateBound::Month(5)));
        assert_eq!(parse_date("08-22"), Some(DateBound::MonthDay(8, 22)));
        assert_eq!(parse_date("02-29"), Some(DateBound::MonthDay(2, 29)));
    }

    #[test]
    fn parse_rejects_nonsense() {
        assert_eq!(parse_date("13"), None);
        assert_eq!(parse_date("2005-13"), None);
        assert_eq!(parse_date("04-31"), None);
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date("1-2-3-4"), None);
    }

    #[test]
    fn parse_time_periods() {
        let (start, next) = parse_time("2005").unwrap();
        assert_eq!(start, date(2005, 1, 1).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(next, date(2006, 1, 1).and_hms_opt(0, 0, 0).unwrap());

        let (start, next) = parse_time("2005-12").unwrap();
        assert_eq!(start, date(2005, 12, 1).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(next, date(2006, 1, 1).and_hms_opt(0, 0, 0).unwrap());

        let (start, next) = parse_time("2005-03-04T12:30:00").unwrap();
        assert_eq!(start, date(2005, 3, 4).and_hms_opt(12, 30, 0).unwrap());
        assert_eq!(next, date(2005, 3, 4).and_hms_opt(12, 30, 1).unwrap());

        assert_eq!(parse_time("2005-03-04-12-30-00"), parse_time("2005-03-04 12:30:00"));
        assert_eq!(parse_time("05"), None);
    }

    #[test]
    fn month_day_cmp_shape() {
        let pred = month_day_cmp("when", Op::Gte, 8, 22);
        assert_eq!(
            pred.to_string(),
            "(MONTH(when) > 8 OR (MONTH(when) = 8 AND DAY(when) >= 22))"
        );
    }
}
