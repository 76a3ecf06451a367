use crate::models::parse_date_key;
use chrono::{Datelike, Months, NaiveDate, TimeDelta, Weekday};

/// Accepts `YYYY-MM-DD`, `today`/`tomorrow`/`yesterday`, offsets such as
/// `-1d`, `+2w` or `1m`, and weekday names (`mon`, `next fri`, `last tue`).
/// Out-of-range results are rejected rather than clamped.
pub(crate) fn parse_relative_date_input(input: &str, base: NaiveDate) -> Option<NaiveDate> {
    let trimmed = input.trim().to_lowercase();
    if let Some(date) = parse_date_key(&trimmed) {
        return Some(date);
    }

    match trimmed.as_str() {
        "" => None,
        "today" => Some(base),
        "tomorrow" => base.succ_opt(),
        "yesterday" => base.pred_opt(),
        other => parse_relative_offset(other, base).or_else(|| parse_weekday_input(other, base)),
    }
}

fn parse_relative_offset(input: &str, base: NaiveDate) -> Option<NaiveDate> {
    let (negative, rest) = match input.as_bytes().first()? {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };
    let unit = rest.chars().last()?;
    let digits = &rest[..rest.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let qty: u32 = digits.parse().ok()?;

    match unit {
        'd' | 'w' => {
            let days = i64::from(qty) * if unit == 'w' { 7 } else { 1 };
            let delta = TimeDelta::try_days(if negative { -days } else { days })?;
            base.checked_add_signed(delta)
        }
        'm' if negative => base.checked_sub_months(Months::new(qty)),
        'm' => base.checked_add_months(Months::new(qty)),
        _ => None,
    }
}

fn parse_weekday_input(input: &str, base: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let (weekday, step) = match parts.as_slice() {
        [day] => (parse_weekday(day)?, Step::Upcoming),
        ["next", day] => (parse_weekday(day)?, Step::Next),
        ["last", day] => (parse_weekday(day)?, Step::Last),
        _ => return None,
    };

    let base_num = i64::from(base.weekday().num_days_from_monday());
    let target_num = i64::from(weekday.num_days_from_monday());
    let delta = match step {
        Step::Upcoming => (target_num - base_num).rem_euclid(7),
        Step::Next => (target_num - base_num - 1).rem_euclid(7) + 1,
        // Habit logs are mostly back-filled, so "last fri" is the common case.
        Step::Last => -((base_num - target_num - 1).rem_euclid(7) + 1),
    };
    base.checked_add_signed(TimeDelta::try_days(delta)?)
}

enum Step {
    Upcoming,
    Next,
    Last,
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    match token.get(..3)? {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}
