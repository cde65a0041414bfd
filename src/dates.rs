use time::{Date, Month, OffsetDateTime};

/// Parses the stored date text, accepting both `YY/MM/DD` and `YYYY/MM/DD`.
/// Two-digit years are interpreted in the 2000s.
pub fn parse_date(raw: &str) -> Option<Date> {
    let trimmed = raw.trim();
    let mut parts = trimmed.split('/');
    let year_part = parts.next()?;
    let month_part = parts.next()?;
    let day_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let mut year: i32 = year_part.trim().parse().ok()?;
    if year < 1000 {
        year += 2000;
    }
    let month: u8 = month_part.trim().parse().ok()?;
    let day: u8 = day_part.trim().parse().ok()?;
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

/// Splits a value into its `(start, end)` pair. A single date becomes a
/// point span `(d, d)`; a `"start-end"` string becomes a range.
pub fn parse_span(raw: &str) -> Option<(Date, Date)> {
    let trimmed = raw.trim();
    if let Some((left, right)) = trimmed.split_once('-') {
        let start = parse_date(left)?;
        let end = parse_date(right)?;
        return Some((start, end));
    }
    let point = parse_date(trimmed)?;
    Some((point, point))
}

/// The scheduled date of a value: a range is judged by its end date.
pub fn scheduled_date(raw: &str) -> Option<Date> {
    parse_span(raw).map(|(_, end)| end)
}

pub fn format_date(date: Date) -> String {
    format!(
        "{:02}/{:02}/{:02}",
        date.year() % 100,
        u8::from(date.month()),
        date.day()
    )
}

pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

pub fn today_stamp() -> String {
    format_date(today())
}

/// First day of the date's month.
pub fn month_floor(date: Date) -> Date {
    Date::from_calendar_date(date.year(), date.month(), 1)
        .expect("day 1 is valid for every month")
}

/// First day of the following month.
pub fn next_month(date: Date) -> Date {
    let (year, month) = if date.month() == Month::December {
        (date.year() + 1, Month::January)
    } else {
        (date.year(), date.month().next())
    };
    Date::from_calendar_date(year, month, 1).expect("day 1 is valid for every month")
}

/// Adds whole months, clamping the day to the target month's length.
pub fn add_months(date: Date, months: i64) -> Date {
    let total = date.year() as i64 * 12 + (u8::from(date.month()) as i64 - 1) + months;
    let year = (total.div_euclid(12)) as i32;
    let month = Month::try_from((total.rem_euclid(12) + 1) as u8)
        .expect("month index is always 1..=12 after rem_euclid");
    let day = date.day().min(month.length(year));
    Date::from_calendar_date(year, month, day).expect("clamped day is valid")
}

/// Splits a planning window into quarter sub-periods. Each quarter opens
/// three months after the previous one, keeping the start's day, and closes
/// the day before the next quarter opens. Leftover months short of a full
/// quarter are dropped.
pub fn quarter_windows(start: Date, duration_months: i64) -> Vec<(Date, Date)> {
    let count = duration_months / 3;
    (0..count)
        .map(|quarter| {
            let open = add_months(start, quarter * 3);
            let close = add_months(start, (quarter + 1) * 3)
                .previous_day()
                .unwrap_or(open);
            (open, close)
        })
        .collect()
}

pub fn days_between(from: Date, to: Date) -> i64 {
    (to.to_julian_day() - from.to_julian_day()) as i64
}
