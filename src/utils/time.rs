use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone};

/// Top-level store key for a date: ISO week-year and ISO week number.
/// Weeks start on Monday; week 1 is the week containing the year's first
/// Thursday, so days around new year can land in the other year's bucket.
pub fn year_week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}_{:02}", week.year(), week.week())
}

/// Day-level store key inside a week bucket.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    (date + Duration::days(1)).with_time(NaiveTime::MIN).unwrap()
}

/// Human form of an accumulated duration, e.g. `1h4m`, `12m34s`, `45s`.
pub fn format_seconds(total: u64) -> String {
    let hours = total / 3600;
    let minutes = total % 3600 / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}h{minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
