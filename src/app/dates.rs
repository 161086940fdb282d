use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::clock::Clock;

/// Command-line date format.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse `YYYY-MM-DD` as midnight UTC.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .with_context(|| format!("invalid date {value:?}, expected YYYY-MM-DD"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Resolve the `--start`/`--end` window. `end` defaults to the start of
/// tomorrow so today's transactions are included.
pub fn resolve_date_range(
    start: &str,
    end: Option<&str>,
    clock: &dyn Clock,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = parse_date(start).context("start date")?;
    let today = clock.start_of_today();

    let end = match end.map(str::trim).filter(|end| !end.is_empty()) {
        Some(end) => parse_date(end).context("end date")?,
        None => clock.start_of_tomorrow(),
    };

    if end < start {
        anyhow::bail!(
            "end date {:?} must be after start date {:?}",
            end.format(DATE_FORMAT).to_string(),
            start.format(DATE_FORMAT).to_string()
        );
    }
    if start > today {
        anyhow::bail!(
            "start date {:?} cannot be in the future",
            start.format(DATE_FORMAT).to_string()
        );
    }
    if end > today + TimeDelta::days(1) {
        anyhow::bail!("end date cannot be more than 1 day in the future");
    }

    Ok((start, end))
}
