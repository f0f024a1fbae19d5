use crate::error::{Result, TimekeepError};
use chrono::{Duration, NaiveDate};
use std::path::{Path, PathBuf};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"];

/// Parse the day to report on, relative to `today` for the natural forms
/// (`today`, `yesterday`, `N days ago`).
pub fn parse_target_date(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let input = input.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return Ok(date);
        }
    }

    if let Some(days) = parse_days_back(input) {
        return today
            .checked_sub_signed(Duration::days(days))
            .ok_or_else(|| TimekeepError::InvalidDate(format!("Date overflow for '{input}'")));
    }

    Err(TimekeepError::InvalidDate(format!(
        "Could not parse date '{input}'. Use YYYY-MM-DD, YYYY/MM/DD, DD-MM-YYYY, DD/MM/YYYY, today, yesterday or 'N days ago'"
    )))
}

fn parse_days_back(input: &str) -> Option<i64> {
    let input = input.to_lowercase();

    match input.as_str() {
        "today" => return Some(0),
        "yesterday" => return Some(1),
        _ => {}
    }

    let days = input
        .strip_suffix(" days ago")
        .or_else(|| input.strip_suffix(" day ago"))?;
    days.trim().parse::<i64>().ok().filter(|n| *n >= 0)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
