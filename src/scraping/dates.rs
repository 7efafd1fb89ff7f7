//! Dutch listing dates ("vr 18 apr t/m zo 20 apr", "21 juni 2024",
//! "DI 08 APR", "21-06-2024") to a single calendar date.
//!
//! Ranges collapse to their first day. A date without a year takes the
//! reference year, and rolls into next year when the listing is read late in
//! the year (October onwards) and the date already passed.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::DateParseError;

static ISO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})").expect("iso date regex"));
static WEEKDAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:maandag|dinsdag|woensdag|donderdag|vrijdag|zaterdag|zondag|ma|di|wo|do|vr|za|zo)\b\.?",
    )
    .expect("weekday regex")
});
static THROUGH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:t/m|t\.m\.|tot en met)\s").expect("through regex"));
static DAY_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s*[-–]\s*\d{1,2}(\s+\p{L})").expect("day range regex")
});
static DASH_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[-–]\s+").expect("dash range regex"));
static BARE_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})$").expect("bare day regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").expect("year regex"));
static DAY_MONTH_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+(\p{L}+)\.?(?:\s+(\d{4}))?").expect("day month regex")
});
static DASHED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})-(\d{1,2})-(\d{4})\b").expect("dashed date regex"));
static DOTTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4})\b").expect("dotted date regex"));
// Spaced forms like "DI 08 APR" already match DAY_MONTH_NAME_RE; this only
// catches the run-together "08APR2026".
static UPPER_ABBREV_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s*([A-Z]{3})(?:\s*(\d{4}))?").expect("uppercase date regex")
});

/// Zero-based month index for a Dutch month name or abbreviation.
pub fn month_index(name: &str) -> Option<u32> {
    let index = match name.trim_end_matches('.').to_lowercase().as_str() {
        "jan" | "januari" => 0,
        "feb" | "februari" => 1,
        "mrt" | "maart" => 2,
        "apr" | "april" => 3,
        "mei" => 4,
        "jun" | "juni" => 5,
        "jul" | "juli" => 6,
        "aug" | "augustus" => 7,
        "sep" | "september" => 8,
        "okt" | "oktober" => 9,
        "nov" | "november" => 10,
        "dec" | "december" => 11,
        _ => return None,
    };
    Some(index)
}

/// Parse a free-text date fragment relative to `reference` (today, in the
/// listing's timezone). Past dates are returned as-is; callers decide
/// whether to keep them.
pub fn parse(text: &str, reference: NaiveDate) -> Result<NaiveDate, DateParseError> {
    let cleaned = crate::scraping::base::clean_text(text);
    if cleaned.is_empty() {
        return Err(DateParseError::Empty);
    }

    if let Some(caps) = ISO_RE.captures(&cleaned) {
        let (day, month, year) = (number(&caps, 3), number(&caps, 2), number(&caps, 1) as i32);
        if month == 0 {
            return Err(DateParseError::InvalidDate { day, month, year });
        }
        return build(day, month - 1, year);
    }

    let without_weekdays = WEEKDAY_RE.replace_all(&cleaned, " ");
    let first_day = first_day_of_range(&crate::scraping::base::clean_text(&without_weekdays));

    let (day, month0, year) =
        match_patterns(&first_day).ok_or_else(|| DateParseError::NoMatch(cleaned.clone()))?;

    match year {
        Some(year) => build(day, month0, year),
        None => {
            let date = build(day, month0, reference.year())?;
            if date < reference && reference.month0() > 8 {
                build(day, month0, reference.year() + 1)
            } else {
                Ok(date)
            }
        }
    }
}

/// Reduce a range to its first day, carrying over a month and year that only
/// appear after the range separator ("17 t/m 19 juli 2026"). A start that
/// lies in a later month than the end belongs to the year before the end
/// ("30 dec t/m 2 jan 2026").
fn first_day_of_range(text: &str) -> String {
    let collapsed = DAY_RANGE_RE.replace(text, "$1$2").into_owned();

    let split_at = THROUGH_RE
        .find(&collapsed)
        .or_else(|| DASH_RANGE_RE.find(&collapsed))
        .map(|found| found.start());
    let Some(index) = split_at else {
        return collapsed;
    };

    let (head, tail) = collapsed.split_at(index);
    let head = head.trim();
    let end = first_day_month(tail);
    let end_year: Option<i32> = YEAR_RE.captures(tail).and_then(|y| y[1].parse().ok());

    if let (Some(day), Some((end_day, end_month0))) = (BARE_DAY_RE.captures(head), end) {
        let day: u32 = day[1].parse().unwrap_or_default();
        let (month0, year) = if day > end_day {
            previous_month(end_month0, end_year)
        } else {
            (end_month0, end_year)
        };
        return with_year(format!("{day} {}", MONTH_NAMES[month0 as usize]), year);
    }

    if YEAR_RE.is_match(head) {
        return head.to_string();
    }
    let year = match (first_day_month(head), end) {
        (Some((_, start_month0)), Some((_, end_month0))) if start_month0 > end_month0 => {
            end_year.map(|year| year - 1)
        }
        _ => end_year,
    };
    with_year(head.to_string(), year)
}

const MONTH_NAMES: [&str; 12] = [
    "januari", "februari", "maart", "april", "mei", "juni", "juli", "augustus", "september",
    "oktober", "november", "december",
];

/// Day and zero-based month of the first "<day> <month name>" in `text`.
fn first_day_month(text: &str) -> Option<(u32, u32)> {
    DAY_MONTH_NAME_RE
        .captures_iter(text)
        .find_map(|caps| month_index(&caps[2]).map(|month0| (number(&caps, 1), month0)))
}

fn previous_month(month0: u32, year: Option<i32>) -> (u32, Option<i32>) {
    if month0 == 0 {
        (11, year.map(|year| year - 1))
    } else {
        (month0 - 1, year)
    }
}

fn with_year(text: String, year: Option<i32>) -> String {
    match year {
        Some(year) => format!("{text} {year}"),
        None => text,
    }
}

/// Try the date shapes in priority order; first match wins.
fn match_patterns(text: &str) -> Option<(u32, u32, Option<i32>)> {
    for caps in DAY_MONTH_NAME_RE.captures_iter(text) {
        if let Some(month0) = month_index(&caps[2]) {
            let year = caps.get(3).map(|m| m.as_str().parse().unwrap_or_default());
            return Some((number(&caps, 1), month0, year));
        }
    }

    for re in [&*DASHED_RE, &*DOTTED_RE] {
        if let Some(caps) = re.captures(text) {
            let month = number(&caps, 2);
            if month == 0 {
                continue;
            }
            return Some((number(&caps, 1), month - 1, Some(number(&caps, 3) as i32)));
        }
    }

    for caps in UPPER_ABBREV_RE.captures_iter(text) {
        if let Some(month0) = month_index(&caps[2]) {
            let year = caps.get(3).map(|m| m.as_str().parse().unwrap_or_default());
            return Some((number(&caps, 1), month0, year));
        }
    }

    None
}

fn number(caps: &Captures<'_>, group: usize) -> u32 {
    caps.get(group)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or_default()
}

fn build(day: u32, month0: u32, year: i32) -> Result<NaiveDate, DateParseError> {
    NaiveDate::from_ymd_opt(year, month0 + 1, day).ok_or(DateParseError::InvalidDate {
        day,
        month: month0 + 1,
        year,
    })
}
