use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};

use crate::dedup::normalized_key;
use crate::error::Rejection;
use crate::models::{Festival, RawCandidate, Source, Status};
use crate::scraping::{base, dates};

/// Listings are Dutch; "today" is the calendar day in Amsterdam.
const TIMEZONE: Tz = chrono_tz::Europe::Amsterdam;

/// Reference time for one pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Clock {
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
}

impl Clock {
    pub fn system() -> Self {
        Self::fixed(Utc::now())
    }

    pub fn fixed(now: DateTime<Utc>) -> Self {
        Self {
            now,
            today: now.with_timezone(&TIMEZONE).date_naive(),
        }
    }
}

/// Stable record id: sha256 over `source|normalized name`.
pub fn festival_id(source: Source, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Turns one adapter's raw candidates into canonical records.
#[derive(Clone, Debug)]
pub struct RecordNormalizer {
    source: Source,
    base_url: String,
    clock: Clock,
    upcoming_only: bool,
}

impl RecordNormalizer {
    pub fn new(source: Source, base_url: &str, clock: Clock, upcoming_only: bool) -> Self {
        Self {
            source,
            base_url: base_url.to_string(),
            clock,
            upcoming_only,
        }
    }

    pub fn normalize(&self, candidate: RawCandidate) -> Result<Festival, Rejection> {
        let name = base::clean_name(&candidate.name_text);
        if name.is_empty() {
            return Err(Rejection::MissingName);
        }
        if !base::is_valid_name(&name) {
            return Err(Rejection::InvalidName(name));
        }

        let date_text = candidate
            .date_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or(Rejection::MissingDate)?;
        let date = dates::parse(date_text, self.clock.today)?;
        if self.upcoming_only && date < self.clock.today {
            return Err(Rejection::PastDate(date));
        }

        let website = base::absolute_url(&self.base_url, candidate.url_text);
        let locations = candidate
            .location_text
            .as_deref()
            .and_then(base::clean_location)
            .into_iter()
            .collect();

        Ok(Festival {
            id: festival_id(self.source, &normalized_key(&name)),
            name,
            date,
            website,
            locations,
            source: self.source,
            status: Status::Active,
            is_interested: false,
            is_favorite: false,
            last_updated: self.clock.now,
        })
    }
}
