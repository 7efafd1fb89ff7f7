use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Site a festival listing was scraped from. Always set by the adapter.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Festileaks,
    Festivalinfo,
    Eblive,
    Followthebeat,
    Partyflock,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Festileaks,
        Source::Festivalinfo,
        Source::Eblive,
        Source::Followthebeat,
        Source::Partyflock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Festileaks => "festileaks",
            Source::Festivalinfo => "festivalinfo",
            Source::Eblive => "eblive",
            Source::Followthebeat => "followthebeat",
            Source::Partyflock => "partyflock",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_lowercase();
        Source::ALL
            .into_iter()
            .find(|source| source.as_str() == wanted)
            .ok_or_else(|| format!("unknown source: {value}"))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Archived,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Archived => "archived",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Status::Active),
            "archived" => Ok(Status::Archived),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Canonical festival record, also the wire shape handed to the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Festival {
    pub id: String, // stable hash: source|normalized name
    pub name: String,
    pub date: NaiveDate,
    pub website: Option<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    pub source: Source,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub is_interested: bool,
    #[serde(default)]
    pub is_favorite: bool,
    pub last_updated: DateTime<Utc>,
}

/// Where a candidate's fields were read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateOrigin {
    /// JSON-LD or `itemprop` microdata.
    Structured,
    /// Ranked CSS selector fallback over visible markup.
    Markup,
}

/// Unvalidated field tuple pulled from a listing page.
#[derive(Clone, Debug, PartialEq)]
pub struct RawCandidate {
    pub name_text: String,
    pub date_text: Option<String>,
    pub location_text: Option<String>,
    pub url_text: Option<String>,
    pub origin: CandidateOrigin,
}

impl RawCandidate {
    pub fn markup(name_text: impl Into<String>) -> Self {
        Self {
            name_text: name_text.into(),
            date_text: None,
            location_text: None,
            url_text: None,
            origin: CandidateOrigin::Markup,
        }
    }

    pub fn structured(name_text: impl Into<String>) -> Self {
        Self {
            origin: CandidateOrigin::Structured,
            ..Self::markup(name_text)
        }
    }

    pub fn with_date(mut self, date_text: Option<String>) -> Self {
        self.date_text = date_text;
        self
    }

    pub fn with_location(mut self, location_text: Option<String>) -> Self {
        self.location_text = location_text;
        self
    }

    pub fn with_url(mut self, url_text: Option<String>) -> Self {
        self.url_text = url_text;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Festival {
        Festival {
            id: "abc".to_string(),
            name: "Sunsation".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 4, 4).expect("valid date"),
            website: Some("https://www.festivalinfo.nl/festival/sunsation/".to_string()),
            locations: vec!["Middelstum".to_string()],
            source: Source::Festivalinfo,
            status: Status::Active,
            is_interested: false,
            is_favorite: true,
            last_updated: Utc
                .with_ymd_and_hms(2025, 3, 1, 12, 30, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn wire_shape_uses_iso_dates_and_lowercase_enums() {
        let value = serde_json::to_value(sample()).expect("serialize");
        assert_eq!(value["date"], "2025-04-04");
        assert_eq!(value["source"], "festivalinfo");
        assert_eq!(value["status"], "active");
        assert_eq!(value["locations"][0], "Middelstum");
        assert_eq!(value["last_updated"], "2025-03-01T12:30:00Z");
    }

    #[test]
    fn wire_json_parses_back_to_the_same_record() {
        let festival = sample();
        let json = serde_json::to_string(&festival).expect("serialize");
        let parsed: Festival = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, festival);
    }

    #[test]
    fn consumer_fields_default_when_absent() {
        let json = r#"{
            "id": "x", "name": "Pinkpop", "date": "2026-06-19", "website": null,
            "source": "partyflock", "last_updated": "2026-01-01T00:00:00Z"
        }"#;
        let parsed: Festival = serde_json::from_str(json).expect("parse");
        assert_eq!(parsed.status, Status::Active);
        assert!(!parsed.is_favorite);
        assert!(parsed.locations.is_empty());
    }

    #[test]
    fn source_parses_case_insensitively() {
        assert_eq!("EBLive".parse::<Source>(), Ok(Source::Eblive));
        assert!("ticketmaster".parse::<Source>().is_err());
    }
}
