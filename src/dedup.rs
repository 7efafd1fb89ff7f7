use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Festival, Source};

static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:festival|event)\s*:\s*").expect("label regex"));
static EDITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\beditie\s*#?\s*\d+\b").expect("edition regex"));
static PUNCTUATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]+").expect("punctuation regex"));
static TRAILING_NUMBERS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\s+\d+)+$").expect("trailing numbers regex"));

/// Comparison key for festival names: lowercase, no labels, no edition or
/// year suffixes, no punctuation, single spaces.
pub fn normalized_key(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let text = LABEL_RE.replace(&lowered, "");
    let text = EDITION_RE.replace_all(&text, " ");
    let text = collapse(&text);
    // Numbers glued to the name ("defqon.1") are part of it; only
    // space-separated trailing numbers are editions.
    let stripped = TRAILING_NUMBERS_RE.replace(&text, "");
    let key = collapse(&PUNCTUATION_RE.replace_all(&stripped, " "));
    if key.is_empty() {
        collapse(&PUNCTUATION_RE.replace_all(&text, " "))
    } else {
        key
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Intra-run accumulator: first sighting of a `(source, key)` wins.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<(Source, String)>,
    records: Vec<Festival>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the record repeats one already kept.
    pub fn push(&mut self, festival: Festival) -> bool {
        let key = (festival.source, normalized_key(&festival.name));
        if self.seen.insert(key) {
            self.records.push(festival);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Festival> {
        self.records
    }
}
