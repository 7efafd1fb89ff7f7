use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::base;
use super::fetch::PageRequest;
use super::SourceAdapter;
use crate::models::{RawCandidate, Source};

const URL: &str = "https://www.eblive.nl/festivals/";
const MAX_PAGES: usize = 50;
const PAGE_PARAM: &str = "page_nr";

static CARD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".festival").expect("eblive card selector"));
static NAME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".festival-name a").expect("eblive name selector"));
static DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".festival-date span").expect("eblive date selector"));
static LOCATION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".festival-location span").expect("eblive location selector"));
static HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h5").expect("eblive heading selector"));
static COUNTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?:NL|BE|DE|AT|FR|ES)\)").expect("eblive country regex"));
static DATE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bt/m\b|\b(?:ma|di|wo|do|vr|za|zo)\b|\b\d{1,2}\s+(?:jan|feb|mrt|apr|mei|jun|jul|aug|sep|okt|nov|dec)",
    )
    .expect("eblive date line regex")
});

pub struct EbLive;

impl SourceAdapter for EbLive {
    fn source(&self) -> Source {
        Source::Eblive
    }

    fn base_url(&self) -> &'static str {
        URL
    }

    fn max_pages(&self) -> usize {
        MAX_PAGES
    }

    fn relaxed_tls(&self) -> bool {
        true
    }

    /// The listing is a search form; page one is the unfiltered search
    /// ordered by upcoming date.
    fn first_page(&self) -> PageRequest {
        PageRequest::new(URL)
            .query("filters[search]", "")
            .query("filters[address]", "")
            .query("filters[distance]", "")
            .query("order_by", "upcoming")
            .query(PAGE_PARAM, "1")
            .relaxed_tls(true)
    }

    /// Page numbers count up until a page comes back without entries.
    fn next_page(
        &self,
        current: &PageRequest,
        _document: &Html,
        found: usize,
    ) -> Option<PageRequest> {
        if found == 0 {
            return None;
        }
        let page: usize = current.query_value(PAGE_PARAM)?.parse().ok()?;
        Some(current.clone().with_query_value(PAGE_PARAM, (page + 1).to_string()))
    }

    fn extract_markup(&self, document: &Html) -> Vec<RawCandidate> {
        let cards: Vec<RawCandidate> = document
            .select(&CARD_SELECTOR)
            .filter_map(card)
            .collect();
        if !cards.is_empty() {
            return cards;
        }
        document.select(&HEADING_SELECTOR).filter_map(heading).collect()
    }
}

fn card(element: ElementRef<'_>) -> Option<RawCandidate> {
    let name = base::first_text(&element, &NAME_SELECTOR)?;
    Some(
        RawCandidate::markup(name)
            .with_date(base::first_text(&element, &DATE_SELECTOR))
            .with_location(base::first_text(&element, &LOCATION_SELECTOR))
            .with_url(base::first_attr(&element, &NAME_SELECTOR, "href")),
    )
}

/// Older layout: an `h5` title whose parent block holds the date and place
/// as loose lines.
fn heading(element: ElementRef<'_>) -> Option<RawCandidate> {
    let name = base::inner_text(element);
    let container = element.parent().and_then(ElementRef::wrap)?;

    let mut date = None;
    let mut location = None;
    for line in container.text().map(base::clean_text) {
        if line.is_empty() || line == name {
            continue;
        }
        if location.is_none() && COUNTRY_RE.is_match(&line) {
            location = Some(line);
        } else if date.is_none() && DATE_LINE_RE.is_match(&line) {
            date = Some(line);
        }
    }

    Some(
        RawCandidate::markup(name)
            .with_date(date)
            .with_location(location)
            .with_url(base::element_link(&container)),
    )
}
