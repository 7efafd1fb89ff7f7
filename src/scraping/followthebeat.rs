use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, FieldChain};
use super::SourceAdapter;
use crate::models::{RawCandidate, Source};

const URL: &str = "https://followthebeat.nl/agenda/?festival=";
const MAX_PAGES: usize = 10;

static SLIDE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".swiper-slide").expect("followthebeat slide selector"));
static LOCATION_PART_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".comma-seperate span").expect("followthebeat location selector")
});
static HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2, h3").expect("followthebeat heading selector"));
static SLIDE_NAME: Lazy<FieldChain> =
    Lazy::new(|| FieldChain::new().text("h3").text("h2").text(".title"));
static SLIDE_DATE: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .text("time")
        .attr("time[datetime]", "datetime")
        .text("[class*=\"date\"]")
});

pub struct FollowTheBeat;

impl SourceAdapter for FollowTheBeat {
    fn source(&self) -> Source {
        Source::Followthebeat
    }

    fn base_url(&self) -> &'static str {
        URL
    }

    fn max_pages(&self) -> usize {
        MAX_PAGES
    }

    fn extract_markup(&self, document: &Html) -> Vec<RawCandidate> {
        let slides: Vec<RawCandidate> = document
            .select(&SLIDE_SELECTOR)
            .filter_map(slide)
            .collect();
        if !slides.is_empty() {
            return slides;
        }
        document
            .select(&HEADING_SELECTOR)
            .filter_map(heading)
            .collect()
    }
}

/// Agenda card: the slide itself is the anchor to the festival page.
fn slide(element: ElementRef<'_>) -> Option<RawCandidate> {
    let name = SLIDE_NAME.extract(&element)?;
    let parts: Vec<String> = element
        .select(&LOCATION_PART_SELECTOR)
        .map(base::inner_text)
        .filter(|part| !part.is_empty())
        .collect();
    let location = if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    };

    Some(
        RawCandidate::markup(name)
            .with_date(SLIDE_DATE.extract(&element))
            .with_location(location)
            .with_url(base::element_link(&element)),
    )
}

/// Plain listing layout: the date sits in the block before the heading and
/// the place in the block after it.
fn heading(element: ElementRef<'_>) -> Option<RawCandidate> {
    let name = base::inner_text(element);
    if name.is_empty() {
        return None;
    }
    let previous = element
        .prev_siblings()
        .find_map(ElementRef::wrap)
        .map(base::inner_text)
        .filter(|text| !text.is_empty());
    let location = element
        .next_siblings()
        .find_map(ElementRef::wrap)
        .and_then(|next| base::location_from_text(&base::inner_text(next)));

    Some(
        RawCandidate::markup(name)
            .with_date(previous)
            .with_location(location)
            .with_url(base::element_link(&element)),
    )
}
