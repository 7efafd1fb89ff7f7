use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, FieldChain, SelectorChain};
use super::SourceAdapter;
use crate::models::{RawCandidate, Source};

const URL: &str = "https://www.festivalinfo.nl/festivals/";
const MAX_PAGES: usize = 10;
const DATE_HEADER_CLASS: &str = "festival_agenda_date";

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".festival_rows_info").expect("festivalinfo row selector"));
static ROW_NAME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("strong a").expect("festivalinfo name selector"));
static ROW_LOCATION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".eightcol span").expect("festivalinfo location selector"));
static DAY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".festival_dag").expect("festivalinfo day selector"));
static SPAN_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span").expect("festivalinfo span selector"));

static GENERIC_CARDS: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".festival-item",
        "tr[id^=\"festival\"]",
        "[class*=\"festival-list\"] > li",
    ])
});
static GENERIC_NAME: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .text(".festival-title")
        .text(".event-name")
        .text("h2")
        .text("h3")
        .text("h4")
        .text("[class*=\"title\"]")
        .text("a")
});
static GENERIC_DATE: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .attr("time[datetime]", "datetime")
        .text("[class*=\"date\"]")
        .text("time")
});
static GENERIC_LOCATION: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .text("[class*=\"location\"]")
        .text("[class*=\"venue\"]")
        .text("[class*=\"place\"]")
});

pub struct FestivalInfo;

impl SourceAdapter for FestivalInfo {
    fn source(&self) -> Source {
        Source::Festivalinfo
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

    fn extract_markup(&self, document: &Html) -> Vec<RawCandidate> {
        let rows: Vec<RawCandidate> = document
            .select(&ROW_SELECTOR)
            .filter_map(agenda_row)
            .collect();
        if !rows.is_empty() {
            return rows;
        }
        GENERIC_CARDS
            .select_first_hit(document)
            .into_iter()
            .filter_map(|card| {
                let name = GENERIC_NAME.extract(&card)?;
                let text = base::inner_text(card);
                Some(
                    RawCandidate::markup(name)
                        .with_date(GENERIC_DATE.extract(&card).or_else(|| Some(text.clone())))
                        .with_location(
                            GENERIC_LOCATION
                                .extract(&card)
                                .or_else(|| base::location_from_text(&text)),
                        )
                        .with_url(base::element_link(&card)),
                )
            })
            .collect()
    }
}

/// One agenda row. The date lives in the closest date header above it,
/// shared by every row until the next header.
fn agenda_row(row: ElementRef<'_>) -> Option<RawCandidate> {
    let name = base::first_text(&row, &ROW_NAME_SELECTOR)?;
    let url = base::first_attr(&row, &ROW_NAME_SELECTOR, "href");
    let location = base::first_text(&row, &ROW_LOCATION_SELECTOR)
        .and_then(|text| text.split(',').next().map(str::to_string))
        .and_then(|place| base::clean_location(&place));

    Some(
        RawCandidate::markup(name)
            .with_date(header_date(row))
            .with_location(location)
            .with_url(url),
    )
}

fn header_date(row: ElementRef<'_>) -> Option<String> {
    let header = row
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sibling| sibling.value().classes().any(|class| class == DATE_HEADER_CLASS))?;
    let day = base::first_text(&header, &DAY_SELECTOR)?;
    let month = header
        .select(&SPAN_SELECTOR)
        .last()
        .map(base::inner_text)
        .filter(|text| !text.is_empty())?;
    Some(format!("{day} {month}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateOrigin;

    const JSON_LD_HTML: &str = r#"
        <html><head>
        <script type="application/ld+json">
        {"@context": "https://schema.org", "@type": "Festival", "name": "Sunsation",
         "startDate": "2025-04-04", "url": "https://www.festivalinfo.nl/festival/34876/Sunsation/2025/",
         "location": {"@type": "Place", "address": {"@type": "PostalAddress", "addressLocality": "Middelstum"}}}
        </script>
        </head><body></body></html>
    "#;

    const AGENDA_HTML: &str = r#"
        <html><body><div id="agenda">
          <div class="festival_agenda_date"><span class="festival_dag">04</span><span>APR</span></div>
          <div class="festival_rows_info">
            <strong><a href="/festival/34876/Sunsation/2025/">Sunsation</a></strong>
            <div class="eightcol"><span>Middelstum, Nederland</span></div>
          </div>
          <div class="festival_rows_info">
            <strong><a href="/festival/35001/Lentekabinet/2025/">Lentekabinet</a></strong>
            <div class="eightcol"><span>Amsterdam (NL)</span></div>
          </div>
          <div class="festival_agenda_date"><span class="festival_dag">12</span><span>APR</span></div>
          <div class="festival_rows_info">
            <strong><a href="/festival/35120/Paaspop/2025/">Paaspop</a></strong>
            <div class="eightcol"><span>Schijndel, Nederland</span></div>
          </div>
        </div></body></html>
    "#;

    #[test]
    fn prefers_json_ld_blocks() {
        let document = Html::parse_document(JSON_LD_HTML);
        let found = FestivalInfo.extract(&document);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name_text, "Sunsation");
        assert_eq!(found[0].origin, CandidateOrigin::Structured);
        assert_eq!(found[0].location_text.as_deref(), Some("Middelstum"));
    }

    #[test]
    fn agenda_rows_take_the_date_of_the_header_above() {
        let document = Html::parse_document(AGENDA_HTML);
        let found = FestivalInfo.extract(&document);
        let summary: Vec<_> = found
            .iter()
            .map(|c| {
                (
                    c.name_text.as_str(),
                    c.date_text.as_deref(),
                    c.location_text.as_deref(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Sunsation", Some("04 APR"), Some("Middelstum")),
                ("Lentekabinet", Some("04 APR"), Some("Amsterdam")),
                ("Paaspop", Some("12 APR"), Some("Schijndel")),
            ]
        );
        assert_eq!(found[2].url_text.as_deref(), Some("/festival/35120/Paaspop/2025/"));
    }

    #[test]
    fn requests_use_relaxed_tls() {
        assert!(FestivalInfo.first_page().relaxed_tls);
    }
}
