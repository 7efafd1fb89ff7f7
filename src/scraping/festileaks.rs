use once_cell::sync::Lazy;
use scraper::Html;

use super::base::{self, FieldChain, SelectorChain};
use super::SourceAdapter;
use crate::models::{RawCandidate, Source};

const URL: &str = "https://festileaks.com/festivalagenda/";
const MAX_PAGES: usize = 10;

static CARDS: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[
        ".festival-item",
        "[class*=\"festival-list\"] > li",
        "[class*=\"event-list\"] > li",
        "article",
    ])
});
static NAME: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .text(".festival-title")
        .text(".event-name")
        .text("h2")
        .text("h3")
        .text("h4")
        .text(".title")
        .text("a")
});
static DATE: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .text(".festival-date")
        .attr("time[datetime]", "datetime")
        .text("time")
        .text("[class*=\"date\"]")
});
static LOCATION: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .text(".festival-location")
        .text("[class*=\"location\"]")
        .text("[class*=\"place\"]")
});

pub struct Festileaks;

impl SourceAdapter for Festileaks {
    fn source(&self) -> Source {
        Source::Festileaks
    }

    fn base_url(&self) -> &'static str {
        URL
    }

    fn max_pages(&self) -> usize {
        MAX_PAGES
    }

    fn extract_markup(&self, document: &Html) -> Vec<RawCandidate> {
        let mut candidates = Vec::new();
        for card in CARDS.select_first_hit(document) {
            let Some(name) = NAME.extract(&card) else {
                continue;
            };
            // Cards without dedicated date/location markup carry both in
            // their running text ("21 - 23 augustus 2025, Biddinghuizen").
            let text = base::inner_text(card);
            let date = DATE.extract(&card).or_else(|| Some(text.clone()));
            let location = LOCATION
                .extract(&card)
                .or_else(|| base::location_from_text(&text));

            candidates.push(
                RawCandidate::markup(name)
                    .with_date(date)
                    .with_location(location)
                    .with_url(base::element_link(&card)),
            );
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
        <html><body>
          <nav><a href="/login">Login</a></nav>
          <div class="festival-item">
            <a href="/festival/lowlands/">
              <span class="festival-title">Featured Lowlands 2025</span>
            </a>
            <span class="festival-date">22 - 24 augustus 2025</span>
            <span class="festival-location">Biddinghuizen</span>
          </div>
          <div class="festival-item">
            <h3><a href="https://festileaks.com/festival/zwarte-cross/">Zwarte Cross</a></h3>
            <p>vr 17 t/m zo 19 juli 2026, Lichtenvoorde</p>
          </div>
          <div class="pagination"><a class="next" href="/festivalagenda/page/2/">Volgende</a></div>
        </body></html>
    "#;

    #[test]
    fn reads_titled_cards_and_free_text_cards() {
        let document = Html::parse_document(SAMPLE_HTML);
        let found = Festileaks.extract(&document);
        assert_eq!(found.len(), 2);

        let lowlands = &found[0];
        assert_eq!(lowlands.name_text, "Featured Lowlands 2025");
        assert_eq!(lowlands.date_text.as_deref(), Some("22 - 24 augustus 2025"));
        assert_eq!(lowlands.location_text.as_deref(), Some("Biddinghuizen"));
        assert_eq!(lowlands.url_text.as_deref(), Some("/festival/lowlands/"));

        let cross = &found[1];
        assert_eq!(cross.name_text, "Zwarte Cross");
        assert_eq!(cross.location_text.as_deref(), Some("Lichtenvoorde"));
        assert!(cross
            .date_text
            .as_deref()
            .is_some_and(|text| text.contains("17 t/m zo 19 juli 2026")));
    }

    #[test]
    fn follows_pagination_links() {
        let document = Html::parse_document(SAMPLE_HTML);
        let next = Festileaks
            .next_page(&Festileaks.first_page(), &document, 2)
            .expect("next page");
        assert_eq!(next.url, "https://festileaks.com/festivalagenda/page/2/");
        assert!(!next.relaxed_tls);
    }
}
