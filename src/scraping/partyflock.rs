use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, FieldChain, SelectorChain};
use super::SourceAdapter;
use crate::models::{RawCandidate, Source};

const URL: &str = "https://partyflock.nl/agenda/festivals";
const MAX_PAGES: usize = 20;

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody.hl tr").expect("partyflock row selector"));
static VENUE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*=\"/location/\"]").expect("partyflock venue selector"));
static CITY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.light7 a").expect("partyflock city selector"));
static ROW_NAME: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .attr("[itemprop=\"name\"]", "content")
        .text("[itemprop=\"name\"]")
});
static ROW_DATE: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .attr("[itemprop=\"startDate\"]", "content")
        .attr("time[datetime]", "datetime")
        .text("[itemprop=\"startDate\"]")
});
static ROW_URL: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .attr("[itemprop=\"url\"]", "href")
        .attr("a[href*=\"/party/\"]", "href")
        .attr("td:nth-child(2) a[href]", "href")
});

static GENERIC_CARDS: Lazy<SelectorChain> = Lazy::new(|| {
    SelectorChain::new(&[".festival-item", ".event-item", ".agenda-item", "article"])
});
static GENERIC_NAME: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .text("[itemprop=\"name\"]")
        .text(".event-name")
        .text("h2")
        .text("h3")
});
static GENERIC_DATE: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .attr("[itemprop=\"startDate\"]", "content")
        .text("[itemprop=\"startDate\"]")
        .text(".event-date")
        .text(".date")
});
static GENERIC_LOCATION: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new()
        .text("[itemprop=\"location\"]")
        .text(".event-location")
        .text(".location")
});

pub struct Partyflock;

impl SourceAdapter for Partyflock {
    fn source(&self) -> Source {
        Source::Partyflock
    }

    fn base_url(&self) -> &'static str {
        URL
    }

    fn max_pages(&self) -> usize {
        MAX_PAGES
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
                Some(
                    RawCandidate::markup(name)
                        .with_date(GENERIC_DATE.extract(&card))
                        .with_location(GENERIC_LOCATION.extract(&card))
                        .with_url(base::element_link(&card)),
                )
            })
            .collect()
    }
}

/// Agenda table row with unscoped `itemprop` fields plus venue and city
/// links; the place becomes "venue, city".
fn agenda_row(row: ElementRef<'_>) -> Option<RawCandidate> {
    let name = ROW_NAME.extract(&row)?;
    let venue = base::first_text(&row, &VENUE_SELECTOR);
    let city = base::first_text(&row, &CITY_SELECTOR);
    let location = match (venue, city) {
        (Some(venue), Some(city)) if venue != city => Some(format!("{venue}, {city}")),
        (Some(venue), _) => Some(venue),
        (None, city) => city,
    };

    Some(
        RawCandidate::markup(name)
            .with_date(ROW_DATE.extract(&row))
            .with_location(location)
            .with_url(ROW_URL.extract(&row)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateOrigin;

    const SAMPLE_HTML: &str = r#"
        <html><body><table class="partylist">
          <tbody class="hl">
            <tr>
              <td><meta itemprop="startDate" content="2025-06-14T12:00:00+02:00">za 14 jun</td>
              <td><a href="/party/481516/Defqon-1"><span itemprop="name">Defqon.1</span></a></td>
              <td><a href="/location/1234/Walibi-Holland">Walibi Holland</a>,
                  <span class="light7"><a href="/city/55/Biddinghuizen">Biddinghuizen</a></span></td>
            </tr>
            <tr>
              <td><meta itemprop="startDate" content="2025-07-05">za 5 jul</td>
              <td><a href="/party/481600/Dance-Valley"><span itemprop="name">Dance Valley</span></a></td>
              <td><span class="light7"><a href="/city/12/Spaarnwoude">Spaarnwoude</a></span></td>
            </tr>
          </tbody>
        </table></body></html>
    "#;

    const MICRODATA_HTML: &str = r#"
        <html><body>
          <div itemscope itemtype="http://schema.org/Event">
            <a itemprop="url" href="/party/500000/Mysteryland"><span itemprop="name">Mysteryland</span></a>
            <meta itemprop="startDate" content="2025-08-22">
            <div itemprop="location" itemscope itemtype="http://schema.org/Place">
              <span itemprop="name">Voormalig Floriadeterrein</span>
              <div itemprop="address" itemscope itemtype="http://schema.org/PostalAddress">
                <meta itemprop="addressLocality" content="Haarlemmermeer">
              </div>
            </div>
          </div>
        </body></html>
    "#;

    #[test]
    fn reads_agenda_rows_with_venue_and_city() {
        let document = Html::parse_document(SAMPLE_HTML);
        let found = Partyflock.extract(&document);
        assert_eq!(found.len(), 2);

        let defqon = &found[0];
        assert_eq!(defqon.name_text, "Defqon.1");
        assert_eq!(defqon.date_text.as_deref(), Some("2025-06-14T12:00:00+02:00"));
        assert_eq!(defqon.location_text.as_deref(), Some("Walibi Holland, Biddinghuizen"));
        assert_eq!(defqon.url_text.as_deref(), Some("/party/481516/Defqon-1"));

        assert_eq!(found[1].location_text.as_deref(), Some("Spaarnwoude"));
        assert_eq!(found[1].origin, CandidateOrigin::Markup);
    }

    #[test]
    fn prefers_scoped_microdata() {
        let document = Html::parse_document(MICRODATA_HTML);
        let found = Partyflock.extract(&document);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name_text, "Mysteryland");
        assert_eq!(found[0].origin, CandidateOrigin::Structured);
        assert_eq!(found[0].date_text.as_deref(), Some("2025-08-22"));
        assert_eq!(found[0].location_text.as_deref(), Some("Haarlemmermeer"));
    }
}
