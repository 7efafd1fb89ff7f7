//! schema.org data embedded in listing pages: JSON-LD blocks and `itemprop`
//! microdata. Both carry machine-readable names and ISO start dates, so they
//! are preferred over scraping visible markup.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::base::clean_text;
use crate::models::RawCandidate;

/// schema.org types treated as festival listings.
pub const EVENT_TYPES: [&str; 3] = ["Festival", "MusicEvent", "Event"];

static LD_JSON_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("json-ld selector")
});
static ITEM_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        r#"[itemscope][itemtype*="schema.org/Event"], [itemscope][itemtype*="schema.org/Festival"], [itemscope][itemtype*="schema.org/MusicEvent"]"#,
    )
    .expect("microdata item selector")
});
static NAME_PROP: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[itemprop="name"]"#).expect("name prop"));
static START_PROP: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[itemprop="startDate"]"#).expect("startDate prop"));
static URL_PROP: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[itemprop="url"]"#).expect("url prop"));
static LOCATION_PROP: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[itemprop="location"]"#).expect("location prop"));
static LOCALITY_PROP: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[itemprop="addressLocality"]"#).expect("locality prop"));

/// JSON-LD and microdata candidates, in document order (JSON-LD first).
pub fn candidates(document: &Html) -> Vec<RawCandidate> {
    let mut found = json_ld_candidates(document, &EVENT_TYPES);
    found.extend(microdata_candidates(document));
    found
}

pub fn json_ld_candidates(document: &Html, types: &[&str]) -> Vec<RawCandidate> {
    let mut found = Vec::new();
    for script in document.select(&LD_JSON_SELECTOR) {
        let body = script.text().collect::<String>();
        match serde_json::from_str::<Value>(body.trim()) {
            Ok(value) => collect_json_ld(&value, types, &mut found),
            Err(err) => debug!(error = %err, "skipping malformed json-ld block"),
        }
    }
    found
}

fn collect_json_ld(value: &Value, types: &[&str], found: &mut Vec<RawCandidate>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_json_ld(item, types, found);
            }
        }
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_json_ld(graph, types, found);
            }
            if let Some(Value::Array(elements)) = map.get("itemListElement") {
                for element in elements {
                    collect_json_ld(element.get("item").unwrap_or(element), types, found);
                }
            }
            if has_type(value, types) {
                if let Some(candidate) = json_ld_candidate(value) {
                    found.push(candidate);
                }
            }
        }
        _ => {}
    }
}

fn has_type(value: &Value, types: &[&str]) -> bool {
    let matches = |name: &str| types.iter().any(|t| t.eq_ignore_ascii_case(name));
    match value.get("@type") {
        Some(Value::String(name)) => matches(name),
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

fn json_ld_candidate(value: &Value) -> Option<RawCandidate> {
    let name = string_field(value, "name")?;
    Some(
        RawCandidate::structured(name)
            .with_date(string_field(value, "startDate"))
            .with_location(value.get("location").and_then(json_ld_location))
            .with_url(string_field(value, "url")),
    )
}

fn json_ld_location(location: &Value) -> Option<String> {
    match location {
        Value::String(text) => non_empty(text),
        Value::Array(places) => places.iter().find_map(json_ld_location),
        Value::Object(_) => {
            let from_address = match location.get("address") {
                Some(Value::String(text)) => non_empty(text),
                Some(address @ Value::Object(_)) => string_field(address, "addressLocality"),
                _ => None,
            };
            from_address.or_else(|| string_field(location, "name"))
        }
        _ => None,
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).and_then(non_empty)
}

fn non_empty(text: &str) -> Option<String> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub fn microdata_candidates(document: &Html) -> Vec<RawCandidate> {
    document
        .select(&ITEM_SELECTOR)
        .filter_map(|item| {
            let name = own_prop(&item, &NAME_PROP).and_then(prop_text)?;
            let date = own_prop(&item, &START_PROP).and_then(prop_date);
            let url = own_prop(&item, &URL_PROP)
                .and_then(prop_url)
                .or_else(|| super::base::element_link(&item));
            Some(
                RawCandidate::structured(name)
                    .with_date(date)
                    .with_location(microdata_location(&item))
                    .with_url(url),
            )
        })
        .collect()
}

fn microdata_location(item: &ElementRef<'_>) -> Option<String> {
    if let Some(location) = own_prop(item, &LOCATION_PROP) {
        let locality = location
            .select(&LOCALITY_PROP)
            .next()
            .and_then(prop_text);
        let place = locality
            .or_else(|| own_prop(&location, &NAME_PROP).and_then(prop_text))
            .or_else(|| prop_text(location));
        if place.is_some() {
            return place;
        }
    }
    item.select(&LOCALITY_PROP).next().and_then(prop_text)
}

/// First property element whose nearest enclosing item scope is `item`, so
/// a nested place's `name` is not mistaken for the event name.
fn own_prop<'a>(item: &ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    item.select(selector).find(|prop| {
        prop.ancestors()
            .filter_map(ElementRef::wrap)
            .find(|ancestor| ancestor.value().attr("itemscope").is_some())
            .map_or(true, |scope| scope.id() == item.id())
    })
}

fn prop_text(element: ElementRef<'_>) -> Option<String> {
    element
        .value()
        .attr("content")
        .and_then(non_empty)
        .or_else(|| non_empty(&super::base::inner_text(element)))
}

fn prop_date(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();
    value
        .attr("content")
        .or_else(|| value.attr("datetime"))
        .and_then(non_empty)
        .or_else(|| non_empty(&super::base::inner_text(element)))
}

fn prop_url(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();
    value
        .attr("href")
        .or_else(|| value.attr("content"))
        .and_then(non_empty)
        .or_else(|| non_empty(&super::base::inner_text(element)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateOrigin;

    #[test]
    fn reads_festival_blocks_from_json_ld() {
        let html = Html::parse_document(
            r#"<html><head>
            <script type="application/ld+json">
            {"@context": "https://schema.org", "@type": "Festival", "name": "Sunsation",
             "startDate": "2025-04-04", "url": "https://www.festivalinfo.nl/festival/sunsation/",
             "location": {"@type": "Place", "name": "Terrein", "address": {"@type": "PostalAddress", "addressLocality": "Middelstum"}}}
            </script>
            <script type="application/ld+json">{"@type": "Organization", "name": "Festivalinfo"}</script>
            </head></html>"#,
        );
        let found = json_ld_candidates(&html, &EVENT_TYPES);
        assert_eq!(found.len(), 1);
        let sunsation = &found[0];
        assert_eq!(sunsation.name_text, "Sunsation");
        assert_eq!(sunsation.date_text.as_deref(), Some("2025-04-04"));
        assert_eq!(sunsation.location_text.as_deref(), Some("Middelstum"));
        assert_eq!(sunsation.origin, CandidateOrigin::Structured);
    }

    #[test]
    fn walks_graphs_item_lists_and_type_arrays() {
        let html = Html::parse_document(
            r#"<script type="application/ld+json">
            {"@graph": [
              {"@type": "ItemList", "itemListElement": [
                {"@type": "ListItem", "item": {"@type": ["MusicEvent"], "name": "Awakenings", "startDate": "2025-07-11"}},
                {"@type": "ListItem", "item": {"@type": "Event", "name": "Dekmantel", "location": [{"name": "Amsterdamse Bos"}]}}
              ]}
            ]}
            </script>
            <script type="application/ld+json">{ not json</script>"#,
        );
        let found = json_ld_candidates(&html, &EVENT_TYPES);
        let names: Vec<_> = found.iter().map(|c| c.name_text.as_str()).collect();
        assert_eq!(names, vec!["Awakenings", "Dekmantel"]);
        assert_eq!(found[1].location_text.as_deref(), Some("Amsterdamse Bos"));
    }

    #[test]
    fn reads_microdata_without_confusing_nested_names() {
        let html = Html::parse_document(
            r#"<div itemscope itemtype="http://schema.org/Event">
                <div itemprop="location" itemscope itemtype="http://schema.org/Place">
                    <span itemprop="name">Strand Noord</span>
                    <span itemprop="address" itemscope itemtype="http://schema.org/PostalAddress">
                        <span itemprop="addressLocality">Scheveningen</span>
                    </span>
                </div>
                <a itemprop="url" href="/event/12345"><span itemprop="name">Rotterdam Beach Festival</span></a>
                <meta itemprop="startDate" content="2025-08-09T12:00:00+02:00">
            </div>"#,
        );
        let found = microdata_candidates(&html);
        assert_eq!(found.len(), 1);
        let event = &found[0];
        assert_eq!(event.name_text, "Rotterdam Beach Festival");
        assert_eq!(event.date_text.as_deref(), Some("2025-08-09T12:00:00+02:00"));
        assert_eq!(event.location_text.as_deref(), Some("Scheveningen"));
        assert_eq!(event.url_text.as_deref(), Some("/event/12345"));
    }
}
