use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:menu|login|log in|register|inloggen|registreren|zoeken|search|gevonden|bekijk|cookies?)\b",
    )
    .expect("noise regex")
});
static FEATURED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^featured\s*").expect("featured regex"));
static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:festival|event)\s*:\s*").expect("label regex"));
static EDITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\beditie\s*#\s*\d+").expect("edition regex"));
static TRAILING_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+(?:19|20)\d{2}$").expect("trailing year regex"));
static COUNTRY_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([A-Z]{2}\)").expect("country marker regex"));
static TRAILING_PLACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([^,]+)$").expect("trailing place regex"));
static IN_PLACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:in|te)\s+([^,.]+)$").expect("in place regex"));
static NEXT_LINK: Lazy<SelectorChain> =
    Lazy::new(|| SelectorChain::new(&["a[rel=\"next\"]", ".pagination .next", "a.next"]));

pub const MIN_NAME_CHARS: usize = 3;

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(inner_text)
        .filter(|text| !text.is_empty())
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Resolve `href` against `base`. Fragment-only and `javascript:` links are
/// not listing targets and resolve to `None`.
pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

/// Own `href` of an anchor element, or the first link inside it.
pub fn element_link(element: &ElementRef<'_>) -> Option<String> {
    static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("link selector"));
    if element.value().name() == "a" {
        if let Some(href) = element.value().attr("href") {
            return Some(href.to_string());
        }
    }
    first_attr(element, &LINK, "href").or_else(|| {
        element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|ancestor| ancestor.value().name() == "a")
            .and_then(|anchor| anchor.value().attr("href"))
            .map(str::to_string)
    })
}

/// Strip site chrome from a listing title: "Featured" badges, "Festival:"
/// labels, "Editie #N" and a trailing edition year.
pub fn clean_name(raw: &str) -> String {
    let text = clean_text(raw);
    let text = FEATURED_RE.replace(&text, "");
    let text = LABEL_RE.replace(&text, "");
    let text = EDITION_RE.replace_all(&text, "");
    let text = clean_text(&text);
    TRAILING_YEAR_RE.replace(&text, "").trim().to_string()
}

/// Names shorter than three characters or containing navigation words are
/// extraction artifacts, not festivals.
pub fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.chars().count() >= MIN_NAME_CHARS && !NOISE_RE.is_match(trimmed)
}

/// Remove `(NL)`-style country markers from a place name.
pub fn clean_location(raw: &str) -> Option<String> {
    let text = clean_text(&COUNTRY_MARKER_RE.replace_all(raw, ""));
    let text = text.trim_matches(|c: char| c == ',' || c == '/' || c.is_whitespace());
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Guess a place from free card text: "…, Amsterdam" or "… in Utrecht".
pub fn location_from_text(text: &str) -> Option<String> {
    let text = clean_text(text);
    TRAILING_PLACE_RE
        .captures(&text)
        .or_else(|| IN_PLACE_RE.captures(&text))
        .and_then(|caps| clean_location(&caps[1]))
}

/// Absolute URL of the page's "next" link, if any.
pub fn next_link(document: &Html, base: &str) -> Option<String> {
    let root = document.root_element();
    absolute_url(base, NEXT_LINK.first_attr(&root, "href"))
}

/// Ordered selectors tried until one yields a non-empty value.
pub struct SelectorChain {
    selectors: Vec<Selector>,
}

impl SelectorChain {
    pub fn new(selectors: &[&str]) -> Self {
        Self {
            selectors: selectors
                .iter()
                .map(|css| Selector::parse(css).expect("valid selector in chain"))
                .collect(),
        }
    }

    pub fn first_text(&self, element: &ElementRef<'_>) -> Option<String> {
        self.selectors
            .iter()
            .find_map(|selector| first_text(element, selector))
    }

    pub fn first_attr(&self, element: &ElementRef<'_>, attr: &str) -> Option<String> {
        self.selectors
            .iter()
            .find_map(|selector| first_attr(element, selector, attr))
    }

    /// All elements matched by the first selector that matches anything.
    pub fn select_first_hit<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        for selector in &self.selectors {
            let hits: Vec<_> = document.select(selector).collect();
            if !hits.is_empty() {
                return hits;
            }
        }
        Vec::new()
    }
}

/// One way of reading a field from a listing card.
pub enum Probe {
    Text(Selector),
    Attr(Selector, &'static str),
}

/// Ranked extraction strategies for a single field; the first probe that
/// produces a non-empty value wins.
pub struct FieldChain {
    probes: Vec<Probe>,
}

impl FieldChain {
    pub fn new() -> Self {
        Self { probes: Vec::new() }
    }

    pub fn text(mut self, css: &str) -> Self {
        self.probes.push(Probe::Text(parse_selector(css)));
        self
    }

    pub fn attr(mut self, css: &str, attr: &'static str) -> Self {
        self.probes.push(Probe::Attr(parse_selector(css), attr));
        self
    }

    pub fn extract(&self, element: &ElementRef<'_>) -> Option<String> {
        self.probes.iter().find_map(|probe| match probe {
            Probe::Text(selector) => first_text(element, selector),
            Probe::Attr(selector, attr) => first_attr(element, selector, attr),
        })
    }
}

fn parse_selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector in field chain")
}
