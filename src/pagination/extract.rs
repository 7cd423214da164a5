//! Reading pagination signals out of list pages

use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Result-count phrases, first match wins
static TOTAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Total:\s*(\d+)",
        r"(?i)Total\s+de\s+(\d+)",
        r"(?i)(\d+)\s+resultados?",
        r"(?i)(\d+)\s+processos?",
        r"(?i)Encontrad[oa]s?\s+(\d+)",
        r"(?i)Localizad[oa]s?\s+(\d+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("total pattern is valid"))
    .collect()
});

static NEXT_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[^\w]*(?:pr[óo]xim[ao]|seguinte|next)\b|\s*(?:>|›|»)\s*$)")
        .expect("next pattern is valid")
});

static LAST_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[^\w]*(?:[úu]ltim[ao]|fim|last)\b|\s*(?:>>|»»)\s*$)")
        .expect("last pattern is valid")
});

static FIRST_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[^\w]*(?:primeir[ao]|in[íi]cio|first)\b|\s*(?:<<|««)\s*$)")
        .expect("first pattern is valid")
});

static PREV_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[^\w]*(?:anterior|previous|prev)\b|\s*(?:<|‹|«)\s*$)")
        .expect("previous pattern is valid")
});

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));

/// Navigation links found on a list page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavLinks {
    pub has_next: bool,
    pub next_token: Option<u32>,
    pub has_prev: bool,
    pub prev_token: Option<u32>,
    pub first_token: Option<u32>,
    pub last_token: Option<u32>,
    pub numbered_pages: BTreeSet<u32>,
}

impl NavLinks {
    /// Whether the page carried any navigation at all
    pub fn has_signal(&self) -> bool {
        self.has_next
            || self.has_prev
            || self.first_token.is_some()
            || self.last_token.is_some()
            || !self.numbered_pages.is_empty()
    }
}

/// Whether an anchor text is pagination navigation (words, arrows or a bare number)
pub fn is_navigation_text(text: &str) -> bool {
    let text = text.trim();
    LAST_TEXT.is_match(text)
        || FIRST_TEXT.is_match(text)
        || NEXT_TEXT.is_match(text)
        || PREV_TEXT.is_match(text)
        || (!text.is_empty() && text.chars().all(|c| c.is_ascii_digit()))
}

/// Parses the result total, if the page states one
pub fn total_count(html: &str) -> Option<u64> {
    TOTAL_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(html))
        .and_then(|caps| caps[1].parse().ok())
}

/// Collects navigation anchors
///
/// # Arguments
///
/// * `html` - The list page
/// * `page_token` - Pattern capturing the page parameter of an href
pub fn nav_links(html: &str, page_token: &Regex) -> NavLinks {
    let document = Html::parse_document(html);
    let mut links = NavLinks::default();

    for anchor in document.select(&ANCHOR) {
        let href = anchor.value().attr("href").unwrap_or_default();
        let text = anchor.text().collect::<String>();
        let text = text.trim();
        let token = page_token
            .captures(href)
            .and_then(|caps| caps[1].parse::<u32>().ok());

        if LAST_TEXT.is_match(text) {
            links.last_token = links.last_token.or(token);
        } else if FIRST_TEXT.is_match(text) {
            links.first_token = links.first_token.or(token);
        } else if NEXT_TEXT.is_match(text) {
            links.has_next = true;
            links.next_token = links.next_token.or(token);
        } else if PREV_TEXT.is_match(text) {
            links.has_prev = true;
            links.prev_token = links.prev_token.or(token);
        } else if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            if let Some(token) = token {
                links.numbered_pages.insert(token);
            }
        }
    }

    if links.last_token.is_none() {
        links.last_token = links.numbered_pages.iter().next_back().copied();
    }

    links
}
