//! HTML parsing for search forms and case links
//!
//! This module handles:
//! - Locating the search form and preserving its hidden fields
//! - Recognizing case detail links (and skipping their sub-resources)
//! - Scoring candidate links against a searched case number

use crate::config::LinkConfig;
use crate::crawler::fetcher::HttpMethod;
use crate::normalize::{normalize_identifier_digits, normalize_identifier_hyphenated};
use crate::pagination::is_navigation_text;
use crate::ConfigError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

static FORM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form").expect("form selector is valid"));

static INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name]").expect("input selector is valid"));

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));

/// Score for an href containing the searched case number
pub const SCORE_EXACT_TARGET: u32 = 100;
/// Score for an href containing any formatted case number
pub const SCORE_CASE_NUMBER: u32 = 50;
/// Score for a detail-looking path
pub const SCORE_DETAIL_PATH: u32 = 25;
/// Score for an href without a query string
pub const SCORE_NO_QUERY: u32 = 10;

/// A search form as found on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchForm {
    pub action: Url,
    pub method: HttpMethod,
    /// Hidden fields in document order
    pub hidden_fields: Vec<(String, String)>,
}

impl SearchForm {
    /// Builds the submitted fields
    ///
    /// Hidden fields are kept verbatim and in order; each override replaces
    /// the value of an existing field or is appended.
    pub fn submission(&self, overrides: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut fields = self.hidden_fields.clone();
        for (name, value) in overrides {
            match fields.iter_mut().find(|(existing, _)| existing == name) {
                Some(field) => field.1 = value.to_string(),
                None => fields.push((name.to_string(), value.to_string())),
            }
        }
        fields
    }
}

/// Finds the search form on a page
///
/// The first form holding an input named `value_field` is preferred; the
/// first form of the page is used otherwise.
///
/// # Arguments
///
/// * `html` - The page content
/// * `page_url` - URL the page was served from, used to resolve the action
/// * `value_field` - Name of the searched-value input
pub fn extract_search_form(html: &str, page_url: &Url, value_field: &str) -> Option<SearchForm> {
    let document = Html::parse_document(html);

    let forms: Vec<ElementRef> = document.select(&FORM).collect();
    let form = forms
        .iter()
        .find(|form| {
            form.select(&INPUT)
                .any(|input| input.value().attr("name") == Some(value_field))
        })
        .or_else(|| forms.first())?;

    let action = match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => page_url.join(action).ok()?,
        _ => page_url.clone(),
    };

    let method = match form.value().attr("method") {
        Some(method) if method.eq_ignore_ascii_case("post") => HttpMethod::Post,
        _ => HttpMethod::Get,
    };

    let hidden_fields = form
        .select(&INPUT)
        .filter(|input| {
            input
                .value()
                .attr("type")
                .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
        })
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    Some(SearchForm {
        action,
        method,
        hidden_fields,
    })
}

/// Resolves a link to an absolute URL
///
/// Returns None for fragments, `javascript:`, `mailto:` and `tel:` links.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    let lower = href.to_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
    {
        return None;
    }

    let url = base_url.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// A detail link considered during disambiguation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
    pub href: String,
    pub url: Url,
    pub score: u32,
    /// Case number found in the href, hyphenated
    pub extracted_identifier: Option<String>,
}

/// Detail link recognition and scoring
#[derive(Debug, Clone)]
pub struct LinkMatcher {
    detail_markers: Vec<String>,
    sub_resource_markers: Vec<String>,
    strategies: Vec<Selector>,
    case_number: Regex,
    /// URL prefixes never treated as detail links (list routes)
    excluded_prefixes: Vec<String>,
}

/// Fixed part of a URL template, up to its first `{placeholder}`
pub fn route_prefix(template: &str) -> &str {
    template.find('{').map_or(template, |i| &template[..i])
}

impl LinkMatcher {
    /// Creates a matcher
    ///
    /// # Arguments
    ///
    /// * `config` - Link markers and selector strategies
    /// * `case_number` - Formatted case-number pattern
    pub fn new(config: &LinkConfig, case_number: Regex) -> Result<Self, ConfigError> {
        let strategies = config
            .selector_strategies
            .iter()
            .map(|selector| {
                Selector::parse(selector).map_err(|e| {
                    ConfigError::InvalidPattern(format!("links selector '{}': {:?}", selector, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            detail_markers: config.detail_markers.iter().map(|m| m.to_lowercase()).collect(),
            sub_resource_markers: config
                .sub_resource_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
            strategies,
            case_number,
            excluded_prefixes: Vec::new(),
        })
    }

    /// Skips links starting with `prefix` when enumerating detail links
    pub fn with_excluded_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !prefix.is_empty() {
            self.excluded_prefixes.push(prefix);
        }
        self
    }

    fn is_excluded(&self, url: &Url) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| url.as_str().starts_with(prefix.as_str()))
    }

    fn is_sub_resource(&self, lower: &str) -> bool {
        self.sub_resource_markers.iter().any(|m| lower.contains(m))
    }

    /// Whether an href points at a case detail resource
    pub fn is_detail_href(&self, href: &str) -> bool {
        let lower = href.to_lowercase();
        self.detail_markers.iter().any(|m| lower.contains(m)) && !self.is_sub_resource(&lower)
    }

    /// Scores a detail link against the searched case number
    ///
    /// # Arguments
    ///
    /// * `href` - The raw href
    /// * `url` - The resolved URL
    /// * `target` - The searched case number (any formatting)
    pub fn score(&self, href: &str, url: &Url, target: &str) -> u32 {
        let hyphenated = normalize_identifier_hyphenated(target);
        let digits = normalize_identifier_digits(target);
        let mut score = 0;

        if (!hyphenated.is_empty() && href.contains(&hyphenated))
            || (!digits.is_empty() && href.contains(&digits))
        {
            score += SCORE_EXACT_TARGET;
        }
        if self.case_number.is_match(href) {
            score += SCORE_CASE_NUMBER;
        }

        let path = url.path().to_lowercase();
        if self.detail_markers.iter().any(|m| path.contains(m)) && !self.is_sub_resource(&path) {
            score += SCORE_DETAIL_PATH;
        }
        if url.query().is_none() {
            score += SCORE_NO_QUERY;
        }

        score
    }

    /// Picks the link most likely to be the searched case
    ///
    /// Selector strategies are scanned in order. Within a strategy the
    /// highest score wins and ties keep the earliest link; once a strategy
    /// yields a score of at least 100 the remaining ones are skipped.
    /// Links scoring zero are never selected.
    pub fn best_match(&self, html: &str, base_url: &Url, target: &str) -> Option<CandidateLink> {
        let document = Html::parse_document(html);
        let mut best: Option<CandidateLink> = None;

        for strategy in &self.strategies {
            for anchor in document.select(strategy) {
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                if !self.is_detail_href(href) {
                    continue;
                }
                let Some(url) = resolve_link(href, base_url) else {
                    continue;
                };

                let score = self.score(href, &url, target);
                if score > best.as_ref().map_or(0, |b| b.score) {
                    best = Some(CandidateLink {
                        href: href.to_string(),
                        url,
                        score,
                        extracted_identifier: self
                            .case_number
                            .find(href)
                            .map(|m| normalize_identifier_hyphenated(m.as_str())),
                    });
                }
            }

            if best.as_ref().is_some_and(|b| b.score >= SCORE_EXACT_TARGET) {
                break;
            }
        }

        best
    }

    /// Enumerates every distinct detail link of a list page, in order
    ///
    /// Pager anchors, links back to the page itself and links under an
    /// excluded prefix are skipped.
    pub fn detail_links(&self, html: &str, page_url: &Url) -> Vec<Url> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for anchor in document.select(&ANCHOR) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !self.is_detail_href(href) {
                continue;
            }
            let text = anchor.text().collect::<String>();
            if is_navigation_text(&text) {
                continue;
            }
            let Some(url) = resolve_link(href, page_url) else {
                continue;
            };
            if url == *page_url || self.is_excluded(&url) {
                continue;
            }
            if seen.insert(url.clone()) {
                links.push(url);
            }
        }

        links
    }
}
