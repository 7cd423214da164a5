//! Case record extraction from detail pages

use crate::config::ClassifierConfig;
use crate::normalize::{
    clean_text, digit_count, normalize_identifier_hyphenated, normalize_person_title,
    parse_date_to_iso, CASE_NUMBER_DIGITS,
};
use crate::ConfigError;
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static LEGACY_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((\d{2}\.\d{2}\.\d+-\d)\)").expect("legacy number pattern is valid")
});

static FILED_ON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)AUTUAD[OA]\s+EM\s+(\d{1,2}/\d{1,2}/\d{4})").expect("filing pattern is valid")
});

static FILING_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)autua[çc][ãa]o|data:").expect("filing hint pattern is valid")
});

static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}/\d{1,2}/\d{4}").expect("date pattern is valid"));

static RAPPORTEUR_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)relatora?\s*:\s*(.+)").expect("rapporteur pattern is valid")
});

static MOVEMENT_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Em\s+(\d{1,2}/\d{1,2}/\d{4})\s+(\d{1,2}:\d{2})")
        .expect("movement stamp pattern is valid")
});

static GUIDE_TRAILER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[Guia:.*?\].*").expect("guide pattern is valid"));

static LEADING_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*:\s*").expect("colon pattern is valid"));

static ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table tr").expect("row selector is valid"));

static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("cell selector is valid"));

static MOVEMENT_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[name^="mov_"]"#).expect("movement selector is valid"));

static MOVEMENT_BLOCK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        ".movimentacoes .movimento, .movimentacoes .item, .andamentos .andamento, .timeline .item",
    )
    .expect("movement block selector is valid")
});

static MOVEMENT_DATE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".data, .timestamp").expect("date selector is valid"));

static MOVEMENT_TEXT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".texto, .descricao").expect("text selector is valid"));

/// Shortest movement description kept
const MIN_MOVEMENT_CHARS: usize = 5;

/// A party of a case and its role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub role: String,
    pub name: String,
}

/// One timeline entry of a case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// ISO-8601 timestamp
    pub date: String,
    pub text: String,
}

/// Structured record built from a detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Hyphenated case number
    pub canonical_id: String,
    pub legacy_number: Option<String>,
    /// ISO-8601 filing date
    pub filed_on: Option<String>,
    pub rapporteur: Option<String>,
    pub parties: Vec<Party>,
    pub movements: Vec<Movement>,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

/// Builds [`CaseRecord`]s from detail page HTML
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    case_number: Regex,
    party_roles: RegexSet,
}

impl RecordExtractor {
    /// Creates an extractor sharing the classifier's vocabulary
    pub fn new(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        let case_number = RegexBuilder::new(&config.case_number)
            .build()
            .map_err(|e| ConfigError::InvalidPattern(format!("classifier.case-number: {}", e)))?;
        let party_roles = RegexSetBuilder::new(&config.party_roles)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern(format!("classifier.party-roles: {}", e)))?;

        Ok(Self {
            case_number,
            party_roles,
        })
    }

    /// Extracts a record from a detail page
    ///
    /// Returns None when the page carries no formatted case number, or when
    /// the matched number does not hold exactly 20 digits.
    ///
    /// # Arguments
    ///
    /// * `html` - The detail page
    /// * `source_url` - URL the page was served from
    /// * `scraped_at` - When the page was fetched
    pub fn extract(
        &self,
        html: &str,
        source_url: &str,
        scraped_at: DateTime<Utc>,
    ) -> Option<CaseRecord> {
        let canonical_id = normalize_identifier_hyphenated(self.case_number.find(html)?.as_str());
        if digit_count(&canonical_id) != CASE_NUMBER_DIGITS {
            return None;
        }
        let document = Html::parse_document(html);
        let rows = table_rows(&document);

        Some(CaseRecord {
            canonical_id,
            legacy_number: LEGACY_NUMBER
                .captures(html)
                .map(|caps| clean_text(&caps[1])),
            filed_on: filed_on(html, &document),
            rapporteur: rapporteur(&rows, &document),
            parties: self.parties(&rows),
            movements: movements(&document),
            source_url: source_url.to_string(),
            scraped_at,
        })
    }

    fn parties(&self, rows: &[(String, String)]) -> Vec<Party> {
        rows.iter()
            .filter(|(label, _)| !is_rapporteur_label(label) && self.party_roles.is_match(label))
            .map(|(label, value)| Party {
                role: label.clone(),
                name: strip_leading_colon(value),
            })
            .filter(|party| party.name.chars().count() > 1)
            .collect()
    }
}

fn element_text(element: &ElementRef) -> String {
    clean_text(&element.text().collect::<String>())
}

fn strip_leading_colon(value: &str) -> String {
    clean_text(&LEADING_COLON.replace(value, ""))
}

fn is_rapporteur_label(label: &str) -> bool {
    label.to_lowercase().starts_with("relator")
}

/// Label and value of every table row with at least two cells
fn table_rows(document: &Html) -> Vec<(String, String)> {
    document
        .select(&ROW)
        .filter_map(|row| {
            let mut cells = row.select(&CELL);
            let label = element_text(&cells.next()?);
            let value = element_text(&cells.next()?);
            (!label.is_empty()).then_some((label, value))
        })
        .collect()
}

fn filed_on(html: &str, document: &Html) -> Option<String> {
    if let Some(date) = FILED_ON
        .captures(html)
        .and_then(|caps| parse_date_to_iso(&caps[1]))
    {
        return Some(date);
    }

    document
        .root_element()
        .text()
        .filter(|text| FILING_HINT.is_match(text))
        .find_map(|text| DATE.find(text).and_then(|m| parse_date_to_iso(m.as_str())))
}

fn rapporteur(rows: &[(String, String)], document: &Html) -> Option<String> {
    let from_row = rows
        .iter()
        .filter(|(label, _)| is_rapporteur_label(label))
        .map(|(_, value)| strip_leading_colon(value))
        .find(|name| !name.is_empty());

    let name = from_row.or_else(|| {
        document.root_element().text().find_map(|text| {
            RAPPORTEUR_TEXT
                .captures(text)
                .map(|caps| clean_text(&caps[1]))
                .filter(|name| !name.is_empty())
        })
    })?;

    Some(normalize_person_title(&name)).filter(|name| !name.is_empty())
}

fn movements(document: &Html) -> Vec<Movement> {
    let mut movements: Vec<Movement> = document
        .select(&MOVEMENT_ANCHOR)
        .filter_map(|anchor| {
            let label = element_text(&anchor);
            let stamp = MOVEMENT_STAMP.captures(&label)?;
            let date = parse_date_to_iso(&format!("{} {}", &stamp[1], &stamp[2]))?;

            let row = anchor
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|element| element.value().name() == "tr")?;
            let next_row = row
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|element| element.value().name() == "tr")?;
            let cell = next_row.select(&CELL).nth(1)?;

            let text = clean_text(&GUIDE_TRAILER.replace(&element_text(&cell), ""));
            (text.chars().count() > MIN_MOVEMENT_CHARS).then_some(Movement { date, text })
        })
        .collect();

    if movements.is_empty() {
        movements = document
            .select(&MOVEMENT_BLOCK)
            .filter_map(|block| {
                let date = block
                    .select(&MOVEMENT_DATE)
                    .next()
                    .and_then(|date| parse_date_to_iso(&element_text(&date)))?;
                let text = block.select(&MOVEMENT_TEXT).next().map(|t| element_text(&t))?;
                (!text.is_empty()).then_some(Movement { date, text })
            })
            .collect();
    }

    movements
}
