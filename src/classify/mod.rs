//! Page classification
//!
//! Maps a raw response body to a [`Classification`] using case-insensitive
//! token sets taken from [`ClassifierConfig`] and the ordered rules in
//! [`rules`].

pub mod rules;

use crate::config::ClassifierConfig;
use crate::ConfigError;
use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};
use rules::{decide, PageSignals};
use std::fmt;
use std::sync::LazyLock;

static HTML_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<html[\s>]").expect("html marker pattern is valid"));

static BODY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<body[\s>]").expect("body marker pattern is valid"));

static TABLE_STRUCTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<table[\s>].*?<tr[\s>]").expect("table pattern is valid")
});

static SEARCH_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<form[\s>].*?<input[\s>]").expect("form pattern is valid")
});

/// What kind of page a response body is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The search form
    Form,
    /// A single case's detail page
    Detail,
    /// A result list or enumeration page
    List,
    /// A failure, empty result or structurally incomplete page
    Error,
    /// Anything else
    Unknown,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Detail => "detail",
            Self::List => "list",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled classifier
#[derive(Debug, Clone)]
pub struct PageClassifier {
    process_label: RegexSet,
    rapporteur: RegexSet,
    party_roles: RegexSet,
    timeline: RegexSet,
    judge: RegexSet,
    count_phrases: RegexSet,
    navigation: RegexSet,
    error_phrases: RegexSet,
    case_number: Regex,
    min_body_chars: usize,
    strict_error_fallback: bool,
}

fn compile_set(name: &str, patterns: &[String]) -> Result<RegexSet, ConfigError> {
    RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern(format!("classifier.{}: {}", name, e)))
}

impl PageClassifier {
    /// Compiles the classifier token sets
    ///
    /// # Returns
    ///
    /// * `Ok(PageClassifier)` - All patterns compiled
    /// * `Err(ConfigError::InvalidPattern)` - A pattern is not a valid regex
    pub fn new(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        let case_number = RegexBuilder::new(&config.case_number)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern(format!("classifier.case-number: {}", e)))?;

        Ok(Self {
            process_label: compile_set("process-label", &config.process_label)?,
            rapporteur: compile_set("rapporteur", &config.rapporteur)?,
            party_roles: compile_set("party-roles", &config.party_roles)?,
            timeline: compile_set("timeline", &config.timeline)?,
            judge: compile_set("judge", &config.judge)?,
            count_phrases: compile_set("count-phrases", &config.count_phrases)?,
            navigation: compile_set("navigation", &config.navigation)?,
            error_phrases: compile_set("error-phrases", &config.error_phrases)?,
            case_number,
            min_body_chars: config.min_body_chars,
            strict_error_fallback: config.strict_error_fallback,
        })
    }

    /// Classifies a response body; an absent or empty body is an Error
    pub fn classify(&self, body: Option<&str>) -> Classification {
        match body {
            Some(html) if !html.trim().is_empty() => decide(
                &self.signals(html),
                self.min_body_chars,
                self.strict_error_fallback,
            ),
            _ => Classification::Error,
        }
    }

    /// Classifies the response to a search-form load
    ///
    /// A body carrying a form with inputs is the Form page; anything else is
    /// classified normally.
    pub fn classify_form_page(&self, body: Option<&str>) -> Classification {
        match body {
            Some(html) if SEARCH_FORM.is_match(html) => Classification::Form,
            _ => self.classify(body),
        }
    }

    /// Extracts every signal the rules look at
    pub fn signals(&self, html: &str) -> PageSignals {
        PageSignals {
            process_label: self.process_label.is_match(html),
            rapporteur: self.rapporteur.is_match(html),
            party_role: self.party_roles.is_match(html),
            timeline: self.timeline.is_match(html),
            judge: self.judge.is_match(html),
            case_numbers: self.case_number.find_iter(html).count(),
            count_phrase: self.count_phrases.is_match(html),
            navigation: self.navigation.is_match(html),
            table: TABLE_STRUCTURE.is_match(html),
            error_phrase: self.error_phrases.is_match(html),
            trimmed_len: html.trim().chars().count(),
            has_html: HTML_MARKER.is_match(html),
            has_body: BODY_MARKER.is_match(html),
        }
    }

    /// The formatted case-number pattern
    pub fn case_number_pattern(&self) -> &Regex {
        &self.case_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> PageClassifier {
        PageClassifier::new(&ClassifierConfig::default()).unwrap()
    }

    const DETAIL_PAGE: &str = r#"<html><body>
        <p>PROCESSO Nº 0015648-78.1999.4.05.0000 (99.05.15648-0)</p>
        <table>
          <tr><td>RELATOR</td><td>: DESEMBARGADOR FEDERAL JOÃO DA SILVA</td></tr>
          <tr><td>APTE</td><td>: FAZENDA NACIONAL</td></tr>
          <tr><td>APDO</td><td>: EMPRESA EXEMPLO LTDA</td></tr>
        </table>
        <p>AUTUADO EM 15/04/1999</p>
    </body></html>"#;

    #[test]
    fn test_strict_detail() {
        assert_eq!(classifier().classify(Some(DETAIL_PAGE)), Classification::Detail);
    }

    #[test]
    fn test_relaxed_detail_without_process_label() {
        let html = r#"<html><body><h1>0015648-78.1999.4.05.0000</h1>
            <p>Relator: Des. Fulano de Tal, acompanhamento completo do feito e das partes envolvidas.</p>
            </body></html>"#;
        assert_eq!(classifier().classify(Some(html)), Classification::Detail);
    }

    #[test]
    fn test_total_count_is_list() {
        let html = r#"<html><body><h2>Resultado da consulta</h2><p>Total: 157</p>
            <p>Lista de processos encontrados para a parte informada nesta consulta.</p>
            </body></html>"#;
        assert_eq!(classifier().classify(Some(html)), Classification::List);
    }

    #[test]
    fn test_table_of_case_numbers_is_list() {
        let html = r#"<html><body><table>
            <tr><td><a href="/cp/processo/1">0000001-11.2020.4.05.0000</a></td></tr>
            <tr><td><a href="/cp/processo/2">0000002-22.2020.4.05.0000</a></td></tr>
            </table><p>Consulta processual, resultados ordenados pelo numero.</p></body></html>"#;
        assert_eq!(classifier().classify(Some(html)), Classification::List);
    }

    #[test]
    fn test_empty_and_absent_bodies_are_errors() {
        let classifier = classifier();
        assert_eq!(classifier.classify(None), Classification::Error);
        assert_eq!(classifier.classify(Some("")), Classification::Error);
        assert_eq!(classifier.classify(Some("   \n ")), Classification::Error);
    }

    #[test]
    fn test_tiny_document_is_error() {
        assert_eq!(
            classifier().classify(Some("<html><body>ok</body></html>")),
            Classification::Error
        );
    }

    #[test]
    fn test_no_results_phrase_is_error() {
        let html = r#"<html><body><div class="aviso">Nenhum resultado encontrado para
            os parâmetros informados. Verifique os dados e tente novamente mais tarde.</div>
            </body></html>"#;
        assert_eq!(classifier().classify(Some(html)), Classification::Error);
    }

    #[test]
    fn test_unmatched_page_fallback() {
        let html = r#"<html><body><p>Bem-vindo ao portal de consulta. Utilize o menu
            lateral para escolher o tipo de pesquisa desejado neste sistema.</p>
            </body></html>"#;
        assert_eq!(classifier().classify(Some(html)), Classification::Error);

        let config = ClassifierConfig {
            strict_error_fallback: false,
            ..ClassifierConfig::default()
        };
        let lenient = PageClassifier::new(&config).unwrap();
        assert_eq!(lenient.classify(Some(html)), Classification::Unknown);
    }

    #[test]
    fn test_form_page() {
        let html = r#"<html><body><form action="/cp/" method="post">
            <input type="hidden" name="token" value="abc"/>
            <input type="text" name="filtro"/></form></body></html>"#;
        let classifier = classifier();
        assert_eq!(classifier.classify_form_page(Some(html)), Classification::Form);
        assert_eq!(
            classifier.classify_form_page(Some(DETAIL_PAGE)),
            Classification::Detail
        );
    }

    #[test]
    fn test_custom_token_sets() {
        let config = ClassifierConfig {
            count_phrases: vec![r"Results:\s*\d+".to_string()],
            navigation: vec![r"\bnext\b".to_string()],
            ..ClassifierConfig::default()
        };
        let classifier = PageClassifier::new(&config).unwrap();
        let html = r#"<html><body><p>Results: 12</p><p>Listing every matching
            record for the requested party, ordered by filing date.</p></body></html>"#;
        assert_eq!(classifier.classify(Some(html)), Classification::List);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = ClassifierConfig {
            timeline: vec!["(".to_string()],
            ..ClassifierConfig::default()
        };
        assert!(matches!(
            PageClassifier::new(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }
}
