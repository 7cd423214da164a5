//! Ordered classification rules
//!
//! A page is first reduced to a set of [`PageSignals`]; the rules then only
//! look at those signals. The first rule of [`DECISION_ORDER`] that matches
//! decides the classification.

use crate::classify::Classification;

/// Facts observed on one page body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSignals {
    pub process_label: bool,
    pub rapporteur: bool,
    pub party_role: bool,
    pub timeline: bool,
    pub judge: bool,
    pub case_numbers: usize,
    pub count_phrase: bool,
    pub navigation: bool,
    pub table: bool,
    pub error_phrase: bool,
    pub trimmed_len: usize,
    pub has_html: bool,
    pub has_body: bool,
}

/// One classification rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Process label, rapporteur, a party role and a timeline token
    StrictDetail,
    /// A formatted case number plus any judge, party or timeline token
    RelaxedDetail,
    /// A count phrase, navigation words, or several case numbers in a table
    List,
    /// Failure phrases or a structurally incomplete document
    ExplicitError,
    /// A complete document that matched nothing else
    ConservativeError,
}

/// Rules in evaluation order with the classification each one yields
///
/// Detail rules come first because detail pages also carry table markup
/// and dates that would satisfy the list rule.
pub const DECISION_ORDER: [(Rule, Classification); 5] = [
    (Rule::StrictDetail, Classification::Detail),
    (Rule::RelaxedDetail, Classification::Detail),
    (Rule::List, Classification::List),
    (Rule::ExplicitError, Classification::Error),
    (Rule::ConservativeError, Classification::Error),
];

impl Rule {
    /// Checks the rule against observed signals
    ///
    /// # Arguments
    ///
    /// * `signals` - Facts extracted from the page
    /// * `min_body_chars` - Shortest trimmed body accepted as a real page
    /// * `strict_error_fallback` - Whether unmatched complete pages are errors
    pub fn matches(
        &self,
        signals: &PageSignals,
        min_body_chars: usize,
        strict_error_fallback: bool,
    ) -> bool {
        match self {
            Self::StrictDetail => {
                signals.process_label
                    && signals.rapporteur
                    && signals.party_role
                    && signals.timeline
            }
            Self::RelaxedDetail => {
                signals.case_numbers > 0
                    && (signals.judge || signals.rapporteur || signals.party_role || signals.timeline)
            }
            Self::List => {
                signals.count_phrase
                    || signals.navigation
                    || (signals.case_numbers > 1 && signals.table)
            }
            Self::ExplicitError => {
                signals.error_phrase
                    || signals.trimmed_len < min_body_chars
                    || !signals.has_html
                    || !signals.has_body
            }
            Self::ConservativeError => strict_error_fallback,
        }
    }
}

/// Runs the decision order over a set of signals
pub fn decide(
    signals: &PageSignals,
    min_body_chars: usize,
    strict_error_fallback: bool,
) -> Classification {
    DECISION_ORDER
        .iter()
        .find(|(rule, _)| rule.matches(signals, min_body_chars, strict_error_fallback))
        .map(|(_, classification)| *classification)
        .unwrap_or(Classification::Unknown)
}
