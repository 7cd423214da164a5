//! Canonicalization of identifiers, dates, free text and person names
//!
//! Every function here is total and deterministic. Functions returning a
//! string are idempotent: applying them twice gives the same result as once.

mod identifiers;
mod text;

pub use identifiers::{
    digit_count, normalize_identifier_digits, normalize_identifier_hyphenated,
    normalize_party_id_digits, validate_case_number, validate_party_id, CASE_NUMBER_DIGITS,
    PARTY_ID_DIGITS,
};
pub use text::{clean_text, normalize_person_title, parse_date_to_iso};
