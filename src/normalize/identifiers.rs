//! Case-number (NPU) and party identifier (CNPJ) normalization

use crate::ValidationError;

/// Digit count of a canonical case number
pub const CASE_NUMBER_DIGITS: usize = 20;

/// Digit count of a party tax identifier
pub const PARTY_ID_DIGITS: usize = 14;

fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Counts the ASCII digits in a raw value
pub fn digit_count(raw: &str) -> usize {
    raw.chars().filter(|c| c.is_ascii_digit()).count()
}

/// Formats a case number as `NNNNNNN-DD.AAAA.J.TR.OOOO`
///
/// Non-digits are stripped first. When the remaining value is not exactly
/// 20 digits the input is returned unchanged; callers validate separately.
///
/// # Example
///
/// ```
/// use trf5_crawler::normalize::normalize_identifier_hyphenated;
///
/// assert_eq!(
///     normalize_identifier_hyphenated("00156487819994050000"),
///     "0015648-78.1999.4.05.0000"
/// );
/// ```
pub fn normalize_identifier_hyphenated(raw: &str) -> String {
    let digits = digits_only(raw);
    if digits.len() != CASE_NUMBER_DIGITS {
        return raw.to_string();
    }

    format!(
        "{}-{}.{}.{}.{}.{}",
        &digits[0..7],
        &digits[7..9],
        &digits[9..13],
        &digits[13..14],
        &digits[14..16],
        &digits[16..20]
    )
}

/// Strips everything but digits from a case number, without length checks
pub fn normalize_identifier_digits(raw: &str) -> String {
    digits_only(raw)
}

/// Strips everything but digits from a party tax identifier
pub fn normalize_party_id_digits(raw: &str) -> String {
    digits_only(raw)
}

/// Validates a case number and returns its hyphenated canonical form
///
/// # Returns
///
/// * `Ok(String)` - The canonical `NNNNNNN-DD.AAAA.J.TR.OOOO` form
/// * `Err(ValidationError)` - The value does not hold exactly 20 digits
pub fn validate_case_number(raw: &str) -> Result<String, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyTarget);
    }

    let digits = digit_count(raw);
    if digits != CASE_NUMBER_DIGITS {
        return Err(ValidationError::InvalidCaseNumber {
            value: raw.to_string(),
            digits,
        });
    }

    Ok(normalize_identifier_hyphenated(raw))
}

/// Validates a party tax identifier and returns its digits-only form
pub fn validate_party_id(raw: &str) -> Result<String, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyTarget);
    }

    let digits = normalize_party_id_digits(raw);
    if digits.len() != PARTY_ID_DIGITS {
        return Err(ValidationError::InvalidPartyId {
            value: raw.to_string(),
            digits: digits.len(),
        });
    }

    Ok(digits)
}
