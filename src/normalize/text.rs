//! Free text, date and person-name normalization

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

static DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2})/(\d{1,2})/(\d{4})\s+(\d{1,2}):(\d{1,2})")
        .expect("date-time pattern is valid")
});

static DATE_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2})/(\d{1,2})/(\d{4})").expect("date pattern is valid")
});

/// Honorific prefixes, longest first so "DESEMBARGADOR FEDERAL" wins over
/// "DESEMBARGADOR".
static TITLE_PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^\s*DES\.?\s+",
        r"(?i)^\s*DESEMBARGADORA?\s+FEDERAL\s+",
        r"(?i)^\s*DESEMBARGADORA?\s+",
        r"(?i)^\s*JU[IÍ]ZA?\s+FEDERAL\s+",
        r"(?i)^\s*JU[IÍ]ZA?\s+",
        r"(?i)^\s*DR\.?\s+",
        r"(?i)^\s*DRA\.?\s+",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("title pattern is valid"))
    .collect()
});

/// Trims and collapses line breaks and whitespace runs into single spaces
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Converts `DD/MM/YYYY` or `DD/MM/YYYY HH:MM` into ISO-8601
///
/// # Returns
///
/// * `Some("YYYY-MM-DD")` or `Some("YYYY-MM-DDTHH:MM:SS")`
/// * `None` - Unrecognized input or an impossible calendar date
///
/// # Example
///
/// ```
/// use trf5_crawler::normalize::parse_date_to_iso;
///
/// assert_eq!(parse_date_to_iso("15/04/2000").as_deref(), Some("2000-04-15"));
/// assert_eq!(parse_date_to_iso("31/02/2021"), None);
/// ```
pub fn parse_date_to_iso(raw: &str) -> Option<String> {
    if let Some(caps) = DATE_TIME.captures(raw) {
        let date = calendar_date(&caps[1], &caps[2], &caps[3])?;
        let hour: u32 = caps[4].parse().ok()?;
        let minute: u32 = caps[5].parse().ok()?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
        return Some(date.and_time(time).format("%Y-%m-%dT%H:%M:%S").to_string());
    }

    let caps = DATE_ONLY.captures(raw)?;
    let date = calendar_date(&caps[1], &caps[2], &caps[3])?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn calendar_date(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Strips judge and doctor honorifics from a name, then cleans the text
///
/// Prefixes are removed repeatedly until none applies, so stacked titles
/// ("DES. DR. ...") are fully removed and the result is stable.
///
/// # Example
///
/// ```
/// use trf5_crawler::normalize::normalize_person_title;
///
/// assert_eq!(
///     normalize_person_title("DESEMBARGADOR FEDERAL JOÃO DA SILVA"),
///     "JOÃO DA SILVA"
/// );
/// ```
pub fn normalize_person_title(raw: &str) -> String {
    let mut current = raw.to_string();

    loop {
        let stripped = TITLE_PREFIXES
            .iter()
            .find(|prefix| prefix.is_match(&current))
            .map(|prefix| prefix.replace(&current, "").into_owned());

        match stripped {
            Some(next) if next != current => current = next,
            _ => break,
        }
    }

    clean_text(&current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  APELAÇÃO \r\n  CÍVEL\t\t nº 1  "), "APELAÇÃO CÍVEL nº 1");
        assert_eq!(clean_text(""), "");
        let once = clean_text(" a \n b ");
        assert_eq!(clean_text(&once), once);
    }

    #[test]
    fn test_parse_date_only() {
        assert_eq!(parse_date_to_iso("15/04/2000").as_deref(), Some("2000-04-15"));
        assert_eq!(parse_date_to_iso("1/2/2003").as_deref(), Some("2003-02-01"));
    }

    #[test]
    fn test_parse_date_with_time() {
        assert_eq!(
            parse_date_to_iso("06/10/2020 03:13").as_deref(),
            Some("2020-10-06T03:13:00")
        );
    }

    #[test]
    fn test_parse_invalid_dates() {
        assert_eq!(parse_date_to_iso("31/02/2021"), None);
        assert_eq!(parse_date_to_iso("31/04/2021"), None);
        assert_eq!(parse_date_to_iso("06/10/2020 25:00"), None);
        assert_eq!(parse_date_to_iso("not a date"), None);
        assert_eq!(parse_date_to_iso(""), None);
    }

    #[test]
    fn test_person_titles() {
        assert_eq!(
            normalize_person_title("DESEMBARGADOR FEDERAL JOÃO DA SILVA"),
            "JOÃO DA SILVA"
        );
        assert_eq!(
            normalize_person_title("Desembargadora Federal Maria Souza"),
            "Maria Souza"
        );
        assert_eq!(
            normalize_person_title("JUÍZA FEDERAL ANA OLIVEIRA"),
            "ANA OLIVEIRA"
        );
        assert_eq!(normalize_person_title("Des. Carlos  Lima"), "Carlos Lima");
        assert_eq!(normalize_person_title("DRA. PAULA REIS"), "PAULA REIS");
        assert_eq!(normalize_person_title("JOSÉ DESTRO"), "JOSÉ DESTRO");
    }

    #[test]
    fn test_person_title_idempotent() {
        for raw in [
            "DR. DES. JOÃO",
            "DESEMBARGADOR FEDERAL JOÃO DA SILVA",
            "  juiz   federal  Pedro ",
            "Ninguém",
        ] {
            let once = normalize_person_title(raw);
            assert_eq!(normalize_person_title(&once), once);
        }
        assert_eq!(normalize_person_title("DR. DES. JOÃO"), "JOÃO");
    }
}
