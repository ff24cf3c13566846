//! Field normalization: timestamps, monetary amounts and email addresses.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use evrec_core::{OpenEvent, RawOpenRow, RawReceiptRow, ReceiptEvent};
use regex::Regex;
use thiserror::Error;

mod email;

pub use email::extract_email;

pub const CRATE_NAME: &str = "evrec-normalize";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("malformed timestamp `{value}`")]
    MalformedTimestamp { value: String },
}

/// Parse a textual event timestamp.
///
/// Tries chrono's RFC 3339 parser first, then naive date/datetime forms
/// assumed to be UTC, then `dateparser` for the long tail of formats
/// (slash-separated dates, RFC 2822, epoch seconds).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let trimmed = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    if let Ok(dt) = dateparser::parse(trimmed) {
        return Ok(dt);
    }

    Err(NormalizeError::MalformedTimestamp {
        value: raw.to_string(),
    })
}

fn amount_re() -> &'static Regex {
    static AMOUNT_RE: OnceLock<Regex> = OnceLock::new();
    AMOUNT_RE.get_or_init(|| Regex::new(r"[0-9]+\.[0-9]{2,}").expect("valid amount regex"))
}

fn display_name_re() -> &'static Regex {
    static DISPLAY_NAME_RE: OnceLock<Regex> = OnceLock::new();
    DISPLAY_NAME_RE.get_or_init(|| {
        Regex::new(r"[A-Z][a-z]+ [A-Z][a-z]+").expect("valid display name regex")
    })
}

/// Extract the first decimal amount with at least two fraction digits from a
/// currency-formatted string. Unmatched input is `None`, never an error.
pub fn extract_amount(raw: &str) -> Option<f64> {
    amount_re()
        .find(raw)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Best-effort "First Last" capture from the raw email field. Not validated
/// against any address grammar.
pub fn extract_display_name(raw: &str) -> Option<String> {
    display_name_re().find(raw).map(|m| m.as_str().to_string())
}

/// Domain portion of a parsed address: everything after the final `@`, with
/// domain-literal brackets trimmed.
pub fn email_domain(address: &str) -> Option<String> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim_matches(|c| c == '[' || c == ']').to_string())
        .filter(|domain| !domain.is_empty())
}

/// Empty date cells are missing, not malformed; anything non-empty must parse.
fn normalize_date(raw: &str) -> Result<Option<DateTime<Utc>>, NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    parse_timestamp(trimmed).map(Some)
}

pub fn normalize_open_rows(rows: Vec<RawOpenRow>) -> Result<Vec<OpenEvent>, NormalizeError> {
    rows.into_iter().map(normalize_open_row).collect()
}

fn normalize_open_row(row: RawOpenRow) -> Result<OpenEvent, NormalizeError> {
    Ok(OpenEvent {
        id: row.id,
        date: normalize_date(&row.date)?,
        receipt_id: row.receipt_id,
        user_agent: row.user_agent,
        page_url: row.page_url,
        brand_id: None,
        email_domain: None,
    })
}

pub fn normalize_receipt_rows(
    rows: Vec<RawReceiptRow>,
) -> Result<Vec<ReceiptEvent>, NormalizeError> {
    rows.into_iter().map(normalize_receipt_row).collect()
}

fn normalize_receipt_row(row: RawReceiptRow) -> Result<ReceiptEvent, NormalizeError> {
    let raw_email = row.email_address.as_deref().unwrap_or_default();
    let email_address = extract_email(raw_email);
    let email_domain = email_address.as_deref().and_then(email_domain);
    // derived fields stay empty unless an address was actually found
    let name_on_email = email_address
        .as_ref()
        .and_then(|_| extract_display_name(raw_email));

    Ok(ReceiptEvent {
        id: row.id,
        date: normalize_date(&row.date)?,
        brand_id: row.brand_id,
        trans_amt: row.trans_amt.as_deref().and_then(extract_amount),
        email_address,
        name_on_email,
        email_domain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn timestamps_accept_common_representations() {
        assert_eq!(
            parse_timestamp("2021-01-05T10:30:00Z").expect("rfc3339"),
            utc(2021, 1, 5, 10, 30, 0)
        );
        assert_eq!(
            parse_timestamp("2021-01-05 10:30:00").expect("naive datetime"),
            utc(2021, 1, 5, 10, 30, 0)
        );
        assert_eq!(
            parse_timestamp("2021-01-05T10:30:00").expect("naive t datetime"),
            utc(2021, 1, 5, 10, 30, 0)
        );
        assert_eq!(
            parse_timestamp("2021-01-05").expect("date only"),
            utc(2021, 1, 5, 0, 0, 0)
        );
        assert_eq!(
            parse_timestamp("2021-01-05T12:00:00+03:00").expect("offset"),
            utc(2021, 1, 5, 9, 0, 0)
        );
    }

    #[test]
    fn garbage_timestamp_is_malformed() {
        let err = parse_timestamp("soon-ish").expect_err("must fail");
        assert!(matches!(
            err,
            NormalizeError::MalformedTimestamp { value } if value == "soon-ish"
        ));
    }

    #[test]
    fn amounts_are_extracted_tolerantly() {
        assert_eq!(extract_amount("$12.50 USD"), Some(12.50));
        assert_eq!(extract_amount("total: 1,234.99"), Some(234.99));
        assert_eq!(extract_amount("N/A"), None);
        // fewer than two fraction digits never matches
        assert_eq!(extract_amount("$1.5"), None);
        assert_eq!(extract_amount(""), None);
    }

    #[test]
    fn display_names_are_best_effort() {
        assert_eq!(
            extract_display_name("Jane Doe <jane.doe@example.com>").as_deref(),
            Some("Jane Doe")
        );
        assert_eq!(extract_display_name("jane.doe@example.com"), None);
    }

    #[test]
    fn domains_come_after_the_final_at() {
        assert_eq!(
            email_domain("jane.doe@example.com").as_deref(),
            Some("example.com")
        );
        assert_eq!(
            email_domain("\"odd@local\"@example.org").as_deref(),
            Some("example.org")
        );
        assert_eq!(email_domain("postmaster@[10.0.0.1]").as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn receipt_rows_normalize_all_fields() {
        let rows = vec![RawReceiptRow {
            id: 7,
            date: "2021-01-01".to_string(),
            brand_id: Some("B1".to_string()),
            trans_amt: Some("$5.00".to_string()),
            email_address: Some("Jane Doe <jane.doe@example.com>".to_string()),
        }];

        let events = normalize_receipt_rows(rows).expect("normalize");
        let event = &events[0];
        assert_eq!(event.date, Some(utc(2021, 1, 1, 0, 0, 0)));
        assert_eq!(event.trans_amt, Some(5.00));
        assert_eq!(event.email_address.as_deref(), Some("jane.doe@example.com"));
        assert_eq!(event.email_domain.as_deref(), Some("example.com"));
        assert_eq!(event.name_on_email.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn unmatched_receipt_fields_are_no_value_not_errors() {
        let rows = vec![RawReceiptRow {
            id: 8,
            date: "2021-02-01".to_string(),
            brand_id: None,
            trans_amt: Some("N/A".to_string()),
            email_address: Some("no address here".to_string()),
        }];

        let events = normalize_receipt_rows(rows).expect("normalize");
        let event = &events[0];
        assert_eq!(event.trans_amt, None);
        assert_eq!(event.email_address, None);
        assert_eq!(event.email_domain, None);
        assert_eq!(event.name_on_email, None);
    }

    #[test]
    fn empty_date_is_missing_but_garbage_date_aborts_the_batch() {
        let ok = normalize_open_rows(vec![RawOpenRow {
            id: 1,
            date: "  ".to_string(),
            receipt_id: None,
            user_agent: None,
            page_url: None,
        }])
        .expect("empty date is tolerated");
        assert_eq!(ok[0].date, None);

        let err = normalize_open_rows(vec![
            RawOpenRow {
                id: 1,
                date: "2021-01-01".to_string(),
                receipt_id: None,
                user_agent: None,
                page_url: None,
            },
            RawOpenRow {
                id: 2,
                date: "not a date".to_string(),
                receipt_id: None,
                user_agent: None,
                page_url: None,
            },
        ])
        .expect_err("whole batch fails");
        assert!(matches!(err, NormalizeError::MalformedTimestamp { .. }));
    }
}
