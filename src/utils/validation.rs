use std::sync::LazyLock;

use mongodb::bson::oid::ObjectId;
use regex::Regex;

use crate::utils::ApiError;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex")
});

static MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").expect("month regex"));

pub fn validate_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// `YYYY-MM`
pub fn validate_month(month: &str) -> bool {
    MONTH_RE.is_match(month)
}

/// Emails are matched case-insensitively everywhere.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn parse_object_id(raw: &str, what: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid {} ID", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_emails() {
        assert!(validate_email("jane.doe@gmail.com"));
        assert!(validate_email("  ops+intake@firm.co.uk "));
    }

    #[test]
    fn rejects_malformed_emails() {
        assert!(!validate_email("jane.doe"));
        assert!(!validate_email("jane@localhost"));
        assert!(!validate_email(""));
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_email(" Jane@Gmail.COM "), "jane@gmail.com");
    }

    #[test]
    fn month_format() {
        assert!(validate_month("2026-01"));
        assert!(!validate_month("2026-13"));
        assert!(!validate_month("26-01"));
    }

    #[test]
    fn object_ids_are_checked() {
        assert!(parse_object_id("65a1b2c3d4e5f60718293a4b", "job").is_ok());
        let err = parse_object_id("not-an-id", "job").unwrap_err();
        assert_eq!(err.message, "Invalid job ID");
    }
}
