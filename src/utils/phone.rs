//! Recipient normalization: phone numbers and JIDs to WhatsApp addresses.

use serde::Serialize;

use crate::error::{GateError, Result};

/// Server suffix for individual accounts.
pub const USER_SERVER: &str = "s.whatsapp.net";
/// Server suffix for groups.
pub const GROUP_SERVER: &str = "g.us";

const MIN_DIGITS: usize = 8;
const MAX_DIGITS: usize = 15;
/// Numbers this short are treated as national and get the default country code.
const NATIONAL_MAX_DIGITS: usize = 11;

/// A normalized message target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    /// Digits only for users; the group id (digits and `-`) for groups.
    pub number: String,
    /// Full WhatsApp JID, e.g. `5511999999999@s.whatsapp.net`.
    pub jid: String,
}

impl Recipient {
    pub fn is_group(&self) -> bool {
        self.jid.ends_with(GROUP_SERVER)
    }
}

/// Normalize `raw` into a [`Recipient`].
///
/// Group JIDs (`...@g.us`) pass through. Everything else is reduced to its
/// digits and a leading `00` international prefix is stripped.
/// `default_country_code` is prefixed to national-length numbers that don't
/// already carry it. Input written as `+...`, `00...` or a JID is already
/// international and never gets the default code.
pub fn normalize_number(raw: &str, default_country_code: Option<&str>) -> Result<Recipient> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GateError::InvalidNumber("number is empty".to_string()));
    }

    let (user_part, from_jid) = match trimmed.split_once('@') {
        Some((user, server)) if server.eq_ignore_ascii_case(GROUP_SERVER) => {
            return group_recipient(trimmed, user);
        }
        Some((user, _)) => (user, true),
        None => (trimmed, false),
    };
    let international = from_jid || user_part.starts_with('+') || user_part.starts_with("00");

    let mut digits: String = user_part.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(rest) = digits.strip_prefix("00") {
        digits = rest.to_string();
    }

    if let Some(code) = default_country_code.filter(|c| !c.is_empty() && !international) {
        if !digits.is_empty() && digits.len() <= NATIONAL_MAX_DIGITS && !digits.starts_with(code)
        {
            digits = format!("{}{}", code, digits);
        }
    }

    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
        return Err(GateError::InvalidNumber(format!(
            "'{}' must contain {}-{} digits including the country code",
            trimmed, MIN_DIGITS, MAX_DIGITS
        )));
    }

    Ok(Recipient {
        jid: format!("{}@{}", digits, USER_SERVER),
        number: digits,
    })
}

fn group_recipient(raw: &str, user: &str) -> Result<Recipient> {
    let valid = !user.is_empty()
        && user.chars().all(|c| c.is_ascii_digit() || c == '-')
        && user.chars().any(|c| c.is_ascii_digit());
    if !valid {
        return Err(GateError::InvalidNumber(format!(
            "'{}' is not a valid group id",
            raw
        )));
    }
    Ok(Recipient {
        number: user.to_string(),
        jid: format!("{}@{}", user, GROUP_SERVER),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_digits() {
        let r = normalize_number("5511999998888", None).unwrap();
        assert_eq!(r.number, "5511999998888");
        assert_eq!(r.jid, "5511999998888@s.whatsapp.net");
        assert!(!r.is_group());
    }

    #[test]
    fn test_formatting_is_stripped() {
        let r = normalize_number(" +55 (11) 99999-8888 ", None).unwrap();
        assert_eq!(r.number, "5511999998888");

        let r = normalize_number("1.202.555.0143", None).unwrap();
        assert_eq!(r.number, "12025550143");
    }

    #[test]
    fn test_international_prefix_stripped() {
        let r = normalize_number("00447911123456", None).unwrap();
        assert_eq!(r.number, "447911123456");
    }

    #[test]
    fn test_jid_suffix_stripped() {
        let r = normalize_number("5511999998888@c.us", None).unwrap();
        assert_eq!(r.jid, "5511999998888@s.whatsapp.net");

        let r = normalize_number("5511999998888@s.whatsapp.net", None).unwrap();
        assert_eq!(r.number, "5511999998888");
    }

    #[test]
    fn test_group_jid_kept() {
        let r = normalize_number("120363025246125486@g.us", None).unwrap();
        assert!(r.is_group());
        assert_eq!(r.jid, "120363025246125486@g.us");

        let r = normalize_number("5511999998888-1617293841@g.us", Some("55")).unwrap();
        assert_eq!(r.number, "5511999998888-1617293841");
    }

    #[test]
    fn test_invalid_group_id() {
        assert!(normalize_number("family@g.us", None).is_err());
        assert!(normalize_number("@g.us", None).is_err());
        assert!(normalize_number("---@g.us", None).is_err());
    }

    #[test]
    fn test_default_country_code_applied_to_national_numbers() {
        let r = normalize_number("(11) 99999-8888", Some("55")).unwrap();
        assert_eq!(r.number, "5511999998888");
    }

    #[test]
    fn test_default_country_code_not_duplicated() {
        let r = normalize_number("5511999998888", Some("55")).unwrap();
        assert_eq!(r.number, "5511999998888");

        // Already long enough to be international
        let r = normalize_number("447911123456", Some("55")).unwrap();
        assert_eq!(r.number, "447911123456");
    }

    #[test]
    fn test_explicit_international_prefix_skips_default_country_code() {
        let cases = [
            ("+1 202 555 0143", "12025550143"),
            ("0012025550143", "12025550143"),
            ("+44 7911 123456", "447911123456"),
            ("12025550143@s.whatsapp.net", "12025550143"),
            ("12025550143@c.us", "12025550143"),
        ];
        for (input, expected) in cases {
            let r = normalize_number(input, Some("55")).unwrap();
            assert_eq!(r.number, expected, "input: {}", input);
        }

        // Bare national digits still get the code
        let r = normalize_number("12025550143", Some("55")).unwrap();
        assert_eq!(r.number, "5512025550143");
    }

    #[test]
    fn test_empty_and_non_numeric_rejected() {
        assert!(matches!(
            normalize_number("   ", None),
            Err(GateError::InvalidNumber(_))
        ));
        assert!(matches!(
            normalize_number("not-a-number", None),
            Err(GateError::InvalidNumber(_))
        ));
        // Country code alone is not a number
        assert!(normalize_number("abc", Some("55")).is_err());
    }

    #[test]
    fn test_length_bounds() {
        assert!(normalize_number("1234567", None).is_err());
        assert!(normalize_number("12345678", None).is_ok());
        assert!(normalize_number("123456789012345", None).is_ok());
        assert!(normalize_number("1234567890123456", None).is_err());
    }

    #[test]
    fn test_error_names_original_input() {
        let err = normalize_number("+1 23", None).unwrap_err();
        assert!(err.to_string().contains("+1 23"));
    }
}
