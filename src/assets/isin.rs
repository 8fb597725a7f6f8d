//! ISIN validation (ISO 6166)
//!
//! An ISIN is two ISO 3166 country letters, nine alphanumeric national
//! identifier characters and one check digit. The check digit is a Luhn
//! checksum over the base-36 expansion of the first eleven characters.

use crate::error::{Result, SecmasterError};

/// Validate an ISIN and return its compact uppercase form
///
/// Separator characters (spaces, dashes) are stripped before checking.
pub fn validate(raw: &str) -> Result<String> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if compact.len() != 12 || !compact.is_ascii() {
        return Err(SecmasterError::Integrity(format!(
            "ISIN {:?} must be 12 ASCII characters",
            raw
        )));
    }
    let bytes = compact.as_bytes();
    if !bytes[..2].iter().all(u8::is_ascii_uppercase) {
        return Err(SecmasterError::Integrity(format!(
            "ISIN {:?} must start with a two-letter country code",
            raw
        )));
    }
    if !bytes[..11].iter().all(u8::is_ascii_alphanumeric) || !bytes[11].is_ascii_digit() {
        return Err(SecmasterError::Integrity(format!(
            "ISIN {:?} has a malformed identifier or check digit",
            raw
        )));
    }
    if luhn_sum(bytes) % 10 != 0 {
        return Err(SecmasterError::Integrity(format!(
            "ISIN {:?} fails its check digit",
            raw
        )));
    }
    Ok(compact)
}

/// Whether a string is a well-formed ISIN
pub fn is_valid(raw: &str) -> bool {
    validate(raw).is_ok()
}

/// Country prefix of a compact ISIN
pub fn country_prefix(isin: &str) -> &str {
    &isin[..2.min(isin.len())]
}

fn luhn_sum(bytes: &[u8]) -> u32 {
    // Expand characters to their base-36 digit strings, then run Luhn
    // right to left, doubling alternate digits.
    let mut digits: Vec<u8> = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        if b.is_ascii_digit() {
            digits.push(b - b'0');
        } else {
            let v = b - b'A' + 10;
            digits.push(v / 10);
            digits.push(v % 10);
        }
    }
    let mut sum = 0u32;
    for (i, &d) in digits.iter().rev().enumerate() {
        let mut v = u32::from(d);
        if i % 2 == 1 {
            v *= 2;
            if v > 9 {
                v -= 9;
            }
        }
        sum += v;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_good_isins() {
        // Apple, Daimler, Treasury-style placeholders with real check digits
        assert!(is_valid("US0378331005"));
        assert!(is_valid("DE0007100000"));
        assert!(is_valid("US0000000002"));
        assert!(is_valid("GB0000000009"));
    }

    #[test]
    fn test_normalization() {
        assert_eq!(validate(" us037833100-5 ").unwrap(), "US0378331005");
    }

    #[test]
    fn test_bad_check_digit() {
        let err = validate("US0378331006").unwrap_err();
        assert!(matches!(err, SecmasterError::Integrity(_)));
        assert!(!is_valid("US0000000000"));
    }

    #[test]
    fn test_malformed() {
        assert!(!is_valid("US03783310"));
        assert!(!is_valid("0S0378331005"));
        assert!(!is_valid("US037833100X"));
        assert!(!is_valid(""));
    }

    #[test]
    fn test_country_prefix() {
        assert_eq!(country_prefix("US0378331005"), "US");
    }
}
