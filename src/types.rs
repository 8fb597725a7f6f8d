//! Core identifier and value types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SecmasterError};

/// Unique identifier for reference-registry entities (issuers, exchanges)
pub type EntityId = u64;

/// Unique identifier for assets
pub type AssetId = u64;

/// Price type
pub type Price = f64;

/// Quantity/volume type
pub type Quantity = f64;

fn code_bytes<const N: usize>(s: &str, what: &str) -> Result<[u8; N]> {
    let raw = s.trim();
    if raw.len() != N || !raw.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(SecmasterError::InvalidData(format!(
            "{} must be {} ASCII letters, got {:?}",
            what, N, s
        )));
    }
    let mut out = [0u8; N];
    for (i, b) in raw.bytes().enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    Ok(out)
}

/// ISO 4217 three-letter currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    pub fn new(code: &str) -> Result<Self> {
        Ok(Self(code_bytes(code, "currency code")?))
    }

    pub fn as_str(&self) -> &str {
        // Bytes are validated ASCII on construction.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = SecmasterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = SecmasterError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

impl From<CurrencyCode> for String {
    fn from(c: CurrencyCode) -> String {
        c.as_str().to_string()
    }
}

/// ISO 3166 alpha-2 country code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    pub fn new(code: &str) -> Result<Self> {
        Ok(Self(code_bytes(code, "country code")?))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountryCode {
    type Err = SecmasterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = SecmasterError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

impl From<CountryCode> for String {
    fn from(c: CountryCode) -> String {
        c.as_str().to_string()
    }
}

/// ISO 10383 market identifier code (four alphanumeric characters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mic([u8; 4]);

impl Mic {
    pub fn new(code: &str) -> Result<Self> {
        let raw = code.trim();
        if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(SecmasterError::InvalidData(format!(
                "MIC must be 4 ASCII alphanumerics, got {:?}",
                code
            )));
        }
        let mut out = [0u8; 4];
        for (i, b) in raw.bytes().enumerate() {
            out[i] = b.to_ascii_uppercase();
        }
        Ok(Self(out))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for Mic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mic {
    type Err = SecmasterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Mic {
    type Error = SecmasterError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

impl From<Mic> for String {
    fn from(m: Mic) -> String {
        m.as_str().to_string()
    }
}

/// Units a vendor quotes prices in. The store always holds whole
/// currency units; cent quotes are normalized on ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteUnits {
    Units,
    Cents,
}

impl QuoteUnits {
    /// Convert a vendor-quoted price to whole currency units
    pub fn to_units(&self, price: Price) -> Price {
        match self {
            QuoteUnits::Units => price,
            QuoteUnits::Cents => price / 100.0,
        }
    }
}

impl Default for QuoteUnits {
    fn default() -> Self {
        QuoteUnits::Units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_code_parse() {
        let usd = CurrencyCode::new("usd").unwrap();
        assert_eq!(usd.as_str(), "USD");
        assert_eq!(usd, "USD".parse().unwrap());
        assert!(CurrencyCode::new("US").is_err());
        assert!(CurrencyCode::new("U5D").is_err());
    }

    #[test]
    fn test_country_code_parse() {
        let us = CountryCode::new("us").unwrap();
        assert_eq!(us.to_string(), "US");
        assert!(CountryCode::new("USA").is_err());
    }

    #[test]
    fn test_mic_parse() {
        let xnys = Mic::new("xnys").unwrap();
        assert_eq!(xnys.as_str(), "XNYS");
        // Some segment MICs carry digits
        assert!(Mic::new("X1Y2").is_ok());
        assert!(Mic::new("XN").is_err());
    }

    #[test]
    fn test_quote_units() {
        assert_eq!(QuoteUnits::Units.to_units(123.5), 123.5);
        assert_eq!(QuoteUnits::Cents.to_units(12350.0), 123.5);
    }
}
