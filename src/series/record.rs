//! Time-series record types
//!
//! One record per (asset, date, series kind). Trade records are tagged so
//! a bar can only attach to the matching asset kind; the mapping lives
//! here and the store enforces it.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::asset::AssetKind;
use crate::types::{CurrencyCode, Price, Quantity, QuoteUnits};

/// Kind tag for an EOD series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeriesKind {
    /// Exchange trade bars for the listed family
    ListedTrade,
    /// Currency pair rates
    ForexTrade,
    /// Published index levels
    IndexTrade,
    /// Cash distributions
    Dividend,
}

impl SeriesKind {
    /// The trade series an asset kind reports, if any
    ///
    /// Cash kinds are worth one unit by definition and unlisted shares do
    /// not trade, so neither carries a trade series.
    pub fn trade_kind_for(kind: AssetKind) -> Option<SeriesKind> {
        match kind {
            AssetKind::Listed | AssetKind::ListedEquity | AssetKind::Etf => {
                Some(SeriesKind::ListedTrade)
            }
            AssetKind::Forex => Some(SeriesKind::ForexTrade),
            AssetKind::Index => Some(SeriesKind::IndexTrade),
            AssetKind::Cash
            | AssetKind::CashAccount
            | AssetKind::SettlementAccount
            | AssetKind::Share => None,
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SeriesKind::ListedTrade => "ListedTrade",
            SeriesKind::ForexTrade => "ForexTrade",
            SeriesKind::IndexTrade => "IndexTrade",
            SeriesKind::Dividend => "Dividend",
        };
        f.write_str(s)
    }
}

/// EOD trade bar
///
/// `close` is the raw settled price and is never rewritten;
/// `adjusted_close` starts equal to it and is owned by the adjustment
/// engine from then on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub adjusted_close: Price,
    pub volume: Quantity,
}

impl TradeRecord {
    /// Create a bar with `adjusted_close` seeded from the close
    pub fn new(
        date: NaiveDate,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Quantity,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            adjusted_close: close,
            volume,
        }
    }

    /// Flat bar at a single price, volume zero. Index levels and forex
    /// fixes arrive this way.
    pub fn flat(date: NaiveDate, level: Price) -> Self {
        Self::new(date, level, level, level, level, 0.0)
    }

    pub fn with_adjusted_close(mut self, adjusted_close: Price) -> Self {
        self.adjusted_close = adjusted_close;
        self
    }

    /// Check OHLC coherence and positivity
    pub fn is_valid(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close, self.adjusted_close];
        prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
            && self.volume.is_finite()
    }

    /// Rescale a vendor quote to whole currency units
    pub fn normalized(mut self, units: QuoteUnits) -> Self {
        self.open = units.to_units(self.open);
        self.high = units.to_units(self.high);
        self.low = units.to_units(self.low);
        self.close = units.to_units(self.close);
        self.adjusted_close = units.to_units(self.adjusted_close);
        self
    }
}

/// Cash distribution record, keyed by ex-date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    /// First date a buyer is no longer entitled to the distribution
    pub ex_date: NaiveDate,
    /// Cash per share in the asset's pricing currency
    pub amount: Price,
    /// Declared payment currency when it differs from the pricing currency
    pub currency: Option<CurrencyCode>,
    pub declaration_date: Option<NaiveDate>,
    pub record_date: Option<NaiveDate>,
    pub payment_date: Option<NaiveDate>,
    /// Set by the adjustment engine once folded into adjusted closes
    pub applied: bool,
}

impl Dividend {
    pub fn new(ex_date: NaiveDate, amount: Price) -> Self {
        Self {
            ex_date,
            amount,
            currency: None,
            declaration_date: None,
            record_date: None,
            payment_date: None,
            applied: false,
        }
    }

    pub fn with_currency(mut self, currency: CurrencyCode) -> Self {
        self.currency = Some(currency);
        self
    }

    pub fn with_dates(
        mut self,
        declaration: Option<NaiveDate>,
        record: Option<NaiveDate>,
        payment: Option<NaiveDate>,
    ) -> Self {
        self.declaration_date = declaration;
        self.record_date = record;
        self.payment_date = payment;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.amount.is_finite() && self.amount > 0.0
    }

    /// Rescale a vendor quote to whole currency units
    pub fn normalized(mut self, units: QuoteUnits) -> Self {
        self.amount = units.to_units(self.amount);
        self
    }
}
