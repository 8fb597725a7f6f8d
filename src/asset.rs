//! Asset taxonomy
//!
//! A closed set of asset kinds with per-kind attribute payloads. The old
//! subtype ladder (share, listed share, listed equity, fund) collapses
//! into one tagged union; code that needs kind-specific data matches on
//! the payload in one place instead of downcasting.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{AssetId, CurrencyCode, EntityId, QuoteUnits};

/// Kind tag for every asset the master can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    /// Money itself; worth exactly one unit of its currency
    Cash,
    /// Cash held against a custody account
    CashAccount,
    /// Cash earmarked for trade settlement
    SettlementAccount,
    /// A currency pair, base priced in the asset's currency
    Forex,
    /// A published index; carries no owner
    Index,
    /// An unlisted share of an issuer
    Share,
    /// A share listed on an exchange
    Listed,
    /// A listed common equity, dividend bearing
    ListedEquity,
    /// An exchange-traded fund replicating an index
    Etf,
}

impl AssetKind {
    /// Whether this kind may carry dividend records
    pub fn bears_dividends(&self) -> bool {
        matches!(self, AssetKind::ListedEquity | AssetKind::Etf)
    }

    /// Whether this kind is money rather than a priced instrument
    pub fn is_cash_like(&self) -> bool {
        matches!(
            self,
            AssetKind::Cash | AssetKind::CashAccount | AssetKind::SettlementAccount
        )
    }

    /// Whether this kind belongs to the share family
    pub fn is_share_family(&self) -> bool {
        matches!(
            self,
            AssetKind::Share | AssetKind::Listed | AssetKind::ListedEquity | AssetKind::Etf
        )
    }

    /// Whether this kind trades on an exchange
    pub fn is_listed_family(&self) -> bool {
        matches!(
            self,
            AssetKind::Listed | AssetKind::ListedEquity | AssetKind::Etf
        )
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetKind::Cash => "Cash",
            AssetKind::CashAccount => "CashAccount",
            AssetKind::SettlementAccount => "SettlementAccount",
            AssetKind::Forex => "Forex",
            AssetKind::Index => "Index",
            AssetKind::Share => "Share",
            AssetKind::Listed => "Listed",
            AssetKind::ListedEquity => "ListedEquity",
            AssetKind::Etf => "Etf",
        };
        f.write_str(s)
    }
}

/// Currency pair attributes; the quote leg is the asset's pricing currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForexDetail {
    pub base: CurrencyCode,
}

impl ForexDetail {
    /// Conventional pair ticker, e.g. `USDJPY` for USD priced in JPY
    pub fn pair_ticker(&self, quote: CurrencyCode) -> String {
        format!("{}{}", self.base, quote)
    }
}

/// Index attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDetail {
    pub ticker: String,
    /// True when the published level reinvests distributions
    pub total_return: bool,
}

/// Share attributes common to the whole share family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareDetail {
    pub issuer: EntityId,
    pub shares_in_issue: Option<u64>,
    /// Whether the share distributes earnings to holders
    pub distributions: bool,
}

/// Listing attributes layered on top of share attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedDetail {
    pub share: ShareDetail,
    pub ticker: String,
    /// ISO 6166 identifier, validated on creation
    pub isin: String,
    pub exchange: EntityId,
}

/// Exchange-traded fund attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtfDetail {
    pub listed: ListedDetail,
    /// The index the fund replicates
    pub index: AssetId,
    /// Total expense ratio, as a fraction per year
    pub ter: Option<f64>,
}

/// Kind-specific payload of an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssetDetail {
    Cash,
    CashAccount,
    SettlementAccount,
    Forex(ForexDetail),
    Index(IndexDetail),
    Share(ShareDetail),
    Listed(ListedDetail),
    ListedEquity(ListedDetail),
    Etf(EtfDetail),
}

impl AssetDetail {
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetDetail::Cash => AssetKind::Cash,
            AssetDetail::CashAccount => AssetKind::CashAccount,
            AssetDetail::SettlementAccount => AssetKind::SettlementAccount,
            AssetDetail::Forex(_) => AssetKind::Forex,
            AssetDetail::Index(_) => AssetKind::Index,
            AssetDetail::Share(_) => AssetKind::Share,
            AssetDetail::Listed(_) => AssetKind::Listed,
            AssetDetail::ListedEquity(_) => AssetKind::ListedEquity,
            AssetDetail::Etf(_) => AssetKind::Etf,
        }
    }

    /// Share attributes, for any member of the share family
    pub fn share(&self) -> Option<&ShareDetail> {
        match self {
            AssetDetail::Share(s) => Some(s),
            AssetDetail::Listed(l) | AssetDetail::ListedEquity(l) => Some(&l.share),
            AssetDetail::Etf(e) => Some(&e.listed.share),
            _ => None,
        }
    }

    /// Listing attributes, for any listed-family member
    pub fn listing(&self) -> Option<&ListedDetail> {
        match self {
            AssetDetail::Listed(l) | AssetDetail::ListedEquity(l) => Some(l),
            AssetDetail::Etf(e) => Some(&e.listed),
            _ => None,
        }
    }

    pub fn forex(&self) -> Option<&ForexDetail> {
        match self {
            AssetDetail::Forex(f) => Some(f),
            _ => None,
        }
    }

    pub fn index(&self) -> Option<&IndexDetail> {
        match self {
            AssetDetail::Index(i) => Some(i),
            _ => None,
        }
    }

    pub fn etf(&self) -> Option<&EtfDetail> {
        match self {
            AssetDetail::Etf(e) => Some(e),
            _ => None,
        }
    }
}

/// Lifecycle state of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetStatus {
    Active,
    /// Delisted or otherwise retired; history stays readable
    Closed,
}

/// Asset representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Unique asset identifier
    pub id: AssetId,
    /// Descriptive name
    pub name: String,
    /// Currency prices are expressed in
    pub currency: CurrencyCode,
    /// Owning entity; `None` only for indices
    pub owner: Option<EntityId>,
    /// Vendor quote convention for this asset's prices
    pub quote_units: QuoteUnits,
    pub status: AssetStatus,
    pub detail: AssetDetail,
}

impl Asset {
    pub fn new(
        id: AssetId,
        name: &str,
        currency: CurrencyCode,
        owner: Option<EntityId>,
        detail: AssetDetail,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            currency,
            owner,
            quote_units: QuoteUnits::default(),
            status: AssetStatus::Active,
            detail,
        }
    }

    pub fn with_quote_units(mut self, units: QuoteUnits) -> Self {
        self.quote_units = units;
        self
    }

    pub fn kind(&self) -> AssetKind {
        self.detail.kind()
    }

    pub fn is_active(&self) -> bool {
        self.status == AssetStatus::Active
    }

    /// Ticker for display: listing ticker, index ticker or forex pair
    pub fn ticker(&self) -> Option<String> {
        match &self.detail {
            AssetDetail::Forex(fx) => Some(fx.pair_ticker(self.currency)),
            AssetDetail::Index(ix) => Some(ix.ticker.clone()),
            _ => self.detail.listing().map(|l| l.ticker.clone()),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ticker() {
            Some(t) => write!(f, "{}({}, {})", self.kind(), t, self.currency),
            None => write!(f, "{}({}, {})", self.kind(), self.name, self.currency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ccy(code: &str) -> CurrencyCode {
        CurrencyCode::new(code).unwrap()
    }

    fn listed_detail() -> ListedDetail {
        ListedDetail {
            share: ShareDetail {
                issuer: 7,
                shares_in_issue: Some(1_000_000),
                distributions: true,
            },
            ticker: "ACME".to_string(),
            isin: "US0000000001".to_string(),
            exchange: 8,
        }
    }

    #[test]
    fn test_kind_predicates() {
        assert!(AssetKind::ListedEquity.bears_dividends());
        assert!(AssetKind::Etf.bears_dividends());
        assert!(!AssetKind::Listed.bears_dividends());
        assert!(AssetKind::SettlementAccount.is_cash_like());
        assert!(AssetKind::Etf.is_share_family());
        assert!(!AssetKind::Index.is_listed_family());
    }

    #[test]
    fn test_detail_accessors() {
        let equity = AssetDetail::ListedEquity(listed_detail());
        assert_eq!(equity.kind(), AssetKind::ListedEquity);
        assert_eq!(equity.share().unwrap().issuer, 7);
        assert_eq!(equity.listing().unwrap().exchange, 8);
        assert!(equity.forex().is_none());

        let etf = AssetDetail::Etf(EtfDetail {
            listed: listed_detail(),
            index: 42,
            ter: Some(0.002),
        });
        assert_eq!(etf.share().unwrap().issuer, 7);
        assert_eq!(etf.etf().unwrap().index, 42);
    }

    #[test]
    fn test_forex_pair_ticker() {
        let fx = ForexDetail { base: ccy("USD") };
        assert_eq!(fx.pair_ticker(ccy("JPY")), "USDJPY");
    }

    #[test]
    fn test_asset_display_uses_ticker() {
        let asset = Asset::new(
            1,
            "ACME Common Stock",
            ccy("USD"),
            Some(7),
            AssetDetail::ListedEquity(listed_detail()),
        );
        assert!(asset.is_active());
        assert_eq!(asset.to_string(), "ListedEquity(ACME, USD)");
        assert_eq!(asset.ticker().unwrap(), "ACME");
    }
}
