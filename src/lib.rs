//! # Secmaster
//!
//! A securities master: reference data and end-of-day time series for
//! financial instruments, kept consistent under concurrent use.
//!
//! The master is built from five cooperating parts: a reference
//! registry (currencies, domiciles, issuers and exchanges), an asset
//! catalog over a closed taxonomy of instrument kinds, a per-asset EOD
//! time-series store, a dividend adjustment engine maintaining
//! adjusted closes, and a query engine for cross-entity lookups and
//! currency conversion.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use secmaster::prelude::*;
//! use secmaster::seed;
//!
//! fn main() -> Result<()> {
//!     let master = SecuritiesMaster::new();
//!     seed::seed_registry(&master)?;
//!
//!     let us = CountryCode::new("US")?;
//!     let issuer = master.upsert_issuer("ACME Industries", us, None)?;
//!     let exchange = master.upsert_exchange(Mic::new("XNYS")?, "New York Stock Exchange", us)?;
//!     let acme = master.create_asset(AssetSpec::listed_equity(
//!         "ACME Industries",
//!         CurrencyCode::new("USD")?,
//!         issuer,
//!         exchange,
//!         "ACME",
//!         "US0000000002",
//!     ))?;
//!
//!     let date = NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date");
//!     master.append_trade(acme, TradeRecord::new(date, 99.5, 101.0, 99.0, 100.0, 10_000.0))?;
//!
//!     let latest = master.query().as_of(acme, date)?;
//!     println!("ACME close {} adjusted {}", latest.close, latest.adjusted_close);
//!     Ok(())
//! }
//! ```

pub mod asset;
pub mod assets;
pub mod audit;
pub mod error;
pub mod master;
#[cfg(feature = "rusqlite-support")]
pub mod persist;
pub mod query;
pub mod registry;
pub mod seed;
pub mod series;
pub mod types;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::asset::{Asset, AssetDetail, AssetKind, AssetStatus};
    pub use crate::assets::{AssetCatalog, AssetSpec};
    pub use crate::audit::{AuditEvent, AuditSink, LogSink, MemorySink};
    pub use crate::error::{Result, SecmasterError};
    pub use crate::master::SecuritiesMaster;
    pub use crate::query::{PriceView, QueryEngine, ReturnView};
    pub use crate::registry::ReferenceRegistry;
    pub use crate::series::{AdjustmentReport, Dividend, SeriesKind, TimeSeriesStore, TradeRecord};
    pub use crate::types::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lib_smoke() {
        let master = master::SecuritiesMaster::default();
        assert_eq!(master.catalog().asset_count(), 0);
        assert_eq!(master.registry().currency_count(), 0);
    }
}
