//! Cross-entity queries, currency conversion and derived series
//!
//! Read-only facade over the registry, catalog and store. Conversion uses
//! a directly registered forex pair in either orientation; chaining
//! through intermediate currencies is deliberately not attempted.

use std::sync::Arc;

use chrono::NaiveDate;
use log::debug;

use crate::asset::{Asset, AssetKind};
use crate::assets::catalog::AssetCatalog;
use crate::error::{Result, SecmasterError};
use crate::registry::ReferenceRegistry;
use crate::series::record::{Dividend, TradeRecord};
use crate::series::store::TimeSeriesStore;
use crate::types::{AssetId, CountryCode, CurrencyCode, EntityId, Mic, Price};

/// Which price column a series view reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceView {
    Close,
    AdjustedClose,
}

/// Which return definition a series view computes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnView {
    /// Close over previous close
    Simple,
    /// Dividend-inclusive: close plus cash gone ex, over previous close
    Total,
}

/// Read-only query surface over the whole master
pub struct QueryEngine {
    registry: Arc<ReferenceRegistry>,
    catalog: Arc<AssetCatalog>,
    store: Arc<TimeSeriesStore>,
}

impl QueryEngine {
    pub fn new(
        registry: Arc<ReferenceRegistry>,
        catalog: Arc<AssetCatalog>,
        store: Arc<TimeSeriesStore>,
    ) -> Self {
        Self {
            registry,
            catalog,
            store,
        }
    }

    /// All listed-family assets trading on the exchange with this MIC
    pub fn listed_on(&self, mic: Mic) -> Result<Vec<Asset>> {
        let exchange = self.registry.lookup_exchange(mic)?;
        Ok(self.catalog.listed_on(exchange.id))
    }

    /// All share-family assets of an issuer entity
    pub fn issued_by(&self, issuer: EntityId) -> Result<Vec<Asset>> {
        let entity = self.registry.get_institution(issuer)?;
        if !entity.is_issuer() {
            return Err(SecmasterError::TypeMismatch(format!(
                "entity {} is not an issuer",
                issuer
            )));
        }
        Ok(self.catalog.issued_by(issuer))
    }

    /// Issuer resolution by natural key, then its share-family assets
    pub fn issued_by_name(&self, name: &str, domicile: CountryCode) -> Result<Vec<Asset>> {
        let issuer = self.registry.lookup_issuer(name, domicile)?;
        Ok(self.catalog.issued_by(issuer.id))
    }

    /// The index an ETF replicates
    pub fn index_for(&self, etf: AssetId) -> Result<Asset> {
        let asset = self.catalog.retrieve(etf)?;
        let detail = asset.detail.etf().ok_or_else(|| {
            SecmasterError::TypeMismatch(format!("asset {} is a {}, not an Etf", etf, asset.kind()))
        })?;
        self.catalog.retrieve(detail.index)
    }

    /// All ETFs replicating an index asset
    pub fn etfs_on(&self, index: AssetId) -> Result<Vec<Asset>> {
        let asset = self.catalog.retrieve(index)?;
        if asset.kind() != AssetKind::Index {
            return Err(SecmasterError::TypeMismatch(format!(
                "asset {} is a {}, not an Index",
                index,
                asset.kind()
            )));
        }
        Ok(self.catalog.etfs_tracking(index))
    }

    /// The replicated index's bars over a window, resolved from an ETF
    pub fn index_range(&self, etf: AssetId, from: NaiveDate, to: NaiveDate) -> Result<Vec<TradeRecord>> {
        let index = self.index_for(etf)?;
        Ok(self.store.range(index.id, from, to))
    }

    /// Trade bars between two dates inclusive
    pub fn range(&self, asset: AssetId, from: NaiveDate, to: NaiveDate) -> Vec<TradeRecord> {
        self.store.range(asset, from, to)
    }

    /// Latest bar on or before a date
    pub fn as_of(&self, asset: AssetId, date: NaiveDate) -> Result<TradeRecord> {
        self.store.as_of(asset, date)
    }

    /// Dividends with ex-dates between two dates inclusive
    pub fn dividends(&self, asset: AssetId, from: NaiveDate, to: NaiveDate) -> Vec<Dividend> {
        self.store.dividends(asset, from, to)
    }

    /// Exchange rate from one currency into another on a date
    ///
    /// Uses the directly registered pair in either orientation, with the
    /// rate forward-filled from the latest fix on or before `date`. No
    /// multi-hop chaining.
    pub fn rate(&self, from: CurrencyCode, to: CurrencyCode, date: NaiveDate) -> Result<f64> {
        if from == to {
            return Ok(1.0);
        }
        let direct = self.catalog.find_pair(from, to);
        let inverse = self.catalog.find_pair(to, from);
        if direct.is_err() && inverse.is_err() {
            return Err(SecmasterError::NoConversionPath {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        if let Ok(pair) = direct {
            match self.store.as_of(pair.id, date) {
                Ok(bar) => {
                    debug!("Rate {}{} on {} = {}", from, to, date, bar.close);
                    return Ok(bar.close);
                }
                Err(SecmasterError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if let Ok(pair) = inverse {
            match self.store.as_of(pair.id, date) {
                Ok(bar) if bar.close > 0.0 => {
                    debug!("Rate {}{} on {} = 1/{}", from, to, date, bar.close);
                    return Ok(1.0 / bar.close);
                }
                Ok(bar) => {
                    return Err(SecmasterError::ConsistencyFault(format!(
                        "pair {} stored a non-positive rate {}",
                        pair.id, bar.close
                    )))
                }
                Err(SecmasterError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Err(SecmasterError::NotFound(format!(
            "no {}{} rate on or before {}",
            from, to, date
        )))
    }

    /// Convert an amount between currencies on a date
    pub fn convert(&self, amount: f64, from: CurrencyCode, to: CurrencyCode, date: NaiveDate) -> Result<f64> {
        Ok(amount * self.rate(from, to, date)?)
    }

    /// An asset's close on a date, expressed in a target currency
    ///
    /// Cash-family assets are worth one unit of their currency by
    /// definition; everything else reads the latest close on or before
    /// the date.
    pub fn close_in(&self, asset: AssetId, date: NaiveDate, target: CurrencyCode) -> Result<Price> {
        let asset = self.catalog.retrieve(asset)?;
        let value = if asset.kind().is_cash_like() {
            1.0
        } else {
            self.store.as_of(asset.id, date)?.close
        };
        self.convert(value, asset.currency, target, date)
    }

    /// One price column over a window
    pub fn price_series(
        &self,
        asset: AssetId,
        from: NaiveDate,
        to: NaiveDate,
        view: PriceView,
    ) -> Vec<(NaiveDate, Price)> {
        self.store
            .range(asset, from, to)
            .iter()
            .map(|r| {
                let price = match view {
                    PriceView::Close => r.close,
                    PriceView::AdjustedClose => r.adjusted_close,
                };
                (r.date, price)
            })
            .collect()
    }

    /// Per-bar returns over a window, dated at the later bar of each pair
    ///
    /// The total view folds in dividends that went ex after the previous
    /// bar and up to the current one, so cash paid across a gap is not
    /// lost.
    pub fn return_series(
        &self,
        asset: AssetId,
        from: NaiveDate,
        to: NaiveDate,
        view: ReturnView,
    ) -> Vec<(NaiveDate, f64)> {
        let rows = self.store.range(asset, from, to);
        let mut out = Vec::with_capacity(rows.len().saturating_sub(1));
        for pair in rows.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            let cash = match view {
                ReturnView::Simple => 0.0,
                ReturnView::Total => self
                    .store
                    .dividends(asset, prev.date.succ_opt().unwrap_or(cur.date), cur.date)
                    .iter()
                    .map(|d| d.amount)
                    .sum(),
            };
            out.push((cur.date, (cur.close + cash) / prev.close - 1.0));
        }
        out
    }

    /// An ETF's bars with the replicated index filling the span before
    /// the fund's first own bar. Own data always wins.
    pub fn etf_backfilled_range(
        &self,
        etf: AssetId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TradeRecord>> {
        let index = self.index_for(etf)?;
        let own = self.store.range(etf, from, to);
        let cutoff = self.store.first_date(etf);

        let mut out: Vec<TradeRecord> = self
            .store
            .range(index.id, from, to)
            .into_iter()
            .filter(|r| cutoff.map_or(true, |first| r.date < first))
            .collect();
        out.extend(own);
        Ok(out)
    }
}
