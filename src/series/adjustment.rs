//! Dividend back-adjustment
//!
//! On a dividend with ex-date D and amount A, the factor
//! `f = (C - A) / C` is taken from the unadjusted close C immediately
//! preceding D, and every `adjusted_close` strictly before D is
//! multiplied by f. Raw closes are never touched. Factors from separate
//! dividends compound, and because each factor is computed from raw
//! closes the result is independent of application order.
//!
//! A dividend whose preceding close has not arrived yet stays pending and
//! is retried on every later trade append for the asset. Each dividend is
//! folded in exactly once; the applied marker makes reprocessing a no-op.

use std::sync::Arc;

use log::{info, warn};
use rayon::prelude::*;

use chrono::NaiveDate;

use crate::asset::Asset;
use crate::error::{Result, SecmasterError};
use crate::series::record::{Dividend, TradeRecord};
use crate::series::store::TimeSeriesStore;
use crate::types::AssetId;

/// Outcome counts of an adjustment pass over one asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustmentReport {
    /// Dividends folded into adjusted closes during this pass
    pub applied: usize,
    /// Dividends still waiting for their preceding close
    pub deferred: usize,
}

impl AdjustmentReport {
    pub fn is_clean(&self) -> bool {
        self.deferred == 0
    }
}

/// Applies dividend adjustments against the store
///
/// The engine is the only sanctioned writer of settled rows, and it
/// rewrites `adjusted_close` only. It holds the asset's dividend and
/// trade locks for the whole rewrite, so readers see a series entirely
/// before or entirely after an adjustment.
pub struct AdjustmentEngine {
    store: Arc<TimeSeriesStore>,
}

impl AdjustmentEngine {
    pub fn new(store: Arc<TimeSeriesStore>) -> Self {
        Self { store }
    }

    /// Fold all unapplied dividends of an asset into its adjusted closes
    ///
    /// Dividends are visited oldest ex-date first. A dividend without a
    /// preceding close is left pending rather than failed; later
    /// dividends are still processed since their factors are independent.
    pub fn apply_pending(&self, asset: &Asset) -> Result<AdjustmentReport> {
        if !asset.kind().bears_dividends() {
            return Ok(AdjustmentReport::default());
        }
        let Some(div_cell) = self.store.dividend_cell_for(asset.id) else {
            return Ok(AdjustmentReport::default());
        };
        let trade_cell = self.store.trade_cell_for(asset.id);

        let mut dividends = div_cell.write().unwrap();
        match trade_cell {
            Some(cell) => {
                let mut rows = cell.write().unwrap();
                Self::fold_unapplied(asset.id, &mut rows, &mut dividends)
            }
            None => {
                let pending = dividends.iter().filter(|d| !d.applied).count();
                if pending > 0 {
                    warn!(
                        "Asset {} has {} dividends pending with no trade series",
                        asset.id, pending
                    );
                }
                Ok(AdjustmentReport {
                    applied: 0,
                    deferred: pending,
                })
            }
        }
    }

    /// Hook for a freshly appended dividend
    pub fn on_dividend(&self, asset: &Asset) -> Result<AdjustmentReport> {
        self.apply_pending(asset)
    }

    /// Hook for a freshly appended trade bar: retries pending dividends,
    /// which a backfilled bar may have unblocked
    pub fn on_trade(&self, asset: &Asset) -> Result<AdjustmentReport> {
        if !asset.kind().bears_dividends() || self.pending_count(asset.id) == 0 {
            return Ok(AdjustmentReport::default());
        }
        self.apply_pending(asset)
    }

    /// Apply one dividend by ex-date, strictly
    ///
    /// Returns the factor, or `None` when the dividend was already
    /// applied. Unlike [`apply_pending`](Self::apply_pending) a missing
    /// preceding close is an error here rather than a deferral.
    pub fn apply_dividend(&self, asset: &Asset, ex_date: NaiveDate) -> Result<Option<f64>> {
        let div_cell = self.store.dividend_cell_for(asset.id).ok_or_else(|| {
            SecmasterError::NotFound(format!("no dividend series for asset {}", asset.id))
        })?;
        let trade_cell = self.store.trade_cell_for(asset.id);

        let mut dividends = div_cell.write().unwrap();
        let idx = dividends
            .binary_search_by_key(&ex_date, |d| d.ex_date)
            .map_err(|_| {
                SecmasterError::NotFound(format!(
                    "no dividend for asset {} ex {}",
                    asset.id, ex_date
                ))
            })?;
        if dividends[idx].applied {
            return Ok(None);
        }
        let cell = trade_cell.ok_or(SecmasterError::MissingClose {
            asset: asset.id,
            date: ex_date,
        })?;
        let mut rows = cell.write().unwrap();
        let factor = Self::fold_one(asset.id, &mut rows, &dividends[idx])?;
        dividends[idx].applied = true;
        info!(
            "Applied dividend for asset {} ex {} factor {:.6}",
            asset.id, ex_date, factor
        );
        Ok(Some(factor))
    }

    /// Rebuild adjusted closes from scratch: reset to raw closes, unmark
    /// every dividend and fold them back in oldest first
    ///
    /// This is the recovery path after bulk backfills or unsettled-row
    /// revisions near an ex-date.
    pub fn recompute(&self, asset: &Asset) -> Result<AdjustmentReport> {
        if !asset.kind().bears_dividends() {
            return Ok(AdjustmentReport::default());
        }
        let Some(div_cell) = self.store.dividend_cell_for(asset.id) else {
            return Ok(AdjustmentReport::default());
        };
        let mut dividends = div_cell.write().unwrap();
        match self.store.trade_cell_for(asset.id) {
            Some(cell) => {
                let mut rows = cell.write().unwrap();
                for row in rows.iter_mut() {
                    row.adjusted_close = row.close;
                }
                for dividend in dividends.iter_mut() {
                    dividend.applied = false;
                }
                Self::fold_unapplied(asset.id, &mut rows, &mut dividends)
            }
            None => {
                for dividend in dividends.iter_mut() {
                    dividend.applied = false;
                }
                Ok(AdjustmentReport {
                    applied: 0,
                    deferred: dividends.len(),
                })
            }
        }
    }

    /// Recompute every dividend-bearing asset in the slice, in parallel
    pub fn recompute_all(&self, assets: &[Asset]) -> Result<AdjustmentReport> {
        let reports: Vec<AdjustmentReport> = assets
            .par_iter()
            .filter(|a| a.kind().bears_dividends())
            .map(|asset| self.recompute(asset))
            .collect::<Result<_>>()?;
        let total = reports.iter().fold(AdjustmentReport::default(), |acc, r| {
            AdjustmentReport {
                applied: acc.applied + r.applied,
                deferred: acc.deferred + r.deferred,
            }
        });
        info!(
            "Recomputed adjustments across {} assets: {} applied, {} deferred",
            assets.len(),
            total.applied,
            total.deferred
        );
        Ok(total)
    }

    /// Dividends recorded but not yet folded in
    pub fn pending_count(&self, asset: AssetId) -> usize {
        self.store
            .dividend_cell_for(asset)
            .map(|c| c.read().unwrap().iter().filter(|d| !d.applied).count())
            .unwrap_or(0)
    }

    fn fold_unapplied(
        asset: AssetId,
        rows: &mut [TradeRecord],
        dividends: &mut [Dividend],
    ) -> Result<AdjustmentReport> {
        let mut report = AdjustmentReport::default();
        for dividend in dividends.iter_mut().filter(|d| !d.applied) {
            match Self::fold_one(asset, rows, dividend) {
                Ok(factor) => {
                    dividend.applied = true;
                    report.applied += 1;
                    info!(
                        "Applied dividend for asset {} ex {} factor {:.6}",
                        asset, dividend.ex_date, factor
                    );
                }
                Err(SecmasterError::MissingClose { .. }) => {
                    report.deferred += 1;
                    warn!(
                        "Deferred dividend for asset {} ex {}: no preceding close",
                        asset, dividend.ex_date
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Multiply every adjusted close strictly before the ex-date by the
    /// dividend's factor
    fn fold_one(asset: AssetId, rows: &mut [TradeRecord], dividend: &Dividend) -> Result<f64> {
        let cut = rows.partition_point(|r| r.date < dividend.ex_date);
        if cut == 0 {
            return Err(SecmasterError::MissingClose {
                asset,
                date: dividend.ex_date,
            });
        }
        let prior_close = rows[cut - 1].close;
        if !(prior_close > 0.0) {
            return Err(SecmasterError::ConsistencyFault(format!(
                "asset {} stored a non-positive close on {}",
                asset,
                rows[cut - 1].date
            )));
        }
        if dividend.amount >= prior_close {
            return Err(SecmasterError::Integrity(format!(
                "dividend {} ex {} is not below the preceding close {}",
                dividend.amount, dividend.ex_date, prior_close
            )));
        }
        let factor = (prior_close - dividend.amount) / prior_close;
        for row in &mut rows[..cut] {
            row.adjusted_close *= factor;
        }
        Ok(factor)
    }
}
