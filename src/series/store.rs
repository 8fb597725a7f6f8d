//! In-memory EOD time-series store
//!
//! Series are sharded per asset: the outer map lock is held only long
//! enough to fetch an asset's cell, so appends to different assets never
//! contend. Rows inside a cell stay date sorted; `as_of` and `range` are
//! binary searches over the sorted slab.
//!
//! A row is settled once a later-dated row exists in its series. Settled
//! rows are append-only; only the adjustment engine may rewrite their
//! `adjusted_close`.

use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use hashbrown::HashMap;
use log::debug;

use crate::asset::Asset;
use crate::error::{Result, SecmasterError};
use crate::series::record::{Dividend, SeriesKind, TradeRecord};
use crate::types::AssetId;

pub(crate) type SeriesCell<T> = Arc<RwLock<Vec<T>>>;

/// Per-asset EOD trade and dividend series
pub struct TimeSeriesStore {
    trades: RwLock<HashMap<AssetId, SeriesCell<TradeRecord>>>,
    dividends: RwLock<HashMap<AssetId, SeriesCell<Dividend>>>,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self {
            trades: RwLock::new(HashMap::new()),
            dividends: RwLock::new(HashMap::new()),
        }
    }

    fn trade_cell(&self, asset: AssetId) -> SeriesCell<TradeRecord> {
        if let Some(cell) = self.trades.read().unwrap().get(&asset) {
            return Arc::clone(cell);
        }
        let mut map = self.trades.write().unwrap();
        Arc::clone(map.entry(asset).or_default())
    }

    fn dividend_cell(&self, asset: AssetId) -> SeriesCell<Dividend> {
        if let Some(cell) = self.dividends.read().unwrap().get(&asset) {
            return Arc::clone(cell);
        }
        let mut map = self.dividends.write().unwrap();
        Arc::clone(map.entry(asset).or_default())
    }

    /// Existing trade cell, if the asset has ever stored a bar
    pub(crate) fn trade_cell_for(&self, asset: AssetId) -> Option<SeriesCell<TradeRecord>> {
        self.trades.read().unwrap().get(&asset).map(Arc::clone)
    }

    /// Existing dividend cell, if the asset has ever stored a dividend
    pub(crate) fn dividend_cell_for(&self, asset: AssetId) -> Option<SeriesCell<Dividend>> {
        self.dividends.read().unwrap().get(&asset).map(Arc::clone)
    }

    /// Series kind the asset's trade bars carry, or a kind mismatch
    fn expected_trade_kind(asset: &Asset) -> Result<SeriesKind> {
        SeriesKind::trade_kind_for(asset.kind()).ok_or_else(|| {
            SecmasterError::KindMismatch(format!(
                "{} asset {} carries no trade series",
                asset.kind(),
                asset.id
            ))
        })
    }

    fn check_open(asset: &Asset) -> Result<()> {
        if !asset.is_active() {
            return Err(SecmasterError::AssetClosed(asset.id));
        }
        Ok(())
    }

    /// Append a trade bar. Out-of-order dates are fine; same-date rows are
    /// duplicates regardless of settlement.
    pub fn append_trade(&self, asset: &Asset, row: TradeRecord) -> Result<()> {
        let kind = Self::expected_trade_kind(asset)?;
        Self::check_open(asset)?;
        let row = row.normalized(asset.quote_units);
        if !row.is_valid() {
            return Err(SecmasterError::Integrity(format!(
                "trade bar for asset {} on {} fails validation",
                asset.id, row.date
            )));
        }

        let cell = self.trade_cell(asset.id);
        let mut rows = cell.write().unwrap();
        match rows.binary_search_by_key(&row.date, |r| r.date) {
            Ok(_) => Err(SecmasterError::DuplicateDate {
                asset: asset.id,
                date: row.date,
            }),
            Err(pos) => {
                debug!("Append {} bar for asset {} on {}", kind, asset.id, row.date);
                rows.insert(pos, row);
                Ok(())
            }
        }
    }

    /// Append a bar, or revise the same-date bar while it is unsettled
    ///
    /// Returns true when an existing row was replaced. A settled row (one
    /// with a later-dated row after it) stays immutable and yields a
    /// duplicate-date error.
    pub fn upsert_trade(&self, asset: &Asset, row: TradeRecord) -> Result<bool> {
        let kind = Self::expected_trade_kind(asset)?;
        Self::check_open(asset)?;
        let row = row.normalized(asset.quote_units);
        if !row.is_valid() {
            return Err(SecmasterError::Integrity(format!(
                "trade bar for asset {} on {} fails validation",
                asset.id, row.date
            )));
        }

        let cell = self.trade_cell(asset.id);
        let mut rows = cell.write().unwrap();
        match rows.binary_search_by_key(&row.date, |r| r.date) {
            Ok(pos) if pos + 1 == rows.len() => {
                debug!("Revise {} bar for asset {} on {}", kind, asset.id, row.date);
                rows[pos] = row;
                Ok(true)
            }
            Ok(_) => Err(SecmasterError::DuplicateDate {
                asset: asset.id,
                date: row.date,
            }),
            Err(pos) => {
                debug!("Append {} bar for asset {} on {}", kind, asset.id, row.date);
                rows.insert(pos, row);
                Ok(false)
            }
        }
    }

    /// Record a dividend. The applied marker is reset; folding it into
    /// adjusted closes is the engine's job.
    pub fn append_dividend(&self, asset: &Asset, dividend: Dividend) -> Result<()> {
        if !asset.kind().bears_dividends() {
            return Err(SecmasterError::KindMismatch(format!(
                "{} asset {} carries no dividend series",
                asset.kind(),
                asset.id
            )));
        }
        Self::check_open(asset)?;
        let mut dividend = dividend.normalized(asset.quote_units);
        dividend.applied = false;
        if !dividend.is_valid() {
            return Err(SecmasterError::Integrity(format!(
                "dividend for asset {} on {} fails validation",
                asset.id, dividend.ex_date
            )));
        }

        let cell = self.dividend_cell(asset.id);
        let mut rows = cell.write().unwrap();
        match rows.binary_search_by_key(&dividend.ex_date, |d| d.ex_date) {
            Ok(_) => Err(SecmasterError::DuplicateDate {
                asset: asset.id,
                date: dividend.ex_date,
            }),
            Err(pos) => {
                debug!(
                    "Append dividend for asset {} ex {} amount {}",
                    asset.id, dividend.ex_date, dividend.amount
                );
                rows.insert(pos, dividend);
                Ok(())
            }
        }
    }

    /// Reload a bar persisted earlier. Values are already store
    /// normalized and closed assets keep their history, so the ingest
    /// checks are skipped.
    pub(crate) fn restore_trade(&self, asset: &Asset, row: TradeRecord) -> Result<()> {
        Self::expected_trade_kind(asset)?;
        let cell = self.trade_cell(asset.id);
        let mut rows = cell.write().unwrap();
        match rows.binary_search_by_key(&row.date, |r| r.date) {
            Ok(_) => Err(SecmasterError::DuplicateDate {
                asset: asset.id,
                date: row.date,
            }),
            Err(pos) => {
                rows.insert(pos, row);
                Ok(())
            }
        }
    }

    /// Reload a dividend persisted earlier; application state resets so
    /// the engine can refold from raw closes.
    pub(crate) fn restore_dividend(&self, asset: &Asset, dividend: Dividend) -> Result<()> {
        if !asset.kind().bears_dividends() {
            return Err(SecmasterError::KindMismatch(format!(
                "{} asset {} carries no dividend series",
                asset.kind(),
                asset.id
            )));
        }
        let mut dividend = dividend;
        dividend.applied = false;
        let cell = self.dividend_cell(asset.id);
        let mut rows = cell.write().unwrap();
        match rows.binary_search_by_key(&dividend.ex_date, |d| d.ex_date) {
            Ok(_) => Err(SecmasterError::DuplicateDate {
                asset: asset.id,
                date: dividend.ex_date,
            }),
            Err(pos) => {
                rows.insert(pos, dividend);
                Ok(())
            }
        }
    }

    /// Trade bars between two dates inclusive, ascending. Gaps are absent
    /// rather than synthesized; an unknown asset yields an empty series.
    pub fn range(&self, asset: AssetId, from: NaiveDate, to: NaiveDate) -> Vec<TradeRecord> {
        if from > to {
            return Vec::new();
        }
        let Some(cell) = self.trade_cell_for(asset) else {
            return Vec::new();
        };
        let rows = cell.read().unwrap();
        let lo = rows.partition_point(|r| r.date < from);
        let hi = rows.partition_point(|r| r.date <= to);
        rows[lo..hi].to_vec()
    }

    /// Latest bar dated on or before `date`
    pub fn as_of(&self, asset: AssetId, date: NaiveDate) -> Result<TradeRecord> {
        let cell = self.trade_cell_for(asset).ok_or_else(|| {
            SecmasterError::NotFound(format!("no trade series for asset {}", asset))
        })?;
        let rows = cell.read().unwrap();
        let idx = rows.partition_point(|r| r.date <= date);
        if idx == 0 {
            return Err(SecmasterError::NotFound(format!(
                "no bar for asset {} on or before {}",
                asset, date
            )));
        }
        Ok(rows[idx - 1])
    }

    /// Latest bar of the series, if any
    pub fn latest(&self, asset: AssetId) -> Option<TradeRecord> {
        let cell = self.trade_cell_for(asset)?;
        let rows = cell.read().unwrap();
        rows.last().copied()
    }

    /// First stored date, if any
    pub fn first_date(&self, asset: AssetId) -> Option<NaiveDate> {
        let cell = self.trade_cell_for(asset)?;
        let rows = cell.read().unwrap();
        rows.first().map(|r| r.date)
    }

    /// The whole trade series, ascending
    pub fn series(&self, asset: AssetId) -> Vec<TradeRecord> {
        self.trade_cell_for(asset)
            .map(|c| c.read().unwrap().clone())
            .unwrap_or_default()
    }

    /// The whole dividend series, ascending by ex-date
    pub fn dividend_series(&self, asset: AssetId) -> Vec<Dividend> {
        self.dividend_cell_for(asset)
            .map(|c| c.read().unwrap().clone())
            .unwrap_or_default()
    }

    /// Dividends with ex-dates between two dates inclusive, ascending
    pub fn dividends(&self, asset: AssetId, from: NaiveDate, to: NaiveDate) -> Vec<Dividend> {
        if from > to {
            return Vec::new();
        }
        let Some(cell) = self.dividend_cell_for(asset) else {
            return Vec::new();
        };
        let rows = cell.read().unwrap();
        let lo = rows.partition_point(|d| d.ex_date < from);
        let hi = rows.partition_point(|d| d.ex_date <= to);
        rows[lo..hi].to_vec()
    }

    pub fn trade_count(&self, asset: AssetId) -> usize {
        self.trade_cell_for(asset)
            .map(|c| c.read().unwrap().len())
            .unwrap_or(0)
    }

    pub fn dividend_count(&self, asset: AssetId) -> usize {
        self.dividend_cell_for(asset)
            .map(|c| c.read().unwrap().len())
            .unwrap_or(0)
    }

    /// Assets holding at least one trade bar
    pub fn assets_with_trades(&self) -> Vec<AssetId> {
        let mut out: Vec<_> = self.trades.read().unwrap().keys().copied().collect();
        out.sort_unstable();
        out
    }

    /// Assets holding at least one dividend
    pub fn assets_with_dividends(&self) -> Vec<AssetId> {
        let mut out: Vec<_> = self.dividends.read().unwrap().keys().copied().collect();
        out.sort_unstable();
        out
    }
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new()
    }
}
