//! SecuritiesMaster, the top-level handle
//!
//! Wires the reference registry, asset catalog, time series store,
//! adjustment engine and query engine together, and emits an audit
//! event for every mutation that succeeds. All ingestion goes through
//! this facade so dividend adjustment hooks and audit never get
//! skipped.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;

use crate::asset::Asset;
use crate::assets::catalog::{AssetCatalog, AssetSpec};
use crate::audit::{AuditEvent, AuditSink, LogSink};
use crate::error::{Result, SecmasterError};
use crate::query::QueryEngine;
use crate::registry::ReferenceRegistry;
use crate::series::adjustment::{AdjustmentEngine, AdjustmentReport};
use crate::series::record::{Dividend, TradeRecord};
use crate::series::store::TimeSeriesStore;
use crate::types::{AssetId, CountryCode, CurrencyCode, EntityId, Mic};

/// The assembled securities master
pub struct SecuritiesMaster {
    registry: Arc<ReferenceRegistry>,
    catalog: Arc<AssetCatalog>,
    store: Arc<TimeSeriesStore>,
    engine: AdjustmentEngine,
    query: QueryEngine,
    sink: Arc<dyn AuditSink>,
    actor: String,
}

impl SecuritiesMaster {
    /// Create an empty master auditing to the log
    pub fn new() -> Self {
        let registry = Arc::new(ReferenceRegistry::new());
        let catalog = Arc::new(AssetCatalog::new(Arc::clone(&registry)));
        let store = Arc::new(TimeSeriesStore::new());
        let engine = AdjustmentEngine::new(Arc::clone(&store));
        let query = QueryEngine::new(Arc::clone(&registry), Arc::clone(&catalog), Arc::clone(&store));
        Self {
            registry,
            catalog,
            store,
            engine,
            query,
            sink: Arc::new(LogSink::new()),
            actor: "local".to_string(),
        }
    }

    /// Replace the audit sink
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Set the actor stamped on audit events
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    pub fn registry(&self) -> &Arc<ReferenceRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<AssetCatalog> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<TimeSeriesStore> {
        &self.store
    }

    /// Read-only query surface
    pub fn query(&self) -> &QueryEngine {
        &self.query
    }

    fn audit(&self, operation: &str, subject: String, detail: serde_json::Value) {
        self.sink
            .record(AuditEvent::new(&self.actor, operation, subject, detail));
    }

    // ----- reference data -----

    pub fn upsert_currency(&self, code: CurrencyCode, name: &str) -> Result<()> {
        self.registry.upsert_currency(code, name)?;
        self.audit("upsert_currency", format!("currency {}", code), json!({ "name": name }));
        Ok(())
    }

    pub fn upsert_domicile(
        &self,
        country: CountryCode,
        alpha3: &str,
        name: &str,
        currency: CurrencyCode,
    ) -> Result<()> {
        self.registry.upsert_domicile(country, alpha3, name, currency)?;
        self.audit(
            "upsert_domicile",
            format!("domicile {}", country),
            json!({ "name": name, "currency": currency.to_string() }),
        );
        Ok(())
    }

    pub fn upsert_issuer(
        &self,
        name: &str,
        domicile: CountryCode,
        identity_code: Option<&str>,
    ) -> Result<EntityId> {
        let id = self.registry.upsert_issuer(name, domicile, identity_code)?;
        self.audit(
            "upsert_issuer",
            format!("entity {}", id),
            json!({ "name": name, "domicile": domicile.to_string() }),
        );
        Ok(id)
    }

    pub fn upsert_exchange(&self, mic: Mic, name: &str, domicile: CountryCode) -> Result<EntityId> {
        let id = self.registry.upsert_exchange(mic, name, domicile)?;
        self.audit(
            "upsert_exchange",
            format!("entity {}", id),
            json!({ "mic": mic.to_string(), "name": name }),
        );
        Ok(id)
    }

    /// Remove a currency nothing references any more
    pub fn remove_currency(&self, code: CurrencyCode) -> Result<()> {
        if self.catalog.references_currency(code) {
            return Err(SecmasterError::InUse(format!(
                "currency {} is referenced by an asset",
                code
            )));
        }
        self.registry.remove_currency(code)?;
        self.audit("remove_currency", format!("currency {}", code), json!(null));
        Ok(())
    }

    pub fn remove_domicile(&self, country: CountryCode) -> Result<()> {
        self.registry.remove_domicile(country)?;
        self.audit("remove_domicile", format!("domicile {}", country), json!(null));
        Ok(())
    }

    /// Remove an issuer or exchange nothing references any more
    pub fn remove_institution(&self, id: EntityId) -> Result<()> {
        if self.catalog.references_entity(id) {
            return Err(SecmasterError::InUse(format!(
                "entity {} is referenced by an asset",
                id
            )));
        }
        self.registry.remove_institution(id)?;
        self.audit("remove_institution", format!("entity {}", id), json!(null));
        Ok(())
    }

    // ----- assets -----

    pub fn create_asset(&self, spec: AssetSpec) -> Result<AssetId> {
        let name = spec.name.clone();
        let kind = spec.detail.kind();
        let id = self.catalog.create(spec)?;
        self.audit(
            "create_asset",
            format!("asset {}", id),
            json!({ "name": name, "kind": kind.to_string() }),
        );
        Ok(id)
    }

    pub fn close_asset(&self, id: AssetId) -> Result<()> {
        self.catalog.close(id)?;
        self.audit("close_asset", format!("asset {}", id), json!(null));
        Ok(())
    }

    // ----- time series -----

    /// Append a trade bar; any dividends waiting on a prior close get
    /// applied once the new bar unblocks them.
    pub fn append_trade(&self, asset: AssetId, row: TradeRecord) -> Result<AdjustmentReport> {
        let asset = self.catalog.retrieve(asset)?;
        self.store.append_trade(&asset, row)?;
        let report = self.engine.on_trade(&asset)?;
        self.audit(
            "append_trade",
            format!("asset {}", asset.id),
            json!({ "date": row.date.to_string(), "close": row.close }),
        );
        Ok(report)
    }

    /// Append a bar, or replace it when it is the unsettled last bar.
    /// A replaced close can feed an already-applied factor, so the
    /// series is refolded from raw closes after a replacement.
    pub fn upsert_trade(&self, asset: AssetId, row: TradeRecord) -> Result<bool> {
        let asset = self.catalog.retrieve(asset)?;
        let replaced = self.store.upsert_trade(&asset, row)?;
        if replaced {
            self.engine.recompute(&asset)?;
        } else {
            self.engine.on_trade(&asset)?;
        }
        self.audit(
            "upsert_trade",
            format!("asset {}", asset.id),
            json!({ "date": row.date.to_string(), "close": row.close, "replaced": replaced }),
        );
        Ok(replaced)
    }

    /// Record a dividend and adjust history; a missing prior close
    /// defers the application instead of failing.
    pub fn append_dividend(&self, asset: AssetId, dividend: Dividend) -> Result<AdjustmentReport> {
        let asset = self.catalog.retrieve(asset)?;
        let ex_date = dividend.ex_date;
        let amount = dividend.amount;
        self.store.append_dividend(&asset, dividend)?;
        let report = self.engine.on_dividend(&asset)?;
        self.audit(
            "append_dividend",
            format!("asset {}", asset.id),
            json!({ "ex_date": ex_date.to_string(), "amount": amount }),
        );
        Ok(report)
    }

    /// Apply one recorded dividend now, failing on a missing prior close
    pub fn apply_dividend(&self, asset: AssetId, ex_date: NaiveDate) -> Result<Option<f64>> {
        let asset = self.catalog.retrieve(asset)?;
        let factor = self.engine.apply_dividend(&asset, ex_date)?;
        self.audit(
            "apply_dividend",
            format!("asset {}", asset.id),
            json!({ "ex_date": ex_date.to_string(), "factor": factor }),
        );
        Ok(factor)
    }

    /// Rebuild one asset's adjusted closes from raw closes
    pub fn recompute_adjustments(&self, asset: AssetId) -> Result<AdjustmentReport> {
        let asset = self.catalog.retrieve(asset)?;
        let report = self.engine.recompute(&asset)?;
        self.audit(
            "recompute_adjustments",
            format!("asset {}", asset.id),
            json!({ "applied": report.applied, "deferred": report.deferred }),
        );
        Ok(report)
    }

    /// Rebuild adjusted closes for every asset in the catalog
    pub fn recompute_all(&self) -> Result<AdjustmentReport> {
        let assets: Vec<Asset> = self.catalog.all_assets();
        let report = self.engine.recompute_all(&assets)?;
        self.audit(
            "recompute_all",
            format!("{} assets", assets.len()),
            json!({ "applied": report.applied, "deferred": report.deferred }),
        );
        Ok(report)
    }

    /// Dividends recorded but not yet folded into adjusted closes
    pub fn pending_dividends(&self, asset: AssetId) -> usize {
        self.engine.pending_count(asset)
    }
}

impl Default for SecuritiesMaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use approx::assert_relative_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ccy(code: &str) -> CurrencyCode {
        CurrencyCode::new(code).unwrap()
    }

    fn bar(date: NaiveDate, close: f64) -> TradeRecord {
        TradeRecord::new(date, close, close, close, close, 1_000.0)
    }

    fn seeded() -> (SecuritiesMaster, Arc<MemorySink>, AssetId) {
        let sink = Arc::new(MemorySink::new());
        let master = SecuritiesMaster::new()
            .with_sink(sink.clone() as Arc<dyn AuditSink>)
            .with_actor("test");
        master.upsert_currency(ccy("USD"), "US Dollar").unwrap();
        let us = CountryCode::new("US").unwrap();
        master.upsert_domicile(us, "USA", "United States", ccy("USD")).unwrap();
        let issuer = master.upsert_issuer("ACME", us, None).unwrap();
        let exchange = master
            .upsert_exchange(Mic::new("XNYS").unwrap(), "NYSE", us)
            .unwrap();
        let equity = master
            .create_asset(AssetSpec::listed_equity(
                "ACME Inc",
                ccy("USD"),
                issuer,
                exchange,
                "ACME",
                "US0000000002",
            ))
            .unwrap();
        (master, sink, equity)
    }

    #[test]
    fn test_every_mutation_is_audited() {
        let (master, sink, equity) = seeded();
        let before = sink.len();
        assert_eq!(before, 5);

        master.append_trade(equity, bar(d(2024, 1, 2), 100.0)).unwrap();
        master
            .append_dividend(equity, Dividend::new(d(2024, 1, 3), 1.0))
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), before + 2);
        assert_eq!(events[before].operation, "append_trade");
        assert_eq!(events[before].actor, "test");
        assert_eq!(events[before + 1].operation, "append_dividend");
        assert_eq!(events[before + 1].detail["amount"], 1.0);
    }

    #[test]
    fn test_failed_mutation_leaves_no_event() {
        let (master, sink, equity) = seeded();
        let before = sink.len();
        let err = master
            .append_trade(equity, TradeRecord::new(d(2024, 1, 2), 100.0, 90.0, 95.0, 100.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, SecmasterError::Integrity(_)));
        assert_eq!(sink.len(), before);
    }

    #[test]
    fn test_dividend_defers_until_a_trade_arrives() {
        let (master, _sink, equity) = seeded();

        let report = master
            .append_dividend(equity, Dividend::new(d(2024, 1, 3), 1.0))
            .unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(master.pending_dividends(equity), 1);

        let report = master.append_trade(equity, bar(d(2024, 1, 2), 100.0)).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(master.pending_dividends(equity), 0);

        let row = master.store().as_of(equity, d(2024, 1, 2)).unwrap();
        assert_eq!(row.close, 100.0);
        assert_relative_eq!(row.adjusted_close, 99.0, epsilon = 1e-12);
    }

    #[test]
    fn test_upsert_of_last_bar_refolds_factors() {
        let (master, _sink, equity) = seeded();
        master.append_trade(equity, bar(d(2024, 1, 2), 100.0)).unwrap();
        master
            .append_dividend(equity, Dividend::new(d(2024, 1, 5), 1.0))
            .unwrap();
        assert_relative_eq!(
            master.store().as_of(equity, d(2024, 1, 2)).unwrap().adjusted_close,
            99.0,
            epsilon = 1e-12
        );

        // Amend the still-unsettled close; the factor must follow it
        let replaced = master.upsert_trade(equity, bar(d(2024, 1, 2), 101.0)).unwrap();
        assert!(replaced);
        assert_relative_eq!(
            master.store().as_of(equity, d(2024, 1, 2)).unwrap().adjusted_close,
            100.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_removals_respect_references() {
        let (master, _sink, equity) = seeded();
        let asset = master.catalog().retrieve(equity).unwrap();

        assert!(matches!(
            master.remove_currency(ccy("USD")).unwrap_err(),
            SecmasterError::InUse(_)
        ));
        let issuer = asset.detail.share().map(|s| s.issuer);
        assert!(matches!(
            master.remove_institution(issuer.unwrap()).unwrap_err(),
            SecmasterError::InUse(_)
        ));
        assert!(matches!(
            master.remove_domicile(CountryCode::new("US").unwrap()).unwrap_err(),
            SecmasterError::InUse(_)
        ));
    }

    #[test]
    fn test_closed_asset_rejects_ingestion_but_answers_queries() {
        let (master, _sink, equity) = seeded();
        master.append_trade(equity, bar(d(2024, 1, 2), 100.0)).unwrap();
        master.close_asset(equity).unwrap();

        assert!(matches!(
            master.append_trade(equity, bar(d(2024, 1, 3), 101.0)).unwrap_err(),
            SecmasterError::AssetClosed(_)
        ));
        assert_eq!(master.query().as_of(equity, d(2024, 1, 2)).unwrap().close, 100.0);
    }

    #[test]
    fn test_recompute_all_covers_the_catalog() {
        let (master, _sink, equity) = seeded();
        master.append_trade(equity, bar(d(2024, 1, 2), 100.0)).unwrap();
        master.append_trade(equity, bar(d(2024, 1, 3), 99.0)).unwrap();
        master
            .append_dividend(equity, Dividend::new(d(2024, 1, 3), 1.0))
            .unwrap();

        let incremental = master.store().as_of(equity, d(2024, 1, 2)).unwrap().adjusted_close;
        let report = master.recompute_all().unwrap();
        assert_eq!(report.applied, 1);
        let rebuilt = master.store().as_of(equity, d(2024, 1, 2)).unwrap().adjusted_close;
        assert_relative_eq!(rebuilt, incremental, epsilon = 1e-12);
    }
}
