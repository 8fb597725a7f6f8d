//! End-to-end tests for the securities master
//!
//! Each test walks a small universe through the public facade the way
//! an ingestion pipeline would: reference data first, then assets,
//! then series and corporate actions.

use std::sync::Arc;
use std::thread;

use chrono::NaiveDate;
use secmaster::prelude::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn bar(d: NaiveDate, close: f64) -> TradeRecord {
    TradeRecord::new(d, close, close + 0.5, close - 0.5, close, 10_000.0)
}

fn usd() -> CurrencyCode {
    CurrencyCode::new("USD").unwrap()
}

/// Master with USD/JPY/GBP, US/GB domiciles, one issuer and one exchange
fn seeded_master() -> (SecuritiesMaster, u64, u64) {
    let master = SecuritiesMaster::new();
    master.upsert_currency(usd(), "US Dollar").unwrap();
    master.upsert_currency(CurrencyCode::new("JPY").unwrap(), "Japanese Yen").unwrap();
    master.upsert_currency(CurrencyCode::new("GBP").unwrap(), "Pound Sterling").unwrap();
    let us = CountryCode::new("US").unwrap();
    let gb = CountryCode::new("GB").unwrap();
    master.upsert_domicile(us, "USA", "United States", usd()).unwrap();
    master
        .upsert_domicile(gb, "GBR", "United Kingdom", CurrencyCode::new("GBP").unwrap())
        .unwrap();
    let issuer = master.upsert_issuer("ACME Industries", us, None).unwrap();
    let exchange = master
        .upsert_exchange(Mic::new("XNYS").unwrap(), "New York Stock Exchange", us)
        .unwrap();
    (master, issuer, exchange)
}

fn acme_spec(issuer: u64, exchange: u64) -> AssetSpec {
    AssetSpec::listed_equity("ACME Industries", usd(), issuer, exchange, "ACME", "US0000000002")
}

#[test]
fn test_dividend_back_adjustment_story() {
    let (master, issuer, exchange) = seeded_master();
    let acme = master.create_asset(acme_spec(issuer, exchange)).unwrap();

    master.append_trade(acme, bar(date(2024, 1, 2), 100.0)).unwrap();
    master.append_trade(acme, bar(date(2024, 1, 3), 99.0)).unwrap();
    master.append_trade(acme, bar(date(2024, 1, 4), 99.5)).unwrap();

    // $1 goes ex on the 3rd; the close preceding the ex-date is 100
    let report = master
        .append_dividend(acme, Dividend::new(date(2024, 1, 3), 1.0))
        .unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.deferred, 0);

    let rows = master.query().range(acme, date(2024, 1, 1), date(2024, 1, 31));
    assert_eq!(rows.len(), 3);

    // Raw closes never move
    assert_eq!(rows[0].close, 100.0);
    assert_eq!(rows[1].close, 99.0);

    // Rows before the ex-date scale by (100 - 1) / 100
    assert!((rows[0].adjusted_close - 99.0).abs() < 1e-12);
    // The ex-date row and everything after stay untouched
    assert_eq!(rows[1].adjusted_close, 99.0);
    assert_eq!(rows[2].adjusted_close, 99.5);

    // A holder through the ex-date was made whole: the adjusted series
    // shows a flat move where the raw series shows the dividend drop
    let adjusted_return = rows[1].adjusted_close / rows[0].adjusted_close - 1.0;
    assert!(adjusted_return.abs() < 1e-12);
    let raw_return = rows[1].close / rows[0].close - 1.0;
    assert!((raw_return - (-0.01)).abs() < 1e-12);
}

#[test]
fn test_dividends_compound_across_events() {
    let (master, issuer, exchange) = seeded_master();
    let acme = master.create_asset(acme_spec(issuer, exchange)).unwrap();

    master.append_trade(acme, bar(date(2024, 1, 2), 100.0)).unwrap();
    master.append_trade(acme, bar(date(2024, 1, 3), 99.0)).unwrap();
    master.append_trade(acme, bar(date(2024, 1, 4), 100.0)).unwrap();
    master.append_trade(acme, bar(date(2024, 1, 5), 98.5)).unwrap();

    master.append_dividend(acme, Dividend::new(date(2024, 1, 3), 1.0)).unwrap();
    master.append_dividend(acme, Dividend::new(date(2024, 1, 5), 2.0)).unwrap();

    let f1 = 99.0 / 100.0; // (100 - 1) / 100
    let f2 = 98.0 / 100.0; // (100 - 2) / 100

    let rows = master.query().range(acme, date(2024, 1, 1), date(2024, 1, 31));
    assert!((rows[0].adjusted_close - 100.0 * f1 * f2).abs() < 1e-9);
    assert!((rows[1].adjusted_close - 99.0 * f2).abs() < 1e-9);
    assert!((rows[2].adjusted_close - 100.0 * f2).abs() < 1e-9);
    assert_eq!(rows[3].adjusted_close, 98.5);
}

#[test]
fn test_dividend_waits_for_its_prior_close() {
    let (master, issuer, exchange) = seeded_master();
    let acme = master.create_asset(acme_spec(issuer, exchange)).unwrap();

    // Recorded before any trading history exists
    let report = master
        .append_dividend(acme, Dividend::new(date(2024, 1, 3), 1.0))
        .unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(master.pending_dividends(acme), 1);

    // Backfilling the prior close unblocks it
    let report = master.append_trade(acme, bar(date(2024, 1, 2), 100.0)).unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(master.pending_dividends(acme), 0);
    assert!(
        (master.query().as_of(acme, date(2024, 1, 2)).unwrap().adjusted_close - 99.0).abs() < 1e-12
    );
}

#[test]
fn test_etf_replicates_and_backfills_from_index() {
    let (master, issuer, exchange) = seeded_master();

    let index = master
        .create_asset(AssetSpec::index("ACME 50", "ACX", usd(), false))
        .unwrap();
    let etf = master
        .create_asset(AssetSpec::etf(
            "ACME 50 Tracker",
            usd(),
            issuer,
            exchange,
            "ACXT",
            "US0000000010",
            index,
            Some(0.0018),
        ))
        .unwrap();

    // Navigation works both directions
    assert_eq!(master.query().index_for(etf).unwrap().id, index);
    let etfs = master.query().etfs_on(index).unwrap();
    assert_eq!(etfs.len(), 1);
    assert_eq!(etfs[0].id, etf);

    // Index history predates the fund launch
    for (day, level) in [(2, 4800.0), (3, 4788.0), (4, 4810.0)] {
        master
            .append_trade(index, TradeRecord::flat(date(2024, 1, day), level))
            .unwrap();
    }
    master.append_trade(etf, bar(date(2024, 1, 4), 48.1)).unwrap();
    master.append_trade(etf, bar(date(2024, 1, 5), 48.4)).unwrap();

    let spliced = master
        .query()
        .etf_backfilled_range(etf, date(2024, 1, 1), date(2024, 1, 31))
        .unwrap();
    let closes: Vec<f64> = spliced.iter().map(|r| r.close).collect();
    assert_eq!(closes, vec![4800.0, 4788.0, 48.1, 48.4]);

    // The fund's own bar wins where both have one
    assert_eq!(spliced[2].date, date(2024, 1, 4));
}

#[test]
fn test_total_and_simple_returns_straddle_an_ex_date() {
    let (master, issuer, exchange) = seeded_master();
    let acme = master.create_asset(acme_spec(issuer, exchange)).unwrap();

    master.append_trade(acme, bar(date(2024, 1, 2), 100.0)).unwrap();
    master.append_trade(acme, bar(date(2024, 1, 3), 99.0)).unwrap();
    master.append_dividend(acme, Dividend::new(date(2024, 1, 3), 1.0)).unwrap();

    let simple = master
        .query()
        .return_series(acme, date(2024, 1, 1), date(2024, 1, 31), ReturnView::Simple);
    let total = master
        .query()
        .return_series(acme, date(2024, 1, 1), date(2024, 1, 31), ReturnView::Total);

    assert!((simple[0].1 - (-0.01)).abs() < 1e-12);
    assert!(total[0].1.abs() < 1e-12);
}

#[test]
fn test_recreation_is_idempotent_and_reconciles_metadata() {
    let (master, issuer, exchange) = seeded_master();
    let first = master.create_asset(acme_spec(issuer, exchange)).unwrap();

    // Same natural key, same id
    let second = master.create_asset(acme_spec(issuer, exchange)).unwrap();
    assert_eq!(first, second);
    assert_eq!(master.catalog().asset_count(), 1);

    // A renamed recreation updates the record in place
    let renamed = AssetSpec::listed_equity(
        "ACME Industries plc",
        usd(),
        issuer,
        exchange,
        "ACME",
        "US0000000002",
    );
    assert_eq!(master.create_asset(renamed).unwrap(), first);
    assert_eq!(master.catalog().retrieve(first).unwrap().name, "ACME Industries plc");

    // A conflicting identity attribute is rejected
    let wrong_currency = AssetSpec::listed_equity(
        "ACME Industries",
        CurrencyCode::new("GBP").unwrap(),
        issuer,
        exchange,
        "ACME",
        "US0000000002",
    );
    assert!(matches!(
        master.create_asset(wrong_currency).unwrap_err(),
        SecmasterError::Integrity(_)
    ));

    // Registry upserts follow the same contract
    master.upsert_currency(usd(), "US Dollar").unwrap();
    assert!(matches!(
        master.upsert_currency(usd(), "Universal Dollar").unwrap_err(),
        SecmasterError::Integrity(_)
    ));
}

#[test]
fn test_referential_closure_is_enforced() {
    let (master, issuer, exchange) = seeded_master();

    // A reference to a record that does not exist is an integrity failure
    assert!(matches!(
        master
            .create_asset(AssetSpec::listed_equity(
                "Ghost",
                CurrencyCode::new("CHF").unwrap(),
                issuer,
                exchange,
                "GHST",
                "US0000000036",
            ))
            .unwrap_err(),
        SecmasterError::Integrity(_)
    ));
    assert!(matches!(
        master
            .create_asset(AssetSpec::listed_equity(
                "Nowhere",
                usd(),
                issuer,
                9999, // no such exchange entity
                "NWHR",
                "US0000000036",
            ))
            .unwrap_err(),
        SecmasterError::Integrity(_)
    ));
    assert!(matches!(
        master
            .create_asset(AssetSpec::etf(
                "Ghost Tracker",
                usd(),
                issuer,
                exchange,
                "GTRK",
                "US0000000036",
                9999, // no such index asset
                None,
            ))
            .unwrap_err(),
        SecmasterError::Integrity(_)
    ));
    // A reference to a record of the wrong kind is a mismatch
    assert!(matches!(
        master
            .create_asset(AssetSpec::listed_equity(
                "Backwards",
                usd(),
                exchange, // an exchange cannot issue shares
                exchange,
                "BACK",
                "US0000000036",
            ))
            .unwrap_err(),
        SecmasterError::TypeMismatch(_)
    ));
    // None of the rejected creates left a partial record behind
    assert_eq!(master.catalog().asset_count(), 0);

    // Removal checks run in the other direction
    let acme = master.create_asset(acme_spec(issuer, exchange)).unwrap();
    assert!(matches!(
        master.remove_institution(issuer).unwrap_err(),
        SecmasterError::InUse(_)
    ));
    assert!(matches!(
        master.remove_currency(usd()).unwrap_err(),
        SecmasterError::InUse(_)
    ));

    // Closing an asset keeps it referenced; history stays readable
    master.append_trade(acme, bar(date(2024, 1, 2), 100.0)).unwrap();
    master.close_asset(acme).unwrap();
    assert!(matches!(
        master.remove_institution(issuer).unwrap_err(),
        SecmasterError::InUse(_)
    ));
    assert_eq!(master.query().as_of(acme, date(2024, 1, 2)).unwrap().close, 100.0);
    assert!(matches!(
        master.append_trade(acme, bar(date(2024, 1, 3), 99.0)).unwrap_err(),
        SecmasterError::AssetClosed(_)
    ));
}

#[test]
fn test_index_ownership_rules() {
    let (master, issuer, _exchange) = seeded_master();

    // Indices are ownerless by construction
    let spec = AssetSpec::new(
        "Rogue Index",
        usd(),
        Some(issuer),
        AssetDetail::Index(secmaster::asset::IndexDetail {
            ticker: "ROGUE".to_string(),
            total_return: false,
        }),
    );
    assert!(matches!(
        master.create_asset(spec).unwrap_err(),
        SecmasterError::TypeMismatch(_)
    ));

    // Everything else requires an owner
    let orphan = AssetSpec::new("Orphan Cash", usd(), None, AssetDetail::Cash);
    assert!(matches!(
        master.create_asset(orphan).unwrap_err(),
        SecmasterError::TypeMismatch(_)
    ));
}

#[test]
fn test_currency_conversion_scenarios() {
    let (master, issuer, _exchange) = seeded_master();
    let jpy = CurrencyCode::new("JPY").unwrap();
    let gbp = CurrencyCode::new("GBP").unwrap();

    let pair = master.create_asset(AssetSpec::forex(usd(), jpy, issuer)).unwrap();
    master
        .append_trade(pair, TradeRecord::flat(date(2024, 1, 2), 150.0))
        .unwrap();

    // Direct, inverse, identity and forward fill
    assert!((master.query().rate(usd(), jpy, date(2024, 1, 2)).unwrap() - 150.0).abs() < 1e-12);
    assert!((master.query().rate(jpy, usd(), date(2024, 1, 2)).unwrap() - 1.0 / 150.0).abs() < 1e-15);
    assert!((master.query().rate(usd(), usd(), date(2024, 1, 2)).unwrap() - 1.0).abs() < 1e-15);
    assert!((master.query().rate(usd(), jpy, date(2024, 3, 1)).unwrap() - 150.0).abs() < 1e-12);

    // No chaining through intermediate currencies
    assert!(matches!(
        master.query().rate(gbp, jpy, date(2024, 1, 2)).unwrap_err(),
        SecmasterError::NoConversionPath { .. }
    ));

    // Cash is worth one unit of its currency wherever it is valued
    let cash = master.create_asset(AssetSpec::cash(usd(), issuer)).unwrap();
    assert!((master.query().close_in(cash, date(2024, 1, 2), jpy).unwrap() - 150.0).abs() < 1e-9);
}

#[test]
fn test_pence_quotes_normalize_on_ingestion() {
    let (master, _issuer, _exchange) = seeded_master();
    let gb = CountryCode::new("GB").unwrap();
    let gbp = CurrencyCode::new("GBP").unwrap();
    let issuer = master.upsert_issuer("Blighty plc", gb, None).unwrap();
    let lse = master
        .upsert_exchange(Mic::new("XLON").unwrap(), "London Stock Exchange", gb)
        .unwrap();

    let listed = master
        .create_asset(
            AssetSpec::listed_equity("Blighty plc", gbp, issuer, lse, "BLTY", "GB0000000009")
                .with_quote_units(QuoteUnits::Cents),
        )
        .unwrap();

    // Vendor sends pence; the store holds pounds
    master.append_trade(listed, bar(date(2024, 1, 2), 10_050.0)).unwrap();
    let row = master.query().as_of(listed, date(2024, 1, 2)).unwrap();
    assert!((row.close - 100.5).abs() < 1e-12);
    assert!((row.high - 100.505).abs() < 1e-12);
}

#[test]
fn test_concurrent_ingestion_and_queries() {
    let (master, issuer, exchange) = seeded_master();
    let master = Arc::new(master);

    // One listed equity per writer thread
    let isins = ["US0000000002", "US0000000010", "US0000000028", "US0000000036"];
    let assets: Vec<u64> = isins
        .iter()
        .enumerate()
        .map(|(i, isin)| {
            master
                .create_asset(AssetSpec::listed_equity(
                    &format!("Writer {}", i),
                    usd(),
                    issuer,
                    exchange,
                    &format!("WR{}", i),
                    isin,
                ))
                .unwrap()
        })
        .collect();

    let mut handles = Vec::new();
    for &asset in &assets {
        let master = Arc::clone(&master);
        handles.push(thread::spawn(move || {
            for day in 1..=28 {
                master
                    .append_trade(asset, bar(date(2024, 2, day), 100.0 + day as f64))
                    .unwrap();
            }
        }));
    }
    for &asset in &assets {
        let master = Arc::clone(&master);
        handles.push(thread::spawn(move || {
            // Readers see a consistent snapshot: sorted, no torn rows
            for _ in 0..50 {
                let rows = master.query().range(asset, date(2024, 2, 1), date(2024, 2, 28));
                for pair in rows.windows(2) {
                    assert!(pair[0].date < pair[1].date);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for &asset in &assets {
        assert_eq!(master.store().trade_count(asset), 28);
        let last = master.query().as_of(asset, date(2024, 2, 28)).unwrap();
        assert_eq!(last.close, 128.0);
    }
}

#[test]
fn test_audit_trail_covers_a_whole_session() {
    let sink = Arc::new(MemorySink::new());
    let master = SecuritiesMaster::new()
        .with_sink(sink.clone() as Arc<dyn AuditSink>)
        .with_actor("pipeline");

    master.upsert_currency(usd(), "US Dollar").unwrap();
    let us = CountryCode::new("US").unwrap();
    master.upsert_domicile(us, "USA", "United States", usd()).unwrap();
    let issuer = master.upsert_issuer("ACME Industries", us, None).unwrap();
    let exchange = master
        .upsert_exchange(Mic::new("XNYS").unwrap(), "New York Stock Exchange", us)
        .unwrap();
    let acme = master.create_asset(acme_spec(issuer, exchange)).unwrap();
    master.append_trade(acme, bar(date(2024, 1, 2), 100.0)).unwrap();
    master.close_asset(acme).unwrap();

    let operations: Vec<String> = sink.events().iter().map(|e| e.operation.clone()).collect();
    assert_eq!(
        operations,
        vec![
            "upsert_currency",
            "upsert_domicile",
            "upsert_issuer",
            "upsert_exchange",
            "create_asset",
            "append_trade",
            "close_asset",
        ]
    );
    assert!(sink.events().iter().all(|e| e.actor == "pipeline"));
}
