//! Securities Master Example
//!
//! Walks a small universe through the whole master: seeded reference
//! data, an issuer with a listed equity, a dividend back-adjustment,
//! an index-tracking ETF with backfill, and currency conversion.

use std::sync::Arc;

use chrono::NaiveDate;
use secmaster::prelude::*;
use secmaster::seed;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn bar(d: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> TradeRecord {
    TradeRecord::new(d, open, high, low, close, 25_000.0)
}

fn main() -> Result<()> {
    env_logger::init();

    println!("=== Securities Master Example ===\n");

    // 1. Assemble a master with an inspectable audit trail
    let sink = Arc::new(MemorySink::new());
    let master = SecuritiesMaster::new()
        .with_sink(sink.clone() as Arc<dyn AuditSink>)
        .with_actor("demo");

    println!("1. Seeding reference data...");
    let seeded = seed::seed_registry(&master)?;
    println!("  ✓ {} built-in currencies and domiciles", seeded);

    let usd = CurrencyCode::new("USD")?;
    let jpy = CurrencyCode::new("JPY")?;
    let us = CountryCode::new("US")?;
    let issuer = master.upsert_issuer("ACME Industries", us, Some("0001234"))?;
    let nyse = master.upsert_exchange(Mic::new("XNYS")?, "New York Stock Exchange", us)?;
    println!("  ✓ Issuer entity {} and exchange entity {}\n", issuer, nyse);

    // 2. A listed equity with a week of closes and one dividend
    println!("2. Listing ACME and applying a dividend...");
    let acme = master.create_asset(AssetSpec::listed_equity(
        "ACME Industries",
        usd,
        issuer,
        nyse,
        "ACME",
        "US0000000002",
    ))?;

    master.append_trade(acme, bar(date(2024, 1, 2), 99.5, 101.0, 99.0, 100.0))?;
    master.append_trade(acme, bar(date(2024, 1, 3), 100.0, 100.5, 98.0, 99.0))?;
    master.append_trade(acme, bar(date(2024, 1, 4), 99.0, 99.8, 98.4, 99.5))?;

    // Goes ex on the 3rd; every earlier close scales by (100 - 1) / 100
    let report = master.append_dividend(acme, Dividend::new(date(2024, 1, 3), 1.0))?;
    println!("  ✓ Dividend applied to {} earlier rows", report.applied);
    for row in master.query().range(acme, date(2024, 1, 1), date(2024, 1, 31)) {
        println!(
            "    {}  close {:>7.2}  adjusted {:>7.2}",
            row.date, row.close, row.adjusted_close
        );
    }
    println!();

    // 3. An index and a fund replicating it, launched two days later
    println!("3. Index and tracker ETF with backfill...");
    let index = master.create_asset(AssetSpec::index("ACME 50", "ACX", usd, false))?;
    let etf = master.create_asset(AssetSpec::etf(
        "ACME 50 Tracker",
        usd,
        issuer,
        nyse,
        "ACXT",
        "US0000000010",
        index,
        Some(0.0018),
    ))?;

    for (day, level) in [(2, 4800.0), (3, 4788.0), (4, 4810.0)] {
        master.append_trade(index, TradeRecord::flat(date(2024, 1, day), level))?;
    }
    for (day, close) in [(4, 48.1), (5, 48.4)] {
        master.append_trade(etf, bar(date(2024, 1, day), close, close, close, close))?;
    }

    let spliced = master
        .query()
        .etf_backfilled_range(etf, date(2024, 1, 1), date(2024, 1, 31))?;
    println!("  ✓ {} rows, index levels before the fund's first own bar:", spliced.len());
    for row in &spliced {
        println!("    {}  close {:>8.2}", row.date, row.close);
    }
    println!();

    // 4. Currency conversion over a registered pair
    println!("4. Converting through USDJPY...");
    let pair = master.create_asset(AssetSpec::forex(usd, jpy, issuer))?;
    master.append_trade(pair, TradeRecord::flat(date(2024, 1, 4), 145.20))?;

    let in_jpy = master.query().close_in(acme, date(2024, 1, 4), jpy)?;
    let back = master.query().convert(in_jpy, jpy, usd, date(2024, 1, 4))?;
    println!("  ✓ ACME close in JPY: {:.0}", in_jpy);
    println!("  ✓ Round trip back to USD: {:.2}\n", back);

    // 5. Every mutation above left an audit event
    println!("5. Audit trail...");
    let events = sink.events();
    println!("  ✓ {} events recorded, last three:", events.len());
    for event in events.iter().rev().take(3) {
        println!("    {} {} by {}", event.operation, event.subject, event.actor);
    }

    println!("\n=== Done ===");
    Ok(())
}
