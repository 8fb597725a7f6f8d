//! Built-in reference seeds and CSV ingestion
//!
//! The registry ships with the major ISO 4217 currencies and ISO 3166
//! domiciles so a fresh master is usable without any vendor files.
//! Larger universes load from CSV. Loaders go through the facade so
//! every row lands in the audit trail.

use std::path::Path;

use chrono::NaiveDate;
use log::{info, warn};
use serde::Deserialize;

use crate::error::{Result, SecmasterError};
use crate::master::SecuritiesMaster;
use crate::series::record::{Dividend, TradeRecord};
use crate::types::{AssetId, CountryCode, CurrencyCode, Mic};

/// (code, name)
const CURRENCIES: &[(&str, &str)] = &[
    ("USD", "US Dollar"),
    ("EUR", "Euro"),
    ("GBP", "Pound Sterling"),
    ("JPY", "Japanese Yen"),
    ("CHF", "Swiss Franc"),
    ("CAD", "Canadian Dollar"),
    ("AUD", "Australian Dollar"),
    ("NZD", "New Zealand Dollar"),
    ("SEK", "Swedish Krona"),
    ("NOK", "Norwegian Krone"),
    ("DKK", "Danish Krone"),
    ("ZAR", "South African Rand"),
    ("HKD", "Hong Kong Dollar"),
    ("SGD", "Singapore Dollar"),
    ("CNY", "Chinese Yuan"),
    ("INR", "Indian Rupee"),
    ("BRL", "Brazilian Real"),
    ("MXN", "Mexican Peso"),
    ("KRW", "South Korean Won"),
    ("PLN", "Polish Zloty"),
];

/// (alpha-2, alpha-3, name, currency)
const DOMICILES: &[(&str, &str, &str, &str)] = &[
    ("US", "USA", "United States", "USD"),
    ("GB", "GBR", "United Kingdom", "GBP"),
    ("DE", "DEU", "Germany", "EUR"),
    ("FR", "FRA", "France", "EUR"),
    ("NL", "NLD", "Netherlands", "EUR"),
    ("IE", "IRL", "Ireland", "EUR"),
    ("IT", "ITA", "Italy", "EUR"),
    ("ES", "ESP", "Spain", "EUR"),
    ("CH", "CHE", "Switzerland", "CHF"),
    ("JP", "JPN", "Japan", "JPY"),
    ("CA", "CAN", "Canada", "CAD"),
    ("AU", "AUS", "Australia", "AUD"),
    ("NZ", "NZL", "New Zealand", "NZD"),
    ("SE", "SWE", "Sweden", "SEK"),
    ("NO", "NOR", "Norway", "NOK"),
    ("DK", "DNK", "Denmark", "DKK"),
    ("ZA", "ZAF", "South Africa", "ZAR"),
    ("HK", "HKG", "Hong Kong", "HKD"),
    ("SG", "SGP", "Singapore", "SGD"),
    ("CN", "CHN", "China", "CNY"),
    ("IN", "IND", "India", "INR"),
    ("BR", "BRA", "Brazil", "BRL"),
    ("MX", "MEX", "Mexico", "MXN"),
    ("KR", "KOR", "South Korea", "KRW"),
    ("PL", "POL", "Poland", "PLN"),
];

/// Seed the built-in currency and domicile tables. Idempotent.
pub fn seed_registry(master: &SecuritiesMaster) -> Result<usize> {
    let mut count = 0;
    for (code, name) in CURRENCIES {
        master.upsert_currency(CurrencyCode::new(code)?, name)?;
        count += 1;
    }
    for (country, alpha3, name, currency) in DOMICILES {
        master.upsert_domicile(
            CountryCode::new(country)?,
            alpha3,
            name,
            CurrencyCode::new(currency)?,
        )?;
        count += 1;
    }
    info!("Seeded {} built-in reference rows", count);
    Ok(count)
}

#[derive(Debug, Deserialize)]
struct CurrencyRow {
    code: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DomicileRow {
    country: String,
    alpha3: String,
    name: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct TradeRow {
    mic: String,
    ticker: String,
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct DividendRow {
    mic: String,
    ticker: String,
    ex_date: String,
    amount: f64,
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| SecmasterError::InvalidData(format!("Invalid date {:?}: {}", raw, e)))
}

/// Load currencies from a CSV with columns `code,name`
pub fn load_currencies_csv(master: &SecuritiesMaster, path: &Path) -> Result<usize> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| SecmasterError::InvalidData(format!("Failed to read CSV: {}", e)))?;
    let mut count = 0;
    for result in reader.deserialize() {
        let row: CurrencyRow = result
            .map_err(|e| SecmasterError::InvalidData(format!("CSV parse error: {}", e)))?;
        master.upsert_currency(CurrencyCode::new(&row.code)?, &row.name)?;
        count += 1;
    }
    info!("Loaded {} currencies from {}", count, path.display());
    Ok(count)
}

/// Load domiciles from a CSV with columns `country,alpha3,name,currency`
pub fn load_domiciles_csv(master: &SecuritiesMaster, path: &Path) -> Result<usize> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| SecmasterError::InvalidData(format!("Failed to read CSV: {}", e)))?;
    let mut count = 0;
    for result in reader.deserialize() {
        let row: DomicileRow = result
            .map_err(|e| SecmasterError::InvalidData(format!("CSV parse error: {}", e)))?;
        master.upsert_domicile(
            CountryCode::new(&row.country)?,
            &row.alpha3,
            &row.name,
            CurrencyCode::new(&row.currency)?,
        )?;
        count += 1;
    }
    info!("Loaded {} domiciles from {}", count, path.display());
    Ok(count)
}

/// Load trade bars from a CSV with columns
/// `mic,ticker,date,open,high,low,close,volume`
///
/// Rows are keyed by listing, so the referenced assets must already
/// exist. A date the series already holds is skipped, which keeps
/// re-runs of the same file harmless.
pub fn load_trades_csv(master: &SecuritiesMaster, path: &Path) -> Result<usize> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| SecmasterError::InvalidData(format!("Failed to read CSV: {}", e)))?;
    let mut count = 0;
    for result in reader.deserialize() {
        let row: TradeRow = result
            .map_err(|e| SecmasterError::InvalidData(format!("CSV parse error: {}", e)))?;
        let asset = master
            .catalog()
            .find_listing(Mic::new(&row.mic)?, &row.ticker)?;
        let record = TradeRecord::new(
            parse_date(&row.date)?,
            row.open,
            row.high,
            row.low,
            row.close,
            row.volume,
        );
        match master.append_trade(asset.id, record) {
            Ok(_) => count += 1,
            Err(SecmasterError::DuplicateDate { asset, date }) => {
                warn!("Skipping duplicate bar for asset {} on {}", asset, date);
            }
            Err(e) => return Err(e),
        }
    }
    info!("Loaded {} trade bars from {}", count, path.display());
    Ok(count)
}

/// Load dividends from a CSV with columns `mic,ticker,ex_date,amount`
pub fn load_dividends_csv(master: &SecuritiesMaster, path: &Path) -> Result<usize> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| SecmasterError::InvalidData(format!("Failed to read CSV: {}", e)))?;
    let mut count = 0;
    for result in reader.deserialize() {
        let row: DividendRow = result
            .map_err(|e| SecmasterError::InvalidData(format!("CSV parse error: {}", e)))?;
        let asset = master
            .catalog()
            .find_listing(Mic::new(&row.mic)?, &row.ticker)?;
        let dividend = Dividend::new(parse_date(&row.ex_date)?, row.amount);
        match master.append_dividend(asset.id, dividend) {
            Ok(_) => count += 1,
            Err(SecmasterError::DuplicateDate { asset, date }) => {
                warn!("Skipping duplicate dividend for asset {} on {}", asset, date);
            }
            Err(e) => return Err(e),
        }
    }
    info!("Loaded {} dividends from {}", count, path.display());
    Ok(count)
}

/// Dump one asset's full series to a CSV with columns
/// `date,open,high,low,close,adjusted_close,volume`
pub fn write_trades_csv(master: &SecuritiesMaster, asset: AssetId, path: &Path) -> Result<usize> {
    let rows = master.store().series(asset);
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| SecmasterError::InvalidData(format!("Failed to create CSV: {}", e)))?;
    writer
        .write_record(["date", "open", "high", "low", "close", "adjusted_close", "volume"])
        .map_err(|e| SecmasterError::InvalidData(format!("Failed to write header: {}", e)))?;
    for row in &rows {
        writer
            .write_record([
                row.date.to_string(),
                row.open.to_string(),
                row.high.to_string(),
                row.low.to_string(),
                row.close.to_string(),
                row.adjusted_close.to_string(),
                row.volume.to_string(),
            ])
            .map_err(|e| SecmasterError::InvalidData(format!("Failed to write row: {}", e)))?;
    }
    writer
        .flush()
        .map_err(|e| SecmasterError::InvalidData(format!("Failed to flush CSV: {}", e)))?;
    Ok(rows.len())
}
