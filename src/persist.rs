//! SQLite persistence for the whole master
//!
//! `save` snapshots reference data, the catalog and both series into
//! one database file. `load` replays the snapshot through the
//! components in dependency order and then rebuilds adjusted closes
//! from raw closes, so adjustment state never depends on what a file
//! claims. Entity and asset ids survive the round trip unchanged.

use std::path::Path;

use chrono::NaiveDate;
use log::info;
use rusqlite::{params, Connection};

use crate::asset::{Asset, AssetDetail, AssetStatus};
use crate::error::{Result, SecmasterError};
use crate::master::SecuritiesMaster;
use crate::registry::{Institution, InstitutionRole};
use crate::series::record::{Dividend, TradeRecord};
use crate::types::{CountryCode, CurrencyCode, EntityId, Mic, QuoteUnits};

/// Securities master database with SQLite backend
pub struct StoreDb {
    conn: Connection,
}

impl StoreDb {
    /// Create or open a database at path
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| SecmasterError::StorageError(format!("Failed to open database: {}", e)))?;
        let mut db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            SecmasterError::StorageError(format!("Failed to create in-memory database: {}", e))
        })?;
        let mut db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&mut self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS currencies (
                code TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS domiciles (
                country TEXT PRIMARY KEY,
                alpha3 TEXT NOT NULL,
                name TEXT NOT NULL,
                currency TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS institutions (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                domicile TEXT NOT NULL,
                role TEXT NOT NULL,
                mic TEXT,
                identity_code TEXT
            )",
            "CREATE TABLE IF NOT EXISTS assets (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                currency TEXT NOT NULL,
                owner INTEGER,
                quote_units TEXT NOT NULL,
                status TEXT NOT NULL,
                detail TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS trades (
                asset_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                adjusted_close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (asset_id, date)
            )",
            "CREATE TABLE IF NOT EXISTS dividends (
                asset_id INTEGER NOT NULL,
                ex_date TEXT NOT NULL,
                amount REAL NOT NULL,
                currency TEXT,
                declaration_date TEXT,
                record_date TEXT,
                payment_date TEXT,
                applied INTEGER NOT NULL,
                PRIMARY KEY (asset_id, ex_date)
            )",
        ];
        for sql in statements {
            self.conn
                .execute(sql, [])
                .map_err(|e| SecmasterError::StorageError(format!("Failed to create table: {}", e)))?;
        }
        Ok(())
    }

    /// Snapshot the whole master into the database, replacing any
    /// previous snapshot
    ///
    /// The replace runs in one transaction; a failed save rolls back
    /// and leaves the previous snapshot untouched.
    pub fn save(&mut self, master: &SecuritiesMaster) -> Result<()> {
        let tx = self.conn.transaction().map_err(|e| {
            SecmasterError::StorageError(format!("Failed to begin transaction: {}", e))
        })?;
        Self::write_snapshot(&tx, master)?;
        tx.commit()
            .map_err(|e| SecmasterError::StorageError(format!("Failed to commit snapshot: {}", e)))?;

        info!(
            "Saved snapshot: {} assets, {} trades",
            self.asset_count()?,
            self.trade_count()?
        );
        Ok(())
    }

    fn write_snapshot(conn: &Connection, master: &SecuritiesMaster) -> Result<()> {
        for table in ["dividends", "trades", "assets", "institutions", "domiciles", "currencies"] {
            conn.execute(&format!("DELETE FROM {}", table), [])
                .map_err(|e| SecmasterError::StorageError(format!("Failed to clear table: {}", e)))?;
        }

        for currency in master.registry().currencies() {
            conn.execute(
                "INSERT INTO currencies (code, name) VALUES (?1, ?2)",
                params![currency.code.as_str(), &currency.name],
            )
            .map_err(|e| SecmasterError::StorageError(format!("Failed to insert currency: {}", e)))?;
        }

        for domicile in master.registry().domiciles() {
            conn.execute(
                "INSERT INTO domiciles (country, alpha3, name, currency) VALUES (?1, ?2, ?3, ?4)",
                params![
                    domicile.country.as_str(),
                    &domicile.alpha3,
                    &domicile.name,
                    domicile.currency.as_str(),
                ],
            )
            .map_err(|e| SecmasterError::StorageError(format!("Failed to insert domicile: {}", e)))?;
        }

        let mut institutions = master.registry().issuers();
        institutions.extend(master.registry().exchanges());
        for institution in institutions {
            let (role, mic) = match &institution.role {
                InstitutionRole::Issuer => ("issuer", None),
                InstitutionRole::Exchange { mic } => ("exchange", Some(mic.as_str().to_string())),
            };
            conn.execute(
                "INSERT INTO institutions (id, name, domicile, role, mic, identity_code)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    institution.id as i64,
                    &institution.name,
                    institution.domicile.as_str(),
                    role,
                    mic,
                    &institution.identity_code,
                ],
            )
            .map_err(|e| SecmasterError::StorageError(format!("Failed to insert institution: {}", e)))?;
        }

        for asset in master.catalog().all_assets() {
            let quote_units = match asset.quote_units {
                QuoteUnits::Units => "units",
                QuoteUnits::Cents => "cents",
            };
            let status = match asset.status {
                AssetStatus::Active => "active",
                AssetStatus::Closed => "closed",
            };
            let detail = serde_json::to_string(&asset.detail)?;
            conn.execute(
                "INSERT INTO assets (id, name, currency, owner, quote_units, status, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    asset.id as i64,
                    &asset.name,
                    asset.currency.as_str(),
                    asset.owner.map(|o| o as i64),
                    quote_units,
                    status,
                    detail,
                ],
            )
            .map_err(|e| SecmasterError::StorageError(format!("Failed to insert asset: {}", e)))?;

            for row in master.store().series(asset.id) {
                conn.execute(
                    "INSERT INTO trades (asset_id, date, open, high, low, close, adjusted_close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        asset.id as i64,
                        row.date.to_string(),
                        row.open,
                        row.high,
                        row.low,
                        row.close,
                        row.adjusted_close,
                        row.volume,
                    ],
                )
                .map_err(|e| SecmasterError::StorageError(format!("Failed to insert trade: {}", e)))?;
            }

            for dividend in master.store().dividend_series(asset.id) {
                conn.execute(
                    "INSERT INTO dividends
                     (asset_id, ex_date, amount, currency, declaration_date, record_date, payment_date, applied)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        asset.id as i64,
                        dividend.ex_date.to_string(),
                        dividend.amount,
                        dividend.currency.map(|c| c.as_str().to_string()),
                        dividend.declaration_date.map(|d| d.to_string()),
                        dividend.record_date.map(|d| d.to_string()),
                        dividend.payment_date.map(|d| d.to_string()),
                        dividend.applied,
                    ],
                )
                .map_err(|e| SecmasterError::StorageError(format!("Failed to insert dividend: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Rebuild a master from the latest snapshot
    pub fn load(&self) -> Result<SecuritiesMaster> {
        let master = SecuritiesMaster::new();

        let mut stmt = self
            .conn
            .prepare("SELECT code, name FROM currencies ORDER BY code")
            .map_err(|e| SecmasterError::StorageError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| SecmasterError::StorageError(format!("Failed to query currencies: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SecmasterError::StorageError(format!("Failed to read currencies: {}", e)))?;
        for (code, name) in rows {
            master.registry().upsert_currency(CurrencyCode::new(&code)?, &name)?;
        }

        let mut stmt = self
            .conn
            .prepare("SELECT country, alpha3, name, currency FROM domiciles ORDER BY country")
            .map_err(|e| SecmasterError::StorageError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| SecmasterError::StorageError(format!("Failed to query domiciles: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SecmasterError::StorageError(format!("Failed to read domiciles: {}", e)))?;
        for (country, alpha3, name, currency) in rows {
            master.registry().upsert_domicile(
                CountryCode::new(&country)?,
                &alpha3,
                &name,
                CurrencyCode::new(&currency)?,
            )?;
        }

        let mut stmt = self
            .conn
            .prepare("SELECT id, name, domicile, role, mic, identity_code FROM institutions ORDER BY id")
            .map_err(|e| SecmasterError::StorageError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })
            .map_err(|e| SecmasterError::StorageError(format!("Failed to query institutions: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SecmasterError::StorageError(format!("Failed to read institutions: {}", e)))?;
        for (id, name, domicile, role, mic, identity_code) in rows {
            let role = match role.as_str() {
                "issuer" => InstitutionRole::Issuer,
                "exchange" => {
                    let mic = mic.ok_or_else(|| {
                        SecmasterError::StorageError(format!("exchange {} has no MIC", id))
                    })?;
                    InstitutionRole::Exchange { mic: Mic::new(&mic)? }
                }
                other => {
                    return Err(SecmasterError::StorageError(format!(
                        "unknown institution role {:?}",
                        other
                    )))
                }
            };
            master.registry().restore_institution(Institution {
                id: id as EntityId,
                name,
                domicile: CountryCode::new(&domicile)?,
                role,
                identity_code,
            })?;
        }

        let mut stmt = self
            .conn
            .prepare("SELECT id, name, currency, owner, quote_units, status, detail FROM assets ORDER BY id")
            .map_err(|e| SecmasterError::StorageError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(|e| SecmasterError::StorageError(format!("Failed to query assets: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SecmasterError::StorageError(format!("Failed to read assets: {}", e)))?;
        for (id, name, currency, owner, quote_units, status, detail) in rows {
            let quote_units = match quote_units.as_str() {
                "cents" => QuoteUnits::Cents,
                _ => QuoteUnits::Units,
            };
            let status = match status.as_str() {
                "closed" => AssetStatus::Closed,
                _ => AssetStatus::Active,
            };
            let detail: AssetDetail = serde_json::from_str(&detail)?;
            master.catalog().restore(Asset {
                id: id as u64,
                name,
                currency: CurrencyCode::new(&currency)?,
                owner: owner.map(|o| o as EntityId),
                quote_units,
                status,
                detail,
            })?;
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT asset_id, date, open, high, low, close, volume FROM trades
                 ORDER BY asset_id, date",
            )
            .map_err(|e| SecmasterError::StorageError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                ))
            })
            .map_err(|e| SecmasterError::StorageError(format!("Failed to query trades: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SecmasterError::StorageError(format!("Failed to read trades: {}", e)))?;
        for (asset_id, date, open, high, low, close, volume) in rows {
            let asset = master.catalog().retrieve(asset_id as u64)?;
            let date = parse_date(&date)?;
            master
                .store()
                .restore_trade(&asset, TradeRecord::new(date, open, high, low, close, volume))?;
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT asset_id, ex_date, amount, currency, declaration_date, record_date, payment_date
                 FROM dividends ORDER BY asset_id, ex_date",
            )
            .map_err(|e| SecmasterError::StorageError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })
            .map_err(|e| SecmasterError::StorageError(format!("Failed to query dividends: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SecmasterError::StorageError(format!("Failed to read dividends: {}", e)))?;
        for (asset_id, ex_date, amount, currency, declaration, record, payment) in rows {
            let asset = master.catalog().retrieve(asset_id as u64)?;
            let currency = match currency {
                Some(c) => Some(CurrencyCode::new(&c)?),
                None => None,
            };
            let dividend = Dividend {
                ex_date: parse_date(&ex_date)?,
                amount,
                currency,
                declaration_date: declaration.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
                record_date: record.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
                payment_date: payment.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
                applied: false,
            };
            master.store().restore_dividend(&asset, dividend)?;
        }

        // Adjusted closes come from refolding raw closes, not the file
        let report = master.recompute_all()?;
        info!(
            "Loaded snapshot: {} assets, {} dividends refolded",
            master.catalog().asset_count(),
            report.applied
        );
        Ok(master)
    }

    /// Count of persisted assets
    pub fn asset_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))
            .map_err(|e| SecmasterError::StorageError(format!("Failed to count assets: {}", e)))?;
        Ok(count as usize)
    }

    /// Count of persisted trade bars
    pub fn trade_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))
            .map_err(|e| SecmasterError::StorageError(format!("Failed to count trades: {}", e)))?;
        Ok(count as usize)
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| SecmasterError::StorageError(format!("Invalid date in database: {}", e)))
}
