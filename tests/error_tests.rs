//! Error taxonomy tests
//!
//! Every variant carries enough context to act on: ids and dates in the
//! message, a recoverability split callers can branch on, and `?`
//! conversions from the io and serde layers.

use chrono::NaiveDate;
use secmaster::error::{Result, SecmasterError};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn test_duplicate_date_message() {
    let err = SecmasterError::DuplicateDate {
        asset: 7,
        date: d(2024, 1, 2),
    };
    let msg = err.to_string();
    assert!(msg.contains("Duplicate date"));
    assert!(msg.contains("2024-01-02"));
    assert!(msg.contains("7"));
}

#[test]
fn test_missing_close_message() {
    let err = SecmasterError::MissingClose {
        asset: 12,
        date: d(2024, 1, 3),
    };
    let msg = err.to_string();
    assert!(msg.contains("No close before 2024-01-03"));
    assert!(msg.contains("12"));
}

#[test]
fn test_no_conversion_path_message() {
    let err = SecmasterError::NoConversionPath {
        from: "GBP".to_string(),
        to: "JPY".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("No conversion path"));
    assert!(msg.contains("GBP"));
    assert!(msg.contains("JPY"));
}

#[test]
fn test_asset_closed_message() {
    let msg = SecmasterError::AssetClosed(42).to_string();
    assert!(msg.contains("Asset 42 is closed"));
}

#[test]
fn test_io_errors_convert_through_question_mark() {
    fn read_missing() -> Result<Vec<u8>> {
        let bytes = std::fs::read("/definitely/not/a/real/path/series.csv")?;
        Ok(bytes)
    }
    assert!(matches!(read_missing().unwrap_err(), SecmasterError::IoError(_)));
}

#[test]
fn test_serde_errors_convert_through_question_mark() {
    fn parse_garbage() -> Result<serde_json::Value> {
        let value = serde_json::from_str("{not json")?;
        Ok(value)
    }
    assert!(matches!(parse_garbage().unwrap_err(), SecmasterError::SerdeError(_)));
}

#[test]
fn test_only_consistency_faults_are_unrecoverable() {
    let fault = SecmasterError::ConsistencyFault("index points at missing asset 9".to_string());
    assert!(!fault.is_recoverable());

    let recoverable = vec![
        SecmasterError::Integrity("bad bar".to_string()),
        SecmasterError::TypeMismatch("entity 3 is not an issuer".to_string()),
        SecmasterError::KindMismatch("Cash asset 5 carries no trade series".to_string()),
        SecmasterError::DuplicateDate {
            asset: 1,
            date: d(2024, 1, 2),
        },
        SecmasterError::AssetClosed(1),
        SecmasterError::NotFound("currency ZAR".to_string()),
        SecmasterError::MissingClose {
            asset: 1,
            date: d(2024, 1, 3),
        },
        SecmasterError::NoConversionPath {
            from: "USD".to_string(),
            to: "KRW".to_string(),
        },
        SecmasterError::InUse("currency USD is referenced by an asset".to_string()),
        SecmasterError::InvalidData("row 3: bad date".to_string()),
        SecmasterError::StorageError("no such table: trades".to_string()),
    ];
    for err in recoverable {
        assert!(err.is_recoverable(), "expected recoverable: {}", err);
    }
}

#[test]
fn test_debug_formatting_names_the_variant() {
    let err = SecmasterError::MissingClose {
        asset: 8,
        date: d(2024, 1, 3),
    };
    let debug = format!("{:?}", err);
    assert!(debug.contains("MissingClose"));
    assert!(debug.contains("8"));
}
