//! Asset catalog and identifier validation

pub mod catalog;
pub mod isin;

pub use catalog::{AssetCatalog, AssetSpec};
