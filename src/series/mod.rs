//! EOD time series and dividend adjustment

pub mod adjustment;
pub mod record;
pub mod store;

pub use adjustment::{AdjustmentEngine, AdjustmentReport};
pub use record::{Dividend, SeriesKind, TradeRecord};
pub use store::TimeSeriesStore;
