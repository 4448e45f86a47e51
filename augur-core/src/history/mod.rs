//! History store: per-entity CSV persistence of draws and OHLCV bars.
//!
//! Raw files from different sources disagree on column names, date formats and
//! number layout. `normalize` maps them onto canonical keys, `row` turns a
//! normalized record into a typed row (dropping what cannot be salvaged), and
//! `store` caches and persists rows atomically.

pub mod normalize;
pub mod row;
pub mod store;

pub use row::{HistoryRow, Record, RowError};
pub use store::{history_hash, HistoryStore, LoadedHistory, StoreError};
