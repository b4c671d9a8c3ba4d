//! Text codecs for calendar stores
//!
//! - **csv_codec**: Header+rows CSV import/export with optional aggregation

pub mod csv_codec;

pub use csv_codec::{CsvCodec, VALUE_COLUMN};
