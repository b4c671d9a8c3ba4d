//! # Almanac
//!
//! Calendar-addressed time-series storage: numeric series indexed by
//! (year, month|week, day, hour) coordinates, kept in a dense binary file and
//! converted to and from CSV.
//!
//! ## Features
//!
//! - **Variable-radix addressing**: leap years, 28-31 day months and
//!   52/53-week ISO years handled exactly
//! - **Random access**: slot positions computed in closed form, no scanning
//! - **Self-describing files**: the series layout lives in a checksummed header
//! - **CSV codec**: lossless round trip, or sums per coarser bucket
//!
//! ## Modules
//!
//! - [`storage`]: Calendar rules, addresses, odometer and binary store
//! - [`codec`]: CSV import/export
//! - [`config`]: TOML configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use almanac::{BinaryStore, CsvCodec, Dimension, OpenMode, SeriesMetadata};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let metadata = SeriesMetadata::new(
//!         vec![Dimension::Year, Dimension::Month, Dimension::Day, Dimension::Hour],
//!         2024,
//!         1,
//!     )?;
//!     let mut store = BinaryStore::open("demand.alm", OpenMode::Create, Some(&metadata))?;
//!
//!     let codec = CsvCodec::new();
//!     codec.csv_to_bin("demand.csv", &mut store)?;
//!     codec.bin_to_csv(&mut store, "daily.csv", true)?;
//!
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    BinaryStore, Dimension, DimensionAddress, Odometer, OpenMode, SeriesMetadata, StorageError,
    StorageResult,
};

pub use codec::CsvCodec;

pub use config::{Config, ConfigError, CsvConfig, LoggingConfig, StoreConfig};
