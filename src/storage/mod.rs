//! Almanac Storage
//!
//! This module provides the calendar-addressed binary store:
//!
//! - **calendar**: Leap-year and variable unit-size rules
//! - **types**: Core data structures (Dimension, DimensionAddress, SeriesMetadata)
//! - **odometer**: Ascending enumeration of valid addresses
//! - **store**: Binary file format and random-access store
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   DimensionAddress → validate → position (closed form) → seek → slots
//!
//! Read Path:
//!   DimensionAddress → validate → position → seek → f64
//!
//! Scan:
//!   Odometer ⨯ sequential slot reader → (address, value) pairs
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use almanac::storage::{BinaryStore, Dimension, DimensionAddress, OpenMode, SeriesMetadata};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let metadata = SeriesMetadata::new(
//!         vec![Dimension::Year, Dimension::Month, Dimension::Day, Dimension::Hour],
//!         2023,
//!         2,
//!     )?;
//!     let mut store = BinaryStore::open("load.alm", OpenMode::Create, Some(&metadata))?;
//!
//!     // 30 hourly values starting at 18:00 spill into the next day
//!     let start = DimensionAddress::parse("year=2024,month=2,day=28,hour=18")?;
//!     store.write(&start, &[1.0; 30])?;
//!
//!     let value = store.read(&DimensionAddress::parse("year=2024,month=2,day=29,hour=0")?)?;
//!     assert_eq!(value, 1.0);
//!
//!     store.close()?;
//!     Ok(())
//! }
//! ```

pub mod calendar;
pub mod error;
pub mod odometer;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use odometer::{advance, first, Odometer};
pub use store::{position, BinaryStore, OpenMode, Slots, StoreHeader, HEADER_SIZE};
pub use types::{
    parse_dimension_list, sidecar_path, Bound, Dimension, DimensionAddress, SeriesMetadata,
    FORMAT_VERSION, MAX_UNIT_LEN,
};
