//! Odometer over calendar addresses
//!
//! Enumerates every valid `DimensionAddress` of a series in ascending order.
//! Unlike a fixed-radix counter, each position's bound is recomputed from the
//! coarser values currently in place, so month lengths, leap days and 53-week
//! years come out right without any precomputed table.
//!
//! ```text
//!   {2024, 2, 28, 23} --advance--> {2024, 2, 29, 0}
//!   {2024, 2, 29, 23} --advance--> {2024, 3, 1, 0}
//!   {2023, 2, 28, 23} --advance--> {2023, 3, 1, 0}
//! ```

use crate::storage::error::StorageResult;
use crate::storage::types::{DimensionAddress, SeriesMetadata};

/// The smallest address of a series
pub fn first(metadata: &SeriesMetadata) -> DimensionAddress {
    let values: Vec<i64> = metadata
        .dimensions()
        .iter()
        .enumerate()
        .map(|(idx, dim)| match idx {
            0 => i64::from(metadata.start_year()),
            _ => dim.min_value(),
        })
        .collect();
    DimensionAddress::from_parts(metadata.dimensions(), &values)
}

/// The address following `address`, or `None` once the year range is exhausted
///
/// `address` must already be valid for `metadata`.
pub fn advance(address: &DimensionAddress, metadata: &SeriesMetadata) -> Option<DimensionAddress> {
    let mut next = address.clone();
    let values = next.values_mut();

    for idx in (0..values.len()).rev() {
        values[idx] += 1;
        let bound = metadata.bound(idx, &values[..idx]);
        if bound.contains(values[idx]) {
            return Some(next);
        }
        if idx == 0 {
            break;
        }
        values[idx] = bound.min;
    }
    None
}

/// Lazy iterator over a series' addresses in canonical order
#[derive(Debug, Clone)]
pub struct Odometer<'a> {
    metadata: &'a SeriesMetadata,
    next: Option<DimensionAddress>,
}

impl<'a> Odometer<'a> {
    /// Start at the first address of the series
    pub fn new(metadata: &'a SeriesMetadata) -> Self {
        Self {
            metadata,
            next: Some(first(metadata)),
        }
    }

    /// Resume from any valid address (inclusive)
    pub fn starting_at(metadata: &'a SeriesMetadata, address: DimensionAddress) -> StorageResult<Self> {
        metadata.validate_address(&address)?;
        Ok(Self {
            metadata,
            next: Some(address),
        })
    }
}

impl Iterator for Odometer<'_> {
    type Item = DimensionAddress;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = advance(&current, self.metadata);
        Some(current)
    }
}
