//! Core data types for the calendar store
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `Dimension`: One calendar level (year, month, week, day, hour)
//! - `DimensionAddress`: A calendar coordinate identifying one slot
//! - `SeriesMetadata`: Immutable description of a series' layout
//! - `Bound`: The inclusive range a coordinate may take given its coarser values

use crate::storage::calendar::{
    days_in_month, days_in_year, hours_in_month, hours_in_year, weeks_in_year, DAYS_IN_WEEK,
    HOURS_IN_DAY, HOURS_IN_WEEK, MONTHS_IN_YEAR,
};
use crate::storage::error::{StorageError, StorageResult};
use chrono::{Datelike, Days, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Size in bytes of one stored value (little-endian f64)
pub const VALUE_WIDTH: u8 = 8;

/// Store format version written to headers and metadata sidecars
pub const FORMAT_VERSION: u16 = 1;

/// Longest unit label, in bytes, that fits in a store header
pub const MAX_UNIT_LEN: usize = 32;

/// Earliest and latest years a series may cover
pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

/// One calendar level of a series
///
/// Variants are declared coarsest first, so the derived ordering is the
/// canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Dimension {
    Year = 1,
    Month = 2,
    Week = 3,
    Day = 4,
    Hour = 5,
}

impl Dimension {
    /// Get all dimensions for iteration
    pub fn all() -> &'static [Dimension] {
        &[
            Dimension::Year,
            Dimension::Month,
            Dimension::Week,
            Dimension::Day,
            Dimension::Hour,
        ]
    }

    /// Column name used in CSV headers and address strings
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Year => "year",
            Dimension::Month => "month",
            Dimension::Week => "week",
            Dimension::Day => "day",
            Dimension::Hour => "hour",
        }
    }

    /// Smallest value the dimension can take below a fixed parent
    pub fn min_value(self) -> i64 {
        match self {
            Dimension::Hour => 0,
            _ => 1,
        }
    }
}

impl TryFrom<u8> for Dimension {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Dimension::Year),
            2 => Ok(Dimension::Month),
            3 => Ok(Dimension::Week),
            4 => Ok(Dimension::Day),
            5 => Ok(Dimension::Hour),
            _ => Err(StorageError::Corruption(format!(
                "Unknown dimension code: {}",
                value
            ))),
        }
    }
}

impl FromStr for Dimension {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::all()
            .iter()
            .copied()
            .find(|d| d.name() == s.trim())
            .ok_or_else(|| StorageError::InvalidMetadata(format!("Unknown dimension: {:?}", s)))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a comma-separated dimension list such as `year,month,day`
pub fn parse_dimension_list(s: &str) -> StorageResult<Vec<Dimension>> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(Dimension::from_str)
        .collect()
}

/// Inclusive range for one coordinate, with the rule that produced its maximum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub min: i64,
    pub max: i64,
    /// Human-readable origin of `max`, e.g. `days_in_month(2023,2)`
    pub rule: String,
}

impl Bound {
    fn new(min: i64, max: i64, rule: impl Into<String>) -> Self {
        Self {
            min,
            max,
            rule: rule.into(),
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Fail with a range error naming `dim`, `value` and the violated bound
    pub fn check(&self, dim: Dimension, value: i64) -> StorageResult<()> {
        if self.contains(value) {
            return Ok(());
        }
        if value < self.min {
            return Err(StorageError::Range(format!(
                "{} {} is below minimum {}",
                dim, value, self.min
            )));
        }
        Err(StorageError::Range(format!(
            "{} {} exceeds {}={}",
            dim, value, self.rule, self.max
        )))
    }
}

/// A calendar coordinate: one value per selected dimension, coarsest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimensionAddress {
    dims: Vec<Dimension>,
    values: Vec<i64>,
}

impl DimensionAddress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set a coordinate, keeping canonical order
    pub fn with(mut self, dim: Dimension, value: i64) -> Self {
        self.set(dim, value);
        self
    }

    /// Set or replace the value of `dim`
    pub fn set(&mut self, dim: Dimension, value: i64) {
        match self.dims.binary_search(&dim) {
            Ok(idx) => self.values[idx] = value,
            Err(idx) => {
                self.dims.insert(idx, dim);
                self.values.insert(idx, value);
            }
        }
    }

    pub fn get(&self, dim: Dimension) -> Option<i64> {
        self.dims
            .binary_search(&dim)
            .ok()
            .map(|idx| self.values[idx])
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [i64] {
        &mut self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, i64)> + '_ {
        self.dims.iter().copied().zip(self.values.iter().copied())
    }

    /// Build from dimensions and values in matching order
    pub fn from_parts(dims: &[Dimension], values: &[i64]) -> Self {
        dims.iter()
            .zip(values)
            .fold(Self::new(), |addr, (d, v)| addr.with(*d, *v))
    }

    /// The coarsest `len` coordinates of this address
    pub fn prefix(&self, len: usize) -> Self {
        let len = len.min(self.dims.len());
        Self {
            dims: self.dims[..len].to_vec(),
            values: self.values[..len].to_vec(),
        }
    }

    /// Parse `year=2024,month=2,day=29`
    pub fn parse(s: &str) -> StorageResult<Self> {
        let mut address = Self::new();
        for part in s.split(',').filter(|p| !p.trim().is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| {
                StorageError::Range(format!("Expected name=value, got {:?}", part))
            })?;
            let dim = Dimension::from_str(name)?;
            let value = value.trim().parse::<i64>().map_err(|_| {
                StorageError::Range(format!("{} value {:?} is not an integer", dim, value))
            })?;
            if address.get(dim).is_some() {
                return Err(StorageError::Range(format!("{} given twice", dim)));
            }
            address.set(dim, value);
        }
        Ok(address)
    }

    /// Start of the calendar period this address names
    ///
    /// Week-based addresses resolve through the ISO week date, so
    /// `{year:2020, week:1}` starts on 2019-12-30. Returns `None` when the
    /// values do not form a real date.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        let year = i32::try_from(self.get(Dimension::Year)?).ok()?;
        let day = self.get(Dimension::Day);

        let date = match (self.get(Dimension::Week), self.get(Dimension::Month)) {
            (Some(week), _) => {
                let monday = NaiveDate::from_isoywd_opt(year, u32::try_from(week).ok()?, Weekday::Mon)?;
                monday.checked_add_days(Days::new(u64::try_from(day.map_or(0, |d| d - 1)).ok()?))?
            }
            (None, Some(month)) => NaiveDate::from_ymd_opt(
                year,
                u32::try_from(month).ok()?,
                u32::try_from(day.unwrap_or(1)).ok()?,
            )?,
            (None, None) => NaiveDate::from_yo_opt(year, u32::try_from(day.unwrap_or(1)).ok()?)?,
        };

        let hour = self.get(Dimension::Hour).unwrap_or(0);
        date.and_hms_opt(0, 0, 0)?
            .checked_add_signed(Duration::try_hours(hour)?)
    }

    /// The address over `dims` of the period containing `datetime`
    ///
    /// Finer components than `dims` can express are dropped; compare
    /// `to_datetime` of the result to detect them.
    pub fn from_datetime(datetime: &NaiveDateTime, dims: &[Dimension]) -> Self {
        let date = datetime.date();
        let hour = i64::from(datetime.hour());
        let iso = date.iso_week();
        let weekly = dims.contains(&Dimension::Week);

        let mut address = Self::new();
        for (idx, dim) in dims.iter().enumerate() {
            let parent = idx.checked_sub(1).map(|i| dims[i]);
            let value = match (*dim, parent) {
                (Dimension::Year, _) if weekly => i64::from(iso.year()),
                (Dimension::Year, _) => i64::from(date.year()),
                (Dimension::Month, _) => i64::from(date.month()),
                (Dimension::Week, _) => i64::from(iso.week()),
                (Dimension::Day, Some(Dimension::Week)) => {
                    i64::from(date.weekday().number_from_monday())
                }
                (Dimension::Day, Some(Dimension::Month)) => i64::from(date.day()),
                (Dimension::Day, _) => i64::from(date.ordinal()),
                (Dimension::Hour, Some(Dimension::Day)) => hour,
                (Dimension::Hour, Some(Dimension::Week)) => {
                    i64::from(date.weekday().num_days_from_monday()) * i64::from(HOURS_IN_DAY) + hour
                }
                (Dimension::Hour, Some(Dimension::Month)) => {
                    i64::from(date.day0()) * i64::from(HOURS_IN_DAY) + hour
                }
                (Dimension::Hour, _) => i64::from(date.ordinal0()) * i64::from(HOURS_IN_DAY) + hour,
            };
            address.set(*dim, value);
        }
        address
    }
}

impl fmt::Display for DimensionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (dim, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}:{}", dim, value)?;
        }
        f.write_str("}")
    }
}

fn default_value_width() -> u8 {
    VALUE_WIDTH
}

fn default_version() -> u16 {
    FORMAT_VERSION
}

/// Path of the TOML description kept next to a store or CSV file
pub fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("toml")
}

/// Immutable description of a series' layout
///
/// Persisted in the binary file header, so an existing file can be reopened
/// without the caller supplying it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    #[serde(default = "default_version")]
    version: u16,
    dimensions: Vec<Dimension>,
    start_year: i32,
    year_count: u32,
    #[serde(default = "default_value_width")]
    value_width: u8,
    /// Free-form unit label, e.g. `MWh`
    #[serde(default)]
    unit: String,
}

impl SeriesMetadata {
    /// Create a validated series description with 8-byte values
    pub fn new(dimensions: Vec<Dimension>, start_year: i32, year_count: u32) -> StorageResult<Self> {
        Self::with_value_width(dimensions, start_year, year_count, VALUE_WIDTH)
    }

    pub(crate) fn with_value_width(
        dimensions: Vec<Dimension>,
        start_year: i32,
        year_count: u32,
        value_width: u8,
    ) -> StorageResult<Self> {
        let metadata = Self {
            version: FORMAT_VERSION,
            dimensions,
            start_year,
            year_count,
            value_width,
            unit: String::new(),
        };
        metadata.validate()?;
        Ok(metadata)
    }

    /// Builder method: attach a unit label of at most `MAX_UNIT_LEN` bytes
    pub fn with_unit(mut self, unit: impl Into<String>) -> StorageResult<Self> {
        self.unit = unit.into();
        self.validate()?;
        Ok(self)
    }

    /// Structural checks: year first, canonical order, month/week exclusive
    pub fn validate(&self) -> StorageResult<()> {
        let invalid = |msg: String| Err(StorageError::InvalidMetadata(msg));

        if self.version != FORMAT_VERSION {
            return invalid(format!(
                "Incompatible file version: expected {}, got {}",
                FORMAT_VERSION, self.version
            ));
        }
        if self.dimensions.first() != Some(&Dimension::Year) {
            return invalid(format!(
                "Dimension set must start with year, got {:?}",
                self.dimension_names()
            ));
        }
        if self.dimensions.windows(2).any(|w| w[0] >= w[1]) {
            return invalid(format!(
                "Dimensions must be unique and ordered year, month|week, day, hour; got {:?}",
                self.dimension_names()
            ));
        }
        if self.has(Dimension::Month) && self.has(Dimension::Week) {
            return invalid("Month and week cannot both be used in one series".to_string());
        }
        if self.year_count == 0 {
            return invalid("year_count must be positive".to_string());
        }
        let last = i64::from(self.start_year) + i64::from(self.year_count) - 1;
        if self.start_year < MIN_YEAR || last > i64::from(MAX_YEAR) {
            return invalid(format!(
                "Years {}..={} fall outside {}..={}",
                self.start_year, last, MIN_YEAR, MAX_YEAR
            ));
        }
        if self.value_width != VALUE_WIDTH {
            return invalid(format!(
                "value_width must be {}, got {}",
                VALUE_WIDTH, self.value_width
            ));
        }
        if self.unit.len() > MAX_UNIT_LEN {
            return invalid(format!(
                "unit {:?} is longer than {} bytes",
                self.unit, MAX_UNIT_LEN
            ));
        }
        Ok(())
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension_names(&self) -> Vec<&'static str> {
        self.dimensions.iter().map(|d| d.name()).collect()
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn year_count(&self) -> u32 {
        self.year_count
    }

    pub fn last_year(&self) -> i32 {
        self.start_year + self.year_count as i32 - 1
    }

    pub fn value_width(&self) -> u8 {
        self.value_width
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Same years and unit over a different dimension set
    pub fn with_dimensions(&self, dimensions: Vec<Dimension>) -> StorageResult<Self> {
        let metadata = Self {
            dimensions,
            ..self.clone()
        };
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn has(&self, dim: Dimension) -> bool {
        self.dimensions.contains(&dim)
    }

    /// Bound of the dimension at `index`, given the coarser values already fixed
    ///
    /// `coarser` holds the values of `dimensions[..index]`.
    pub fn bound(&self, index: usize, coarser: &[i64]) -> Bound {
        let dim = self.dimensions[index];
        let year = coarser.first().map_or(self.start_year, |y| *y as i32);
        let parent = index.checked_sub(1).map(|i| (self.dimensions[i], coarser[i]));

        match dim {
            Dimension::Year => Bound::new(
                i64::from(self.start_year),
                i64::from(self.last_year()),
                format!("last_year({}+{}-1)", self.start_year, self.year_count),
            ),
            Dimension::Month => Bound::new(1, i64::from(MONTHS_IN_YEAR), "months_in_year"),
            Dimension::Week => Bound::new(
                1,
                i64::from(weeks_in_year(year)),
                format!("weeks_in_year({})", year),
            ),
            Dimension::Day => match parent {
                Some((Dimension::Week, _)) => {
                    Bound::new(1, i64::from(DAYS_IN_WEEK), "days_in_week")
                }
                Some((Dimension::Month, month)) => Bound::new(
                    1,
                    i64::from(days_in_month(year, month as u32)),
                    format!("days_in_month({},{})", year, month),
                ),
                _ => Bound::new(
                    1,
                    i64::from(days_in_year(year)),
                    format!("days_in_year({})", year),
                ),
            },
            Dimension::Hour => match parent {
                Some((Dimension::Day, _)) => {
                    Bound::new(0, i64::from(HOURS_IN_DAY) - 1, "hours_in_day-1")
                }
                Some((Dimension::Week, _)) => {
                    Bound::new(0, i64::from(HOURS_IN_WEEK) - 1, "hours_in_week-1")
                }
                Some((Dimension::Month, month)) => Bound::new(
                    0,
                    i64::from(hours_in_month(year, month as u32)) - 1,
                    format!("hours_in_month({},{})-1", year, month),
                ),
                _ => Bound::new(
                    0,
                    i64::from(hours_in_year(year)) - 1,
                    format!("hours_in_year({})-1", year),
                ),
            },
        }
    }

    /// Check that `address` selects exactly this series' dimensions and
    /// that every value lies within its calendar bound
    pub fn validate_address(&self, address: &DimensionAddress) -> StorageResult<()> {
        if address.dimensions() != self.dimensions.as_slice() {
            return Err(StorageError::Range(format!(
                "Address {} does not match series dimensions {:?}",
                address,
                self.dimension_names()
            )));
        }
        let values = address.values();
        for (idx, dim) in self.dimensions.iter().enumerate() {
            self.bound(idx, &values[..idx]).check(*dim, values[idx])?;
        }
        Ok(())
    }

    /// Number of addressable slots across the whole range
    pub fn total_slots(&self) -> u64 {
        crate::storage::store::end_slot(self)
    }

    /// Parse a TOML series description
    pub fn from_toml(content: &str) -> StorageResult<Self> {
        let metadata: SeriesMetadata = toml::from_str(content)?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn to_toml(&self) -> StorageResult<String> {
        toml::to_string_pretty(self).map_err(|e| StorageError::InvalidMetadata(e.to_string()))
    }

    /// Write the TOML description beside `path`, returning the sidecar path
    pub fn write_sidecar(&self, path: &Path) -> StorageResult<PathBuf> {
        let sidecar = sidecar_path(path);
        std::fs::write(&sidecar, self.to_toml()?)?;
        Ok(sidecar)
    }

    /// Read the TOML description kept beside `path`
    pub fn read_sidecar(path: &Path) -> StorageResult<Self> {
        let sidecar = sidecar_path(path);
        let content = std::fs::read_to_string(&sidecar).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                StorageError::InvalidPath(sidecar.clone(), "metadata sidecar not found".into())
            }
            _ => StorageError::Io(e),
        })?;
        Self::from_toml(&content)
    }
}

impl fmt::Display for SeriesMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}..={} ({}-byte values)",
            self.dimension_names().join(","),
            self.start_year,
            self.last_year(),
            self.value_width
        )?;
        if !self.unit.is_empty() {
            write!(f, " in {}", self.unit)?;
        }
        Ok(())
    }
}
