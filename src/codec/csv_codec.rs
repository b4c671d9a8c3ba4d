//! CSV codec
//!
//! Converts between a `BinaryStore` and a header+rows text table. The header
//! names the series' dimension columns coarsest first, followed by `value`.
//! Export can collapse the finest dimensions into sums per coarser bucket
//! (e.g. 24 hourly values into one daily total).
//!
//! Coordinates can also be written as one ISO 8601 column: `date` when the
//! exported dimensions stop at days or coarser, `datetime` when they include
//! hours. Import tells the two forms apart by the header.

use crate::config::CsvConfig;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::store::{BinaryStore, OpenMode};
use crate::storage::types::{
    parse_dimension_list, sidecar_path, Dimension, DimensionAddress, SeriesMetadata,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Name of the value column
pub const VALUE_COLUMN: &str = "value";
/// Combined coordinate column for series without hours
pub const DATE_COLUMN: &str = "date";
/// Combined coordinate column for series with hours
pub const DATETIME_COLUMN: &str = "datetime";

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// How a CSV file spells the calendar coordinates of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coordinates {
    /// One integer column per dimension
    Split,
    /// A single `date` or `datetime` column
    Combined,
}

/// Bidirectional converter between store contents and CSV text
#[derive(Debug, Clone)]
pub struct CsvCodec {
    /// Field delimiter (default `,`)
    delimiter: u8,
    /// Dimensions kept when aggregating; `None` drops the finest dimension
    target: Option<Vec<Dimension>>,
    /// Export coordinates as one ISO column
    datetime: bool,
}

impl Default for CsvCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvCodec {
    /// Create a codec with default settings
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            target: None,
            datetime: false,
        }
    }

    /// Build a codec from the `[csv]` configuration section
    pub fn from_config(config: &CsvConfig) -> StorageResult<Self> {
        if !config.delimiter.is_ascii() {
            return Err(StorageError::InvalidMetadata(format!(
                "CSV delimiter must be a single ASCII character, got {:?}",
                config.delimiter
            )));
        }
        let mut codec = Self::new()
            .with_delimiter(config.delimiter as u8)
            .with_datetime_column(config.datetime_column);
        if !config.aggregate_to.is_empty() {
            codec = codec.with_target(parse_dimension_list(&config.aggregate_to.join(","))?);
        }
        Ok(codec)
    }

    /// Set the field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the dimensions retained by aggregated export
    pub fn with_target(mut self, target: Vec<Dimension>) -> Self {
        self.target = Some(target);
        self
    }

    /// Export coordinates as a single ISO `date`/`datetime` column
    pub fn with_datetime_column(mut self, datetime: bool) -> Self {
        self.datetime = datetime;
        self
    }

    /// Column names for `metadata`: its dimensions coarsest first, then `value`
    pub fn expected_header(metadata: &SeriesMetadata) -> Vec<String> {
        header_for(metadata.dimensions(), Coordinates::Split)
    }

    /// Column names for `metadata` with coordinates in one ISO column
    pub fn datetime_header(metadata: &SeriesMetadata) -> Vec<String> {
        header_for(metadata.dimensions(), Coordinates::Combined)
    }

    /// Compare a raw header line token by token with the expected columns
    ///
    /// Either the per-dimension or the ISO column form is accepted.
    pub fn validate_header(&self, line: &str, metadata: &SeriesMetadata) -> StorageResult<()> {
        let tokens: Vec<String> = line
            .trim_end_matches(&['\r', '\n'][..])
            .split(self.delimiter as char)
            .map(|t| t.trim().to_string())
            .collect();
        check_header(&tokens, metadata).map(|_| ())
    }

    /// Dimensions kept by aggregated export of `metadata`
    ///
    /// Must be a non-empty strict prefix of the series' dimension set.
    pub fn aggregate_target(&self, metadata: &SeriesMetadata) -> StorageResult<Vec<Dimension>> {
        let dims = metadata.dimensions();
        let target = match &self.target {
            Some(target) => target.clone(),
            None => dims[..dims.len().saturating_sub(1)].to_vec(),
        };

        if target.is_empty() || target.len() >= dims.len() || !dims.starts_with(&target) {
            return Err(StorageError::InvalidMetadata(format!(
                "Aggregation target {:?} must be a shorter prefix of {:?}",
                target.iter().map(|d| d.name()).collect::<Vec<_>>(),
                metadata.dimension_names()
            )));
        }
        Ok(target)
    }

    /// Layout of the rows an export of `metadata` produces
    pub fn export_metadata(
        &self,
        metadata: &SeriesMetadata,
        aggregate: bool,
    ) -> StorageResult<SeriesMetadata> {
        if aggregate {
            metadata.with_dimensions(self.aggregate_target(metadata)?)
        } else {
            Ok(metadata.clone())
        }
    }

    /// Load a CSV file into `store`, returning the number of rows written
    pub fn csv_to_bin(&self, csv_path: impl AsRef<Path>, store: &mut BinaryStore) -> StorageResult<u64> {
        let csv_path = csv_path.as_ref();
        let file = File::open(csv_path)?;
        let rows = self.read_csv(file, store)?;
        tracing::info!("Imported {} rows from {:?} into {:?}", rows, csv_path, store.path());
        Ok(rows)
    }

    /// Create a store at `store_path` from the metadata sidecar beside
    /// `csv_path`, then load the CSV into it
    pub fn csv_to_new_bin(
        &self,
        csv_path: impl AsRef<Path>,
        store_path: impl AsRef<Path>,
    ) -> StorageResult<(BinaryStore, u64)> {
        let csv_path = csv_path.as_ref();
        let metadata = SeriesMetadata::read_sidecar(csv_path)?;
        let mut store = BinaryStore::open(store_path, OpenMode::Create, Some(&metadata))?;
        let rows = self.csv_to_bin(csv_path, &mut store)?;
        Ok((store, rows))
    }

    /// Load CSV text from any reader into `store`
    ///
    /// Each row is positioned independently, so row order does not matter;
    /// a repeated address keeps the last value.
    pub fn read_csv<R: Read>(&self, reader: R, store: &mut BinaryStore) -> StorageResult<u64> {
        let metadata = store.metadata().clone();
        let dims = metadata.dimensions();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let coordinates = check_header(&header, &metadata)?;

        let columns = header.len();
        let mut rows = 0u64;
        for result in reader.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            if record.len() != columns {
                return Err(StorageError::Format {
                    line,
                    message: format!("expected {} columns, found {}", columns, record.len()),
                });
            }

            let address = match coordinates {
                Coordinates::Split => {
                    let mut address = DimensionAddress::new();
                    for (dim, field) in dims.iter().zip(record.iter()) {
                        let value = field.parse::<i64>().map_err(|_| StorageError::Format {
                            line,
                            message: format!("{} {:?} is not an integer", dim, field),
                        })?;
                        address.set(*dim, value);
                    }
                    address
                }
                Coordinates::Combined => parse_datetime(&record[0], dims, line)?,
            };

            let field = &record[columns - 1];
            let value = field.parse::<f64>().map_err(|_| StorageError::Format {
                line,
                message: format!("value {:?} is not a number", field),
            })?;

            store.write(&address, &[value]).map_err(|e| match e {
                StorageError::Range(msg) => StorageError::Range(format!("line {}: {}", line, msg)),
                other => other,
            })?;
            rows += 1;
        }

        Ok(rows)
    }

    /// Export `store` to a CSV file, returning the number of rows emitted
    ///
    /// A TOML sidecar describing the exported layout is written beside the
    /// CSV unless it would replace the store's own sidecar. Nothing is
    /// created when the store is closed or the aggregation target is invalid.
    pub fn bin_to_csv(
        &self,
        store: &mut BinaryStore,
        csv_path: impl AsRef<Path>,
        aggregate: bool,
    ) -> StorageResult<u64> {
        let csv_path = csv_path.as_ref();
        store.ensure_open()?;
        let exported = self.export_metadata(store.metadata(), aggregate)?;

        let file = File::create(csv_path)?;
        let rows = self.write_csv(store, file, aggregate)?;

        let sidecar = sidecar_path(csv_path);
        if sidecar != csv_path && sidecar != sidecar_path(store.path()) {
            exported.write_sidecar(csv_path)?;
        }

        tracing::info!(
            "Exported {} rows from {:?} to {:?} (aggregate={})",
            rows,
            store.path(),
            csv_path,
            aggregate
        );
        Ok(rows)
    }

    /// Export `store` as CSV text to any writer
    pub fn write_csv<W: Write>(
        &self,
        store: &mut BinaryStore,
        writer: W,
        aggregate: bool,
    ) -> StorageResult<u64> {
        let exported = self.export_metadata(store.metadata(), aggregate)?;
        let kept = exported.dimensions().len();
        let coordinates = if self.datetime {
            Coordinates::Combined
        } else {
            Coordinates::Split
        };

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(writer);
        writer.write_record(header_for(exported.dimensions(), coordinates))?;

        let mut rows = 0u64;
        let mut bucket: Option<(DimensionAddress, f64)> = None;

        for slot in store.slots()? {
            let (address, value) = slot?;
            if !aggregate {
                writer.write_record(row(&address, value, coordinates)?)?;
                rows += 1;
                continue;
            }

            if let Some((current, sum)) = bucket.as_mut() {
                if current.values() == &address.values()[..kept] {
                    *sum += value;
                    continue;
                }
            }
            if let Some((current, sum)) = bucket.replace((address.prefix(kept), value)) {
                writer.write_record(row(&current, sum, coordinates)?)?;
                rows += 1;
            }
        }

        if let Some((current, sum)) = bucket {
            writer.write_record(row(&current, sum, coordinates)?)?;
            rows += 1;
        }

        writer.flush()?;
        Ok(rows)
    }
}

fn time_column(dims: &[Dimension]) -> &'static str {
    if dims.contains(&Dimension::Hour) {
        DATETIME_COLUMN
    } else {
        DATE_COLUMN
    }
}

fn header_for(dims: &[Dimension], coordinates: Coordinates) -> Vec<String> {
    let leading: Vec<String> = match coordinates {
        Coordinates::Split => dims.iter().map(|d| d.name().to_string()).collect(),
        Coordinates::Combined => vec![time_column(dims).to_string()],
    };
    leading
        .into_iter()
        .chain(std::iter::once(VALUE_COLUMN.to_string()))
        .collect()
}

fn check_header(actual: &[String], metadata: &SeriesMetadata) -> StorageResult<Coordinates> {
    let dims = metadata.dimensions();
    for coordinates in [Coordinates::Split, Coordinates::Combined] {
        if actual == header_for(dims, coordinates).as_slice() {
            return Ok(coordinates);
        }
    }

    let combined = matches!(
        actual.first().map(String::as_str),
        Some(DATE_COLUMN) | Some(DATETIME_COLUMN)
    );
    let expected = if combined {
        CsvCodec::datetime_header(metadata)
    } else {
        CsvCodec::expected_header(metadata)
    };
    Err(StorageError::HeaderMismatch {
        expected,
        actual: actual.to_vec(),
    })
}

/// Resolve an ISO `date`/`datetime` field to the address it starts
fn parse_datetime(field: &str, dims: &[Dimension], line: u64) -> StorageResult<DimensionAddress> {
    let parsed = if dims.contains(&Dimension::Hour) {
        NaiveDateTime::parse_from_str(field, DATETIME_FORMAT)
    } else {
        NaiveDate::parse_from_str(field, DATE_FORMAT).map(|d| d.and_time(NaiveTime::MIN))
    };
    let datetime = parsed.map_err(|e| StorageError::Format {
        line,
        message: format!("{:?} is not an ISO {}: {}", field, time_column(dims), e),
    })?;

    let address = DimensionAddress::from_datetime(&datetime, dims);
    if address.to_datetime() != Some(datetime) {
        return Err(StorageError::Format {
            line,
            message: format!(
                "{:?} is not the start of a {} period",
                field,
                dims.last().map_or("year", |d| d.name())
            ),
        });
    }
    Ok(address)
}

/// Render one row: coordinates, then the value in plain decimal
///
/// `f64`'s `Display` never uses exponent notation and prints the shortest
/// text that parses back to the same bits.
fn row(address: &DimensionAddress, value: f64, coordinates: Coordinates) -> StorageResult<Vec<String>> {
    let mut fields: Vec<String> = match coordinates {
        Coordinates::Split => address.values().iter().map(|c| c.to_string()).collect(),
        Coordinates::Combined => {
            let datetime = address.to_datetime().ok_or_else(|| {
                StorageError::Range(format!("{} is not a calendar date", address))
            })?;
            let format = if address.get(Dimension::Hour).is_some() {
                DATETIME_FORMAT
            } else {
                DATE_FORMAT
            };
            vec![datetime.format(format).to_string()]
        }
    };
    fields.push(value.to_string());
    Ok(fields)
}
