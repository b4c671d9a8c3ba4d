//! Calendar-addressed binary store
//!
//! A store file is a fixed header followed by one dense slot per address of
//! the series, in odometer order. Slot positions are computed in closed form
//! from calendar sizes, so reads and writes seek directly.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (64 bytes)                       │
//! │   magic: [u8; 4] = "ALMN"               │
//! │   version: u16                          │
//! │   dimension_count: u8                   │
//! │   dimension_codes: [u8; 5]              │
//! │   start_year: i32                       │
//! │   year_count: u32                       │
//! │   value_width: u8                       │
//! │   unit_len: u8                          │
//! │   unit: [u8; 32] (UTF-8, zero padded)   │
//! │   reserved: [u8; 6]                     │
//! │   checksum: u32                         │
//! ├─────────────────────────────────────────┤
//! │ SLOTS                                   │
//! │   total_slots × f64 (little-endian)     │
//! │   zero-filled at creation               │
//! └─────────────────────────────────────────┘
//! ```

use crate::storage::calendar::{
    days_before_month, days_between_years, weeks_between_years, DAYS_IN_WEEK, HOURS_IN_DAY,
    MONTHS_IN_YEAR,
};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::odometer::{self, Odometer};
use crate::storage::types::{
    sidecar_path, Dimension, DimensionAddress, SeriesMetadata, FORMAT_VERSION, MAX_UNIT_LEN,
};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for store file identification
const STORE_MAGIC: [u8; 4] = *b"ALMN";

/// Header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Maximum number of dimension codes the header can hold
const MAX_DIMENSIONS: usize = 5;

/// Offset of the unit label length byte; the label follows it
const UNIT_OFFSET: usize = 21;

/// Store file header
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHeader {
    /// Format version
    pub version: u16,
    /// Series layout
    pub metadata: SeriesMetadata,
}

impl StoreHeader {
    pub fn new(metadata: SeriesMetadata) -> Self {
        Self {
            version: FORMAT_VERSION,
            metadata,
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let dims = self.metadata.dimensions();

        buf[0..4].copy_from_slice(&STORE_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6] = dims.len() as u8;
        for (i, dim) in dims.iter().take(MAX_DIMENSIONS).enumerate() {
            buf[7 + i] = *dim as u8;
        }
        buf[12..16].copy_from_slice(&self.metadata.start_year().to_le_bytes());
        buf[16..20].copy_from_slice(&self.metadata.year_count().to_le_bytes());
        buf[20] = self.metadata.value_width();
        let unit = self.metadata.unit().as_bytes();
        let unit_len = unit.len().min(MAX_UNIT_LEN);
        buf[UNIT_OFFSET] = unit_len as u8;
        buf[UNIT_OFFSET + 1..UNIT_OFFSET + 1 + unit_len].copy_from_slice(&unit[..unit_len]);
        // bytes 54-59 reserved

        let checksum = crc32fast::hash(&buf[0..60]);
        buf[60..64].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> StorageResult<Self> {
        if buf[0..4] != STORE_MAGIC {
            return Err(StorageError::Corruption(format!(
                "Invalid magic: {:?}",
                &buf[0..4]
            )));
        }

        let stored_checksum = u32::from_le_bytes([buf[60], buf[61], buf[62], buf[63]]);
        let computed_checksum = crc32fast::hash(&buf[0..60]);
        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption(format!(
                "Header checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != FORMAT_VERSION {
            return Err(StorageError::Corruption(format!(
                "Unsupported version: {}",
                version
            )));
        }

        let count = buf[6] as usize;
        if count == 0 || count > MAX_DIMENSIONS {
            return Err(StorageError::Corruption(format!(
                "Invalid dimension count: {}",
                count
            )));
        }
        let dimensions = buf[7..7 + count]
            .iter()
            .map(|code| Dimension::try_from(*code))
            .collect::<StorageResult<Vec<_>>>()?;

        let start_year = i32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let year_count = u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]);
        let unit_len = buf[UNIT_OFFSET] as usize;
        if unit_len > MAX_UNIT_LEN {
            return Err(StorageError::Corruption(format!(
                "Invalid unit length: {}",
                unit_len
            )));
        }
        let unit = std::str::from_utf8(&buf[UNIT_OFFSET + 1..UNIT_OFFSET + 1 + unit_len])
            .map_err(|e| StorageError::Corruption(format!("Unit is not UTF-8: {}", e)))?;

        let metadata =
            SeriesMetadata::with_value_width(dimensions, start_year, year_count, buf[20])
                .and_then(|m| m.with_unit(unit))
                .map_err(|e| StorageError::Corruption(format!("Header metadata: {}", e)))?;

        Ok(Self { version, metadata })
    }
}

/// Slot index of an address whose values are already known to be in range
///
/// Counts finest-grain units elapsed since the first address: whole years
/// and months via leap-aware day counts, whole ISO weeks via week-one
/// Mondays, then the offset inside the current unit.
fn slot_index(metadata: &SeriesMetadata, address: &DimensionAddress) -> i64 {
    let start = metadata.start_year();
    let year = address.get(Dimension::Year).unwrap_or(i64::from(start));
    let year_i32 = year as i32;
    let week = address.get(Dimension::Week);
    let month = address.get(Dimension::Month);
    let day = address.get(Dimension::Day);
    let hour = address.get(Dimension::Hour);

    if day.is_none() && hour.is_none() {
        return match (week, month) {
            (Some(w), _) => weeks_between_years(start, year_i32) + w - 1,
            (None, Some(m)) => (year - i64::from(start)) * i64::from(MONTHS_IN_YEAR) + m - 1,
            (None, None) => year - i64::from(start),
        };
    }

    let day_offset = day.map_or(0, |d| d - 1);
    let day_index = match week {
        Some(w) => {
            let weeks = weeks_between_years(start, year_i32) + w - 1;
            weeks * i64::from(DAYS_IN_WEEK) + day_offset
        }
        None => {
            let before_month =
                month.map_or(0, |m| i64::from(days_before_month(year_i32, m as u32)));
            days_between_years(start, year_i32) + before_month + day_offset
        }
    };

    match hour {
        Some(h) => day_index * i64::from(HOURS_IN_DAY) + h,
        None => day_index,
    }
}

/// Zero-based slot of `address`, after validating it against `metadata`
pub fn position(address: &DimensionAddress, metadata: &SeriesMetadata) -> StorageResult<u64> {
    metadata.validate_address(address)?;
    Ok(slot_index(metadata, address) as u64)
}

/// One past the last slot: the index the first address of the following year would take
pub(crate) fn end_slot(metadata: &SeriesMetadata) -> u64 {
    let mut end = odometer::first(metadata);
    end.set(Dimension::Year, i64::from(metadata.last_year()) + 1);
    slot_index(metadata, &end) as u64
}

/// How a store file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing file, reads only
    Read,
    /// New file (truncating any existing one), reads and writes
    Create,
    /// Existing file, reads and writes
    ReadWrite,
}

impl OpenMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

/// Exclusive owner of one open store file
///
/// Not `Clone`: a store is the single handle to its file. The file is
/// released on `close` or when the store is dropped.
#[derive(Debug)]
pub struct BinaryStore {
    path: PathBuf,
    metadata: SeriesMetadata,
    mode: OpenMode,
    file: Option<File>,
    /// Whether `close` should fsync written data
    sync_on_close: bool,
    dirty: bool,
}

impl BinaryStore {
    /// Open a store file
    ///
    /// `Create` requires `metadata` and writes a fresh zero-filled file.
    /// `Read`/`ReadWrite` recover the metadata from the header; a supplied
    /// `metadata` must match it exactly.
    pub fn open(
        path: impl AsRef<Path>,
        mode: OpenMode,
        metadata: Option<&SeriesMetadata>,
    ) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        check_path(&path, mode)?;

        match mode {
            OpenMode::Create => {
                let metadata = metadata.ok_or_else(|| {
                    StorageError::InvalidMetadata(
                        "Metadata must be provided when creating a store".into(),
                    )
                })?;
                Self::create(path, metadata.clone())
            }
            OpenMode::Read | OpenMode::ReadWrite => Self::open_existing(path, mode, metadata),
        }
    }

    fn create(path: PathBuf, metadata: SeriesMetadata) -> StorageResult<Self> {
        metadata.validate()?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let header = StoreHeader::new(metadata.clone());
        file.write_all(&header.to_bytes())?;
        let total_len = expected_len(&metadata);
        // Extending with set_len zero-fills the slot array
        file.set_len(total_len)?;
        file.flush()?;
        let sidecar = metadata.write_sidecar(&path)?;

        tracing::debug!("Wrote metadata sidecar {:?}", sidecar);

        tracing::debug!(
            "Created store {:?}: {} ({} slots)",
            path,
            metadata,
            metadata.total_slots()
        );

        Ok(Self {
            path,
            metadata,
            mode: OpenMode::Create,
            file: Some(file),
            sync_on_close: true,
            dirty: true,
        })
    }

    fn open_existing(
        path: PathBuf,
        mode: OpenMode,
        expected: Option<&SeriesMetadata>,
    ) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(mode.is_writable())
            .open(&path)?;

        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                StorageError::Corruption(format!("File too short for header: {:?}", path))
            }
            _ => StorageError::Io(e),
        })?;
        let header = StoreHeader::from_bytes(&header_buf)?;

        if let Some(expected) = expected {
            if *expected != header.metadata {
                return Err(StorageError::SchemaMismatch {
                    expected: expected.to_string(),
                    found: header.metadata.to_string(),
                });
            }
        }

        let actual_len = file.metadata()?.len();
        let wanted = expected_len(&header.metadata);
        if actual_len != wanted {
            return Err(StorageError::Corruption(format!(
                "File length {} does not match {} expected for {}",
                actual_len, wanted, header.metadata
            )));
        }

        tracing::debug!("Opened store {:?} ({:?}): {}", path, mode, header.metadata);

        Ok(Self {
            path,
            metadata: header.metadata,
            mode,
            file: Some(file),
            sync_on_close: true,
            dirty: false,
        })
    }

    /// Builder method: whether `close` fsyncs written data (default: true)
    pub fn sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }

    pub fn metadata(&self) -> &SeriesMetadata {
        &self.metadata
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Zero-based slot of `address` in this store
    pub fn position(&self, address: &DimensionAddress) -> StorageResult<u64> {
        position(address, &self.metadata)
    }

    /// Read the value stored at `address`
    ///
    /// Slots never written read back as 0.0.
    pub fn read(&mut self, address: &DimensionAddress) -> StorageResult<f64> {
        let values = self.read_run(address, 1)?;
        Ok(values[0])
    }

    /// Read `count` consecutive slots starting at `address`
    pub fn read_run(&mut self, address: &DimensionAddress, count: usize) -> StorageResult<Vec<f64>> {
        self.ensure_open()?;
        let slot = self.position(address)?;
        self.check_run(address, slot, count)?;

        let width = usize::from(self.metadata.value_width());
        let len = count
            .checked_mul(width)
            .ok_or_else(|| StorageError::Range(format!("Run of {} values is too long", count)))?;
        let file = self.seek_to(slot)?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;

        Ok(buf
            .chunks_exact(width)
            .map(|chunk| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(chunk);
                f64::from_le_bytes(bytes)
            })
            .collect())
    }

    /// Write a contiguous run of values starting at `address`
    ///
    /// Element `i` lands on the `i`-th odometer successor of `address`, so a
    /// run may cross day, month or year boundaries. A run that would pass the
    /// last slot is rejected before anything is written. A failing I/O call
    /// part-way through can leave a prefix of the run written.
    pub fn write(&mut self, address: &DimensionAddress, values: &[f64]) -> StorageResult<()> {
        self.ensure_open()?;
        if !self.mode.is_writable() {
            return Err(StorageError::State(format!(
                "Store {:?} is opened read-only",
                self.path
            )));
        }
        let slot = self.position(address)?;
        self.check_run(address, slot, values.len())?;

        let mut buf = Vec::with_capacity(values.len() * 8);
        for value in values {
            buf.extend_from_slice(&value.to_le_bytes());
        }

        let file = self.seek_to(slot)?;
        file.write_all(&buf)?;
        self.dirty = true;

        tracing::trace!("Wrote {} values at {} (slot {})", values.len(), address, slot);
        Ok(())
    }

    /// Sequential scan over every slot in odometer order
    pub fn slots(&mut self) -> StorageResult<Slots<'_>> {
        self.ensure_open()?;
        let file = self.file.as_mut().ok_or_else(|| closed_error(&self.path))?;
        file.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        Ok(Slots {
            addresses: Odometer::new(&self.metadata),
            reader: BufReader::new(file),
        })
    }

    /// Flush and release the file; closing twice is a no-op
    pub fn close(&mut self) -> StorageResult<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        if self.dirty {
            file.flush()?;
            if self.sync_on_close {
                file.sync_all()?;
            }
            self.dirty = false;
        }
        tracing::debug!("Closed store {:?}", self.path);
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> StorageResult<()> {
        if self.file.is_none() {
            return Err(closed_error(&self.path));
        }
        Ok(())
    }

    fn check_run(&self, address: &DimensionAddress, slot: u64, count: usize) -> StorageResult<()> {
        let total = self.metadata.total_slots();
        let end = u64::try_from(count).ok().and_then(|n| slot.checked_add(n));
        match end {
            Some(end) if end <= total => Ok(()),
            _ => Err(StorageError::Range(format!(
                "Run of {} values from {} (slot {}) passes the last slot of {}",
                count, address, slot, total
            ))),
        }
    }

    fn seek_to(&mut self, slot: u64) -> StorageResult<&mut File> {
        let width = u64::from(self.metadata.value_width());
        let path = &self.path;
        let file = self.file.as_mut().ok_or_else(|| closed_error(path))?;
        file.seek(SeekFrom::Start(HEADER_SIZE as u64 + slot * width))?;
        Ok(file)
    }
}

impl Drop for BinaryStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close store {:?}: {}", self.path, e);
        }
    }
}

/// Iterator returned by [`BinaryStore::slots`]
pub struct Slots<'a> {
    addresses: Odometer<'a>,
    reader: BufReader<&'a mut File>,
}

impl Iterator for Slots<'_> {
    type Item = StorageResult<(DimensionAddress, f64)>;

    fn next(&mut self) -> Option<Self::Item> {
        let address = self.addresses.next()?;
        let mut bytes = [0u8; 8];
        Some(
            self.reader
                .read_exact(&mut bytes)
                .map(|_| (address, f64::from_le_bytes(bytes)))
                .map_err(StorageError::from),
        )
    }
}

fn closed_error(path: &Path) -> StorageError {
    StorageError::State(format!("Store {:?} is closed", path))
}

fn expected_len(metadata: &SeriesMetadata) -> u64 {
    HEADER_SIZE as u64 + metadata.total_slots() * u64::from(metadata.value_width())
}

fn check_path(path: &Path, mode: OpenMode) -> StorageResult<()> {
    if path.as_os_str().is_empty() {
        return Err(StorageError::InvalidPath(path.to_path_buf(), "empty path".into()));
    }
    if path.is_dir() {
        return Err(StorageError::InvalidPath(
            path.to_path_buf(),
            "is a directory".into(),
        ));
    }
    match mode {
        OpenMode::Create => {
            if sidecar_path(path) == path {
                return Err(StorageError::InvalidPath(
                    path.to_path_buf(),
                    "would be overwritten by its metadata sidecar".into(),
                ));
            }
            let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
            if let Some(parent) = parent {
                if !parent.is_dir() {
                    return Err(StorageError::InvalidPath(
                        path.to_path_buf(),
                        "parent directory does not exist".into(),
                    ));
                }
            }
        }
        OpenMode::Read | OpenMode::ReadWrite => {
            if !path.exists() {
                return Err(StorageError::InvalidPath(
                    path.to_path_buf(),
                    "file not found".into(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Dimension::*;
    use tempfile::tempdir;

    fn hourly(start: i32, count: u32) -> SeriesMetadata {
        SeriesMetadata::new(vec![Year, Month, Day, Hour], start, count).unwrap()
    }

    fn addr(y: i64, m: i64, d: i64, h: i64) -> DimensionAddress {
        DimensionAddress::new()
            .with(Year, y)
            .with(Month, m)
            .with(Day, d)
            .with(Hour, h)
    }

    #[test]
    fn test_store_header_roundtrip() {
        let header = StoreHeader::new(hourly(2023, 2));
        let bytes = header.to_bytes();
        let restored = StoreHeader::from_bytes(&bytes).unwrap();

        assert_eq!(&bytes[0..4], &STORE_MAGIC);
        assert_eq!(restored.version, FORMAT_VERSION);
        assert_eq!(restored.metadata, header.metadata);
    }

    #[test]
    fn test_store_header_detects_corruption() {
        let mut bytes = StoreHeader::new(hourly(2023, 2)).to_bytes();
        bytes[13] ^= 0xFF;
        assert!(matches!(
            StoreHeader::from_bytes(&bytes),
            Err(StorageError::Corruption(_))
        ));

        let mut bytes = StoreHeader::new(hourly(2023, 2)).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            StoreHeader::from_bytes(&bytes),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_position_matches_odometer_order() {
        for dims in [
            vec![Year, Month, Day, Hour],
            vec![Year, Week, Day, Hour],
            vec![Year, Week, Hour],
            vec![Year, Month, Hour],
            vec![Year, Day],
            vec![Year, Week],
            vec![Year, Month],
            vec![Year],
        ] {
            let meta = SeriesMetadata::new(dims, 2019, 3).unwrap();
            for (expected, address) in Odometer::new(&meta).enumerate() {
                assert_eq!(position(&address, &meta).unwrap(), expected as u64, "{}", address);
            }
        }
    }

    #[test]
    fn test_position_closed_form_values() {
        let meta = hourly(2023, 2);
        assert_eq!(position(&addr(2023, 1, 1, 0), &meta).unwrap(), 0);
        assert_eq!(position(&addr(2023, 1, 2, 0), &meta).unwrap(), 24);
        assert_eq!(position(&addr(2024, 1, 1, 0), &meta).unwrap(), 8760);
        assert_eq!(position(&addr(2024, 3, 1, 0), &meta).unwrap(), 8760 + 60 * 24);
        assert_eq!(meta.total_slots(), 17544);
        assert!(position(&addr(2023, 2, 29, 0), &meta).is_err());
    }

    #[test]
    fn test_create_zero_fills() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.alm");
        let meta = hourly(2023, 2);

        let mut store = BinaryStore::open(&path, OpenMode::Create, Some(&meta)).unwrap();
        assert_eq!(store.read(&addr(2024, 7, 4, 12)).unwrap(), 0.0);
        store.close().unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, HEADER_SIZE as u64 + 17544 * 8);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.alm");
        let meta = hourly(2023, 2);
        let mut store = BinaryStore::open(&path, OpenMode::Create, Some(&meta)).unwrap();

        let cases = [
            (addr(2023, 1, 1, 0), 1.5),
            (addr(2024, 2, 29, 13), -0.1),
            (addr(2024, 12, 31, 23), f64::MAX),
            (addr(2023, 6, 15, 7), f64::MIN_POSITIVE),
        ];
        for (address, value) in &cases {
            store.write(address, &[*value]).unwrap();
        }
        for (address, value) in &cases {
            assert_eq!(store.read(address).unwrap().to_bits(), value.to_bits());
        }
    }

    #[test]
    fn test_run_crosses_day_boundary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.alm");
        let meta = hourly(2023, 1);
        let mut store = BinaryStore::open(&path, OpenMode::Create, Some(&meta)).unwrap();

        let values: Vec<f64> = (0..30).map(|i| i as f64).collect();
        store.write(&addr(2023, 1, 31, 18), &values).unwrap();

        assert_eq!(store.read(&addr(2023, 1, 31, 23)).unwrap(), 5.0);
        assert_eq!(store.read(&addr(2023, 2, 1, 0)).unwrap(), 6.0);
        assert_eq!(store.read(&addr(2023, 2, 1, 23)).unwrap(), 29.0);
        assert_eq!(store.read(&addr(2023, 2, 2, 0)).unwrap(), 0.0);

        let run = store.read_run(&addr(2023, 1, 31, 22), 4).unwrap();
        assert_eq!(run, vec![4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_run_past_end_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.alm");
        let meta = hourly(2023, 1);
        let mut store = BinaryStore::open(&path, OpenMode::Create, Some(&meta)).unwrap();

        let err = store.write(&addr(2023, 12, 31, 22), &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, StorageError::Range(_)));
        assert_eq!(store.read(&addr(2023, 12, 31, 22)).unwrap(), 0.0);
        store.write(&addr(2023, 12, 31, 22), &[1.0, 2.0]).unwrap();
    }

    #[test]
    fn test_reopen_recovers_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.alm");
        let meta = hourly(2023, 2);

        {
            let mut store = BinaryStore::open(&path, OpenMode::Create, Some(&meta)).unwrap();
            store.write(&addr(2024, 2, 29, 5), &[42.0]).unwrap();
        }

        let mut store = BinaryStore::open(&path, OpenMode::Read, None).unwrap();
        assert_eq!(store.metadata(), &meta);
        assert_eq!(store.read(&addr(2024, 2, 29, 5)).unwrap(), 42.0);

        let err = store.write(&addr(2024, 2, 29, 5), &[1.0]).unwrap_err();
        assert!(matches!(err, StorageError::State(_)));

        let mut rw = BinaryStore::open(&path, OpenMode::ReadWrite, Some(&meta)).unwrap();
        rw.write(&addr(2024, 2, 29, 5), &[7.0]).unwrap();
        assert_eq!(rw.read(&addr(2024, 2, 29, 5)).unwrap(), 7.0);
    }

    #[test]
    fn test_schema_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.alm");
        BinaryStore::open(&path, OpenMode::Create, Some(&hourly(2023, 2))).unwrap();

        let other = hourly(2023, 3);
        let err = BinaryStore::open(&path, OpenMode::Read, Some(&other)).unwrap_err();
        assert!(matches!(err, StorageError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_invalid_paths() {
        let dir = tempdir().unwrap();
        let meta = hourly(2023, 1);

        let err = BinaryStore::open(dir.path(), OpenMode::Create, Some(&meta)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(..)));

        let missing = dir.path().join("missing.alm");
        let err = BinaryStore::open(&missing, OpenMode::Read, None).unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(..)));

        let orphan = dir.path().join("no_such_dir").join("series.alm");
        let err = BinaryStore::open(&orphan, OpenMode::Create, Some(&meta)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(..)));

        let err = BinaryStore::open(dir.path().join("x.alm"), OpenMode::Create, None).unwrap_err();
        assert!(matches!(err, StorageError::InvalidMetadata(_)));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.alm");
        BinaryStore::open(&path, OpenMode::Create, Some(&hourly(2023, 1))).unwrap();

        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(HEADER_SIZE as u64 + 16).unwrap();
        drop(file);

        let err = BinaryStore::open(&path, OpenMode::Read, None).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_access() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.alm");
        let meta = hourly(2023, 1);
        let mut store = BinaryStore::open(&path, OpenMode::Create, Some(&meta)).unwrap();

        store.close().unwrap();
        store.close().unwrap();
        assert!(!store.is_open());

        let err = store.read(&addr(2023, 1, 1, 0)).unwrap_err();
        assert!(matches!(err, StorageError::State(_)));
        let err = store.write(&addr(2023, 1, 1, 0), &[1.0]).unwrap_err();
        assert!(matches!(err, StorageError::State(_)));
        assert!(store.slots().is_err());
    }

    #[test]
    fn test_moved_store_keeps_ownership() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.alm");
        let meta = hourly(2023, 1);
        let store = BinaryStore::open(&path, OpenMode::Create, Some(&meta)).unwrap();

        let mut owner = store;
        owner.write(&addr(2023, 3, 1, 0), &[3.0]).unwrap();
        assert_eq!(owner.read(&addr(2023, 3, 1, 0)).unwrap(), 3.0);
    }

    #[test]
    fn test_slots_scan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("days.alm");
        let meta = SeriesMetadata::new(vec![Year, Month, Day], 2024, 1).unwrap();
        let mut store = BinaryStore::open(&path, OpenMode::Create, Some(&meta)).unwrap();

        let feb29 = DimensionAddress::new().with(Year, 2024).with(Month, 2).with(Day, 29);
        store.write(&feb29, &[9.5]).unwrap();

        let slots: Vec<_> = store.slots().unwrap().collect::<StorageResult<_>>().unwrap();
        assert_eq!(slots.len(), 366);
        assert_eq!(slots[59], (feb29, 9.5));
        assert_eq!(slots.iter().filter(|(_, v)| *v != 0.0).count(), 1);
    }

    #[test]
    fn test_header_keeps_unit() {
        let meta = hourly(2023, 1).with_unit("MWh").unwrap();
        let bytes = StoreHeader::new(meta.clone()).to_bytes();
        assert_eq!(bytes[UNIT_OFFSET], 3);
        assert_eq!(&bytes[UNIT_OFFSET + 1..UNIT_OFFSET + 4], b"MWh");
        assert_eq!(StoreHeader::from_bytes(&bytes).unwrap().metadata, meta);

        let mut bad = bytes;
        bad[4] = 2;
        let checksum = crc32fast::hash(&bad[0..60]);
        bad[60..64].copy_from_slice(&checksum.to_le_bytes());
        assert!(matches!(
            StoreHeader::from_bytes(&bad),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_oversized_runs_are_range_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.alm");
        let meta = hourly(2023, 1);
        let mut store = BinaryStore::open(&path, OpenMode::Create, Some(&meta)).unwrap();

        for count in [usize::MAX, usize::MAX / 8 + 1, 8761] {
            let err = store.read_run(&addr(2023, 1, 1, 0), count).unwrap_err();
            assert!(matches!(err, StorageError::Range(_)), "{}", count);
        }
        let err = store.read_run(&addr(2023, 12, 31, 23), usize::MAX).unwrap_err();
        assert!(matches!(err, StorageError::Range(_)));

        assert_eq!(store.read_run(&addr(2023, 1, 1, 0), 8760).unwrap().len(), 8760);
        assert!(store.read_run(&addr(2023, 1, 1, 0), 0).unwrap().is_empty());
    }

    #[test]
    fn test_create_writes_sidecar() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.alm");
        let meta = hourly(2023, 1).with_unit("kW").unwrap();
        BinaryStore::open(&path, OpenMode::Create, Some(&meta)).unwrap();

        let sidecar = dir.path().join("series.toml");
        assert!(sidecar.exists());
        assert_eq!(SeriesMetadata::read_sidecar(&path).unwrap(), meta);

        let reopened = BinaryStore::open(&path, OpenMode::Read, None).unwrap();
        assert_eq!(reopened.metadata().unit(), "kW");

        let err = BinaryStore::open(&sidecar, OpenMode::Create, Some(&meta)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(..)));
    }
}
