//! Minimal table codec for the legacy dBASE files.
//!
//! Covers exactly the subset the back-office tables use: fixed-width records,
//! a 32-byte header, field descriptors terminated by 0x0D, and the `*`
//! deletion flag. Character, numeric, float, logical, and date fields only;
//! memo files, index files, and codepage translation are out of scope.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::warn;

use super::value::{encode_field, normalize_field, CellValue, FieldDescriptor, FieldKind};
use crate::errors::{Error, Result};

const HEADER_SIZE: usize = 32;
const DESCRIPTOR_SIZE: usize = 32;
const DESCRIPTOR_TERMINATOR: u8 = 0x0D;
const FLAG_ACTIVE: u8 = b' ';
const FLAG_DELETED: u8 = b'*';

/// Backoff before the single retry when another process holds the file.
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// An open legacy table: parsed header plus field layout.
///
/// The struct holds no file handle; every read opens with shared intent and
/// every write opens read-write and closes on completion, since the files are
/// shared with the legacy application.
#[derive(Debug, Clone)]
pub struct DbfTable {
    path: PathBuf,
    fields: Vec<FieldDescriptor>,
    offsets: Vec<usize>,
    record_count: u32,
    header_len: u16,
    record_len: u16,
}

/// One physical record, before name resolution.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub index: usize,
    pub deleted: bool,
    pub values: Vec<CellValue>,
}

/// Sequential record reader. Stops early (with a warning) on a truncated
/// record area rather than failing a whole scan.
pub struct RecordIter {
    file: BufReader<File>,
    path: PathBuf,
    fields: Vec<FieldDescriptor>,
    offsets: Vec<usize>,
    record_len: usize,
    remaining: usize,
    next_index: usize,
}

impl Iterator for RecordIter {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        if self.remaining == 0 {
            return None;
        }
        let mut buf = vec![0u8; self.record_len];
        if let Err(e) = self.file.read_exact(&mut buf) {
            warn!(
                "{}: record {} unreadable ({}), stopping scan early",
                self.path.display(),
                self.next_index,
                e
            );
            self.remaining = 0;
            return None;
        }

        let deleted = buf[0] == FLAG_DELETED;
        let mut values = Vec::with_capacity(self.fields.len());
        for (field, offset) in self.fields.iter().zip(&self.offsets) {
            let raw = String::from_utf8_lossy(&buf[*offset..*offset + field.length as usize]);
            match normalize_field(&raw, field.kind) {
                Ok(value) => values.push(value),
                Err(_) => {
                    // Salvage unparseable payloads as raw text so a single
                    // corrupt cell does not hide the rest of the row.
                    values.push(CellValue::Text(raw.trim().to_string()));
                }
            }
        }

        let record = RawRecord {
            index: self.next_index,
            deleted,
            values,
        };
        self.next_index += 1;
        self.remaining -= 1;
        Some(record)
    }
}

impl DbfTable {
    /// Opens an existing table and parses its structure.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::DbfMissing(path.display().to_string())
            } else {
                Error::from(e)
            }
        })?;

        let mut header = [0u8; HEADER_SIZE];
        file.read_exact(&mut header)
            .map_err(|_| Error::DbfFormat(format!("{}: truncated header", path.display())))?;

        let record_count = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let header_len = u16::from_le_bytes([header[8], header[9]]);
        let record_len = u16::from_le_bytes([header[10], header[11]]);

        if (header_len as usize) < HEADER_SIZE + 1 {
            return Err(Error::DbfFormat(format!(
                "{}: implausible header length {}",
                path.display(),
                header_len
            )));
        }

        let descriptor_bytes = header_len as usize - HEADER_SIZE;
        let mut descriptors = vec![0u8; descriptor_bytes];
        file.read_exact(&mut descriptors)
            .map_err(|_| Error::DbfFormat(format!("{}: truncated field area", path.display())))?;

        let mut fields = Vec::new();
        for chunk in descriptors.chunks(DESCRIPTOR_SIZE) {
            if chunk[0] == DESCRIPTOR_TERMINATOR {
                break;
            }
            if chunk.len() < DESCRIPTOR_SIZE {
                return Err(Error::DbfFormat(format!(
                    "{}: truncated field descriptor",
                    path.display()
                )));
            }
            let name_end = chunk[..11].iter().position(|b| *b == 0).unwrap_or(11);
            let name = String::from_utf8_lossy(&chunk[..name_end]).trim().to_string();
            let kind = FieldKind::from_type_byte(chunk[11]).ok_or_else(|| {
                Error::DbfFormat(format!(
                    "{}: unsupported field type '{}' on {}",
                    path.display(),
                    chunk[11] as char,
                    name
                ))
            })?;
            fields.push(FieldDescriptor {
                name,
                kind,
                length: chunk[16],
                decimals: chunk[17],
            });
        }

        if fields.is_empty() {
            return Err(Error::DbfFormat(format!(
                "{}: no field descriptors",
                path.display()
            )));
        }

        let payload: usize = fields.iter().map(|f| f.length as usize).sum();
        if payload + 1 != record_len as usize {
            return Err(Error::DbfFormat(format!(
                "{}: record length {} does not match field widths {}",
                path.display(),
                record_len,
                payload + 1
            )));
        }

        let mut offsets = Vec::with_capacity(fields.len());
        let mut cursor = 1usize; // past the deletion flag
        for field in &fields {
            offsets.push(cursor);
            cursor += field.length as usize;
        }

        Ok(Self {
            path,
            fields,
            offsets,
            record_count,
            header_len,
            record_len,
        })
    }

    /// Creates a new, empty table with the given layout.
    pub fn create(path: impl AsRef<Path>, fields: Vec<FieldDescriptor>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if fields.is_empty() {
            return Err(Error::DbfFormat("table needs at least one field".into()));
        }

        let record_len: usize = 1 + fields.iter().map(|f| f.length as usize).sum::<usize>();
        let header_len = HEADER_SIZE + fields.len() * DESCRIPTOR_SIZE + 1;

        let mut header = vec![0u8; HEADER_SIZE];
        header[0] = 0x03;
        let today = chrono::Utc::now().date_naive();
        header[1] = (today.format("%y").to_string().parse::<u16>().unwrap_or(0) % 100) as u8;
        header[2] = today.format("%m").to_string().parse::<u8>().unwrap_or(1);
        header[3] = today.format("%d").to_string().parse::<u8>().unwrap_or(1);
        header[8..10].copy_from_slice(&(header_len as u16).to_le_bytes());
        header[10..12].copy_from_slice(&(record_len as u16).to_le_bytes());

        let mut file = File::create(&path)?;
        file.write_all(&header)?;
        for field in &fields {
            let mut descriptor = [0u8; DESCRIPTOR_SIZE];
            let name_bytes = field.name.as_bytes();
            let copy_len = name_bytes.len().min(10);
            descriptor[..copy_len].copy_from_slice(&name_bytes[..copy_len]);
            descriptor[11] = match field.kind {
                FieldKind::Character => b'C',
                FieldKind::Numeric => b'N',
                FieldKind::Logical => b'L',
                FieldKind::Date => b'D',
            };
            descriptor[16] = field.length;
            descriptor[17] = field.decimals;
            file.write_all(&descriptor)?;
        }
        file.write_all(&[DESCRIPTOR_TERMINATOR])?;
        file.flush()?;

        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn record_count(&self) -> usize {
        self.record_count as usize
    }

    /// Position of a field by case-insensitive name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Opens a sequential reader over every physical record, including
    /// deleted ones (flagged).
    ///
    /// Read paths that surface data to consumers must skip `deleted` records;
    /// the flag is exposed so the service layer can do that in one place.
    pub fn iter_records(&self) -> Result<RecordIter> {
        let mut file = BufReader::new(File::open(&self.path)?);
        file.seek(SeekFrom::Start(self.header_len as u64))?;
        Ok(RecordIter {
            file,
            path: self.path.clone(),
            fields: self.fields.clone(),
            offsets: self.offsets.clone(),
            record_len: self.record_len as usize,
            remaining: self.record_count as usize,
            next_index: 0,
        })
    }

    /// Reads every physical record into memory. Convenience over
    /// [`DbfTable::iter_records`] for small tables and tests.
    pub fn read_records(&self) -> Result<Vec<RawRecord>> {
        Ok(self.iter_records()?.collect())
    }

    /// Appends one record. Values are positional and must match the layout.
    pub fn append_record(&mut self, values: &[CellValue]) -> Result<usize> {
        if values.len() != self.fields.len() {
            return Err(Error::DbfWrite(format!(
                "{}: expected {} values, got {}",
                self.path.display(),
                self.fields.len(),
                values.len()
            )));
        }

        let mut payload = Vec::with_capacity(self.record_len as usize);
        payload.push(FLAG_ACTIVE);
        for (value, field) in values.iter().zip(&self.fields) {
            payload.extend_from_slice(encode_field(value, field)?.as_bytes());
        }

        let mut file = open_read_write(&self.path)?;
        let position = self.header_len as u64 + self.record_count as u64 * self.record_len as u64;
        file.seek(SeekFrom::Start(position))?;
        file.write_all(&payload)?;

        self.record_count += 1;
        file.seek(SeekFrom::Start(4))?;
        file.write_all(&self.record_count.to_le_bytes())?;
        file.flush()?;

        Ok(self.record_count as usize - 1)
    }

    /// Writes one field of one record in place.
    ///
    /// Fails when the row is deleted or out of range, or when the value does
    /// not fit the field type. A locked file is retried once.
    pub fn write_cell(&self, row: usize, field_index: usize, value: &CellValue) -> Result<()> {
        if row >= self.record_count as usize {
            return Err(Error::DbfWrite(format!(
                "{}: row {} out of range ({} records)",
                self.path.display(),
                row,
                self.record_count
            )));
        }
        let field = self.fields.get(field_index).ok_or_else(|| {
            Error::DbfWrite(format!(
                "{}: no field at index {}",
                self.path.display(),
                field_index
            ))
        })?;
        let encoded = encode_field(value, field)?;

        let mut file = open_read_write(&self.path)?;
        let record_start = self.header_len as u64 + row as u64 * self.record_len as u64;

        let mut flag = [0u8; 1];
        file.seek(SeekFrom::Start(record_start))?;
        file.read_exact(&mut flag)?;
        if flag[0] == FLAG_DELETED {
            return Err(Error::DbfWrite(format!(
                "{}: row {} is marked deleted",
                self.path.display(),
                row
            )));
        }

        file.seek(SeekFrom::Start(record_start + self.offsets[field_index] as u64))?;
        file.write_all(encoded.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Flags a record as deleted. Readers will skip it from then on.
    pub fn delete_record(&self, row: usize) -> Result<()> {
        if row >= self.record_count as usize {
            return Err(Error::DbfWrite(format!(
                "{}: row {} out of range",
                self.path.display(),
                row
            )));
        }
        let mut file = open_read_write(&self.path)?;
        file.seek(SeekFrom::Start(
            self.header_len as u64 + row as u64 * self.record_len as u64,
        ))?;
        file.write_all(&[FLAG_DELETED])?;
        file.flush()?;
        Ok(())
    }
}

/// Opens the file for in-place writing, retrying once if another process
/// holds it (the legacy application keeps tables open while forms are up).
fn open_read_write(path: &Path) -> Result<File> {
    match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => Ok(file),
        Err(first) => {
            warn!(
                "{}: write open failed ({}), retrying once",
                path.display(),
                first
            );
            thread::sleep(WRITE_RETRY_DELAY);
            OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::DbfMissing(path.display().to_string())
                    } else {
                        Error::DbfWrite(format!("{}: {}", path.display(), e))
                    }
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn checks_layout() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor {
                name: "CCHECKNO".into(),
                kind: FieldKind::Character,
                length: 10,
                decimals: 0,
            },
            FieldDescriptor {
                name: "NAMOUNT".into(),
                kind: FieldKind::Numeric,
                length: 12,
                decimals: 2,
            },
            FieldDescriptor {
                name: "LCLEARED".into(),
                kind: FieldKind::Logical,
                length: 1,
                decimals: 0,
            },
            FieldDescriptor {
                name: "DCHECKDATE".into(),
                kind: FieldKind::Date,
                length: 8,
                decimals: 0,
            },
        ]
    }

    #[test]
    fn create_append_and_reopen_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("CHECKS.dbf");

        let mut table = DbfTable::create(&path, checks_layout()).unwrap();
        table
            .append_record(&[
                CellValue::Text("1001".into()),
                CellValue::Number(dec!(150.25)),
                CellValue::Bool(false),
                CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()),
            ])
            .unwrap();
        table
            .append_record(&[
                CellValue::Text("1002".into()),
                CellValue::Number(dec!(-20.00)),
                CellValue::Bool(true),
                CellValue::Null,
            ])
            .unwrap();

        let reopened = DbfTable::open(&path).unwrap();
        assert_eq!(reopened.record_count(), 2);
        let records = reopened.read_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].values[0], CellValue::Text("1001".into()));
        assert_eq!(records[0].values[1], CellValue::Number(dec!(150.25)));
        assert_eq!(records[0].values[2], CellValue::Bool(false));
        assert_eq!(
            records[0].values[3],
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert_eq!(records[1].values[3], CellValue::Null);
    }

    #[test]
    fn write_cell_updates_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("CHECKS.dbf");
        let mut table = DbfTable::create(&path, checks_layout()).unwrap();
        table
            .append_record(&[
                CellValue::Text("1001".into()),
                CellValue::Number(dec!(150.25)),
                CellValue::Bool(false),
                CellValue::Null,
            ])
            .unwrap();

        let cleared_index = table.field_index("LCLEARED").unwrap();
        table
            .write_cell(0, cleared_index, &CellValue::Bool(true))
            .unwrap();

        let records = DbfTable::open(&path).unwrap().read_records().unwrap();
        assert_eq!(records[0].values[cleared_index], CellValue::Bool(true));
        // Neighboring fields are untouched.
        assert_eq!(records[0].values[1], CellValue::Number(dec!(150.25)));
    }

    #[test]
    fn write_cell_refuses_deleted_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("CHECKS.dbf");
        let mut table = DbfTable::create(&path, checks_layout()).unwrap();
        table
            .append_record(&[
                CellValue::Text("1001".into()),
                CellValue::Number(dec!(1.00)),
                CellValue::Bool(false),
                CellValue::Null,
            ])
            .unwrap();
        table.delete_record(0).unwrap();

        let err = table
            .write_cell(0, 2, &CellValue::Bool(true))
            .unwrap_err();
        assert!(matches!(err, Error::DbfWrite(_)));
    }

    #[test]
    fn open_missing_file_is_a_distinct_error() {
        let dir = tempdir().unwrap();
        let err = DbfTable::open(dir.path().join("NOPE.dbf")).unwrap_err();
        assert!(matches!(err, Error::DbfMissing(_)));
    }

    #[test]
    fn open_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("BAD.dbf");
        std::fs::write(&path, b"not a table").unwrap();
        let err = DbfTable::open(&path).unwrap_err();
        assert!(matches!(err, Error::DbfFormat(_)));
    }
}
