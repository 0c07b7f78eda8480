//! Table-oriented read/write surface over the legacy DBF directories.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::debug;
use serde::{Deserialize, Serialize};

use super::codec::{DbfTable, RecordIter};
use super::paths::resolve_company_dir;
use super::value::CellValue;
use crate::errors::{Error, Result};

/// Sort direction for [`ReadOptions::sort_col`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// Options for a paged table read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOptions {
    pub search: Option<String>,
    pub offset: usize,
    pub limit: usize,
    pub sort_col: Option<String>,
    pub sort_dir: SortDir,
}

/// One table row with resolved field names. `index` is the physical record
/// position used for in-place updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbfRow {
    pub index: usize,
    pub values: HashMap<String, CellValue>,
}

impl DbfRow {
    /// Case-insensitive field lookup (keys are stored uppercased).
    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.values.get(&name.to_ascii_uppercase())
    }

    pub fn text(&self, name: &str) -> String {
        match self.get(name) {
            Some(CellValue::Text(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => String::new(),
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name).map(CellValue::as_bool).unwrap_or(false)
    }

    pub fn number(&self, name: &str) -> rust_decimal::Decimal {
        self.get(name)
            .and_then(CellValue::as_number)
            .unwrap_or_default()
    }

    pub fn date(&self, name: &str) -> Option<chrono::NaiveDate> {
        self.get(name).and_then(CellValue::as_date)
    }
}

/// A page of table data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbfPage {
    /// Field names in on-disk order.
    pub columns: Vec<String>,
    pub rows: Vec<DbfRow>,
    /// Count of rows matching the search, before paging.
    pub total: usize,
}

/// Streaming view of a table: non-deleted rows in physical order.
pub struct DbfStream {
    columns: Vec<String>,
    inner: RecordIter,
}

impl DbfStream {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of a column by case-insensitive name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// First matching column from an alias list.
    pub fn resolve_column(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| self.column_index(alias))
    }
}

impl Iterator for DbfStream {
    type Item = (usize, Vec<CellValue>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = self.inner.next()?;
            if record.deleted {
                continue;
            }
            return Some((record.index, record.values));
        }
    }
}

/// Read/write access to a company's legacy tables.
///
/// Stateless; each operation resolves the company directory and opens the
/// table for just that call, since the files are shared with the legacy
/// application.
#[derive(Debug, Clone, Default)]
pub struct DbfService;

impl DbfService {
    pub fn new() -> Self {
        Self
    }

    /// Lists table names in the company directory, `.dbf` stripped, sorted
    /// case-insensitively.
    pub fn list_tables(&self, company: &str) -> Result<Vec<String>> {
        let dir = resolve_company_dir(company)?;
        let entries = fs::read_dir(&dir)
            .map_err(|_| Error::NotFound(format!("company directory {}", dir.display())))?;

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.to_ascii_lowercase().ends_with(".dbf") {
                    Some(name[..name.len() - 4].to_string())
                } else {
                    None
                }
            })
            .collect();
        names.sort_by_key(|n| n.to_ascii_uppercase());
        Ok(names)
    }

    /// Reads a page of a table with optional search and sort.
    pub fn read_table(&self, company: &str, name: &str, options: &ReadOptions) -> Result<DbfPage> {
        let table = self.open_table(company, name)?;
        let columns: Vec<String> = table.fields().iter().map(|f| f.name.clone()).collect();

        let mut rows: Vec<DbfRow> = table
            .iter_records()?
            .filter(|r| !r.deleted)
            .map(|r| to_row(&columns, r.index, r.values))
            .collect();

        if let Some(search) = options.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let needle = search.to_lowercase();
            rows.retain(|row| {
                row.values
                    .values()
                    .any(|v| v.to_string().to_lowercase().contains(&needle))
            });
        }

        if let Some(sort_col) = options.sort_col.as_deref() {
            let key = sort_col.to_ascii_uppercase();
            rows.sort_by(|a, b| {
                let ordering = compare_cells(a.values.get(&key), b.values.get(&key));
                match options.sort_dir {
                    SortDir::Asc => ordering,
                    SortDir::Desc => ordering.reverse(),
                }
            });
        }

        let total = rows.len();
        let rows: Vec<DbfRow> = rows
            .into_iter()
            .skip(options.offset)
            .take(if options.limit == 0 {
                usize::MAX
            } else {
                options.limit
            })
            .collect();

        debug!(
            "read {}/{}: {} of {} rows (offset {})",
            company,
            name,
            rows.len(),
            total,
            options.offset
        );
        Ok(DbfPage {
            columns,
            rows,
            total,
        })
    }

    /// Writes one field of one row in place.
    pub fn update_cell(
        &self,
        company: &str,
        name: &str,
        row_index: usize,
        col_index: usize,
        value: &CellValue,
    ) -> Result<()> {
        let table = self.open_table(company, name)?;
        table.write_cell(row_index, col_index, value)
    }

    /// Opens a forward-only stream of non-deleted rows.
    pub fn open_stream(&self, company: &str, name: &str) -> Result<DbfStream> {
        let table = self.open_table(company, name)?;
        let columns = table.fields().iter().map(|f| f.name.clone()).collect();
        Ok(DbfStream {
            columns,
            inner: table.iter_records()?,
        })
    }

    /// Opens a table by name, matching the file case-insensitively.
    pub fn open_table(&self, company: &str, name: &str) -> Result<DbfTable> {
        let dir = resolve_company_dir(company)?;
        DbfTable::open(self.table_path(&dir, name)?)
    }

    fn table_path(&self, dir: &PathBuf, name: &str) -> Result<PathBuf> {
        let base = name.trim().trim_end_matches(".dbf").trim_end_matches(".DBF");
        let direct = dir.join(format!("{}.dbf", base));
        if direct.is_file() {
            return Ok(direct);
        }
        // The legacy tools are inconsistent about filename case.
        let wanted = format!("{}.dbf", base).to_ascii_lowercase();
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let file_name = entry.file_name().to_string_lossy().to_string();
                if file_name.to_ascii_lowercase() == wanted {
                    return Ok(entry.path());
                }
            }
        }
        Err(Error::DbfMissing(format!(
            "{} in {}",
            name,
            dir.display()
        )))
    }
}

fn to_row(columns: &[String], index: usize, values: Vec<CellValue>) -> DbfRow {
    let mut map = HashMap::with_capacity(columns.len());
    for (column, value) in columns.iter().zip(values) {
        map.insert(column.to_ascii_uppercase(), value);
    }
    DbfRow { index, values: map }
}

/// Total order over heterogeneous cells: nulls first, then flags, numbers,
/// dates, text.
fn compare_cells(a: Option<&CellValue>, b: Option<&CellValue>) -> Ordering {
    fn rank(v: Option<&CellValue>) -> u8 {
        match v {
            None | Some(CellValue::Null) => 0,
            Some(CellValue::Bool(_)) => 1,
            Some(CellValue::Number(_)) => 2,
            Some(CellValue::Date(_)) => 3,
            Some(CellValue::Text(_)) => 4,
        }
    }

    match (a, b) {
        (Some(CellValue::Bool(x)), Some(CellValue::Bool(y))) => x.cmp(y),
        (Some(CellValue::Number(x)), Some(CellValue::Number(y))) => x.cmp(y),
        (Some(CellValue::Date(x)), Some(CellValue::Date(y))) => x.cmp(y),
        (Some(CellValue::Text(x)), Some(CellValue::Text(y))) => {
            x.to_lowercase().cmp(&y.to_lowercase())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
