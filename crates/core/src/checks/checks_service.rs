use log::{info, warn};

use super::checks_model::CheckRecord;
use crate::constants::CHECKS_TABLE;
use crate::dbf::{CellValue, DbfService};
use crate::errors::{Error, Result};

/// Scans and updates the legacy checks register.
///
/// This is the only component that writes `LCLEARED`; everything else goes
/// through it so the cleared/void decoding stays in one place.
#[derive(Debug, Clone, Default)]
pub struct ChecksService {
    dbf: DbfService,
}

impl ChecksService {
    pub fn new(dbf: DbfService) -> Self {
        Self { dbf }
    }

    /// Reads all non-deleted check rows, optionally filtered by account.
    pub fn scan(&self, company: &str, account: Option<&str>) -> Result<Vec<CheckRecord>> {
        let stream = self.dbf.open_stream(company, CHECKS_TABLE)?;

        let number_idx = stream.column_index("CCHECKNO");
        let amount_idx = stream.column_index("NAMOUNT");
        let account_idx = stream.column_index("CACCTNO");
        let cleared_idx = stream.column_index("LCLEARED");
        let void_idx = stream.column_index("LVOID");
        let date_idx = stream.column_index("DCHECKDATE");
        let payee_idx = stream.column_index("CPAYEE");
        let id_idx = stream.column_index("CIDCHEC");
        let batch_idx = stream.column_index("CBATCH");

        let wanted = account.map(str::trim);
        let mut records = Vec::new();
        for (row_index, values) in stream {
            let get = |idx: Option<usize>| idx.and_then(|i| values.get(i));

            let row_account = get(account_idx)
                .map(|v| v.to_string().trim().to_string())
                .unwrap_or_default();
            if let Some(wanted) = wanted {
                if !row_account.eq_ignore_ascii_case(wanted) {
                    continue;
                }
            }

            let record = CheckRecord {
                row_index,
                check_number: get(number_idx)
                    .map(|v| v.to_string().trim().to_string())
                    .unwrap_or_default(),
                amount: get(amount_idx)
                    .and_then(CellValue::as_number)
                    .unwrap_or_default(),
                payee: get(payee_idx)
                    .map(|v| v.to_string().trim().to_string())
                    .unwrap_or_default(),
                check_date: get(date_idx).and_then(CellValue::as_date),
                account: row_account,
                cleared: get(cleared_idx).map(CellValue::as_bool).unwrap_or(false),
                void: get(void_idx).map(CellValue::as_bool).unwrap_or(false),
                batch: get(batch_idx)
                    .map(|v| v.to_string().trim().to_string())
                    .filter(|s| !s.is_empty()),
                legacy_id: get(id_idx)
                    .map(|v| v.to_string().trim().to_string())
                    .filter(|s| !s.is_empty()),
            };

            if record.void && !record.amount.is_zero() {
                warn!(
                    "check {} in {} is void with non-zero amount {}",
                    record.check_number, company, record.amount
                );
            }

            records.push(record);
        }
        Ok(records)
    }

    /// Reads only outstanding rows (`!cleared && !void`).
    pub fn scan_outstanding(&self, company: &str, account: Option<&str>) -> Result<Vec<CheckRecord>> {
        Ok(self
            .scan(company, account)?
            .into_iter()
            .filter(CheckRecord::is_outstanding)
            .collect())
    }

    /// Sets `LCLEARED` on the given physical rows.
    ///
    /// Clearing an already-cleared row is a no-op at the file level, so a
    /// partial failure can be repaired by re-running with the same set.
    pub fn clear_checks(&self, company: &str, row_indexes: &[usize]) -> Result<()> {
        if row_indexes.is_empty() {
            return Ok(());
        }
        let table = self.dbf.open_table(company, CHECKS_TABLE)?;
        let cleared_idx = table
            .field_index("LCLEARED")
            .ok_or_else(|| Error::DbfSchema("CHECKS has no LCLEARED".to_string()))?;

        for row in row_indexes {
            table.write_cell(*row, cleared_idx, &CellValue::Bool(true))?;
        }
        info!(
            "cleared {} check rows in {}/{}",
            row_indexes.len(),
            company,
            CHECKS_TABLE
        );
        Ok(())
    }
}
