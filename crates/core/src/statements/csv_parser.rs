//! Bank-statement CSV parsing and serialization.
//!
//! Statement exports differ across banks mostly in header spelling; columns
//! are matched case-insensitively against alias lists. Amounts and dates use
//! the same normalization rules as the DBF layer.

use csv::{ReaderBuilder, WriterBuilder};

use super::statements_model::{ParsedStatementRow, TransactionType};
use crate::dbf::{parse_amount, parse_date};
use crate::errors::{Error, Result, ValidationError};

const DATE_HEADERS: &[&str] = &["date", "transaction date", "posted date", "post date", "trans date"];
const DESCRIPTION_HEADERS: &[&str] = &["description", "memo", "payee", "details"];
const AMOUNT_HEADERS: &[&str] = &["amount", "transaction amount"];
const CHECK_NUMBER_HEADERS: &[&str] = &["check number", "check #", "check no", "checknum", "check"];
const BALANCE_HEADERS: &[&str] = &["balance", "running balance"];
const TYPE_HEADERS: &[&str] = &["type", "transaction type"];

struct ColumnMap {
    date: usize,
    description: usize,
    amount: usize,
    check_number: Option<usize>,
    balance: Option<usize>,
    transaction_type: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> Result<Self> {
        let find = |aliases: &[&str]| {
            headers.iter().position(|h| {
                let normalized = h.trim().to_lowercase();
                aliases.iter().any(|a| normalized == *a)
            })
        };

        let date = find(DATE_HEADERS).ok_or_else(|| missing("transaction date"))?;
        let description = find(DESCRIPTION_HEADERS).ok_or_else(|| missing("description"))?;
        let amount = find(AMOUNT_HEADERS).ok_or_else(|| missing("amount"))?;

        Ok(Self {
            date,
            description,
            amount,
            check_number: find(CHECK_NUMBER_HEADERS),
            balance: find(BALANCE_HEADERS),
            transaction_type: find(TYPE_HEADERS),
        })
    }
}

fn missing(what: &str) -> Error {
    Error::Validation(ValidationError::MissingField(format!(
        "statement CSV has no {} column",
        what
    )))
}

/// Parses a statement file into normalized rows.
///
/// Requirements: one header row; comma separated; double quotes for embedded
/// commas/quotes; an optional UTF-8 BOM is stripped. Empty trailing fields
/// are preserved as empty values, not dropped.
pub fn parse_statement_csv(content: &[u8]) -> Result<Vec<ParsedStatementRow>> {
    let content = strip_bom(content);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content);

    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(first) => first?.iter().map(|h| h.trim().to_string()).collect(),
        None => {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "statement CSV is empty".to_string(),
            )))
        }
    };
    let columns = ColumnMap::resolve(&headers)?;

    let mut rows = Vec::new();
    for (line, record) in records.enumerate() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let cell = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();

        let transaction_date = parse_date(&cell(columns.date)).map_err(|_| {
            Error::Validation(ValidationError::InvalidInput(format!(
                "row {}: unrecognized date '{}'",
                line + 2,
                cell(columns.date)
            )))
        })?;
        let amount = parse_amount(&cell(columns.amount)).map_err(|_| {
            Error::Validation(ValidationError::InvalidInput(format!(
                "row {}: unrecognized amount '{}'",
                line + 2,
                cell(columns.amount)
            )))
        })?;

        let check_number = columns
            .check_number
            .map(cell)
            .filter(|s| !s.is_empty());
        let balance = match columns.balance.map(cell).filter(|s| !s.is_empty()) {
            Some(raw) => Some(parse_amount(&raw)?),
            None => None,
        };

        // An explicit, recognizable type wins; otherwise derive it.
        let transaction_type = columns
            .transaction_type
            .map(cell)
            .as_deref()
            .and_then(TransactionType::parse)
            .unwrap_or_else(|| TransactionType::derive(check_number.as_deref(), amount));

        rows.push(ParsedStatementRow {
            transaction_date,
            check_number,
            description: cell(columns.description),
            amount,
            balance,
            transaction_type,
        });
    }

    if rows.is_empty() {
        return Err(Error::Validation(ValidationError::InvalidInput(
            "statement CSV has no data rows".to_string(),
        )));
    }
    Ok(rows)
}

/// Serializes rows back to the canonical statement CSV form.
///
/// Re-parsing the output yields the same normalized rows.
pub fn write_statement_csv(rows: &[ParsedStatementRow]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(["Date", "Check Number", "Description", "Amount", "Balance", "Type"])?;

    for row in rows {
        writer.write_record([
            row.transaction_date.format("%Y-%m-%d").to_string(),
            row.check_number.clone().unwrap_or_default(),
            row.description.clone(),
            row.amount.to_string(),
            row.balance.map(|b| b.to_string()).unwrap_or_default(),
            row.transaction_type.as_str().to_string(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| Error::Unexpected(e.to_string()))
}

fn strip_bom(content: &[u8]) -> &[u8] {
    content.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(content)
}
