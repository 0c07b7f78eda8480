//! Normalized cell values and the parsing rules for legacy field data.
//!
//! Every consumer of DBF data sees values through [`CellValue`]; the duck-typed
//! decoding of logical flags, formatted amounts, and multi-format dates lives
//! here and nowhere else.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result, ValidationError};

/// Field type taxonomy of the legacy tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Character,
    Numeric,
    Logical,
    Date,
}

impl FieldKind {
    /// Maps a dBASE field-type byte to a kind. `F` (float) rows normalize
    /// through the same numeric path as `N`.
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            b'C' => Some(FieldKind::Character),
            b'N' | b'F' => Some(FieldKind::Numeric),
            b'L' => Some(FieldKind::Logical),
            b'D' => Some(FieldKind::Date),
            _ => None,
        }
    }
}

/// Descriptor for one column of a legacy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub length: u8,
    pub decimals: u8,
}

/// A normalized value read from (or written to) a legacy table cell.
///
/// The string-map row shape is acceptable as a transport type at the service
/// boundary, but balance and matching logic only ever consume these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Text(String),
    Number(Decimal),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Logical view of the cell. Missing and non-logical values read as false,
    /// matching how the legacy forms treat blank flags.
    pub fn as_bool(&self) -> bool {
        match self {
            CellValue::Bool(b) => *b,
            CellValue::Text(s) => parse_logical(s),
            CellValue::Number(n) => !n.is_zero(),
            _ => false,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            CellValue::Text(s) => parse_date(s).ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Bool(b) => write!(f, "{}", if *b { ".T." } else { ".F." }),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Null => Ok(()),
        }
    }
}

/// Parses a raw character field: trailing padding is stripped.
pub fn normalize_text(raw: &str) -> String {
    raw.trim_end().to_string()
}

/// Parses a legacy logical flag.
///
/// Accepts `t`, `.t.`, `true`, `yes`, `y` and `1` (any case) as true;
/// everything else, including blanks and `?`, is false.
pub fn parse_logical(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "t" | ".t." | "true" | "yes" | "y" | "1"
    )
}

/// Parses a legacy numeric field into a [`Decimal`].
///
/// Commas are stripped and parentheses denote negation, so `(1,234.50)`
/// parses as `-1234.50`. A blank field parses as zero.
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let (body, negate) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (&trimmed[1..trimmed.len() - 1], true)
    } else {
        (trimmed, false)
    };

    let cleaned: String = body
        .chars()
        .filter(|c| *c != ',' && *c != '$')
        .collect::<String>();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let value = Decimal::from_str(cleaned).map_err(|_| {
        Error::Validation(ValidationError::InvalidInput(format!(
            "not a numeric value: '{}'",
            raw
        )))
    })?;

    Ok(if negate { -value } else { value })
}

/// The date formats the legacy stack emits, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%Y%m%d"];

/// Parses a legacy date field.
///
/// Accepted formats: `YYYY-MM-DD`, `MM/DD/YYYY` (single-digit month/day
/// allowed), `YYYY/MM/DD`, `YYYYMMDD`. Anything else is rejected.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(ValidationError::UnrecognizedDate(
            raw.to_string(),
        )));
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }

    Err(Error::Validation(ValidationError::UnrecognizedDate(
        raw.to_string(),
    )))
}

/// Normalizes one raw field payload according to its declared kind.
///
/// Empty numeric and date payloads normalize to [`CellValue::Null`] rather
/// than zero values, so callers can distinguish "blank" from "0".
pub fn normalize_field(raw: &str, kind: FieldKind) -> Result<CellValue> {
    match kind {
        FieldKind::Character => Ok(CellValue::Text(normalize_text(raw))),
        FieldKind::Logical => Ok(CellValue::Bool(parse_logical(raw))),
        FieldKind::Numeric => {
            if raw.trim().is_empty() {
                Ok(CellValue::Null)
            } else {
                Ok(CellValue::Number(parse_amount(raw)?))
            }
        }
        FieldKind::Date => {
            if raw.trim().is_empty() {
                Ok(CellValue::Null)
            } else {
                Ok(CellValue::Date(parse_date(raw)?))
            }
        }
    }
}

/// Renders a [`CellValue`] into the fixed-width payload for a field of the
/// given descriptor. Fails when the value is incompatible with the field type
/// or too wide for the field.
pub fn encode_field(value: &CellValue, field: &FieldDescriptor) -> Result<String> {
    let width = field.length as usize;
    let rendered = match (field.kind, value) {
        (FieldKind::Character, CellValue::Text(s)) => {
            if s.len() > width {
                return Err(Error::DbfWrite(format!(
                    "value too wide for {} ({} > {})",
                    field.name,
                    s.len(),
                    width
                )));
            }
            format!("{:<width$}", s, width = width)
        }
        (FieldKind::Character, CellValue::Null) => " ".repeat(width),
        (FieldKind::Logical, value) => {
            let flag = match value {
                CellValue::Bool(b) => *b,
                CellValue::Text(s) => parse_logical(s),
                CellValue::Null => false,
                _ => {
                    return Err(Error::DbfWrite(format!(
                        "cannot store {:?} in logical field {}",
                        value, field.name
                    )))
                }
            };
            let mut out = " ".repeat(width);
            out.replace_range(0..1, if flag { "T" } else { "F" });
            out
        }
        (FieldKind::Numeric, CellValue::Number(n)) => {
            let body = format!("{:.prec$}", n, prec = field.decimals as usize);
            if body.len() > width {
                return Err(Error::DbfWrite(format!(
                    "value {} too wide for {}",
                    n, field.name
                )));
            }
            format!("{:>width$}", body, width = width)
        }
        (FieldKind::Numeric, CellValue::Text(s)) => {
            let parsed = parse_amount(s)?;
            return encode_field(&CellValue::Number(parsed), field);
        }
        (FieldKind::Numeric, CellValue::Null) => " ".repeat(width),
        (FieldKind::Date, CellValue::Date(d)) => d.format("%Y%m%d").to_string(),
        (FieldKind::Date, CellValue::Text(s)) => {
            let parsed = parse_date(s)?;
            return encode_field(&CellValue::Date(parsed), field);
        }
        (FieldKind::Date, CellValue::Null) => " ".repeat(width),
        (kind, value) => {
            return Err(Error::DbfWrite(format!(
                "cannot store {:?} in {:?} field {}",
                value, kind, field.name
            )))
        }
    };
    Ok(rendered)
}
