//! Domain model for rows of the legacy checks register.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a physical check row.
///
/// `CIDCHEC` uniquely identifies a check when the legacy data carries it;
/// older data falls back to the `(account, number, amount, date)` composite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckId {
    Legacy(String),
    Composite {
        account: String,
        check_number: String,
        amount: String,
        check_date: String,
    },
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckId::Legacy(id) => write!(f, "{}", id),
            CheckId::Composite {
                account,
                check_number,
                amount,
                check_date,
            } => write!(f, "{}|{}|{}|{}", account, check_number, amount, check_date),
        }
    }
}

/// One row of the CHECKS table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    /// Physical record position, used for in-place updates.
    pub row_index: usize,
    pub check_number: String,
    pub amount: Decimal,
    pub payee: String,
    pub check_date: Option<NaiveDate>,
    pub account: String,
    pub cleared: bool,
    pub void: bool,
    pub batch: Option<String>,
    /// The legacy per-check unique identifier (`CIDCHEC`), when present.
    pub legacy_id: Option<String>,
}

impl CheckRecord {
    /// A check is outstanding iff it is neither cleared nor void.
    pub fn is_outstanding(&self) -> bool {
        !self.cleared && !self.void
    }

    /// Stable identity for matching and audit rows.
    pub fn id(&self) -> CheckId {
        match self.legacy_id.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(id) => CheckId::Legacy(id.trim().to_string()),
            None => CheckId::Composite {
                account: self.account.clone(),
                check_number: self.check_number.clone(),
                amount: self.amount.normalize().to_string(),
                check_date: self
                    .check_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn check() -> CheckRecord {
        CheckRecord {
            row_index: 0,
            check_number: "1001".into(),
            amount: dec!(50.00),
            payee: "Smith Supply".into(),
            check_date: NaiveDate::from_ymd_opt(2024, 1, 10),
            account: "1000".into(),
            cleared: false,
            void: false,
            batch: None,
            legacy_id: None,
        }
    }

    #[test]
    fn outstanding_requires_neither_cleared_nor_void() {
        assert!(check().is_outstanding());
        assert!(!CheckRecord {
            cleared: true,
            ..check()
        }
        .is_outstanding());
        assert!(!CheckRecord {
            void: true,
            ..check()
        }
        .is_outstanding());
    }

    #[test]
    fn identity_prefers_the_legacy_id() {
        let with_id = CheckRecord {
            legacy_id: Some("ABC123".into()),
            ..check()
        };
        assert_eq!(with_id.id().to_string(), "ABC123");

        // Blank legacy ids fall back to the composite.
        let blank = CheckRecord {
            legacy_id: Some("   ".into()),
            ..check()
        };
        assert_eq!(blank.id().to_string(), "1000|1001|50|2024-01-10");
    }
}
