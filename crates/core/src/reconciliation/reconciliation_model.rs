//! Reconciliation domain models.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result, ValidationError};

/// Lifecycle of a reconciliation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Draft,
    Committed,
    Archived,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationStatus::Draft => "draft",
            ReconciliationStatus::Committed => "committed",
            ReconciliationStatus::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(ReconciliationStatus::Draft),
            "committed" => Some(ReconciliationStatus::Committed),
            "archived" => Some(ReconciliationStatus::Archived),
            _ => None,
        }
    }
}

/// Snapshot of one check selected into a reconciliation.
///
/// Stored as JSON; the shape must round-trip exactly (strings, decimal
/// amounts, integer row indexes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCheck {
    pub check_id: String,
    pub check_number: String,
    pub amount: Decimal,
    pub check_date: Option<NaiveDate>,
    pub payee: String,
    pub dbf_row_index: Option<i64>,
}

/// A reconciliation record: statement amounts plus the selected checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub id: i32,
    pub company: String,
    pub account_number: String,
    pub reconcile_date: NaiveDate,
    pub beginning_balance: Decimal,
    pub statement_balance: Decimal,
    pub statement_credits: Decimal,
    pub statement_debits: Decimal,
    /// Stored, but always `beginning + credits - debits`.
    pub ending_balance: Decimal,
    pub selected_checks: Vec<SelectedCheck>,
    pub status: ReconciliationStatus,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub committed_at: Option<NaiveDateTime>,
    /// Physical CHECKREC row this record was synced to, when known.
    pub dbf_row_index: Option<i32>,
    pub dbf_last_sync: Option<NaiveDateTime>,
    /// Forward-compatible extras; opaque to the core.
    pub extended_data: Option<serde_json::Value>,
}

/// Input for creating or updating the single draft of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftReconciliation {
    pub company: String,
    pub account_number: String,
    pub reconcile_date: NaiveDate,
    pub beginning_balance: Decimal,
    pub statement_balance: Decimal,
    pub statement_credits: Decimal,
    pub statement_debits: Decimal,
    pub selected_checks: Vec<SelectedCheck>,
    pub created_by: String,
}

impl DraftReconciliation {
    /// The derived ending balance the stored row must agree with.
    pub fn ending_balance(&self) -> Decimal {
        self.beginning_balance + self.statement_credits - self.statement_debits
    }

    pub fn validate(&self) -> Result<()> {
        if self.company.trim().is_empty() {
            return Err(Error::Validation(ValidationError::MissingField(
                "company".to_string(),
            )));
        }
        if self.account_number.trim().is_empty() {
            return Err(Error::Validation(ValidationError::MissingField(
                "accountNumber".to_string(),
            )));
        }
        Ok(())
    }
}

/// Result of looking up the last committed reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum LastCommitted {
    /// Found in the store.
    Stored(Reconciliation),
    /// Rebuilt from the legacy CHECKREC table; not persisted.
    Recovered(RecoveredReconciliation),
    /// Neither store nor legacy data has one.
    NoData,
}

/// Normalized snapshot recovered from CHECKREC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredReconciliation {
    pub account_number: String,
    pub reconcile_date: NaiveDate,
    pub beginning_balance: Decimal,
    pub ending_balance: Decimal,
    pub cleared_count: i32,
    pub cleared_amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ending_balance_is_beginning_plus_credits_minus_debits() {
        let draft = DraftReconciliation {
            company: "ACME".into(),
            account_number: "1000".into(),
            reconcile_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            beginning_balance: dec!(1000.00),
            statement_balance: dec!(1150.00),
            statement_credits: dec!(400.00),
            statement_debits: dec!(250.00),
            selected_checks: Vec::new(),
            created_by: "alice".into(),
        };
        assert_eq!(draft.ending_balance(), dec!(1150.00));
    }

    #[test]
    fn selected_checks_round_trip_through_json() {
        let checks = vec![
            SelectedCheck {
                check_id: "A1".into(),
                check_number: "1001".into(),
                amount: dec!(50.25),
                check_date: NaiveDate::from_ymd_opt(2024, 1, 10),
                payee: "Smith Supply".into(),
                dbf_row_index: Some(7),
            },
            SelectedCheck {
                check_id: "1000|1002|20|".into(),
                check_number: "1002".into(),
                amount: dec!(20.00),
                check_date: None,
                payee: String::new(),
                dbf_row_index: None,
            },
        ];
        let json = serde_json::to_string(&checks).unwrap();
        let back: Vec<SelectedCheck> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checks);
    }

    #[test]
    fn status_parses_its_own_wire_form() {
        for status in [
            ReconciliationStatus::Draft,
            ReconciliationStatus::Committed,
            ReconciliationStatus::Archived,
        ] {
            assert_eq!(ReconciliationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReconciliationStatus::parse("open"), None);
    }
}
