//! Bank statement and transaction domain models.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MIN_MATCH_SCORE;

/// Classification of one statement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Check,
    Deposit,
    Debit,
    Credit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Check => "Check",
            TransactionType::Deposit => "Deposit",
            TransactionType::Debit => "Debit",
            TransactionType::Credit => "Credit",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "check" => Some(TransactionType::Check),
            "deposit" => Some(TransactionType::Deposit),
            "debit" => Some(TransactionType::Debit),
            "credit" => Some(TransactionType::Credit),
            _ => None,
        }
    }

    /// The derivation used when the statement file carries no usable type:
    /// a check number makes it a check; otherwise the sign decides.
    pub fn derive(check_number: Option<&str>, amount: Decimal) -> Self {
        match check_number.map(str::trim).filter(|s| !s.is_empty()) {
            Some(_) => TransactionType::Check,
            None if amount >= Decimal::ZERO => TransactionType::Credit,
            None => TransactionType::Debit,
        }
    }
}

/// How a transaction-to-check link was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    AmountExact,
    HighConfidence,
    Fuzzy,
    Manual,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::AmountExact => "amount_exact",
            MatchType::HighConfidence => "high_confidence",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "exact" => Some(MatchType::Exact),
            "amount_exact" => Some(MatchType::AmountExact),
            "high_confidence" => Some(MatchType::HighConfidence),
            "fuzzy" => Some(MatchType::Fuzzy),
            "manual" => Some(MatchType::Manual),
            _ => None,
        }
    }
}

/// One imported statement: the batch header row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankStatement {
    pub id: i32,
    pub company: String,
    pub account_number: String,
    pub statement_date: NaiveDate,
    /// Unique id grouping the transactions of one import.
    pub batch_id: String,
    pub beginning_balance: Decimal,
    pub ending_balance: Decimal,
    pub transaction_count: i32,
    pub matched_count: i32,
    pub is_active: bool,
    pub reconciliation_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One imported statement line with its matching state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransaction {
    pub id: i32,
    pub statement_id: i32,
    pub batch_id: String,
    pub transaction_date: NaiveDate,
    pub check_number: Option<String>,
    pub description: String,
    pub amount: Decimal,
    pub transaction_type: TransactionType,

    pub matched_check_id: Option<String>,
    pub matched_dbf_row_index: Option<i64>,
    pub match_confidence: Decimal,
    pub match_type: Option<MatchType>,
    pub is_matched: bool,
    pub manually_matched: bool,

    pub is_reconciled: bool,
    pub reconciled_date: Option<NaiveDateTime>,
    pub reconciliation_id: Option<i32>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One parsed statement row, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedStatementRow {
    pub transaction_date: NaiveDate,
    pub check_number: Option<String>,
    pub description: String,
    pub amount: Decimal,
    pub balance: Option<Decimal>,
    pub transaction_type: TransactionType,
}

/// Input for persisting one import batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementImport {
    pub company: String,
    pub account_number: String,
    pub statement_date: NaiveDate,
    pub batch_id: String,
    pub beginning_balance: Decimal,
    pub ending_balance: Decimal,
    /// Delete a prior statement for the same `(company, account, date)`
    /// instead of failing with `AlreadyExists`.
    pub replace: bool,
    pub rows: Vec<ParsedStatementRow>,
}

/// A persisted import: the statement plus its transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub statement: BankStatement,
    pub transactions: Vec<BankTransaction>,
}

/// Options for one matching run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOptions {
    /// Restrict candidates to checks dated on or before `statement_date`.
    pub limit_to_statement_date: bool,
    pub statement_date: Option<NaiveDate>,
    /// Offer void checks as candidates (normally excluded).
    pub include_void_checks: bool,
    pub min_match_score: Decimal,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            limit_to_statement_date: false,
            statement_date: None,
            include_void_checks: false,
            min_match_score: DEFAULT_MIN_MATCH_SCORE,
        }
    }
}

/// One match decision to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchUpdate {
    pub transaction_id: i32,
    pub matched_check_id: String,
    pub matched_dbf_row_index: i64,
    pub match_confidence: Decimal,
    pub match_type: MatchType,
}

/// Result of a matching run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRunSummary {
    pub transactions_considered: usize,
    pub checks_considered: usize,
    pub matched: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn transaction_type_derivation_follows_check_number_then_sign() {
        assert_eq!(
            TransactionType::derive(Some("1001"), dec!(-50)),
            TransactionType::Check
        );
        assert_eq!(
            TransactionType::derive(Some("  "), dec!(25)),
            TransactionType::Credit
        );
        assert_eq!(
            TransactionType::derive(None, dec!(-25)),
            TransactionType::Debit
        );
        assert_eq!(
            TransactionType::derive(None, Decimal::ZERO),
            TransactionType::Credit
        );
    }

    #[test]
    fn match_type_wire_form_round_trips() {
        for mt in [
            MatchType::Exact,
            MatchType::AmountExact,
            MatchType::HighConfidence,
            MatchType::Fuzzy,
            MatchType::Manual,
        ] {
            assert_eq!(MatchType::parse(mt.as_str()), Some(mt));
        }
    }
}
