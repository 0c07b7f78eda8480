//! Database models for bank statements and transactions.

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

use financialsx_core::statements::{BankStatement, BankTransaction, MatchType, TransactionType};

use crate::utils::to_decimal;

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::bank_statements)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BankStatementDB {
    pub id: i32,
    pub company: String,
    pub account_number: String,
    pub statement_date: NaiveDate,
    pub batch_id: String,
    pub beginning_balance: f64,
    pub ending_balance: f64,
    pub transaction_count: i32,
    pub matched_count: i32,
    pub is_active: bool,
    pub reconciliation_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::bank_statements)]
pub struct NewBankStatementDB {
    pub company: String,
    pub account_number: String,
    pub statement_date: NaiveDate,
    pub batch_id: String,
    pub beginning_balance: f64,
    pub ending_balance: f64,
    pub transaction_count: i32,
    pub matched_count: i32,
    pub is_active: bool,
}

impl From<BankStatementDB> for BankStatement {
    fn from(db: BankStatementDB) -> Self {
        Self {
            id: db.id,
            company: db.company,
            account_number: db.account_number,
            statement_date: db.statement_date,
            batch_id: db.batch_id,
            beginning_balance: to_decimal(db.beginning_balance),
            ending_balance: to_decimal(db.ending_balance),
            transaction_count: db.transaction_count,
            matched_count: db.matched_count,
            is_active: db.is_active,
            reconciliation_id: db.reconciliation_id,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::bank_transactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BankTransactionDB {
    pub id: i32,
    pub statement_id: i32,
    pub batch_id: String,
    pub transaction_date: NaiveDate,
    pub check_number: Option<String>,
    pub description: String,
    pub amount: f64,
    pub transaction_type: String,
    pub matched_check_id: Option<String>,
    pub matched_dbf_row_index: Option<i64>,
    pub match_confidence: f64,
    pub match_type: Option<String>,
    pub is_matched: bool,
    pub manually_matched: bool,
    pub is_reconciled: bool,
    pub reconciled_date: Option<NaiveDateTime>,
    pub reconciliation_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::bank_transactions)]
pub struct NewBankTransactionDB {
    pub statement_id: i32,
    pub batch_id: String,
    pub transaction_date: NaiveDate,
    pub check_number: Option<String>,
    pub description: String,
    pub amount: f64,
    pub transaction_type: String,
}

impl From<BankTransactionDB> for BankTransaction {
    fn from(db: BankTransactionDB) -> Self {
        Self {
            id: db.id,
            statement_id: db.statement_id,
            batch_id: db.batch_id,
            transaction_date: db.transaction_date,
            check_number: db.check_number,
            description: db.description,
            amount: to_decimal(db.amount),
            transaction_type: TransactionType::parse(&db.transaction_type)
                .unwrap_or(TransactionType::Debit),
            matched_check_id: db.matched_check_id,
            matched_dbf_row_index: db.matched_dbf_row_index,
            match_confidence: to_decimal(db.match_confidence),
            match_type: db.match_type.as_deref().and_then(MatchType::parse),
            is_matched: db.is_matched,
            manually_matched: db.manually_matched,
            is_reconciled: db.is_reconciled,
            reconciled_date: db.reconciled_date,
            reconciliation_id: db.reconciliation_id,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
