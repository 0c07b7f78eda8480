//! Database models for cached balances and their history.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use financialsx_core::balances::{BalanceHistoryEntry, CachedBalance, ChangeType};

use crate::utils::to_decimal;

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::account_balances)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AccountBalanceDB {
    pub id: i32,
    pub company: String,
    pub account_number: String,
    pub account_name: Option<String>,
    pub gl_balance: f64,
    pub gl_record_count: i32,
    pub gl_last_updated: Option<NaiveDateTime>,
    pub outstanding_total: f64,
    pub outstanding_count: i32,
    pub outstanding_last_updated: Option<NaiveDateTime>,
    pub bank_balance: f64,
    pub is_active: bool,
    pub is_bank_account: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Insert form: the id, the generated bank balance, and the timestamp
/// defaults stay with the database.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::account_balances)]
pub struct NewAccountBalanceDB {
    pub company: String,
    pub account_number: String,
    pub account_name: Option<String>,
    pub gl_balance: f64,
    pub gl_record_count: i32,
    pub gl_last_updated: Option<NaiveDateTime>,
    pub outstanding_total: f64,
    pub outstanding_count: i32,
    pub outstanding_last_updated: Option<NaiveDateTime>,
    pub is_active: bool,
    pub is_bank_account: bool,
}

impl From<AccountBalanceDB> for CachedBalance {
    fn from(db: AccountBalanceDB) -> Self {
        Self {
            id: db.id,
            company: db.company,
            account_number: db.account_number,
            account_name: db.account_name,
            gl_balance: to_decimal(db.gl_balance),
            gl_record_count: db.gl_record_count,
            gl_last_updated: db.gl_last_updated,
            outstanding_total: to_decimal(db.outstanding_total),
            outstanding_count: db.outstanding_count,
            outstanding_last_updated: db.outstanding_last_updated,
            bank_balance: to_decimal(db.bank_balance),
            is_active: db.is_active,
            is_bank_account: db.is_bank_account,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::balance_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BalanceHistoryDB {
    pub id: i32,
    pub balance_id: i32,
    pub company: String,
    pub account_number: String,
    pub change_type: String,
    pub old_gl_balance: Option<f64>,
    pub new_gl_balance: Option<f64>,
    pub old_outstanding_total: Option<f64>,
    pub new_outstanding_total: Option<f64>,
    pub old_bank_balance: Option<f64>,
    pub new_bank_balance: Option<f64>,
    pub reason: Option<String>,
    pub changed_by: String,
    pub changed_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::balance_history)]
pub struct NewBalanceHistoryDB {
    pub balance_id: i32,
    pub company: String,
    pub account_number: String,
    pub change_type: String,
    pub old_gl_balance: Option<f64>,
    pub new_gl_balance: Option<f64>,
    pub old_outstanding_total: Option<f64>,
    pub new_outstanding_total: Option<f64>,
    pub old_bank_balance: Option<f64>,
    pub new_bank_balance: Option<f64>,
    pub reason: Option<String>,
    pub changed_by: String,
}

impl From<BalanceHistoryDB> for BalanceHistoryEntry {
    fn from(db: BalanceHistoryDB) -> Self {
        Self {
            id: db.id,
            balance_id: db.balance_id,
            company: db.company,
            account_number: db.account_number,
            change_type: ChangeType::parse(&db.change_type).unwrap_or(ChangeType::ManualAdjustment),
            old_gl_balance: db.old_gl_balance.map(to_decimal),
            new_gl_balance: db.new_gl_balance.map(to_decimal),
            old_outstanding_total: db.old_outstanding_total.map(to_decimal),
            new_outstanding_total: db.new_outstanding_total.map(to_decimal),
            old_bank_balance: db.old_bank_balance.map(to_decimal),
            new_bank_balance: db.new_bank_balance.map(to_decimal),
            reason: db.reason,
            changed_by: db.changed_by,
            changed_at: db.changed_at,
        }
    }
}
