//! Database model for reconciliation records.

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use log::warn;

use financialsx_core::reconciliation::{
    Reconciliation, ReconciliationStatus, SelectedCheck,
};

use crate::utils::to_decimal;

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::reconciliations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReconciliationDB {
    pub id: i32,
    pub company: String,
    pub account_number: String,
    pub reconcile_date: NaiveDate,
    pub beginning_balance: f64,
    pub statement_balance: f64,
    pub statement_credits: f64,
    pub statement_debits: f64,
    pub ending_balance: f64,
    pub selected_checks_json: String,
    pub status: String,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub committed_at: Option<NaiveDateTime>,
    pub dbf_row_index: Option<i32>,
    pub dbf_last_sync: Option<NaiveDateTime>,
    pub extended_data: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::reconciliations)]
pub struct NewReconciliationDB {
    pub company: String,
    pub account_number: String,
    pub reconcile_date: NaiveDate,
    pub beginning_balance: f64,
    pub statement_balance: f64,
    pub statement_credits: f64,
    pub statement_debits: f64,
    pub ending_balance: f64,
    pub selected_checks_json: String,
    pub status: String,
    pub created_by: String,
    pub committed_at: Option<NaiveDateTime>,
}

pub(crate) fn encode_selected_checks(checks: &[SelectedCheck]) -> String {
    serde_json::to_string(checks).unwrap_or_else(|_| "[]".to_string())
}

impl From<ReconciliationDB> for Reconciliation {
    fn from(db: ReconciliationDB) -> Self {
        let selected_checks: Vec<SelectedCheck> = serde_json::from_str(&db.selected_checks_json)
            .unwrap_or_else(|e| {
                warn!(
                    "reconciliation {}: unreadable selected checks ({}), treating as empty",
                    db.id, e
                );
                Vec::new()
            });
        Self {
            id: db.id,
            company: db.company,
            account_number: db.account_number,
            reconcile_date: db.reconcile_date,
            beginning_balance: to_decimal(db.beginning_balance),
            statement_balance: to_decimal(db.statement_balance),
            statement_credits: to_decimal(db.statement_credits),
            statement_debits: to_decimal(db.statement_debits),
            ending_balance: to_decimal(db.ending_balance),
            selected_checks,
            status: ReconciliationStatus::parse(&db.status)
                .unwrap_or(ReconciliationStatus::Draft),
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
            committed_at: db.committed_at,
            dbf_row_index: db.dbf_row_index,
            dbf_last_sync: db.dbf_last_sync,
            extended_data: db
                .extended_data
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
        }
    }
}
