//! Repository for reconciliation records.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use financialsx_core::errors::{Error, Result};
use financialsx_core::reconciliation::{
    DraftReconciliation, Reconciliation, ReconciliationRepositoryTrait, ReconciliationStatus,
    RecoveredReconciliation,
};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::reconciliations;
use crate::utils::to_f64;

use super::model::{encode_selected_checks, NewReconciliationDB, ReconciliationDB};

pub struct ReconciliationRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl ReconciliationRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn load(conn: &mut SqliteConnection, id: i32) -> Result<ReconciliationDB> {
    reconciliations::table
        .find(id)
        .select(ReconciliationDB::as_select())
        .first::<ReconciliationDB>(conn)
        .optional()
        .into_core()?
        .ok_or_else(|| Error::NotFound(format!("reconciliation {}", id)))
}

fn find_draft(
    conn: &mut SqliteConnection,
    company_value: &str,
    account_value: &str,
) -> Result<Option<ReconciliationDB>> {
    reconciliations::table
        .filter(reconciliations::company.eq(company_value))
        .filter(reconciliations::account_number.eq(account_value))
        .filter(reconciliations::status.eq(ReconciliationStatus::Draft.as_str()))
        .order(reconciliations::updated_at.desc())
        .select(ReconciliationDB::as_select())
        .first::<ReconciliationDB>(conn)
        .optional()
        .into_core()
}

#[async_trait]
impl ReconciliationRepositoryTrait for ReconciliationRepository {
    async fn save_draft(&self, draft: DraftReconciliation) -> Result<Reconciliation> {
        self.writer
            .exec(move |conn| {
                let ending = draft.ending_balance();
                let checks_json = encode_selected_checks(&draft.selected_checks);

                let row = match find_draft(conn, &draft.company, &draft.account_number)? {
                    Some(existing) => {
                        diesel::update(reconciliations::table.find(existing.id))
                            .set((
                                reconciliations::reconcile_date.eq(draft.reconcile_date),
                                reconciliations::beginning_balance
                                    .eq(to_f64(draft.beginning_balance)),
                                reconciliations::statement_balance
                                    .eq(to_f64(draft.statement_balance)),
                                reconciliations::statement_credits
                                    .eq(to_f64(draft.statement_credits)),
                                reconciliations::statement_debits
                                    .eq(to_f64(draft.statement_debits)),
                                reconciliations::ending_balance.eq(to_f64(ending)),
                                reconciliations::selected_checks_json.eq(&checks_json),
                                reconciliations::updated_at.eq(Utc::now().naive_utc()),
                            ))
                            .execute(conn)
                            .into_core()?;
                        load(conn, existing.id)?
                    }
                    None => {
                        diesel::insert_into(reconciliations::table)
                            .values(&NewReconciliationDB {
                                company: draft.company.clone(),
                                account_number: draft.account_number.clone(),
                                reconcile_date: draft.reconcile_date,
                                beginning_balance: to_f64(draft.beginning_balance),
                                statement_balance: to_f64(draft.statement_balance),
                                statement_credits: to_f64(draft.statement_credits),
                                statement_debits: to_f64(draft.statement_debits),
                                ending_balance: to_f64(ending),
                                selected_checks_json: checks_json,
                                status: ReconciliationStatus::Draft.as_str().to_string(),
                                created_by: draft.created_by.clone(),
                                committed_at: None,
                            })
                            .returning(ReconciliationDB::as_returning())
                            .get_result::<ReconciliationDB>(conn)
                            .into_core()?
                    }
                };
                Ok(row.into())
            })
            .await
    }

    fn get_draft(&self, company: &str, account_number: &str) -> Result<Option<Reconciliation>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(find_draft(&mut conn, company, account_number)?.map(Into::into))
    }

    fn get_by_id(&self, id: i32) -> Result<Option<Reconciliation>> {
        let mut conn = get_connection(&self.pool)?;
        let row = reconciliations::table
            .find(id)
            .select(ReconciliationDB::as_select())
            .first::<ReconciliationDB>(&mut conn)
            .optional()
            .into_core()?;
        Ok(row.map(Into::into))
    }

    fn history(
        &self,
        company: &str,
        account_number: &str,
        limit: i64,
    ) -> Result<Vec<Reconciliation>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = reconciliations::table
            .filter(reconciliations::company.eq(company))
            .filter(reconciliations::account_number.eq(account_number))
            .filter(reconciliations::status.ne(ReconciliationStatus::Draft.as_str()))
            .order((
                reconciliations::reconcile_date.desc(),
                reconciliations::created_at.desc(),
            ))
            .limit(limit)
            .select(ReconciliationDB::as_select())
            .load::<ReconciliationDB>(&mut conn)
            .into_core()?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn last_committed(
        &self,
        company: &str,
        account_number: &str,
    ) -> Result<Option<Reconciliation>> {
        let mut conn = get_connection(&self.pool)?;
        let row = reconciliations::table
            .filter(reconciliations::company.eq(company))
            .filter(reconciliations::account_number.eq(account_number))
            .filter(reconciliations::status.eq(ReconciliationStatus::Committed.as_str()))
            .order((
                reconciliations::reconcile_date.desc(),
                reconciliations::created_at.desc(),
            ))
            .select(ReconciliationDB::as_select())
            .first::<ReconciliationDB>(&mut conn)
            .optional()
            .into_core()?;
        Ok(row.map(Into::into))
    }

    async fn commit(&self, id: i32, _by_user: &str) -> Result<Reconciliation> {
        self.writer
            .exec(move |conn| {
                let existing = load(conn, id)?;
                if existing.status != ReconciliationStatus::Draft.as_str() {
                    return Err(Error::Conflict(format!(
                        "reconciliation {} is {}, only drafts can be committed",
                        id, existing.status
                    )));
                }
                let now = Utc::now().naive_utc();
                diesel::update(reconciliations::table.find(id))
                    .set((
                        reconciliations::status.eq(ReconciliationStatus::Committed.as_str()),
                        reconciliations::committed_at.eq(Some(now)),
                        reconciliations::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .into_core()?;
                Ok(load(conn, id)?.into())
            })
            .await
    }

    async fn archive(&self, id: i32) -> Result<Reconciliation> {
        self.writer
            .exec(move |conn| {
                let existing = load(conn, id)?;
                if existing.status != ReconciliationStatus::Committed.as_str() {
                    return Err(Error::Conflict(format!(
                        "reconciliation {} is {}, only committed records can be archived",
                        id, existing.status
                    )));
                }
                diesel::update(reconciliations::table.find(id))
                    .set((
                        reconciliations::status.eq(ReconciliationStatus::Archived.as_str()),
                        reconciliations::updated_at.eq(Utc::now().naive_utc()),
                    ))
                    .execute(conn)
                    .into_core()?;
                Ok(load(conn, id)?.into())
            })
            .await
    }

    async fn delete_draft(&self, company: &str, account_number: &str) -> Result<usize> {
        let company = company.to_string();
        let account_number = account_number.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(
                    reconciliations::table
                        .filter(reconciliations::company.eq(&company))
                        .filter(reconciliations::account_number.eq(&account_number))
                        .filter(
                            reconciliations::status.eq(ReconciliationStatus::Draft.as_str()),
                        ),
                )
                .execute(conn)
                .into_core()
            })
            .await
    }

    async fn insert_recovered(
        &self,
        company: &str,
        snapshot: RecoveredReconciliation,
        by_user: &str,
    ) -> Result<Reconciliation> {
        let company = company.to_string();
        let by_user = by_user.to_string();
        self.writer
            .exec(move |conn| {
                let now = Utc::now().naive_utc();
                // CHECKREC carries no credit/debit split; encode the net so
                // that beginning + credits - debits still equals ending.
                let net = snapshot.ending_balance - snapshot.beginning_balance;
                let (credits, debits) = if net >= rust_decimal::Decimal::ZERO {
                    (net, rust_decimal::Decimal::ZERO)
                } else {
                    (rust_decimal::Decimal::ZERO, -net)
                };
                let row = diesel::insert_into(reconciliations::table)
                    .values(&NewReconciliationDB {
                        company: company.clone(),
                        account_number: snapshot.account_number.clone(),
                        reconcile_date: snapshot.reconcile_date,
                        beginning_balance: to_f64(snapshot.beginning_balance),
                        statement_balance: to_f64(snapshot.ending_balance),
                        statement_credits: to_f64(credits),
                        statement_debits: to_f64(debits),
                        ending_balance: to_f64(snapshot.ending_balance),
                        selected_checks_json: "[]".to_string(),
                        status: ReconciliationStatus::Committed.as_str().to_string(),
                        created_by: by_user.clone(),
                        committed_at: Some(now),
                    })
                    .returning(ReconciliationDB::as_returning())
                    .get_result::<ReconciliationDB>(conn)
                    .into_core()?;
                Ok(row.into())
            })
            .await
    }
}
