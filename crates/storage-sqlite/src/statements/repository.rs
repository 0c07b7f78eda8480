//! Repository for bank statements, transactions, and match state.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use financialsx_core::errors::{Error, Result};
use financialsx_core::statements::{
    BankStatement, BankTransaction, ImportOutcome, MatchUpdate, StatementImport,
    StatementRepositoryTrait,
};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::{bank_statements, bank_transactions};
use crate::utils::to_f64;

use super::model::{
    BankStatementDB, BankTransactionDB, NewBankStatementDB, NewBankTransactionDB,
};

pub struct StatementRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl StatementRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn load_transaction(conn: &mut SqliteConnection, id: i32) -> Result<BankTransactionDB> {
    bank_transactions::table
        .find(id)
        .select(BankTransactionDB::as_select())
        .first::<BankTransactionDB>(conn)
        .optional()
        .into_core()?
        .ok_or_else(|| Error::NotFound(format!("bank transaction {}", id)))
}

/// Recomputes a statement's `matched_count` from its transactions. Kept in
/// the same transaction as whatever changed the match columns.
fn refresh_matched_count(conn: &mut SqliteConnection, statement_id_value: i32) -> Result<()> {
    let matched: i64 = bank_transactions::table
        .filter(bank_transactions::statement_id.eq(statement_id_value))
        .filter(bank_transactions::is_matched.eq(true))
        .count()
        .get_result(conn)
        .into_core()?;
    diesel::update(bank_statements::table.find(statement_id_value))
        .set((
            bank_statements::matched_count.eq(matched as i32),
            bank_statements::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .into_core()?;
    Ok(())
}

#[async_trait]
impl StatementRepositoryTrait for StatementRepository {
    async fn insert_import(&self, import: StatementImport) -> Result<ImportOutcome> {
        self.writer
            .exec(move |conn| {
                let existing = bank_statements::table
                    .filter(bank_statements::company.eq(&import.company))
                    .filter(bank_statements::account_number.eq(&import.account_number))
                    .filter(bank_statements::statement_date.eq(import.statement_date))
                    .filter(bank_statements::is_active.eq(true))
                    .select(BankStatementDB::as_select())
                    .first::<BankStatementDB>(conn)
                    .optional()
                    .into_core()?;

                if let Some(existing) = existing {
                    if !import.replace {
                        return Err(Error::AlreadyExists(format!(
                            "statement for {}/{} dated {}",
                            import.company, import.account_number, import.statement_date
                        )));
                    }
                    // Replace: drop the prior statement; its transactions go
                    // with it through the cascading foreign key.
                    diesel::delete(bank_statements::table.find(existing.id))
                        .execute(conn)
                        .into_core()?;
                }

                let statement = diesel::insert_into(bank_statements::table)
                    .values(&NewBankStatementDB {
                        company: import.company.clone(),
                        account_number: import.account_number.clone(),
                        statement_date: import.statement_date,
                        batch_id: import.batch_id.clone(),
                        beginning_balance: to_f64(import.beginning_balance),
                        ending_balance: to_f64(import.ending_balance),
                        transaction_count: import.rows.len() as i32,
                        matched_count: 0,
                        is_active: true,
                    })
                    .returning(BankStatementDB::as_returning())
                    .get_result::<BankStatementDB>(conn)
                    .into_core()?;

                let new_rows: Vec<NewBankTransactionDB> = import
                    .rows
                    .iter()
                    .map(|row| NewBankTransactionDB {
                        statement_id: statement.id,
                        batch_id: import.batch_id.clone(),
                        transaction_date: row.transaction_date,
                        check_number: row.check_number.clone(),
                        description: row.description.clone(),
                        amount: to_f64(row.amount),
                        transaction_type: row.transaction_type.as_str().to_string(),
                    })
                    .collect();
                diesel::insert_into(bank_transactions::table)
                    .values(&new_rows)
                    .execute(conn)
                    .into_core()?;

                let transactions = bank_transactions::table
                    .filter(bank_transactions::statement_id.eq(statement.id))
                    .order(bank_transactions::id.asc())
                    .select(BankTransactionDB::as_select())
                    .load::<BankTransactionDB>(conn)
                    .into_core()?;

                Ok(ImportOutcome {
                    statement: statement.into(),
                    transactions: transactions.into_iter().map(Into::into).collect(),
                })
            })
            .await
    }

    fn get_statement(
        &self,
        company: &str,
        account_number: &str,
        statement_date: NaiveDate,
    ) -> Result<Option<BankStatement>> {
        let mut conn = get_connection(&self.pool)?;
        let row = bank_statements::table
            .filter(bank_statements::company.eq(company))
            .filter(bank_statements::account_number.eq(account_number))
            .filter(bank_statements::statement_date.eq(statement_date))
            .filter(bank_statements::is_active.eq(true))
            .select(BankStatementDB::as_select())
            .first::<BankStatementDB>(&mut conn)
            .optional()
            .into_core()?;
        Ok(row.map(Into::into))
    }

    fn get_statement_by_id(&self, id: i32) -> Result<Option<BankStatement>> {
        let mut conn = get_connection(&self.pool)?;
        let row = bank_statements::table
            .find(id)
            .select(BankStatementDB::as_select())
            .first::<BankStatementDB>(&mut conn)
            .optional()
            .into_core()?;
        Ok(row.map(Into::into))
    }

    fn latest_statement(
        &self,
        company: &str,
        account_number: &str,
    ) -> Result<Option<BankStatement>> {
        let mut conn = get_connection(&self.pool)?;
        let row = bank_statements::table
            .filter(bank_statements::company.eq(company))
            .filter(bank_statements::account_number.eq(account_number))
            .filter(bank_statements::is_active.eq(true))
            .order((
                bank_statements::statement_date.desc(),
                bank_statements::created_at.desc(),
            ))
            .select(BankStatementDB::as_select())
            .first::<BankStatementDB>(&mut conn)
            .optional()
            .into_core()?;
        Ok(row.map(Into::into))
    }

    fn list_statements(&self, company: &str, account_number: &str) -> Result<Vec<BankStatement>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = bank_statements::table
            .filter(bank_statements::company.eq(company))
            .filter(bank_statements::account_number.eq(account_number))
            .order(bank_statements::statement_date.desc())
            .select(BankStatementDB::as_select())
            .load::<BankStatementDB>(&mut conn)
            .into_core()?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn transactions_for_statement(&self, statement_id: i32) -> Result<Vec<BankTransaction>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = bank_transactions::table
            .filter(bank_transactions::statement_id.eq(statement_id))
            .order(bank_transactions::id.asc())
            .select(BankTransactionDB::as_select())
            .load::<BankTransactionDB>(&mut conn)
            .into_core()?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn transactions_for_batch(&self, batch_id: &str) -> Result<Vec<BankTransaction>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = bank_transactions::table
            .filter(bank_transactions::batch_id.eq(batch_id))
            .order(bank_transactions::id.asc())
            .select(BankTransactionDB::as_select())
            .load::<BankTransactionDB>(&mut conn)
            .into_core()?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn get_transaction(&self, transaction_id: i32) -> Result<Option<BankTransaction>> {
        let mut conn = get_connection(&self.pool)?;
        let row = bank_transactions::table
            .find(transaction_id)
            .select(BankTransactionDB::as_select())
            .first::<BankTransactionDB>(&mut conn)
            .optional()
            .into_core()?;
        Ok(row.map(Into::into))
    }

    fn claimed_check_ids(&self, company: &str, account_number: &str) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let ids: Vec<Option<String>> = bank_transactions::table
            .inner_join(bank_statements::table)
            .filter(bank_statements::company.eq(company))
            .filter(bank_statements::account_number.eq(account_number))
            .filter(bank_transactions::is_reconciled.eq(false))
            .filter(bank_transactions::matched_check_id.is_not_null())
            .select(bank_transactions::matched_check_id)
            .load::<Option<String>>(&mut conn)
            .into_core()?;
        Ok(ids.into_iter().flatten().collect())
    }

    async fn apply_matches(&self, statement_id: i32, updates: Vec<MatchUpdate>) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().naive_utc();
                let mut applied = 0usize;
                for update in &updates {
                    // Manual pins and reconciled rows are immune to the
                    // automatic matcher.
                    applied += diesel::update(
                        bank_transactions::table
                            .find(update.transaction_id)
                            .filter(bank_transactions::manually_matched.eq(false))
                            .filter(bank_transactions::is_reconciled.eq(false)),
                    )
                    .set((
                        bank_transactions::matched_check_id
                            .eq(Some(update.matched_check_id.clone())),
                        bank_transactions::matched_dbf_row_index
                            .eq(Some(update.matched_dbf_row_index)),
                        bank_transactions::match_confidence.eq(to_f64(update.match_confidence)),
                        bank_transactions::match_type
                            .eq(Some(update.match_type.as_str().to_string())),
                        bank_transactions::is_matched.eq(true),
                        bank_transactions::manually_matched.eq(false),
                        bank_transactions::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .into_core()?;
                }
                refresh_matched_count(conn, statement_id)?;
                Ok(applied)
            })
            .await
    }

    async fn manual_match(
        &self,
        transaction_id: i32,
        check_id: &str,
        check_row_index: i64,
    ) -> Result<BankTransaction> {
        let check_id = check_id.to_string();
        self.writer
            .exec(move |conn| {
                let existing = load_transaction(conn, transaction_id)?;
                if existing.is_reconciled {
                    return Err(Error::Conflict(format!(
                        "transaction {} is already reconciled",
                        transaction_id
                    )));
                }
                if existing.is_matched
                    && existing.matched_check_id.as_deref() != Some(check_id.as_str())
                {
                    return Err(Error::Conflict(format!(
                        "transaction {} is already matched to check {}; unmatch it first",
                        transaction_id,
                        existing.matched_check_id.unwrap_or_default()
                    )));
                }

                diesel::update(bank_transactions::table.find(transaction_id))
                    .set((
                        bank_transactions::matched_check_id.eq(Some(check_id.clone())),
                        bank_transactions::matched_dbf_row_index.eq(Some(check_row_index)),
                        bank_transactions::match_confidence.eq(1.0f64),
                        bank_transactions::match_type.eq(Some("manual".to_string())),
                        bank_transactions::is_matched.eq(true),
                        bank_transactions::manually_matched.eq(true),
                        bank_transactions::updated_at.eq(Utc::now().naive_utc()),
                    ))
                    .execute(conn)
                    .into_core()?;

                refresh_matched_count(conn, existing.statement_id)?;
                Ok(load_transaction(conn, transaction_id)?.into())
            })
            .await
    }

    async fn unmatch(&self, transaction_id: i32) -> Result<BankTransaction> {
        self.writer
            .exec(move |conn| {
                let existing = load_transaction(conn, transaction_id)?;
                if existing.is_reconciled {
                    return Err(Error::Conflict(format!(
                        "transaction {} is already reconciled",
                        transaction_id
                    )));
                }

                diesel::update(bank_transactions::table.find(transaction_id))
                    .set((
                        bank_transactions::matched_check_id.eq(None::<String>),
                        bank_transactions::matched_dbf_row_index.eq(None::<i64>),
                        bank_transactions::match_confidence.eq(0.0f64),
                        bank_transactions::match_type.eq(None::<String>),
                        bank_transactions::is_matched.eq(false),
                        bank_transactions::manually_matched.eq(false),
                        bank_transactions::updated_at.eq(Utc::now().naive_utc()),
                    ))
                    .execute(conn)
                    .into_core()?;

                refresh_matched_count(conn, existing.statement_id)?;
                Ok(load_transaction(conn, transaction_id)?.into())
            })
            .await
    }

    async fn clear_auto_matches(&self, statement_id: i32) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                let cleared = diesel::update(
                    bank_transactions::table
                        .filter(bank_transactions::statement_id.eq(statement_id))
                        .filter(bank_transactions::manually_matched.eq(false))
                        .filter(bank_transactions::is_reconciled.eq(false))
                        .filter(bank_transactions::is_matched.eq(true)),
                )
                .set((
                    bank_transactions::matched_check_id.eq(None::<String>),
                    bank_transactions::matched_dbf_row_index.eq(None::<i64>),
                    bank_transactions::match_confidence.eq(0.0f64),
                    bank_transactions::match_type.eq(None::<String>),
                    bank_transactions::is_matched.eq(false),
                    bank_transactions::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)
                .into_core()?;

                refresh_matched_count(conn, statement_id)?;
                Ok(cleared)
            })
            .await
    }

    async fn mark_batch_reconciled(
        &self,
        batch_id: &str,
        reconciliation_id: i32,
    ) -> Result<usize> {
        let batch_id = batch_id.to_string();
        self.writer
            .exec(move |conn| {
                let now = Utc::now().naive_utc();
                let updated = diesel::update(
                    bank_transactions::table
                        .filter(bank_transactions::batch_id.eq(&batch_id))
                        .filter(bank_transactions::is_matched.eq(true))
                        .filter(bank_transactions::is_reconciled.eq(false)),
                )
                .set((
                    bank_transactions::is_reconciled.eq(true),
                    bank_transactions::reconciled_date.eq(Some(now)),
                    bank_transactions::reconciliation_id.eq(Some(reconciliation_id)),
                    bank_transactions::updated_at.eq(now),
                ))
                .execute(conn)
                .into_core()?;

                diesel::update(
                    bank_statements::table.filter(bank_statements::batch_id.eq(&batch_id)),
                )
                .set((
                    bank_statements::reconciliation_id.eq(Some(reconciliation_id)),
                    bank_statements::updated_at.eq(now),
                ))
                .execute(conn)
                .into_core()?;

                Ok(updated)
            })
            .await
    }
}
