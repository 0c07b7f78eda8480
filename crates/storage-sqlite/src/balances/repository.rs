//! Repository for the cached balances and their append-only history.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use financialsx_core::balances::{
    BalanceHistoryEntry, BalanceRepositoryTrait, CachedBalance, ChangeType, ChecksRefreshOutcome,
    GlRefreshOutcome, ManualAdjustment,
};
use financialsx_core::errors::{Error, Result};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::{account_balances, balance_history};

use super::model::{
    AccountBalanceDB, BalanceHistoryDB, NewAccountBalanceDB, NewBalanceHistoryDB,
};
use crate::utils::{to_decimal, to_f64};

pub struct BalanceRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl BalanceRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn find_row(
    conn: &mut SqliteConnection,
    company_value: &str,
    account_value: &str,
) -> Result<Option<AccountBalanceDB>> {
    account_balances::table
        .filter(account_balances::company.eq(company_value))
        .filter(account_balances::account_number.eq(account_value))
        .select(AccountBalanceDB::as_select())
        .first::<AccountBalanceDB>(conn)
        .optional()
        .into_core()
}

fn reload_row(
    conn: &mut SqliteConnection,
    company_value: &str,
    account_value: &str,
) -> Result<AccountBalanceDB> {
    find_row(conn, company_value, account_value)?.ok_or_else(|| {
        Error::NotFound(format!(
            "cached balance for {}/{}",
            company_value, account_value
        ))
    })
}

fn insert_history(conn: &mut SqliteConnection, row: NewBalanceHistoryDB) -> Result<()> {
    diesel::insert_into(balance_history::table)
        .values(&row)
        .execute(conn)
        .into_core()?;
    Ok(())
}

#[async_trait]
impl BalanceRepositoryTrait for BalanceRepository {
    fn get(&self, company: &str, account_number: &str) -> Result<Option<CachedBalance>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(find_row(&mut conn, company, account_number)?.map(Into::into))
    }

    fn list_bank_accounts(&self, company: &str) -> Result<Vec<CachedBalance>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = account_balances::table
            .filter(account_balances::company.eq(company))
            .filter(account_balances::is_active.eq(true))
            .filter(account_balances::is_bank_account.eq(true))
            .order(account_balances::account_number.asc())
            .select(AccountBalanceDB::as_select())
            .load::<AccountBalanceDB>(&mut conn)
            .into_core()?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn apply_gl_refresh(&self, outcome: GlRefreshOutcome) -> Result<CachedBalance> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().naive_utc();
                let existing = find_row(conn, &outcome.company, &outcome.account_number)?;
                let new_gl = to_f64(outcome.gl_balance);

                match existing {
                    None => {
                        diesel::insert_into(account_balances::table)
                            .values(&NewAccountBalanceDB {
                                company: outcome.company.clone(),
                                account_number: outcome.account_number.clone(),
                                account_name: outcome.account_name.clone(),
                                gl_balance: new_gl,
                                gl_record_count: outcome.gl_record_count,
                                gl_last_updated: Some(now),
                                outstanding_total: 0.0,
                                outstanding_count: 0,
                                outstanding_last_updated: None,
                                is_active: true,
                                is_bank_account: outcome.is_bank_account,
                            })
                            .execute(conn)
                            .into_core()?;

                        let inserted = reload_row(conn, &outcome.company, &outcome.account_number)?;
                        insert_history(
                            conn,
                            NewBalanceHistoryDB {
                                balance_id: inserted.id,
                                company: outcome.company.clone(),
                                account_number: outcome.account_number.clone(),
                                change_type: ChangeType::GlRefresh.as_str().to_string(),
                                old_gl_balance: None,
                                new_gl_balance: Some(new_gl),
                                old_outstanding_total: None,
                                new_outstanding_total: None,
                                old_bank_balance: None,
                                new_bank_balance: Some(inserted.bank_balance),
                                reason: Some("GL balance refresh".to_string()),
                                changed_by: outcome.changed_by.clone(),
                            },
                        )?;
                        Ok(inserted.into())
                    }
                    Some(existing) => {
                        let changed = to_decimal(existing.gl_balance) != outcome.gl_balance
                            || existing.gl_record_count != outcome.gl_record_count;

                        diesel::update(account_balances::table.find(existing.id))
                            .set((
                                account_balances::gl_balance.eq(new_gl),
                                account_balances::gl_record_count.eq(outcome.gl_record_count),
                                account_balances::gl_last_updated.eq(Some(now)),
                                account_balances::account_name
                                    .eq(outcome.account_name.clone().or(existing.account_name.clone())),
                                account_balances::is_bank_account
                                    .eq(outcome.is_bank_account || existing.is_bank_account),
                            ))
                            .execute(conn)
                            .into_core()?;

                        let updated = reload_row(conn, &outcome.company, &outcome.account_number)?;
                        // A refresh that computed identical totals bumps the
                        // freshness stamp but adds no history row.
                        if changed {
                            insert_history(
                                conn,
                                NewBalanceHistoryDB {
                                    balance_id: updated.id,
                                    company: outcome.company.clone(),
                                    account_number: outcome.account_number.clone(),
                                    change_type: ChangeType::GlRefresh.as_str().to_string(),
                                    old_gl_balance: Some(existing.gl_balance),
                                    new_gl_balance: Some(new_gl),
                                    old_outstanding_total: None,
                                    new_outstanding_total: None,
                                    old_bank_balance: Some(existing.bank_balance),
                                    new_bank_balance: Some(updated.bank_balance),
                                    reason: Some("GL balance refresh".to_string()),
                                    changed_by: outcome.changed_by.clone(),
                                },
                            )?;
                        }
                        Ok(updated.into())
                    }
                }
            })
            .await
    }

    async fn apply_checks_refresh(&self, outcome: ChecksRefreshOutcome) -> Result<CachedBalance> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().naive_utc();
                let existing = find_row(conn, &outcome.company, &outcome.account_number)?;
                let new_total = to_f64(outcome.outstanding_total);

                match existing {
                    None => {
                        diesel::insert_into(account_balances::table)
                            .values(&NewAccountBalanceDB {
                                company: outcome.company.clone(),
                                account_number: outcome.account_number.clone(),
                                account_name: None,
                                gl_balance: 0.0,
                                gl_record_count: 0,
                                gl_last_updated: None,
                                outstanding_total: new_total,
                                outstanding_count: outcome.outstanding_count,
                                outstanding_last_updated: Some(now),
                                is_active: true,
                                is_bank_account: false,
                            })
                            .execute(conn)
                            .into_core()?;

                        let inserted = reload_row(conn, &outcome.company, &outcome.account_number)?;
                        insert_history(
                            conn,
                            NewBalanceHistoryDB {
                                balance_id: inserted.id,
                                company: outcome.company.clone(),
                                account_number: outcome.account_number.clone(),
                                change_type: ChangeType::ChecksRefresh.as_str().to_string(),
                                old_gl_balance: None,
                                new_gl_balance: None,
                                old_outstanding_total: None,
                                new_outstanding_total: Some(new_total),
                                old_bank_balance: None,
                                new_bank_balance: Some(inserted.bank_balance),
                                reason: Some("Outstanding checks refresh".to_string()),
                                changed_by: outcome.changed_by.clone(),
                            },
                        )?;
                        Ok(inserted.into())
                    }
                    Some(existing) => {
                        let changed = to_decimal(existing.outstanding_total)
                            != outcome.outstanding_total
                            || existing.outstanding_count != outcome.outstanding_count;

                        diesel::update(account_balances::table.find(existing.id))
                            .set((
                                account_balances::outstanding_total.eq(new_total),
                                account_balances::outstanding_count.eq(outcome.outstanding_count),
                                account_balances::outstanding_last_updated.eq(Some(now)),
                            ))
                            .execute(conn)
                            .into_core()?;

                        let updated = reload_row(conn, &outcome.company, &outcome.account_number)?;
                        if changed {
                            insert_history(
                                conn,
                                NewBalanceHistoryDB {
                                    balance_id: updated.id,
                                    company: outcome.company.clone(),
                                    account_number: outcome.account_number.clone(),
                                    change_type: ChangeType::ChecksRefresh.as_str().to_string(),
                                    old_gl_balance: None,
                                    new_gl_balance: None,
                                    old_outstanding_total: Some(existing.outstanding_total),
                                    new_outstanding_total: Some(new_total),
                                    old_bank_balance: Some(existing.bank_balance),
                                    new_bank_balance: Some(updated.bank_balance),
                                    reason: Some("Outstanding checks refresh".to_string()),
                                    changed_by: outcome.changed_by.clone(),
                                },
                            )?;
                        }
                        Ok(updated.into())
                    }
                }
            })
            .await
    }

    async fn apply_manual_adjustment(&self, adjustment: ManualAdjustment) -> Result<CachedBalance> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().naive_utc();
                let existing = reload_row(conn, &adjustment.company, &adjustment.account_number)?;

                let gl_target = adjustment
                    .gl_balance
                    .map(to_f64)
                    .unwrap_or(existing.gl_balance);
                let outstanding_target = adjustment
                    .outstanding_total
                    .map(to_f64)
                    .unwrap_or(existing.outstanding_total);

                let stamp_gl: Option<NaiveDateTime> = if adjustment.gl_balance.is_some() {
                    Some(now)
                } else {
                    existing.gl_last_updated
                };
                let stamp_checks: Option<NaiveDateTime> =
                    if adjustment.outstanding_total.is_some() {
                        Some(now)
                    } else {
                        existing.outstanding_last_updated
                    };

                diesel::update(account_balances::table.find(existing.id))
                    .set((
                        account_balances::gl_balance.eq(gl_target),
                        account_balances::outstanding_total.eq(outstanding_target),
                        account_balances::gl_last_updated.eq(stamp_gl),
                        account_balances::outstanding_last_updated.eq(stamp_checks),
                    ))
                    .execute(conn)
                    .into_core()?;

                let updated = reload_row(conn, &adjustment.company, &adjustment.account_number)?;
                // Manual corrections always leave an audit row, changed or not.
                insert_history(
                    conn,
                    NewBalanceHistoryDB {
                        balance_id: updated.id,
                        company: adjustment.company.clone(),
                        account_number: adjustment.account_number.clone(),
                        change_type: ChangeType::ManualAdjustment.as_str().to_string(),
                        old_gl_balance: Some(existing.gl_balance),
                        new_gl_balance: Some(gl_target),
                        old_outstanding_total: Some(existing.outstanding_total),
                        new_outstanding_total: Some(outstanding_target),
                        old_bank_balance: Some(existing.bank_balance),
                        new_bank_balance: Some(updated.bank_balance),
                        reason: Some(adjustment.reason.clone()),
                        changed_by: adjustment.changed_by.clone(),
                    },
                )?;
                Ok(updated.into())
            })
            .await
    }

    fn history(
        &self,
        company: &str,
        account_number: &str,
        limit: i64,
    ) -> Result<Vec<BalanceHistoryEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = balance_history::table
            .filter(balance_history::company.eq(company))
            .filter(balance_history::account_number.eq(account_number))
            .order((balance_history::changed_at.desc(), balance_history::id.desc()))
            .limit(limit)
            .select(BalanceHistoryDB::as_select())
            .load::<BalanceHistoryDB>(&mut conn)
            .into_core()?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
