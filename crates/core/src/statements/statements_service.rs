use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{error, info};
use uuid::Uuid;

use super::csv_parser::parse_statement_csv;
use super::matching::assign;
use super::statements_model::{
    BankTransaction, ImportOutcome, MatchOptions, MatchRunSummary, StatementImport,
};
use super::statements_traits::{StatementRepositoryTrait, StatementServiceTrait};
use crate::checks::{CheckRecord, ChecksService};
use crate::errors::{Error, Result};

/// Imports statement files and links their transactions to outstanding
/// checks.
pub struct StatementService {
    repository: Arc<dyn StatementRepositoryTrait>,
    checks: ChecksService,
}

impl StatementService {
    pub fn new(repository: Arc<dyn StatementRepositoryTrait>, checks: ChecksService) -> Self {
        Self { repository, checks }
    }

    /// Candidate checks for a matching run: outstanding (or also void, when
    /// asked), minus every check already claimed by an unreconciled
    /// transaction of the account.
    fn candidate_checks(
        &self,
        company: &str,
        account_number: &str,
        options: &MatchOptions,
    ) -> Result<Vec<CheckRecord>> {
        let mut checks = if options.include_void_checks {
            self.checks
                .scan(company, Some(account_number))?
                .into_iter()
                .filter(|c| !c.cleared)
                .collect()
        } else {
            self.checks.scan_outstanding(company, Some(account_number))?
        };

        let claimed = self.repository.claimed_check_ids(company, account_number)?;
        if !claimed.is_empty() {
            checks.retain(|c| !claimed.contains(&c.id().to_string()));
        }
        Ok(checks)
    }

    async fn match_statement(
        &self,
        company: &str,
        account_number: &str,
        statement_id: i32,
        options: &MatchOptions,
    ) -> Result<MatchRunSummary> {
        let statement = self
            .repository
            .get_statement_by_id(statement_id)?
            .ok_or_else(|| Error::NotFound(format!("statement {}", statement_id)))?;

        // Default the date window to the statement's own date.
        let mut options = options.clone();
        if options.limit_to_statement_date && options.statement_date.is_none() {
            options.statement_date = Some(statement.statement_date);
        }

        let transactions: Vec<BankTransaction> = self
            .repository
            .transactions_for_statement(statement_id)?
            .into_iter()
            .filter(|t| !t.is_matched && !t.is_reconciled)
            .collect();
        let checks = self.candidate_checks(company, account_number, &options)?;

        let updates = assign(&transactions, &checks, &options);
        let matched = self
            .repository
            .apply_matches(statement_id, updates)
            .await
            .inspect_err(|e| error!("match run for statement {} failed: {}", statement_id, e))?;

        info!(
            "matched {} of {} transactions against {} checks for statement {}",
            matched,
            transactions.len(),
            checks.len(),
            statement_id
        );
        Ok(MatchRunSummary {
            transactions_considered: transactions.len(),
            checks_considered: checks.len(),
            matched,
        })
    }

    fn latest_statement_id(&self, company: &str, account_number: &str) -> Result<i32> {
        self.repository
            .latest_statement(company, account_number)?
            .map(|s| s.id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no active statement for {}/{}",
                    company, account_number
                ))
            })
    }
}

#[async_trait]
impl StatementServiceTrait for StatementService {
    async fn import(
        &self,
        company: &str,
        account_number: &str,
        statement_date: NaiveDate,
        content: &[u8],
        replace: bool,
    ) -> Result<ImportOutcome> {
        let rows = parse_statement_csv(content)
            .inspect_err(|e| error!("statement import parse failed: {}", e))?;

        // Balances come from the running-balance column when the bank
        // provides one: the first row's balance backs out its own amount.
        let beginning_balance = rows
            .first()
            .and_then(|r| r.balance.map(|b| b - r.amount))
            .unwrap_or_default();
        let ending_balance = rows.last().and_then(|r| r.balance).unwrap_or_default();

        let import = StatementImport {
            company: company.to_string(),
            account_number: account_number.trim().to_string(),
            statement_date,
            batch_id: Uuid::new_v4().to_string(),
            beginning_balance,
            ending_balance,
            replace,
            rows,
        };

        let outcome = self
            .repository
            .insert_import(import)
            .await
            .inspect_err(|e| error!("statement import failed: {}", e))?;
        info!(
            "imported statement {} for {}/{}: {} transactions (batch {})",
            outcome.statement.id,
            company,
            account_number,
            outcome.transactions.len(),
            outcome.statement.batch_id
        );
        Ok(outcome)
    }

    async fn run_matching(
        &self,
        company: &str,
        account_number: &str,
        options: MatchOptions,
    ) -> Result<MatchRunSummary> {
        let statement_id = self.latest_statement_id(company, account_number)?;
        self.match_statement(company, account_number, statement_id, &options)
            .await
    }

    async fn retry_for_statement(
        &self,
        company: &str,
        account_number: &str,
        statement_id: i32,
    ) -> Result<MatchRunSummary> {
        self.match_statement(company, account_number, statement_id, &MatchOptions::default())
            .await
    }

    async fn rerun(
        &self,
        company: &str,
        account_number: &str,
        options: MatchOptions,
    ) -> Result<MatchRunSummary> {
        let statement_id = self.latest_statement_id(company, account_number)?;
        let cleared = self.repository.clear_auto_matches(statement_id).await?;
        info!(
            "rerun: cleared {} automatic matches on statement {}",
            cleared, statement_id
        );
        self.match_statement(company, account_number, statement_id, &options)
            .await
    }

    async fn manual_match(
        &self,
        transaction_id: i32,
        check_id: &str,
        check_row_index: i64,
    ) -> Result<BankTransaction> {
        let updated = self
            .repository
            .manual_match(transaction_id, check_id, check_row_index)
            .await
            .inspect_err(|e| error!("manual match of transaction {} failed: {}", transaction_id, e))?;
        info!(
            "transaction {} manually matched to check {}",
            transaction_id, check_id
        );
        Ok(updated)
    }

    async fn unmatch(&self, transaction_id: i32) -> Result<BankTransaction> {
        let updated = self.repository.unmatch(transaction_id).await?;
        info!("transaction {} unmatched", transaction_id);
        Ok(updated)
    }

    async fn reconcile_batch(
        &self,
        company: &str,
        batch_id: &str,
        reconciliation_id: i32,
    ) -> Result<usize> {
        let matched: Vec<BankTransaction> = self
            .repository
            .transactions_for_batch(batch_id)?
            .into_iter()
            .filter(|t| t.is_matched && !t.is_reconciled)
            .collect();
        if matched.is_empty() {
            return Ok(0);
        }

        // Clear the legacy flags first; the store is only marked once every
        // DBF write succeeded, so a failure here leaves SQLite untouched.
        // (A partial DBF write converges on retry: re-clearing is a no-op.)
        let rows: Vec<usize> = matched
            .iter()
            .filter_map(|t| t.matched_dbf_row_index)
            .map(|i| i as usize)
            .collect();
        self.checks
            .clear_checks(company, &rows)
            .inspect_err(|e| error!("clearing checks for batch {} failed: {}", batch_id, e))?;

        let updated = self
            .repository
            .mark_batch_reconciled(batch_id, reconciliation_id)
            .await
            .inspect_err(|e| {
                error!(
                    "marking batch {} reconciled failed after DBF writes: {}",
                    batch_id, e
                )
            })?;
        info!(
            "batch {} reconciled: {} transactions, {} checks cleared (reconciliation {})",
            batch_id,
            updated,
            rows.len(),
            reconciliation_id
        );
        Ok(updated)
    }
}
