//! Statement repository and service traits.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::statements_model::{
    BankStatement, BankTransaction, ImportOutcome, MatchOptions, MatchRunSummary, MatchUpdate,
    StatementImport,
};
use crate::errors::Result;

/// Persistence contract for statements, transactions, and match state.
#[async_trait]
pub trait StatementRepositoryTrait: Send + Sync {
    /// Persists one import batch: the statement row plus its transactions.
    ///
    /// An active statement for the same `(company, account, statement_date)`
    /// fails with `AlreadyExists` unless `replace` is set, in which case the
    /// prior statement and its transactions are deleted first.
    async fn insert_import(&self, import: StatementImport) -> Result<ImportOutcome>;

    fn get_statement(
        &self,
        company: &str,
        account_number: &str,
        statement_date: NaiveDate,
    ) -> Result<Option<BankStatement>>;

    fn get_statement_by_id(&self, id: i32) -> Result<Option<BankStatement>>;

    /// Newest active statement for the account, by statement date.
    fn latest_statement(&self, company: &str, account_number: &str)
        -> Result<Option<BankStatement>>;

    fn list_statements(&self, company: &str, account_number: &str) -> Result<Vec<BankStatement>>;

    fn transactions_for_statement(&self, statement_id: i32) -> Result<Vec<BankTransaction>>;

    fn transactions_for_batch(&self, batch_id: &str) -> Result<Vec<BankTransaction>>;

    fn get_transaction(&self, transaction_id: i32) -> Result<Option<BankTransaction>>;

    /// Check ids claimed by any unreconciled transaction of the account.
    /// These stay off the candidate list so pairing remains one-to-one.
    fn claimed_check_ids(&self, company: &str, account_number: &str) -> Result<Vec<String>>;

    /// Applies automatic match decisions and refreshes the statement's
    /// `matched_count`, all in one transaction.
    async fn apply_matches(&self, statement_id: i32, updates: Vec<MatchUpdate>) -> Result<usize>;

    /// Pins a manual match. Fails with `Conflict` when the transaction
    /// already carries a different match.
    async fn manual_match(
        &self,
        transaction_id: i32,
        check_id: &str,
        check_row_index: i64,
    ) -> Result<BankTransaction>;

    /// Clears the match columns of one transaction.
    async fn unmatch(&self, transaction_id: i32) -> Result<BankTransaction>;

    /// Clears every non-manual, unreconciled match of the statement.
    async fn clear_auto_matches(&self, statement_id: i32) -> Result<usize>;

    /// Marks the batch's matched transactions reconciled and back-links the
    /// reconciliation, in one transaction.
    async fn mark_batch_reconciled(&self, batch_id: &str, reconciliation_id: i32) -> Result<usize>;
}

/// Business operations for statement import and matching.
#[async_trait]
pub trait StatementServiceTrait: Send + Sync {
    /// Parses a statement CSV and persists it as one batch.
    async fn import(
        &self,
        company: &str,
        account_number: &str,
        statement_date: NaiveDate,
        content: &[u8],
        replace: bool,
    ) -> Result<ImportOutcome>;

    /// Runs matching over the account's latest active statement.
    async fn run_matching(
        &self,
        company: &str,
        account_number: &str,
        options: MatchOptions,
    ) -> Result<MatchRunSummary>;

    /// Runs matching over one statement only.
    async fn retry_for_statement(
        &self,
        company: &str,
        account_number: &str,
        statement_id: i32,
    ) -> Result<MatchRunSummary>;

    /// Clears non-manual matches and reapplies the algorithm; manual pins
    /// survive and their checks stay out of the candidate set.
    async fn rerun(
        &self,
        company: &str,
        account_number: &str,
        options: MatchOptions,
    ) -> Result<MatchRunSummary>;

    async fn manual_match(
        &self,
        transaction_id: i32,
        check_id: &str,
        check_row_index: i64,
    ) -> Result<BankTransaction>;

    async fn unmatch(&self, transaction_id: i32) -> Result<BankTransaction>;

    /// Records a committed reconciliation against the batch: transactions are
    /// flagged reconciled and every matched check is cleared in the legacy
    /// store. The two writes succeed together or not at all.
    async fn reconcile_batch(
        &self,
        company: &str,
        batch_id: &str,
        reconciliation_id: i32,
    ) -> Result<usize>;
}
