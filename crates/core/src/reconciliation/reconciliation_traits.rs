//! Reconciliation repository and service traits.

use async_trait::async_trait;

use super::reconciliation_model::{
    DraftReconciliation, LastCommitted, Reconciliation, RecoveredReconciliation,
};
use crate::errors::Result;

/// Persistence contract for reconciliation records.
#[async_trait]
pub trait ReconciliationRepositoryTrait: Send + Sync {
    /// Inserts the draft, or updates the existing draft of the same
    /// `(company, account)` in place. At most one draft per account exists.
    async fn save_draft(&self, draft: DraftReconciliation) -> Result<Reconciliation>;

    fn get_draft(&self, company: &str, account_number: &str) -> Result<Option<Reconciliation>>;

    fn get_by_id(&self, id: i32) -> Result<Option<Reconciliation>>;

    /// Non-draft rows, newest reconcile date first.
    fn history(
        &self,
        company: &str,
        account_number: &str,
        limit: i64,
    ) -> Result<Vec<Reconciliation>>;

    fn last_committed(&self, company: &str, account_number: &str)
        -> Result<Option<Reconciliation>>;

    /// Transitions draft to committed, stamping `committed_at`. Fails with
    /// `Conflict` when the row is not a draft.
    async fn commit(&self, id: i32, by_user: &str) -> Result<Reconciliation>;

    /// Transitions committed to archived.
    async fn archive(&self, id: i32) -> Result<Reconciliation>;

    async fn delete_draft(&self, company: &str, account_number: &str) -> Result<usize>;

    /// Writes a recovered legacy snapshot as a committed row. Only the
    /// explicit migration path calls this.
    async fn insert_recovered(
        &self,
        company: &str,
        snapshot: RecoveredReconciliation,
        by_user: &str,
    ) -> Result<Reconciliation>;
}

/// Business operations over reconciliation state.
#[async_trait]
pub trait ReconciliationServiceTrait: Send + Sync {
    async fn save_draft(&self, draft: DraftReconciliation) -> Result<Reconciliation>;

    fn get_draft(&self, company: &str, account_number: &str) -> Result<Option<Reconciliation>>;

    fn get_by_id(&self, id: i32) -> Result<Option<Reconciliation>>;

    fn get_history(
        &self,
        company: &str,
        account_number: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Reconciliation>>;

    /// The most recent committed reconciliation, falling back to the legacy
    /// CHECKREC table when the store has none. Recovered snapshots are
    /// presented, never silently persisted.
    fn get_last_committed(&self, company: &str, account_number: &str) -> Result<LastCommitted>;

    async fn commit(&self, id: i32, by_user: &str) -> Result<Reconciliation>;

    async fn archive(&self, id: i32) -> Result<Reconciliation>;

    async fn delete_draft(&self, company: &str, account_number: &str) -> Result<usize>;

    /// Reads the latest CHECKREC row for the account.
    fn recover_last_from_dbf(&self, company: &str, account_number: &str) -> Result<LastCommitted>;

    /// Explicitly persists a recovered snapshot as committed history.
    async fn migrate_recovered(
        &self,
        company: &str,
        snapshot: RecoveredReconciliation,
        by_user: &str,
    ) -> Result<Reconciliation>;
}
