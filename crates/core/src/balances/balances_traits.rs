//! Balance cache repository and service traits.
//!
//! These traits define the contract without any database-specific types,
//! allowing for different storage implementations.

use async_trait::async_trait;

use super::balances_model::{
    BalanceHistoryEntry, CachedBalance, ChecksRefreshOutcome, GlRefreshOutcome, ManualAdjustment,
    RefreshAllSummary,
};
use crate::errors::Result;

/// Persistence contract for the cached balances and their history.
///
/// Every `apply_*` method upserts its dimension and appends the matching
/// history row inside a single transaction: a failure leaves both untouched.
#[async_trait]
pub trait BalanceRepositoryTrait: Send + Sync {
    fn get(&self, company: &str, account_number: &str) -> Result<Option<CachedBalance>>;

    /// Active bank accounts of a company, ordered by account number.
    fn list_bank_accounts(&self, company: &str) -> Result<Vec<CachedBalance>>;

    async fn apply_gl_refresh(&self, outcome: GlRefreshOutcome) -> Result<CachedBalance>;

    async fn apply_checks_refresh(&self, outcome: ChecksRefreshOutcome) -> Result<CachedBalance>;

    async fn apply_manual_adjustment(&self, adjustment: ManualAdjustment) -> Result<CachedBalance>;

    fn history(
        &self,
        company: &str,
        account_number: &str,
        limit: i64,
    ) -> Result<Vec<BalanceHistoryEntry>>;
}

/// Business operations over the balance cache.
#[async_trait]
pub trait BalanceServiceTrait: Send + Sync {
    /// The cached view, or none when the account was never refreshed.
    fn get_cached(&self, company: &str, account_number: &str) -> Result<Option<CachedBalance>>;

    /// Cached rows for every active bank account of the company.
    fn list_cached(&self, company: &str) -> Result<Vec<CachedBalance>>;

    /// Recomputes the GL balance from GLMASTER and persists it.
    async fn refresh_gl(
        &self,
        company: &str,
        account_number: &str,
        by_user: &str,
    ) -> Result<CachedBalance>;

    /// Recomputes the outstanding-checks totals from CHECKS and persists them.
    async fn refresh_checks(
        &self,
        company: &str,
        account_number: &str,
        by_user: &str,
    ) -> Result<CachedBalance>;

    /// Refreshes both dimensions for every bank account in the chart of
    /// accounts.
    async fn refresh_all(&self, company: &str, by_user: &str) -> Result<RefreshAllSummary>;

    /// Records a user-entered correction with a reason.
    async fn record_manual_adjustment(&self, adjustment: ManualAdjustment)
        -> Result<CachedBalance>;

    fn history(
        &self,
        company: &str,
        account_number: &str,
        limit: i64,
    ) -> Result<Vec<BalanceHistoryEntry>>;
}
