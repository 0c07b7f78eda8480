//! Balances module - the cached per-account position and its history.

mod balances_model;
mod balances_service;
mod balances_traits;

pub use balances_model::{
    BalanceHistoryEntry, CachedBalance, ChangeType, ChecksRefreshOutcome, Freshness,
    GlRefreshOutcome, ManualAdjustment, RefreshAllSummary,
};
pub use balances_service::BalanceService;
pub use balances_traits::{BalanceRepositoryTrait, BalanceServiceTrait};
