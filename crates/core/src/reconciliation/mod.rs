//! Reconciliation module - draft/commit state and legacy recovery.

mod reconciliation_model;
mod reconciliation_service;
mod reconciliation_traits;

pub use reconciliation_model::{
    DraftReconciliation, LastCommitted, Reconciliation, ReconciliationStatus,
    RecoveredReconciliation, SelectedCheck,
};
pub use reconciliation_service::ReconciliationService;
pub use reconciliation_traits::{ReconciliationRepositoryTrait, ReconciliationServiceTrait};
