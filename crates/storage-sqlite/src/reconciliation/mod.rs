//! Reconciliation storage.

mod model;
mod repository;

pub use model::ReconciliationDB;
pub use repository::ReconciliationRepository;
