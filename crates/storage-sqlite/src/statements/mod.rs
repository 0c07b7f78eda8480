//! Bank statement storage.

mod model;
mod repository;

pub use model::{BankStatementDB, BankTransactionDB};
pub use repository::StatementRepository;
