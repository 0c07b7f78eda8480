//! Cached balance storage.

mod model;
mod repository;

pub use model::{AccountBalanceDB, BalanceHistoryDB};
pub use repository::BalanceRepository;
