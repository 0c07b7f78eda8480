//! SQLite storage implementation for FinancialsX.
//!
//! This crate provides all database-related functionality using Diesel ORM
//! with SQLite. It implements the repository traits defined in
//! `financialsx-core` and contains:
//! - Database connection pooling and management
//! - Diesel migrations
//! - Repository implementations for balances, reconciliations, and statements
//! - Database-specific model types (with Diesel derives)
//!
//! # Architecture
//!
//! This crate is the only place in the application where Diesel dependencies
//! exist. The core crate is database-agnostic and works with traits.
//!
//! ```text
//!        core (domain, DBF, legacy serialization)
//!                         │
//!                         ▼
//!             storage-sqlite (this crate)
//!                         │
//!                         ▼
//!            sql/financialsx.db (per company)
//! ```

pub mod db;
pub mod errors;
pub mod schema;

mod utils;

// Repository implementations
pub mod balances;
pub mod reconciliation;
pub mod statements;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, get_db_path, init, run_migrations, spawn_writer, DbConnection,
    DbPool, WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

// Re-export from financialsx-core for convenience
pub use financialsx_core::errors::{DatabaseError, Error, Result};
