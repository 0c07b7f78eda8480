//! Shared constants: legacy table names, column aliases, and tuning knobs.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Legacy table holding chart-of-accounts rows.
pub const COA_TABLE: &str = "COA";
/// Legacy checks register.
pub const CHECKS_TABLE: &str = "CHECKS";
/// Legacy general-ledger master table.
pub const GLMASTER_TABLE: &str = "GLMASTER";
/// Legacy reconciliation history table.
pub const CHECKREC_TABLE: &str = "CHECKREC";
/// Company master file located under the datafiles root.
pub const COMPANY_MASTER_FILE: &str = "compmast.dbf";

/// Account-number column aliases in GLMASTER, checked in order.
pub const GL_ACCOUNT_COLUMNS: &[&str] = &["CACCTNO", "ACCOUNT", "ACCTNO"];
/// Debit-amount column aliases in GLMASTER.
pub const GL_DEBIT_COLUMNS: &[&str] = &["NDEBITS", "DEBIT", "NDEBIT"];
/// Credit-amount column aliases in GLMASTER.
pub const GL_CREDIT_COLUMNS: &[&str] = &["NCREDITS", "CREDIT", "NCREDIT"];

/// GL balance freshness thresholds (hours since last refresh).
pub const GL_AGING_HOURS: i64 = 4;
pub const GL_STALE_HOURS: i64 = 24;
/// Outstanding-checks freshness thresholds (hours since last refresh).
pub const CHECKS_AGING_HOURS: i64 = 1;
pub const CHECKS_STALE_HOURS: i64 = 4;

/// Tolerance used when comparing amounts from heterogeneous sources.
pub const AMOUNT_TOLERANCE: Decimal = dec!(0.01);

/// Default minimum score for a fuzzy statement match.
pub const DEFAULT_MIN_MATCH_SCORE: Decimal = dec!(0.50);

/// Bounded request queue depth for the legacy executor thread.
pub const LEGACY_QUEUE_DEPTH: usize = 128;
/// Default maximum number of pooled legacy sessions.
pub const LEGACY_POOL_MAX: usize = 3;
/// Backoff before the single acquisition retry on a saturated pool.
pub const LEGACY_POOL_RETRY_MS: u64 = 100;

/// Operation timeout for a legacy liveness ping.
pub const LEGACY_PING_TIMEOUT_SECS: u64 = 5;
/// Operation timeout for ordinary legacy queries.
pub const LEGACY_QUERY_TIMEOUT_SECS: u64 = 30;

/// SQLite busy timeout applied to every pooled connection.
pub const SQLITE_BUSY_TIMEOUT_MS: u32 = 5000;

/// Relative location of the per-company SQLite database.
pub const COMPANY_DB_RELATIVE_PATH: &str = "sql/financialsx.db";
