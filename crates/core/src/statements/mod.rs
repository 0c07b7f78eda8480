//! Statements module - import batches, CSV parsing, and check matching.

mod csv_parser;
mod matching;
mod statements_model;
mod statements_service;
mod statements_traits;

pub use csv_parser::{parse_statement_csv, write_statement_csv};
pub use matching::{assign, classify, score, ScoreBreakdown};
pub use statements_model::{
    BankStatement, BankTransaction, ImportOutcome, MatchOptions, MatchRunSummary, MatchType,
    MatchUpdate, ParsedStatementRow, StatementImport, TransactionType,
};
pub use statements_service::StatementService;
pub use statements_traits::{StatementRepositoryTrait, StatementServiceTrait};
