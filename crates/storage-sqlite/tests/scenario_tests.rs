//! End-to-end scenarios over real DBF fixtures and a real SQLite database:
//! refresh math, draft upsert, matching determinism, manual pins, and
//! reconciliation write-back.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use financialsx_core::balances::{
    BalanceService, BalanceServiceTrait, ChangeType, Freshness,
};
use financialsx_core::checks::ChecksService;
use financialsx_core::dbf::{CellValue, DbfService, DbfTable, FieldDescriptor, FieldKind};
use financialsx_core::errors::Error;
use financialsx_core::reconciliation::{
    DraftReconciliation, ReconciliationService, ReconciliationServiceTrait, ReconciliationStatus,
    SelectedCheck,
};
use financialsx_core::statements::{
    MatchOptions, MatchType, StatementService, StatementServiceTrait,
};
use financialsx_storage_sqlite::balances::BalanceRepository;
use financialsx_storage_sqlite::reconciliation::ReconciliationRepository;
use financialsx_storage_sqlite::statements::StatementRepository;
use financialsx_storage_sqlite::{create_pool, get_db_path, init, spawn_writer};

struct Harness {
    _company_dir: TempDir,
    company: String,
    balances: BalanceService,
    reconciliations: ReconciliationService,
    statements: StatementService,
    checks: ChecksService,
}

fn field(name: &str, kind: FieldKind, length: u8, decimals: u8) -> FieldDescriptor {
    FieldDescriptor {
        name: name.into(),
        kind,
        length,
        decimals,
    }
}

fn checks_layout() -> Vec<FieldDescriptor> {
    vec![
        field("CIDCHEC", FieldKind::Character, 12, 0),
        field("CCHECKNO", FieldKind::Character, 10, 0),
        field("NAMOUNT", FieldKind::Numeric, 12, 2),
        field("CACCTNO", FieldKind::Character, 10, 0),
        field("LCLEARED", FieldKind::Logical, 1, 0),
        field("LVOID", FieldKind::Logical, 1, 0),
        field("DCHECKDATE", FieldKind::Date, 8, 0),
        field("CPAYEE", FieldKind::Character, 25, 0),
        field("CBATCH", FieldKind::Character, 8, 0),
    ]
}

struct CheckFixture {
    id: &'static str,
    number: &'static str,
    amount: Decimal,
    account: &'static str,
    cleared: bool,
    void: bool,
    date: (i32, u32, u32),
    payee: &'static str,
}

fn write_checks(dir: &std::path::Path, rows: &[CheckFixture]) {
    let mut table = DbfTable::create(dir.join("CHECKS.dbf"), checks_layout()).unwrap();
    for row in rows {
        table
            .append_record(&[
                CellValue::Text(row.id.into()),
                CellValue::Text(row.number.into()),
                CellValue::Number(row.amount),
                CellValue::Text(row.account.into()),
                CellValue::Bool(row.cleared),
                CellValue::Bool(row.void),
                CellValue::Date(NaiveDate::from_ymd_opt(row.date.0, row.date.1, row.date.2).unwrap()),
                CellValue::Text(row.payee.into()),
                CellValue::Null,
            ])
            .unwrap();
    }
}

fn write_glmaster(dir: &std::path::Path, rows: &[(&str, Decimal, Decimal)]) {
    let mut table = DbfTable::create(
        dir.join("GLMASTER.dbf"),
        vec![
            field("CACCTNO", FieldKind::Character, 10, 0),
            field("NDEBITS", FieldKind::Numeric, 12, 2),
            field("NCREDITS", FieldKind::Numeric, 12, 2),
        ],
    )
    .unwrap();
    for (account, debit, credit) in rows {
        table
            .append_record(&[
                CellValue::Text((*account).into()),
                CellValue::Number(*debit),
                CellValue::Number(*credit),
            ])
            .unwrap();
    }
}

fn write_coa(dir: &std::path::Path, rows: &[(&str, &str, bool)]) {
    let mut table = DbfTable::create(
        dir.join("COA.dbf"),
        vec![
            field("CACCTNO", FieldKind::Character, 10, 0),
            field("CACCTDESC", FieldKind::Character, 30, 0),
            field("LBANKACCT", FieldKind::Logical, 1, 0),
        ],
    )
    .unwrap();
    for (account, description, bank) in rows {
        table
            .append_record(&[
                CellValue::Text((*account).into()),
                CellValue::Text((*description).into()),
                CellValue::Bool(*bank),
            ])
            .unwrap();
    }
}

async fn harness() -> Harness {
    let company_dir = TempDir::new().unwrap();
    let company = company_dir.path().to_str().unwrap().to_string();

    let db_path = get_db_path(company_dir.path());
    init(&db_path).unwrap();
    let pool = create_pool(&db_path).unwrap();
    let writer = spawn_writer(pool.clone());

    let dbf = DbfService::new();
    let checks = ChecksService::new(dbf.clone());

    let balances = BalanceService::new(
        Arc::new(BalanceRepository::new(pool.clone(), writer.clone())),
        checks.clone(),
        dbf.clone(),
    );
    let reconciliations = ReconciliationService::new(
        Arc::new(ReconciliationRepository::new(pool.clone(), writer.clone())),
        dbf.clone(),
    );
    let statements = StatementService::new(
        Arc::new(StatementRepository::new(pool.clone(), writer.clone())),
        checks.clone(),
    );

    Harness {
        _company_dir: company_dir,
        company,
        balances,
        reconciliations,
        statements,
        checks,
    }
}

fn company_path(harness: &Harness) -> &std::path::Path {
    harness._company_dir.path()
}

// =============================================================================
// S1 / property 1 - GL refresh math, history, idempotence
// =============================================================================

#[tokio::test]
async fn s1_gl_refresh_computes_the_sum_and_appends_one_history_row() {
    let h = harness().await;
    write_glmaster(
        company_path(&h),
        &[
            ("1000", dec!(100.00), dec!(0.00)),
            ("1000", dec!(0.00), dec!(40.00)),
            ("1000", dec!(25.00), dec!(0.00)),
        ],
    );
    write_coa(company_path(&h), &[("1000", "Operating", true)]);

    let cached = h.balances.refresh_gl(&h.company, "1000", "alice").await.unwrap();
    assert_eq!(cached.gl_balance, dec!(85.00));
    assert_eq!(cached.gl_record_count, 3);
    assert_eq!(cached.bank_balance, dec!(85.00));
    assert!(cached.is_bank_account);
    assert_eq!(cached.account_name.as_deref(), Some("Operating"));
    assert_eq!(cached.gl_freshness(), Freshness::Fresh);

    let history = h.balances.history(&h.company, "1000", 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].change_type, ChangeType::GlRefresh);
    assert_eq!(history[0].old_gl_balance, None);
    assert_eq!(history[0].new_gl_balance, Some(dec!(85.00)));
    assert_eq!(history[0].changed_by, "alice");

    // Property 1: a second refresh with no DBF mutation is a no-op that
    // changes nothing and (documented choice) writes no extra history row.
    let again = h.balances.refresh_gl(&h.company, "1000", "alice").await.unwrap();
    assert_eq!(again.gl_balance, dec!(85.00));
    assert_eq!(again.gl_record_count, 3);
    assert_eq!(h.balances.history(&h.company, "1000", 10).unwrap().len(), 1);
}

// =============================================================================
// S2 / property 2 - outstanding selection and the bank balance identity
// =============================================================================

#[tokio::test]
async fn s2_outstanding_selection_and_bank_balance_identity() {
    let h = harness().await;
    write_glmaster(company_path(&h), &[("1000", dec!(500.00), dec!(100.00))]);
    write_coa(company_path(&h), &[("1000", "Operating", true)]);
    write_checks(
        company_path(&h),
        &[
            CheckFixture { id: "A1", number: "1001", amount: dec!(50.00), account: "1000", cleared: false, void: false, date: (2024, 1, 10), payee: "Smith" },
            CheckFixture { id: "A2", number: "1002", amount: dec!(75.00), account: "1000", cleared: true, void: false, date: (2024, 1, 11), payee: "Acme" },
            CheckFixture { id: "A3", number: "1003", amount: dec!(0.00), account: "1000", cleared: false, void: true, date: (2024, 1, 12), payee: "Void" },
            CheckFixture { id: "A4", number: "1004", amount: dec!(20.00), account: "1000", cleared: false, void: false, date: (2024, 1, 13), payee: "Basin" },
        ],
    );

    h.balances.refresh_gl(&h.company, "1000", "alice").await.unwrap();
    let cached = h
        .balances
        .refresh_checks(&h.company, "1000", "alice")
        .await
        .unwrap();

    assert_eq!(cached.outstanding_total, dec!(70.00));
    assert_eq!(cached.outstanding_count, 2);
    // bank_balance == gl_balance + outstanding_total, via the generated column.
    assert_eq!(cached.gl_balance, dec!(400.00));
    assert_eq!(cached.bank_balance, dec!(470.00));

    // Each dimension wrote its own history row.
    let history = h.balances.history(&h.company, "1000", 10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].change_type, ChangeType::ChecksRefresh);

    let listed = h.balances.list_cached(&h.company).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].account_number, "1000");
}

// =============================================================================
// S3 - draft upsert, commit, conflict
// =============================================================================

fn draft(company: &str, selected: Vec<SelectedCheck>) -> DraftReconciliation {
    DraftReconciliation {
        company: company.to_string(),
        account_number: "1000".into(),
        reconcile_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        beginning_balance: dec!(1000.00),
        statement_balance: dec!(1150.00),
        statement_credits: dec!(400.00),
        statement_debits: dec!(250.00),
        selected_checks: selected,
        created_by: "alice".into(),
    }
}

#[tokio::test]
async fn s3_save_draft_upserts_in_place() {
    let h = harness().await;

    let first = h.reconciliations.save_draft(draft(&h.company, Vec::new())).await.unwrap();
    assert_eq!(first.status, ReconciliationStatus::Draft);
    assert_eq!(first.ending_balance, dec!(1150.00));

    let selected = vec![SelectedCheck {
        check_id: "A1".into(),
        check_number: "1001".into(),
        amount: dec!(50.00),
        check_date: NaiveDate::from_ymd_opt(2024, 1, 10),
        payee: "Smith Supply".into(),
        dbf_row_index: Some(0),
    }];
    let second = h
        .reconciliations
        .save_draft(draft(&h.company, selected.clone()))
        .await
        .unwrap();

    // Updated in place, not duplicated.
    assert_eq!(second.id, first.id);
    assert_eq!(second.selected_checks, selected);

    let stored = h.reconciliations.get_draft(&h.company, "1000").unwrap().unwrap();
    assert_eq!(stored.id, first.id);
    assert_eq!(stored.selected_checks, selected);

    // Commit transitions the draft; committing again conflicts.
    let committed = h.reconciliations.commit(first.id, "alice").await.unwrap();
    assert_eq!(committed.status, ReconciliationStatus::Committed);
    assert!(committed.committed_at.is_some());
    assert!(matches!(
        h.reconciliations.commit(first.id, "alice").await.unwrap_err(),
        Error::Conflict(_)
    ));

    // The committed row shows up in history, and no draft remains.
    assert!(h.reconciliations.get_draft(&h.company, "1000").unwrap().is_none());
    let history = h.reconciliations.get_history(&h.company, "1000", None).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ReconciliationStatus::Committed);
}

// =============================================================================
// S4 / property 3/4 - matching determinism through the full import flow
// =============================================================================

#[tokio::test]
async fn s4_matching_picks_the_globally_consistent_pairing() {
    let h = harness().await;
    write_checks(
        company_path(&h),
        &[
            CheckFixture { id: "C200", number: "200", amount: dec!(123.45), account: "1000", cleared: false, void: false, date: (2024, 1, 10), payee: "Smith" },
            CheckFixture { id: "C201", number: "201", amount: dec!(123.45), account: "1000", cleared: false, void: false, date: (2024, 1, 15), payee: "Smith" },
        ],
    );

    let csv = b"Date,Check Number,Description,Amount\n\
        01/12/2024,,CHECK WITHDRAWAL,(123.45)\n\
        01/16/2024,201,CHECK 201,(123.45)\n";
    let outcome = h
        .statements
        .import(
            &h.company,
            "1000",
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            csv,
            false,
        )
        .await
        .unwrap();
    assert_eq!(outcome.statement.transaction_count, 2);
    assert_eq!(outcome.statement.matched_count, 0);

    let summary = h
        .statements
        .run_matching(&h.company, "1000", MatchOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.matched, 2);

    let repo = StatementRepositoryHandle::new(&h).await;
    let transactions = repo.transactions_for_batch(&outcome.statement.batch_id);
    let t1 = &transactions[0];
    let t2 = &transactions[1];

    // The numbered transaction takes its check; the other takes the
    // closest-date check - never the crossed assignment.
    assert_eq!(t2.matched_check_id.as_deref(), Some("C201"));
    assert_eq!(t1.matched_check_id.as_deref(), Some("C200"));
    assert!(t1.is_matched && t2.is_matched);
    assert_eq!(t1.match_type, Some(MatchType::AmountExact));

    // Property 3: the statement's matched_count equals its matched rows.
    let statement = repo.statement_by_batch(&outcome.statement.batch_id);
    assert_eq!(statement.matched_count, 2);

    // Property 4: no check id appears twice.
    let mut ids: Vec<_> = transactions
        .iter()
        .filter_map(|t| t.matched_check_id.clone())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 2);
}

/// Small read-side helper over the raw repository, for assertions.
struct StatementRepositoryHandle {
    repo: StatementRepository,
}

impl StatementRepositoryHandle {
    async fn new(h: &Harness) -> Self {
        let db_path = get_db_path(company_path(h));
        let pool = create_pool(&db_path).unwrap();
        let writer = spawn_writer(pool.clone());
        Self {
            repo: StatementRepository::new(pool, writer),
        }
    }

    fn transactions_for_batch(
        &self,
        batch_id: &str,
    ) -> Vec<financialsx_core::statements::BankTransaction> {
        use financialsx_core::statements::StatementRepositoryTrait;
        self.repo.transactions_for_batch(batch_id).unwrap()
    }

    fn statement_by_batch(&self, batch_id: &str) -> financialsx_core::statements::BankStatement {
        let transactions = self.transactions_for_batch(batch_id);
        use financialsx_core::statements::StatementRepositoryTrait;
        self.repo
            .get_statement_by_id(transactions[0].statement_id)
            .unwrap()
            .unwrap()
    }
}

// =============================================================================
// S5 - manual pins survive reruns
// =============================================================================

#[tokio::test]
async fn s5_manual_match_survives_a_rerun() {
    let h = harness().await;
    write_checks(
        company_path(&h),
        &[
            CheckFixture { id: "C300", number: "300", amount: dec!(55.00), account: "1000", cleared: false, void: false, date: (2024, 2, 5), payee: "Far" },
            CheckFixture { id: "C301", number: "301", amount: dec!(55.00), account: "1000", cleared: false, void: false, date: (2024, 2, 10), payee: "Near" },
        ],
    );

    let csv = b"Date,Description,Amount\n02/11/2024,CHECK WITHDRAWAL,(55.00)\n";
    let outcome = h
        .statements
        .import(
            &h.company,
            "1000",
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            csv,
            false,
        )
        .await
        .unwrap();
    let transaction_id = outcome.transactions[0].id;

    // Pin the transaction to the check the algorithm would not pick.
    let pinned = h.statements.manual_match(transaction_id, "C300", 0).await.unwrap();
    assert_eq!(pinned.match_type, Some(MatchType::Manual));
    assert_eq!(pinned.match_confidence, dec!(1.0));
    assert!(pinned.manually_matched);

    // A second manual match over the pin is a conflict.
    assert!(matches!(
        h.statements.manual_match(transaction_id, "C301", 1).await.unwrap_err(),
        Error::Conflict(_)
    ));

    let summary = h
        .statements
        .rerun(&h.company, "1000", MatchOptions::default())
        .await
        .unwrap();

    let repo = StatementRepositoryHandle::new(&h).await;
    let transactions = repo.transactions_for_batch(&outcome.statement.batch_id);
    assert_eq!(transactions[0].matched_check_id.as_deref(), Some("C300"));
    assert_eq!(transactions[0].match_type, Some(MatchType::Manual));
    assert!(transactions[0].manually_matched);
    // The only transaction is pinned, so the rerun had nothing to assign and
    // the pinned check stayed off the candidate list.
    assert_eq!(summary.matched, 0);

    // Unmatching releases the pin; a rerun then picks the closest date.
    h.statements.unmatch(transaction_id).await.unwrap();
    h.statements
        .rerun(&h.company, "1000", MatchOptions::default())
        .await
        .unwrap();
    let transactions = repo.transactions_for_batch(&outcome.statement.batch_id);
    assert_eq!(transactions[0].matched_check_id.as_deref(), Some("C301"));
}

// =============================================================================
// S6 - committed reconciliation clears checks in the legacy store
// =============================================================================

#[tokio::test]
async fn s6_reconciliation_clears_matched_checks_everywhere() {
    let h = harness().await;
    write_glmaster(company_path(&h), &[("1000", dec!(1000.00), dec!(0.00))]);
    write_coa(company_path(&h), &[("1000", "Operating", true)]);
    write_checks(
        company_path(&h),
        &[
            CheckFixture { id: "C400", number: "400", amount: dec!(40.00), account: "1000", cleared: false, void: false, date: (2024, 3, 1), payee: "Smith" },
            CheckFixture { id: "C401", number: "401", amount: dec!(41.00), account: "1000", cleared: false, void: false, date: (2024, 3, 2), payee: "Acme" },
        ],
    );

    let csv = b"Date,Check Number,Description,Amount\n\
        03/05/2024,400,CHECK 400,(40.00)\n\
        03/06/2024,401,CHECK 401,(41.00)\n";
    let outcome = h
        .statements
        .import(
            &h.company,
            "1000",
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            csv,
            false,
        )
        .await
        .unwrap();
    h.statements
        .run_matching(&h.company, "1000", MatchOptions::default())
        .await
        .unwrap();

    let committed = {
        let saved = h
            .reconciliations
            .save_draft(DraftReconciliation {
                company: h.company.clone(),
                account_number: "1000".into(),
                reconcile_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                beginning_balance: dec!(1000.00),
                statement_balance: dec!(919.00),
                statement_credits: dec!(0.00),
                statement_debits: dec!(81.00),
                selected_checks: Vec::new(),
                created_by: "alice".into(),
            })
            .await
            .unwrap();
        h.reconciliations.commit(saved.id, "alice").await.unwrap()
    };

    let reconciled = h
        .statements
        .reconcile_batch(&h.company, &outcome.statement.batch_id, committed.id)
        .await
        .unwrap();
    assert_eq!(reconciled, 2);

    // Both checks are cleared in the DBF.
    let remaining = h.checks.scan_outstanding(&h.company, Some("1000")).unwrap();
    assert!(remaining.is_empty());

    // Both transactions carry the reconciliation linkage.
    let repo = StatementRepositoryHandle::new(&h).await;
    for transaction in repo.transactions_for_batch(&outcome.statement.batch_id) {
        assert!(transaction.is_reconciled);
        assert_eq!(transaction.reconciliation_id, Some(committed.id));
        assert!(transaction.reconciled_date.is_some());
    }

    // A checks refresh now sees nothing outstanding.
    let cached = h
        .balances
        .refresh_checks(&h.company, "1000", "alice")
        .await
        .unwrap();
    assert_eq!(cached.outstanding_total, Decimal::ZERO);
    assert_eq!(cached.outstanding_count, 0);
}

// =============================================================================
// Import uniqueness and replace idempotence
// =============================================================================

#[tokio::test]
async fn duplicate_imports_fail_unless_replaced_and_replace_is_idempotent() {
    let h = harness().await;
    write_checks(company_path(&h), &[]);

    let csv = b"Date,Description,Amount\n04/01/2024,DEPOSIT,100.00\n04/02/2024,FEE,(5.00)\n";
    let date = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap();

    let first = h.statements.import(&h.company, "1000", date, csv, false).await.unwrap();
    assert!(matches!(
        h.statements.import(&h.company, "1000", date, csv, false).await.unwrap_err(),
        Error::AlreadyExists(_)
    ));

    // Replacing any number of times converges on the same final state.
    let mut last_batch = String::new();
    for _ in 0..3 {
        let outcome = h.statements.import(&h.company, "1000", date, csv, true).await.unwrap();
        assert_eq!(outcome.statement.transaction_count, 2);
        assert_eq!(outcome.statement.matched_count, 0);
        assert_eq!(outcome.transactions.len(), 2);
        assert_eq!(outcome.transactions[0].amount, dec!(100.00));
        assert_eq!(outcome.transactions[1].amount, dec!(-5.00));
        last_batch = outcome.statement.batch_id.clone();
    }

    // Only the final statement remains.
    let repo = StatementRepositoryHandle::new(&h).await;
    let transactions = repo.transactions_for_batch(&last_batch);
    assert_eq!(transactions.len(), 2);
    assert_ne!(first.statement.batch_id, last_batch);
}
