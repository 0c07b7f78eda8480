use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info};
use num_traits::ToPrimitive;

use super::reconciliation_model::{
    DraftReconciliation, LastCommitted, Reconciliation, RecoveredReconciliation,
};
use super::reconciliation_traits::{ReconciliationRepositoryTrait, ReconciliationServiceTrait};
use crate::constants::CHECKREC_TABLE;
use crate::dbf::{CellValue, DbfService};
use crate::errors::Result;

const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Draft/commit state machine over the repository, plus cold-start recovery
/// from the legacy CHECKREC table.
pub struct ReconciliationService {
    repository: Arc<dyn ReconciliationRepositoryTrait>,
    dbf: DbfService,
}

impl ReconciliationService {
    pub fn new(repository: Arc<dyn ReconciliationRepositoryTrait>, dbf: DbfService) -> Self {
        Self { repository, dbf }
    }
}

#[async_trait]
impl ReconciliationServiceTrait for ReconciliationService {
    async fn save_draft(&self, draft: DraftReconciliation) -> Result<Reconciliation> {
        draft.validate()?;
        let saved = self.repository.save_draft(draft).await.inspect_err(|e| {
            error!("saving reconciliation draft failed: {}", e);
        })?;
        info!(
            "draft saved for {}/{} ({} selected checks)",
            saved.company,
            saved.account_number,
            saved.selected_checks.len()
        );
        Ok(saved)
    }

    fn get_draft(&self, company: &str, account_number: &str) -> Result<Option<Reconciliation>> {
        self.repository.get_draft(company, account_number)
    }

    fn get_by_id(&self, id: i32) -> Result<Option<Reconciliation>> {
        self.repository.get_by_id(id)
    }

    fn get_history(
        &self,
        company: &str,
        account_number: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Reconciliation>> {
        self.repository
            .history(company, account_number, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
    }

    fn get_last_committed(&self, company: &str, account_number: &str) -> Result<LastCommitted> {
        if let Some(stored) = self.repository.last_committed(company, account_number)? {
            return Ok(LastCommitted::Stored(stored));
        }
        self.recover_last_from_dbf(company, account_number)
    }

    async fn commit(&self, id: i32, by_user: &str) -> Result<Reconciliation> {
        let committed = self.repository.commit(id, by_user).await.inspect_err(|e| {
            error!("commit of reconciliation {} failed: {}", id, e);
        })?;
        info!(
            "reconciliation {} committed for {}/{} by {}",
            committed.id, committed.company, committed.account_number, by_user
        );
        Ok(committed)
    }

    async fn archive(&self, id: i32) -> Result<Reconciliation> {
        self.repository.archive(id).await
    }

    async fn delete_draft(&self, company: &str, account_number: &str) -> Result<usize> {
        let deleted = self.repository.delete_draft(company, account_number).await?;
        if deleted > 0 {
            info!("draft deleted for {}/{}", company, account_number);
        }
        Ok(deleted)
    }

    fn recover_last_from_dbf(&self, company: &str, account_number: &str) -> Result<LastCommitted> {
        let stream = match self.dbf.open_stream(company, CHECKREC_TABLE) {
            Ok(stream) => stream,
            // A company without the table simply has no legacy history.
            Err(crate::errors::Error::DbfMissing(_)) => return Ok(LastCommitted::NoData),
            Err(e) => return Err(e),
        };

        let account_idx = stream.column_index("CACCTNO");
        let date_idx = stream.column_index("DRECDATE");
        let begin_idx = stream.column_index("NBEGBAL");
        let end_idx = stream.column_index("NENDBAL");
        let count_idx = stream.column_index("NCLEARED");
        let amount_idx = stream.column_index("NCLEAREDAMT");

        let wanted = account_number.trim();
        let mut latest: Option<RecoveredReconciliation> = None;
        for (_, values) in stream {
            let get = |idx: Option<usize>| idx.and_then(|i| values.get(i));

            let row_account = get(account_idx)
                .map(|v| v.to_string().trim().to_string())
                .unwrap_or_default();
            if !row_account.eq_ignore_ascii_case(wanted) {
                continue;
            }
            let Some(date) = get(date_idx).and_then(CellValue::as_date) else {
                continue;
            };
            if latest
                .as_ref()
                .map(|l| date <= l.reconcile_date)
                .unwrap_or(false)
            {
                continue;
            }
            latest = Some(RecoveredReconciliation {
                account_number: row_account,
                reconcile_date: date,
                beginning_balance: get(begin_idx)
                    .and_then(CellValue::as_number)
                    .unwrap_or_default(),
                ending_balance: get(end_idx)
                    .and_then(CellValue::as_number)
                    .unwrap_or_default(),
                cleared_count: get(count_idx)
                    .and_then(CellValue::as_number)
                    .and_then(|n| n.to_i32())
                    .unwrap_or_default(),
                cleared_amount: get(amount_idx)
                    .and_then(CellValue::as_number)
                    .unwrap_or_default(),
            });
        }

        match latest {
            Some(snapshot) => {
                info!(
                    "recovered reconciliation {}/{} dated {}",
                    company, snapshot.account_number, snapshot.reconcile_date
                );
                Ok(LastCommitted::Recovered(snapshot))
            }
            None => Ok(LastCommitted::NoData),
        }
    }

    async fn migrate_recovered(
        &self,
        company: &str,
        snapshot: RecoveredReconciliation,
        by_user: &str,
    ) -> Result<Reconciliation> {
        let migrated = self
            .repository
            .insert_recovered(company, snapshot, by_user)
            .await?;
        info!(
            "recovered reconciliation migrated into the store as {} for {}/{}",
            migrated.id, migrated.company, migrated.account_number
        );
        Ok(migrated)
    }
}

#[cfg(test)]
mod reconciliation_service_tests {
    use super::*;
    use crate::dbf::{DbfTable, FieldDescriptor, FieldKind};
    use crate::errors::Error;
    use crate::reconciliation::ReconciliationStatus;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct StubRepo {
        last_committed: Mutex<Option<Reconciliation>>,
    }

    #[async_trait]
    impl ReconciliationRepositoryTrait for StubRepo {
        async fn save_draft(&self, _draft: DraftReconciliation) -> Result<Reconciliation> {
            Err(Error::Unexpected("not used".into()))
        }

        fn get_draft(&self, _c: &str, _a: &str) -> Result<Option<Reconciliation>> {
            Ok(None)
        }

        fn get_by_id(&self, _id: i32) -> Result<Option<Reconciliation>> {
            Ok(None)
        }

        fn history(&self, _c: &str, _a: &str, _l: i64) -> Result<Vec<Reconciliation>> {
            Ok(Vec::new())
        }

        fn last_committed(&self, _c: &str, _a: &str) -> Result<Option<Reconciliation>> {
            Ok(self.last_committed.lock().unwrap().clone())
        }

        async fn commit(&self, _id: i32, _by: &str) -> Result<Reconciliation> {
            Err(Error::Unexpected("not used".into()))
        }

        async fn archive(&self, _id: i32) -> Result<Reconciliation> {
            Err(Error::Unexpected("not used".into()))
        }

        async fn delete_draft(&self, _c: &str, _a: &str) -> Result<usize> {
            Ok(0)
        }

        async fn insert_recovered(
            &self,
            _company: &str,
            _snapshot: RecoveredReconciliation,
            _by_user: &str,
        ) -> Result<Reconciliation> {
            Err(Error::Unexpected("not used".into()))
        }
    }

    fn write_checkrec(dir: &std::path::Path) {
        let mut table = DbfTable::create(
            dir.join("CHECKREC.dbf"),
            vec![
                FieldDescriptor {
                    name: "CACCTNO".into(),
                    kind: FieldKind::Character,
                    length: 10,
                    decimals: 0,
                },
                FieldDescriptor {
                    name: "DRECDATE".into(),
                    kind: FieldKind::Date,
                    length: 8,
                    decimals: 0,
                },
                FieldDescriptor {
                    name: "NBEGBAL".into(),
                    kind: FieldKind::Numeric,
                    length: 12,
                    decimals: 2,
                },
                FieldDescriptor {
                    name: "NENDBAL".into(),
                    kind: FieldKind::Numeric,
                    length: 12,
                    decimals: 2,
                },
                FieldDescriptor {
                    name: "NCLEARED".into(),
                    kind: FieldKind::Numeric,
                    length: 6,
                    decimals: 0,
                },
                FieldDescriptor {
                    name: "NCLEAREDAMT".into(),
                    kind: FieldKind::Numeric,
                    length: 12,
                    decimals: 2,
                },
            ],
        )
        .unwrap();
        let rows = [
            ("1000", (2024, 1, 31), dec!(900.00), dec!(1000.00), dec!(4), dec!(310.00)),
            ("1000", (2024, 2, 29), dec!(1000.00), dec!(1200.00), dec!(6), dec!(450.00)),
            ("2000", (2024, 3, 31), dec!(50.00), dec!(60.00), dec!(1), dec!(10.00)),
        ];
        for (account, (y, m, d), begin, end, count, amount) in rows {
            table
                .append_record(&[
                    CellValue::Text(account.into()),
                    CellValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap()),
                    CellValue::Number(begin),
                    CellValue::Number(end),
                    CellValue::Number(count),
                    CellValue::Number(amount),
                ])
                .unwrap();
        }
    }

    #[test]
    fn recovery_picks_the_latest_row_for_the_account() {
        let dir = TempDir::new().unwrap();
        write_checkrec(dir.path());
        let company = dir.path().to_str().unwrap().to_string();

        let service = ReconciliationService::new(Arc::new(StubRepo::default()), DbfService::new());
        let recovered = service.recover_last_from_dbf(&company, "1000").unwrap();

        match recovered {
            LastCommitted::Recovered(snapshot) => {
                assert_eq!(
                    snapshot.reconcile_date,
                    NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
                );
                assert_eq!(snapshot.beginning_balance, dec!(1000.00));
                assert_eq!(snapshot.ending_balance, dec!(1200.00));
                assert_eq!(snapshot.cleared_count, 6);
                assert_eq!(snapshot.cleared_amount, dec!(450.00));
            }
            other => panic!("expected a recovered snapshot, got {:?}", other),
        }
    }

    #[test]
    fn recovery_reports_no_data_for_unknown_accounts_and_missing_tables() {
        let dir = TempDir::new().unwrap();
        write_checkrec(dir.path());
        let company = dir.path().to_str().unwrap().to_string();
        let service = ReconciliationService::new(Arc::new(StubRepo::default()), DbfService::new());

        assert_eq!(
            service.recover_last_from_dbf(&company, "9999").unwrap(),
            LastCommitted::NoData
        );

        let empty = TempDir::new().unwrap();
        let missing = empty.path().to_str().unwrap().to_string();
        assert_eq!(
            service.recover_last_from_dbf(&missing, "1000").unwrap(),
            LastCommitted::NoData
        );
    }

    #[test]
    fn last_committed_prefers_the_store_over_recovery() {
        let dir = TempDir::new().unwrap();
        write_checkrec(dir.path());
        let company = dir.path().to_str().unwrap().to_string();

        let repo = Arc::new(StubRepo::default());
        let service = ReconciliationService::new(repo.clone(), DbfService::new());

        // Empty store: falls through to the legacy table.
        assert!(matches!(
            service.get_last_committed(&company, "1000").unwrap(),
            LastCommitted::Recovered(_)
        ));

        // With a stored row, recovery is not consulted.
        let now = chrono::Utc::now().naive_utc();
        *repo.last_committed.lock().unwrap() = Some(Reconciliation {
            id: 9,
            company: company.clone(),
            account_number: "1000".into(),
            reconcile_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            beginning_balance: dec!(1.00),
            statement_balance: dec!(1.00),
            statement_credits: dec!(0.00),
            statement_debits: dec!(0.00),
            ending_balance: dec!(1.00),
            selected_checks: Vec::new(),
            status: ReconciliationStatus::Committed,
            created_by: "alice".into(),
            created_at: now,
            updated_at: now,
            committed_at: Some(now),
            dbf_row_index: None,
            dbf_last_sync: None,
            extended_data: None,
        });
        assert!(matches!(
            service.get_last_committed(&company, "1000").unwrap(),
            LastCommitted::Stored(r) if r.id == 9
        ));
    }
}
