use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use rust_decimal::Decimal;

use super::balances_model::{
    BalanceHistoryEntry, CachedBalance, ChecksRefreshOutcome, GlRefreshOutcome, ManualAdjustment,
    RefreshAllSummary,
};
use super::balances_traits::{BalanceRepositoryTrait, BalanceServiceTrait};
use crate::checks::ChecksService;
use crate::constants::{
    COA_TABLE, GLMASTER_TABLE, GL_ACCOUNT_COLUMNS, GL_CREDIT_COLUMNS, GL_DEBIT_COLUMNS,
};
use crate::dbf::{CellValue, DbfService};
use crate::errors::{Error, Result};

/// Computes and caches each bank account's position from the legacy tables.
pub struct BalanceService {
    repository: Arc<dyn BalanceRepositoryTrait>,
    checks: ChecksService,
    dbf: DbfService,
}

/// One chart-of-accounts row, as far as the cache cares.
struct CoaEntry {
    account_number: String,
    description: Option<String>,
    is_bank_account: bool,
}

impl BalanceService {
    pub fn new(
        repository: Arc<dyn BalanceRepositoryTrait>,
        checks: ChecksService,
        dbf: DbfService,
    ) -> Self {
        Self {
            repository,
            checks,
            dbf,
        }
    }

    /// Sums `debit - credit` over GLMASTER rows for one account.
    ///
    /// Column names vary across data generations; the first alias present
    /// wins. An account column is mandatory; at least one of the amount
    /// columns must exist.
    fn compute_gl_balance(&self, company: &str, account_number: &str) -> Result<(Decimal, i32)> {
        let stream = self.dbf.open_stream(company, GLMASTER_TABLE)?;

        let account_idx = stream.resolve_column(GL_ACCOUNT_COLUMNS).ok_or_else(|| {
            Error::DbfSchema(format!(
                "GLMASTER has no account column (looked for {})",
                GL_ACCOUNT_COLUMNS.join("/")
            ))
        })?;
        let debit_idx = stream.resolve_column(GL_DEBIT_COLUMNS);
        let credit_idx = stream.resolve_column(GL_CREDIT_COLUMNS);
        if debit_idx.is_none() && credit_idx.is_none() {
            return Err(Error::DbfSchema(
                "GLMASTER has neither debit nor credit columns".to_string(),
            ));
        }

        let wanted = account_number.trim();
        let mut balance = Decimal::ZERO;
        let mut count: i32 = 0;
        for (_, values) in stream {
            let row_account = values
                .get(account_idx)
                .map(|v| v.to_string())
                .unwrap_or_default();
            if !row_account.trim().eq_ignore_ascii_case(wanted) {
                continue;
            }
            let debit = debit_idx
                .and_then(|i| values.get(i))
                .and_then(CellValue::as_number)
                .unwrap_or_default();
            let credit = credit_idx
                .and_then(|i| values.get(i))
                .and_then(CellValue::as_number)
                .unwrap_or_default();
            balance += debit - credit;
            count += 1;
        }
        Ok((balance, count))
    }

    /// Looks an account up in COA. Missing tables or accounts degrade to a
    /// non-bank entry rather than failing a refresh.
    fn coa_entry(&self, company: &str, account_number: &str) -> Option<CoaEntry> {
        let entries = self.read_coa(company).ok()?;
        entries
            .into_iter()
            .find(|e| e.account_number.eq_ignore_ascii_case(account_number.trim()))
    }

    fn read_coa(&self, company: &str) -> Result<Vec<CoaEntry>> {
        let stream = self.dbf.open_stream(company, COA_TABLE)?;
        let account_idx = stream
            .column_index("CACCTNO")
            .ok_or_else(|| Error::DbfSchema("COA has no CACCTNO".to_string()))?;
        let desc_idx = stream.column_index("CACCTDESC");
        let bank_idx = stream.column_index("LBANKACCT");

        let mut entries = Vec::new();
        for (_, values) in stream {
            let account_number = values
                .get(account_idx)
                .map(|v| v.to_string().trim().to_string())
                .unwrap_or_default();
            if account_number.is_empty() {
                continue;
            }
            entries.push(CoaEntry {
                account_number,
                description: desc_idx
                    .and_then(|i| values.get(i))
                    .map(|v| v.to_string().trim().to_string())
                    .filter(|s| !s.is_empty()),
                is_bank_account: bank_idx
                    .and_then(|i| values.get(i))
                    .map(CellValue::as_bool)
                    .unwrap_or(false),
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl BalanceServiceTrait for BalanceService {
    fn get_cached(&self, company: &str, account_number: &str) -> Result<Option<CachedBalance>> {
        self.repository.get(company, account_number)
    }

    fn list_cached(&self, company: &str) -> Result<Vec<CachedBalance>> {
        self.repository.list_bank_accounts(company)
    }

    async fn refresh_gl(
        &self,
        company: &str,
        account_number: &str,
        by_user: &str,
    ) -> Result<CachedBalance> {
        let (gl_balance, gl_record_count) = self
            .compute_gl_balance(company, account_number)
            .inspect_err(|e| error!("GL refresh failed for {}/{}: {}", company, account_number, e))?;

        let coa = self.coa_entry(company, account_number);
        let cached = self
            .repository
            .apply_gl_refresh(GlRefreshOutcome {
                company: company.to_string(),
                account_number: account_number.trim().to_string(),
                account_name: coa.as_ref().and_then(|c| c.description.clone()),
                is_bank_account: coa.as_ref().map(|c| c.is_bank_account).unwrap_or(false),
                gl_balance,
                gl_record_count,
                changed_by: by_user.to_string(),
            })
            .await?;

        info!(
            "GL refresh {}/{}: balance {} over {} rows (by {})",
            company, account_number, gl_balance, gl_record_count, by_user
        );
        Ok(cached)
    }

    async fn refresh_checks(
        &self,
        company: &str,
        account_number: &str,
        by_user: &str,
    ) -> Result<CachedBalance> {
        let outstanding = self
            .checks
            .scan_outstanding(company, Some(account_number))
            .inspect_err(|e| {
                error!(
                    "outstanding refresh failed for {}/{}: {}",
                    company, account_number, e
                )
            })?;

        let outstanding_total: Decimal = outstanding.iter().map(|c| c.amount).sum();
        let outstanding_count = outstanding.len() as i32;

        let cached = self
            .repository
            .apply_checks_refresh(ChecksRefreshOutcome {
                company: company.to_string(),
                account_number: account_number.trim().to_string(),
                outstanding_total,
                outstanding_count,
                changed_by: by_user.to_string(),
            })
            .await?;

        info!(
            "outstanding refresh {}/{}: {} checks totaling {} (by {})",
            company, account_number, outstanding_count, outstanding_total, by_user
        );
        Ok(cached)
    }

    async fn refresh_all(&self, company: &str, by_user: &str) -> Result<RefreshAllSummary> {
        let bank_accounts: Vec<CoaEntry> = self
            .read_coa(company)?
            .into_iter()
            .filter(|e| e.is_bank_account)
            .collect();

        let mut summary = RefreshAllSummary::default();
        for entry in bank_accounts {
            let account = entry.account_number.as_str();
            let outcome = async {
                self.refresh_gl(company, account, by_user).await?;
                self.refresh_checks(company, account, by_user).await
            }
            .await;
            match outcome {
                Ok(_) => summary.refreshed.push(account.to_string()),
                Err(e) => {
                    warn!("refresh_all: {}/{} failed: {}", company, account, e);
                    summary.failed.push((account.to_string(), e.to_string()));
                }
            }
        }
        info!(
            "refresh_all {}: {} refreshed, {} failed (by {})",
            company,
            summary.refreshed.len(),
            summary.failed.len(),
            by_user
        );
        Ok(summary)
    }

    async fn record_manual_adjustment(
        &self,
        adjustment: ManualAdjustment,
    ) -> Result<CachedBalance> {
        if adjustment.reason.trim().is_empty() {
            return Err(Error::Validation(
                crate::errors::ValidationError::MissingField("reason".to_string()),
            ));
        }
        let cached = self
            .repository
            .apply_manual_adjustment(adjustment.clone())
            .await?;
        info!(
            "manual adjustment {}/{} by {}: {}",
            adjustment.company, adjustment.account_number, adjustment.changed_by, adjustment.reason
        );
        Ok(cached)
    }

    fn history(
        &self,
        company: &str,
        account_number: &str,
        limit: i64,
    ) -> Result<Vec<BalanceHistoryEntry>> {
        self.repository.history(company, account_number, limit)
    }
}
