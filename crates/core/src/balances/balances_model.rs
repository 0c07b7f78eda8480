//! Cached balance domain models.

use chrono::{NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{CHECKS_AGING_HOURS, CHECKS_STALE_HOURS, GL_AGING_HOURS, GL_STALE_HOURS};

/// How trustworthy a cached dimension is, by age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Aging,
    Stale,
}

impl Freshness {
    /// Labels an age against `(aging, stale)` hour thresholds. A dimension
    /// that was never refreshed is stale.
    pub fn from_age(
        last_updated: Option<NaiveDateTime>,
        now: NaiveDateTime,
        aging_hours: i64,
        stale_hours: i64,
    ) -> Self {
        let Some(updated) = last_updated else {
            return Freshness::Stale;
        };
        let age = now.signed_duration_since(updated);
        if age.num_hours() >= stale_hours {
            Freshness::Stale
        } else if age.num_hours() >= aging_hours {
            Freshness::Aging
        } else {
            Freshness::Fresh
        }
    }

    pub fn for_gl(last_updated: Option<NaiveDateTime>, now: NaiveDateTime) -> Self {
        Self::from_age(last_updated, now, GL_AGING_HOURS, GL_STALE_HOURS)
    }

    pub fn for_checks(last_updated: Option<NaiveDateTime>, now: NaiveDateTime) -> Self {
        Self::from_age(last_updated, now, CHECKS_AGING_HOURS, CHECKS_STALE_HOURS)
    }
}

/// The cached position of one bank account: the GL dimension, the
/// outstanding-checks dimension, and the derived bank balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedBalance {
    pub id: i32,
    pub company: String,
    pub account_number: String,
    pub account_name: Option<String>,

    pub gl_balance: Decimal,
    pub gl_record_count: i32,
    pub gl_last_updated: Option<NaiveDateTime>,

    pub outstanding_total: Decimal,
    pub outstanding_count: i32,
    pub outstanding_last_updated: Option<NaiveDateTime>,

    /// Always `gl_balance + outstanding_total`; the storage layer keeps it as
    /// a generated column.
    pub bank_balance: Decimal,

    pub is_active: bool,
    pub is_bank_account: bool,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl CachedBalance {
    pub fn gl_freshness(&self) -> Freshness {
        Freshness::for_gl(self.gl_last_updated, Utc::now().naive_utc())
    }

    pub fn checks_freshness(&self) -> Freshness {
        Freshness::for_checks(self.outstanding_last_updated, Utc::now().naive_utc())
    }
}

/// Kind of change recorded in the balance history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    GlRefresh,
    ChecksRefresh,
    ManualAdjustment,
    Reconciliation,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::GlRefresh => "gl_refresh",
            ChangeType::ChecksRefresh => "checks_refresh",
            ChangeType::ManualAdjustment => "manual_adjustment",
            ChangeType::Reconciliation => "reconciliation",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "gl_refresh" => Some(ChangeType::GlRefresh),
            "checks_refresh" => Some(ChangeType::ChecksRefresh),
            "manual_adjustment" => Some(ChangeType::ManualAdjustment),
            "reconciliation" => Some(ChangeType::Reconciliation),
            _ => None,
        }
    }
}

/// One append-only history row. Written alongside every cached-balance
/// mutation in the same transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceHistoryEntry {
    pub id: i32,
    pub balance_id: i32,
    pub company: String,
    pub account_number: String,
    pub change_type: ChangeType,
    pub old_gl_balance: Option<Decimal>,
    pub new_gl_balance: Option<Decimal>,
    pub old_outstanding_total: Option<Decimal>,
    pub new_outstanding_total: Option<Decimal>,
    pub old_bank_balance: Option<Decimal>,
    pub new_bank_balance: Option<Decimal>,
    pub reason: Option<String>,
    pub changed_by: String,
    pub changed_at: NaiveDateTime,
}

/// Input for persisting a GL refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlRefreshOutcome {
    pub company: String,
    pub account_number: String,
    pub account_name: Option<String>,
    pub is_bank_account: bool,
    pub gl_balance: Decimal,
    pub gl_record_count: i32,
    pub changed_by: String,
}

/// Input for persisting an outstanding-checks refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksRefreshOutcome {
    pub company: String,
    pub account_number: String,
    pub outstanding_total: Decimal,
    pub outstanding_count: i32,
    pub changed_by: String,
}

/// Input for a user-entered correction of the cached totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAdjustment {
    pub company: String,
    pub account_number: String,
    pub gl_balance: Option<Decimal>,
    pub outstanding_total: Option<Decimal>,
    pub reason: String,
    pub changed_by: String,
}

/// Result of refreshing every bank account of a company.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshAllSummary {
    pub refreshed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn freshness_thresholds_follow_the_dimension() {
        let now = Utc::now().naive_utc();
        let hours = |h: i64| Some(now - Duration::hours(h));

        assert_eq!(Freshness::for_gl(hours(1), now), Freshness::Fresh);
        assert_eq!(Freshness::for_gl(hours(5), now), Freshness::Aging);
        assert_eq!(Freshness::for_gl(hours(25), now), Freshness::Stale);
        assert_eq!(Freshness::for_gl(None, now), Freshness::Stale);

        assert_eq!(Freshness::for_checks(hours(0), now), Freshness::Fresh);
        assert_eq!(Freshness::for_checks(hours(2), now), Freshness::Aging);
        assert_eq!(Freshness::for_checks(hours(5), now), Freshness::Stale);
    }

    #[test]
    fn change_type_round_trips_its_wire_form() {
        for change in [
            ChangeType::GlRefresh,
            ChangeType::ChecksRefresh,
            ChangeType::ManualAdjustment,
            ChangeType::Reconciliation,
        ] {
            assert_eq!(ChangeType::parse(change.as_str()), Some(change));
        }
        assert_eq!(ChangeType::parse("other"), None);
    }
}
