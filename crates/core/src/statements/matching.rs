//! Deterministic scoring and assignment of bank transactions to checks.
//!
//! Pure functions over domain models; persistence and candidate selection
//! live in the service. Scores are exact decimals so ordering is total and
//! reruns reproduce the same pairing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::statements_model::{BankTransaction, MatchOptions, MatchType, MatchUpdate};
use crate::checks::CheckRecord;
use crate::constants::AMOUNT_TOLERANCE;

const AMOUNT_POINTS: Decimal = dec!(0.50);
const CHECK_NUMBER_EXACT_POINTS: Decimal = dec!(0.35);
const CHECK_NUMBER_PARTIAL_POINTS: Decimal = dec!(0.20);
const DATE_SAME_POINTS: Decimal = dec!(0.10);
const DATE_3D_POINTS: Decimal = dec!(0.07);
const DATE_7D_POINTS: Decimal = dec!(0.04);
const DATE_30D_POINTS: Decimal = dec!(0.02);
const PAYEE_POINTS: Decimal = dec!(0.05);

const HIGH_CONFIDENCE_THRESHOLD: Decimal = dec!(0.70);
const AMOUNT_EXACT_THRESHOLD: Decimal = dec!(0.55);

/// Per-pair score with the component signals that decide the match type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub score: Decimal,
    pub amount_match: bool,
    pub check_number_exact: bool,
    pub check_number_partial: bool,
    pub same_date: bool,
    pub date_points: Decimal,
}

/// Scores one transaction against one candidate check.
pub fn score(transaction: &BankTransaction, check: &CheckRecord) -> ScoreBreakdown {
    let mut total = Decimal::ZERO;

    // Amount: exact within the cross-source tolerance.
    let amount_match =
        (transaction.amount.abs() - check.amount.abs()).abs() <= AMOUNT_TOLERANCE;
    if amount_match {
        total += AMOUNT_POINTS;
    }

    // Check number: exact, else substring either way.
    let txn_number = transaction
        .check_number
        .as_deref()
        .map(str::trim)
        .unwrap_or("");
    let check_number = check.check_number.trim();
    let mut check_number_exact = false;
    let mut check_number_partial = false;
    if !txn_number.is_empty() && !check_number.is_empty() {
        if txn_number.eq_ignore_ascii_case(check_number) {
            check_number_exact = true;
            total += CHECK_NUMBER_EXACT_POINTS;
        } else if txn_number.to_ascii_lowercase().contains(&check_number.to_ascii_lowercase())
            || check_number
                .to_ascii_lowercase()
                .contains(&txn_number.to_ascii_lowercase())
        {
            check_number_partial = true;
            total += CHECK_NUMBER_PARTIAL_POINTS;
        }
    }

    // Date proximity.
    let mut same_date = false;
    let mut date_points = Decimal::ZERO;
    if let Some(check_date) = check.check_date {
        let distance = (transaction.transaction_date - check_date).num_days().abs();
        date_points = match distance {
            0 => {
                same_date = true;
                DATE_SAME_POINTS
            }
            1..=3 => DATE_3D_POINTS,
            4..=7 => DATE_7D_POINTS,
            8..=30 => DATE_30D_POINTS,
            _ => Decimal::ZERO,
        };
        total += date_points;
    }

    // Payee appears in the description.
    if payee_in_description(&check.payee, &transaction.description) {
        total += PAYEE_POINTS;
    }

    ScoreBreakdown {
        score: total,
        amount_match,
        check_number_exact,
        check_number_partial,
        same_date,
        date_points,
    }
}

fn payee_in_description(payee: &str, description: &str) -> bool {
    let payee = collapse_whitespace(payee);
    if payee.is_empty() {
        return false;
    }
    collapse_whitespace(description).contains(&payee)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Derives the match type from a breakdown, or `None` below `min_score`.
pub fn classify(breakdown: &ScoreBreakdown, min_score: Decimal) -> Option<MatchType> {
    if breakdown.amount_match && breakdown.check_number_exact && breakdown.same_date {
        return Some(MatchType::Exact);
    }
    if breakdown.amount_match
        && !breakdown.check_number_exact
        && !breakdown.check_number_partial
        && AMOUNT_POINTS + breakdown.date_points >= AMOUNT_EXACT_THRESHOLD
    {
        return Some(MatchType::AmountExact);
    }
    if breakdown.score >= HIGH_CONFIDENCE_THRESHOLD {
        return Some(MatchType::HighConfidence);
    }
    if breakdown.score >= min_score {
        return Some(MatchType::Fuzzy);
    }
    None
}

/// Greedy score-maximizing assignment.
///
/// Candidate pairs are sorted by descending score; ties break to the older
/// check date, then the lower transaction id. Each transaction and each
/// check is claimed at most once.
pub fn assign(
    transactions: &[BankTransaction],
    checks: &[CheckRecord],
    options: &MatchOptions,
) -> Vec<MatchUpdate> {
    struct Pair {
        transaction_pos: usize,
        check_pos: usize,
        breakdown: ScoreBreakdown,
        match_type: MatchType,
    }

    let mut pairs = Vec::new();
    for (transaction_pos, transaction) in transactions.iter().enumerate() {
        for (check_pos, check) in checks.iter().enumerate() {
            if options.limit_to_statement_date {
                let Some(statement_date) = options.statement_date else {
                    continue;
                };
                match check.check_date {
                    Some(date) if date <= statement_date => {}
                    _ => continue,
                }
            }
            let breakdown = score(transaction, check);
            if let Some(match_type) = classify(&breakdown, options.min_match_score) {
                pairs.push(Pair {
                    transaction_pos,
                    check_pos,
                    breakdown,
                    match_type,
                });
            }
        }
    }

    pairs.sort_by(|a, b| {
        b.breakdown
            .score
            .cmp(&a.breakdown.score)
            .then_with(|| {
                let a_date = checks[a.check_pos].check_date;
                let b_date = checks[b.check_pos].check_date;
                match (a_date, b_date) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
            })
            .then_with(|| {
                transactions[a.transaction_pos]
                    .id
                    .cmp(&transactions[b.transaction_pos].id)
            })
    });

    let mut claimed_transactions = vec![false; transactions.len()];
    let mut claimed_checks = vec![false; checks.len()];
    let mut updates = Vec::new();
    for pair in pairs {
        if claimed_transactions[pair.transaction_pos] || claimed_checks[pair.check_pos] {
            continue;
        }
        claimed_transactions[pair.transaction_pos] = true;
        claimed_checks[pair.check_pos] = true;

        let check = &checks[pair.check_pos];
        updates.push(MatchUpdate {
            transaction_id: transactions[pair.transaction_pos].id,
            matched_check_id: check.id().to_string(),
            matched_dbf_row_index: check.row_index as i64,
            match_confidence: pair.breakdown.score,
            match_type: pair.match_type,
        });
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn txn(id: i32, amount: Decimal, date: (i32, u32, u32), check_number: &str) -> BankTransaction {
        let now = Utc::now().naive_utc();
        BankTransaction {
            id,
            statement_id: 1,
            batch_id: "batch".into(),
            transaction_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            check_number: Some(check_number.to_string()).filter(|s| !s.is_empty()),
            description: String::new(),
            amount,
            transaction_type: super::super::statements_model::TransactionType::Check,
            matched_check_id: None,
            matched_dbf_row_index: None,
            match_confidence: Decimal::ZERO,
            match_type: None,
            is_matched: false,
            manually_matched: false,
            is_reconciled: false,
            reconciled_date: None,
            reconciliation_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn check(row: usize, number: &str, amount: Decimal, date: (i32, u32, u32)) -> CheckRecord {
        CheckRecord {
            row_index: row,
            check_number: number.into(),
            amount,
            payee: String::new(),
            check_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
            account: "1000".into(),
            cleared: false,
            void: false,
            batch: None,
            legacy_id: Some(format!("ID{}", row)),
        }
    }

    #[test]
    fn exact_needs_amount_number_and_same_date() {
        let t = txn(1, dec!(-123.45), (2024, 1, 10), "200");
        let c = check(0, "200", dec!(123.45), (2024, 1, 10));
        let breakdown = score(&t, &c);
        assert_eq!(breakdown.score, dec!(0.95));
        assert_eq!(
            classify(&breakdown, dec!(0.50)),
            Some(MatchType::Exact)
        );
    }

    #[test]
    fn amount_with_close_date_but_no_number_is_amount_exact() {
        let t = txn(1, dec!(-123.45), (2024, 1, 12), "");
        let c = check(0, "200", dec!(123.45), (2024, 1, 10));
        let breakdown = score(&t, &c);
        assert_eq!(breakdown.score, dec!(0.57));
        assert_eq!(
            classify(&breakdown, dec!(0.50)),
            Some(MatchType::AmountExact)
        );

        // Seven days out, the pair is only fuzzy.
        let far = txn(1, dec!(-123.45), (2024, 1, 17), "");
        let breakdown = score(&far, &c);
        assert_eq!(breakdown.score, dec!(0.54));
        assert_eq!(classify(&breakdown, dec!(0.50)), Some(MatchType::Fuzzy));
    }

    #[test]
    fn amount_tolerance_is_a_penny() {
        let t = txn(1, dec!(-123.46), (2024, 1, 10), "");
        let c = check(0, "200", dec!(123.45), (2024, 1, 10));
        assert!(score(&t, &c).amount_match);

        let off = txn(1, dec!(-123.47), (2024, 1, 10), "");
        assert!(!score(&off, &c).amount_match);
    }

    #[test]
    fn substring_check_numbers_earn_partial_credit() {
        let t = txn(1, dec!(-50.00), (2024, 1, 10), "0001001");
        let c = check(0, "1001", dec!(50.00), (2024, 1, 10));
        let breakdown = score(&t, &c);
        assert!(breakdown.check_number_partial);
        assert_eq!(breakdown.score, dec!(0.80));
        assert_eq!(
            classify(&breakdown, dec!(0.50)),
            Some(MatchType::HighConfidence)
        );
    }

    #[test]
    fn payee_in_description_adds_its_nudge() {
        let mut t = txn(1, dec!(-50.00), (2024, 1, 10), "");
        t.description = "CHECK PAID TO   SMITH  SUPPLY CO".into();
        let mut c = check(0, "1001", dec!(50.00), (2024, 1, 10));
        c.payee = "Smith Supply".into();
        let breakdown = score(&t, &c);
        assert_eq!(breakdown.score, dec!(0.65));
    }

    #[test]
    fn assignment_prefers_the_globally_better_pairing() {
        // Two checks with the same amount; the numbered transaction must take
        // its check, leaving the closest-date check for the other.
        let checks = vec![
            check(0, "200", dec!(123.45), (2024, 1, 10)),
            check(1, "201", dec!(123.45), (2024, 1, 15)),
        ];
        let transactions = vec![
            txn(1, dec!(-123.45), (2024, 1, 12), ""),
            txn(2, dec!(-123.45), (2024, 1, 16), "201"),
        ];

        let updates = assign(&transactions, &checks, &MatchOptions::default());
        assert_eq!(updates.len(), 2);

        let by_txn: std::collections::HashMap<i32, &MatchUpdate> =
            updates.iter().map(|u| (u.transaction_id, u)).collect();
        assert_eq!(by_txn[&2].matched_check_id, "ID1");
        assert_eq!(by_txn[&1].matched_check_id, "ID0");
    }

    #[test]
    fn score_ties_break_to_the_older_check() {
        let checks = vec![
            check(0, "301", dec!(40.00), (2024, 2, 20)),
            check(1, "300", dec!(40.00), (2024, 2, 10)),
        ];
        let transactions = vec![txn(7, dec!(-40.00), (2024, 2, 15), "")];

        let updates = assign(&transactions, &checks, &MatchOptions::default());
        assert_eq!(updates.len(), 1);
        // Both pairs score identically (3-day window either way); the older
        // check wins.
        assert_eq!(updates[0].matched_check_id, "ID1");
    }

    #[test]
    fn no_check_is_claimed_twice() {
        let checks = vec![check(0, "400", dec!(25.00), (2024, 3, 1))];
        let transactions = vec![
            txn(1, dec!(-25.00), (2024, 3, 1), "400"),
            txn(2, dec!(-25.00), (2024, 3, 1), "400"),
        ];
        let updates = assign(&transactions, &checks, &MatchOptions::default());
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].transaction_id, 1);
    }

    #[test]
    fn statement_date_limit_excludes_future_and_dateless_checks() {
        let mut dateless = check(2, "999", dec!(10.00), (2024, 1, 1));
        dateless.check_date = None;
        let checks = vec![
            check(0, "500", dec!(10.00), (2024, 1, 5)),
            check(1, "501", dec!(10.00), (2024, 2, 5)),
            dateless,
        ];
        let transactions = vec![txn(1, dec!(-10.00), (2024, 1, 6), "")];

        let options = MatchOptions {
            limit_to_statement_date: true,
            statement_date: NaiveDate::from_ymd_opt(2024, 1, 31),
            ..Default::default()
        };
        let updates = assign(&transactions, &checks, &options);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].matched_check_id, "ID0");
    }

    #[test]
    fn pairs_below_the_floor_are_not_assigned() {
        let checks = vec![check(0, "600", dec!(99.00), (2024, 1, 1))];
        let transactions = vec![txn(1, dec!(-10.00), (2024, 1, 2), "")];
        assert!(assign(&transactions, &checks, &MatchOptions::default()).is_empty());
    }
}
