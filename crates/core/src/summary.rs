//! Fee aggregations computed over already-loaded records.

use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;

use crate::api::{FeesSummaryRow, MonthlyTotal};
use crate::model::{FeesRecord, Student};

/// One row per student that has at least one installment, ordered by student id.
///
/// Totals take the largest value seen across installments, payments are
/// summed and the amount due never goes below zero. Name and subjects come
/// from the current, non-deleted student record; when that record is gone
/// both are left empty rather than taken from the installment copies.
pub fn summarize_by_student(fees: &[FeesRecord], students: &[Student]) -> Vec<FeesSummaryRow> {
    let by_id: HashMap<&str, &Student> = students
        .iter()
        .filter(|s| !s.is_deleted)
        .map(|s| (s.id.as_str(), s))
        .collect();
    let mut rows: BTreeMap<&str, FeesSummaryRow> = BTreeMap::new();

    for fee in fees.iter().filter(|f| !f.is_deleted) {
        let student_id = fee.selected_student.student_id.as_str();
        let student = by_id.get(student_id);
        let row = rows.entry(student_id).or_insert_with(|| FeesSummaryRow {
            student_id: student_id.to_string(),
            name: student.map(|s| s.summary_name()).unwrap_or_default(),
            subjects: student.map(|s| s.subject.clone()).unwrap_or_default(),
            total_installments: 0,
            total_fees: 0.0,
            monthly_installments: 0.0,
            total_paid: 0.0,
            amount_due: 0.0,
            last_payment_date: None,
        });
        row.total_installments = row.total_installments.max(fee.total_installments);
        row.total_fees = row.total_fees.max(fee.total_fees);
        row.monthly_installments = row.monthly_installments.max(fee.monthly_installments);
        row.total_paid += fee.fees_paid;
        if row.last_payment_date.is_none_or(|d| fee.date > d) {
            row.last_payment_date = Some(fee.date);
        }
    }

    rows.into_values()
        .map(|mut row| {
            row.amount_due = (row.total_fees - row.total_paid).max(0.0);
            row
        })
        .collect()
}

/// Sum of payments per UTC calendar month, oldest first.
pub fn monthly_totals(fees: &[FeesRecord], year: Option<i32>) -> Vec<MonthlyTotal> {
    let mut months: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for fee in fees.iter().filter(|f| !f.is_deleted) {
        let key = (fee.date.year(), fee.date.month());
        if year.is_some_and(|y| y != key.0) {
            continue;
        }
        *months.entry(key).or_default() += fee.fees_paid;
    }
    months
        .into_iter()
        .map(|((year, month), total_collected)| MonthlyTotal {
            year,
            month,
            total_collected,
        })
        .collect()
}

/// Most recent installment: latest payment date, ties broken by creation time.
pub fn latest_installment(fees: &[FeesRecord]) -> Option<&FeesRecord> {
    fees.iter()
        .filter(|f| !f.is_deleted)
        .max_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)))
}
