//! Spreadsheet vs PDF cross-check on monthly changes.

use crate::month::YearMonth;
use crate::official::OfficialRow;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    NotRun,
    Ok,
    Warning,
    NotAvailable,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::NotRun => "not_run",
            ValidationStatus::Ok => "ok",
            ValidationStatus::Warning => "warning",
            ValidationStatus::NotAvailable => "not_available",
            ValidationStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub status: ValidationStatus,
    pub checked_month: Option<YearMonth>,
    pub compared_rows: usize,
    pub max_abs_diff_pp: Option<f64>,
    pub mismatch_count: usize,
}

impl Reconciliation {
    fn not_available() -> Self {
        Self {
            status: ValidationStatus::NotAvailable,
            checked_month: None,
            compared_rows: 0,
            max_abs_diff_pp: None,
            mismatch_count: 0,
        }
    }

    /// Warning text for an out-of-tolerance check, `None` otherwise.
    pub fn warning(&self) -> Option<String> {
        if self.status != ValidationStatus::Warning {
            return None;
        }
        let month = self.checked_month.map(|m| m.to_string()).unwrap_or_default();
        Some(format!(
            "XLS vs PDF validation out of tolerance: month {month} | max_abs_diff_pp={:.4} | mismatches={}",
            self.max_abs_diff_pp.unwrap_or_default(),
            self.mismatch_count
        ))
    }
}

/// Compares `mom_change` on rows present in both inputs, restricted to the
/// latest month they share. Differences above `tolerance_pp` are mismatches.
pub fn reconcile(xls: &[OfficialRow], pdf: &[OfficialRow], tolerance_pp: f64) -> Reconciliation {
    let xls_mom: BTreeMap<_, f64> = xls
        .iter()
        .filter_map(|r| r.mom_change.map(|v| (r.key(), v)))
        .collect();
    let pairs: Vec<(YearMonth, f64)> = pdf
        .iter()
        .filter_map(|r| {
            let pdf_v = r.mom_change?;
            let xls_v = xls_mom.get(&r.key())?;
            Some((r.year_month, (xls_v - pdf_v).abs()))
        })
        .collect();

    let Some(latest) = pairs.iter().map(|(ym, _)| *ym).max() else {
        return Reconciliation::not_available();
    };
    let diffs: Vec<f64> = pairs
        .into_iter()
        .filter(|(ym, _)| *ym == latest)
        .map(|(_, d)| d)
        .collect();
    let max_abs = diffs.iter().copied().fold(0.0_f64, f64::max);
    let mismatch_count = diffs.iter().filter(|d| **d > tolerance_pp).count();

    Reconciliation {
        status: if mismatch_count == 0 {
            ValidationStatus::Ok
        } else {
            ValidationStatus::Warning
        },
        checked_month: Some(latest),
        compared_rows: diffs.len(),
        max_abs_diff_pp: Some(max_abs),
        mismatch_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Slug;

    fn row(ym: &str, metric: &str, mom: Option<f64>) -> OfficialRow {
        OfficialRow {
            region: "patagonia".into(),
            year_month: ym.parse().unwrap(),
            metric_code: Slug::normalize(metric).unwrap(),
            category_slug: None,
            index_value: None,
            mom_change: mom,
            yoy_change: None,
            status: "final".into(),
        }
    }

    #[test]
    fn within_tolerance_is_ok() {
        let xls = vec![row("2024-02", "general", Some(2.70)), row("2024-02", "vivienda", Some(4.0))];
        let pdf = vec![row("2024-02", "general", Some(2.75)), row("2024-02", "vivienda", Some(4.0))];
        let r = reconcile(&xls, &pdf, 0.10);
        assert_eq!(r.status, ValidationStatus::Ok);
        assert_eq!(r.compared_rows, 2);
        assert!(r.max_abs_diff_pp.unwrap() <= 0.05 + 1e-9);
        assert_eq!(r.warning(), None);
    }

    #[test]
    fn out_of_tolerance_warns_on_latest_month_only() {
        let xls = vec![
            row("2024-01", "general", Some(1.0)),
            row("2024-02", "general", Some(2.7)),
        ];
        let pdf = vec![
            row("2024-01", "general", Some(9.0)),
            row("2024-02", "general", Some(2.9)),
        ];
        let r = reconcile(&xls, &pdf, 0.10);
        assert_eq!(r.status, ValidationStatus::Warning);
        assert_eq!(r.checked_month, YearMonth::new(2024, 2));
        assert_eq!(r.mismatch_count, 1);
        assert!(r.max_abs_diff_pp.unwrap() < 1.0);
        assert!(r.warning().unwrap().contains("2024-02"));
    }

    #[test]
    fn no_overlap_is_not_available() {
        let xls = vec![row("2024-01", "general", Some(1.0))];
        let pdf = vec![row("2024-02", "general", Some(1.0)), row("2024-01", "general", None)];
        assert_eq!(reconcile(&xls, &pdf, 0.1).status, ValidationStatus::NotAvailable);
        assert_eq!(reconcile(&[], &pdf, 0.1).status, ValidationStatus::NotAvailable);
    }
}
