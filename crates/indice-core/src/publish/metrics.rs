use crate::model::SeriesPoint;
use crate::month::YearMonth;
use serde::Serialize;
use std::collections::BTreeMap;

/// Tracker vs official error figures. `None` when no month qualifies.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonMetrics {
    pub mae_base100: Option<f64>,
    pub rmse_base100: Option<f64>,
    pub mae_mom: Option<f64>,
    pub rmse_mom: Option<f64>,
    pub overlap_months: usize,
    pub rebase_month: Option<YearMonth>,
}

fn usable(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x != 0.0)
}

fn mae_rmse(diffs: &[f64]) -> (Option<f64>, Option<f64>) {
    if diffs.is_empty() {
        return (None, None);
    }
    let n = diffs.len() as f64;
    let mae = diffs.iter().map(|d| d.abs()).sum::<f64>() / n;
    let rmse = (diffs.iter().map(|d| d * d).sum::<f64>() / n).sqrt();
    (Some(mae), Some(rmse))
}

/// Rebases both series to 100 at their first month where both index values are
/// usable, then compares levels over the overlapping months. Monthly changes
/// are compared raw wherever both sides have one.
pub fn compare(tracker: &[SeriesPoint], official: &[SeriesPoint]) -> ComparisonMetrics {
    let official: BTreeMap<YearMonth, &SeriesPoint> =
        official.iter().map(|p| (p.year_month, p)).collect();
    let mut pairs: Vec<(&SeriesPoint, &SeriesPoint)> = tracker
        .iter()
        .filter_map(|t| official.get(&t.year_month).map(|o| (t, *o)))
        .collect();
    pairs.sort_by_key(|(t, _)| t.year_month);

    let mom_diffs: Vec<f64> = pairs
        .iter()
        .filter_map(|(t, o)| Some(t.mom_change? - o.mom_change?))
        .collect();
    let (mae_mom, rmse_mom) = mae_rmse(&mom_diffs);

    let base = pairs
        .iter()
        .find_map(|(t, o)| Some((t.year_month, usable(t.index_value)?, usable(o.index_value)?)));
    let Some((rebase_month, t_base, o_base)) = base else {
        return ComparisonMetrics {
            mae_mom,
            rmse_mom,
            ..ComparisonMetrics::default()
        };
    };

    let level_diffs: Vec<f64> = pairs
        .iter()
        .filter(|(t, _)| t.year_month >= rebase_month)
        .filter_map(|(t, o)| {
            let t = t.index_value? / t_base * 100.0;
            let o = o.index_value? / o_base * 100.0;
            Some(t - o)
        })
        .collect();
    let (mae_base100, rmse_base100) = mae_rmse(&level_diffs);

    ComparisonMetrics {
        mae_base100,
        rmse_base100,
        mae_mom,
        rmse_mom,
        overlap_months: level_diffs.len(),
        rebase_month: Some(rebase_month),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(ym: &str, index: Option<f64>, mom: Option<f64>) -> SeriesPoint {
        SeriesPoint {
            year_month: ym.parse().unwrap(),
            index_value: index,
            mom_change: mom,
        }
    }

    #[test]
    fn rebases_at_first_mutual_month() {
        let tracker = [
            pt("2024-01", None, None),
            pt("2024-02", Some(100.0), Some(2.0)),
            pt("2024-03", Some(110.0), Some(10.0)),
        ];
        let official = [
            pt("2024-01", Some(500.0), Some(1.0)),
            pt("2024-02", Some(1000.0), Some(3.0)),
            pt("2024-03", Some(1080.0), Some(8.0)),
            pt("2024-04", Some(1100.0), Some(2.0)),
        ];
        let m = compare(&tracker, &official);
        assert_eq!(m.rebase_month, Some("2024-02".parse().unwrap()));
        assert_eq!(m.overlap_months, 2);
        // level diffs: 0 and 110 - 108
        assert!((m.mae_base100.unwrap() - 1.0).abs() < 1e-9);
        assert!((m.rmse_base100.unwrap() - 2f64.sqrt()).abs() < 1e-9);
        // mom diffs: -1 and 2
        assert!((m.mae_mom.unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn no_overlap_yields_empty_metrics() {
        let tracker = [pt("2024-01", Some(100.0), None)];
        let official = [pt("2023-12", Some(100.0), Some(1.0))];
        let m = compare(&tracker, &official);
        assert_eq!(m, ComparisonMetrics::default());
    }
}
