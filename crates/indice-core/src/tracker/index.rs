//! Chained fixed-weight index over representative prices.

use super::weights::BasketWeights;
use crate::model::{BasketType, RepresentativePrice, TrackerIndexPoint, TrackerStatus};
use crate::month::YearMonth;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub basket_type: BasketType,
    pub method_version: String,
    pub coverage_min_weight_pct: f64,
    pub provisional_freeze_days: i64,
    pub now: DateTime<Utc>,
}

/// Months to compute. Explicit bounds win; a missing bound extends to the
/// observed span (or to the other bound when nothing was observed).
pub fn month_range(
    observed: &[YearMonth],
    from: Option<YearMonth>,
    to: Option<YearMonth>,
) -> Vec<YearMonth> {
    let first = observed.iter().min().copied();
    let last = observed.iter().max().copied();
    let bounds = match (from, to) {
        (Some(f), Some(t)) => Some((f, t)),
        (Some(f), None) => Some((f, last.unwrap_or(f))),
        (None, Some(t)) => Some((first.unwrap_or(t), t)),
        (None, None) => first.zip(last),
    };
    bounds
        .map(|(f, t)| YearMonth::range_inclusive(f, t))
        .unwrap_or_default()
}

fn status_for(month: YearMonth, coverage: Option<f64>, settings: &IndexSettings) -> TrackerStatus {
    if coverage.is_some_and(|c| c < settings.coverage_min_weight_pct) {
        return TrackerStatus::ProvisionalLowCoverage;
    }
    let freeze_at = month.next_month_start().and_time(NaiveTime::MIN).and_utc()
        + Duration::days(settings.provisional_freeze_days);
    if settings.now >= freeze_at {
        TrackerStatus::Final
    } else {
        TrackerStatus::Provisional
    }
}

/// One row per month in `months` for the product set in `weights`.
///
/// The base month is the first whose observed weight share reaches the
/// coverage threshold and is pinned at 100. Later months chain the weighted
/// mean of price relatives between consecutive months; months before the base,
/// or without any relative, carry no index value.
pub fn compute_monthly_rows(
    reps: &[RepresentativePrice],
    weights: &BasketWeights,
    months: &[YearMonth],
    settings: &IndexSettings,
    category: Option<&str>,
) -> Vec<TrackerIndexPoint> {
    if weights.is_empty() || months.is_empty() {
        return Vec::new();
    }
    let total_weight = weights.total();
    let expected = weights.len();

    let mut by_month: BTreeMap<YearMonth, BTreeMap<&str, &RepresentativePrice>> = BTreeMap::new();
    for rep in reps.iter().filter(|r| weights.contains(&r.canonical_id)) {
        by_month
            .entry(rep.month)
            .or_default()
            .insert(rep.canonical_id.as_str(), rep);
    }
    let empty = BTreeMap::new();
    let month_reps = |m: YearMonth| by_month.get(&m).unwrap_or(&empty);
    let share = |w: f64| (total_weight > 0.0).then(|| w / total_weight);

    let base_month = months.iter().copied().find(|&m| {
        let current = month_reps(m);
        let observed: f64 = current.values().map(|r| r.weight).sum();
        !current.is_empty() && share(observed).is_some_and(|s| s >= settings.coverage_min_weight_pct)
    });

    let mut rows = Vec::with_capacity(months.len());
    let mut index_by_month: HashMap<YearMonth, f64> = HashMap::new();
    let mut prev_month: Option<YearMonth> = None;
    let mut prev_index: Option<f64> = None;

    for &month in months {
        let current = month_reps(month);
        let observed = current.len();
        let observed_weight: f64 = current.values().map(|r| r.weight).sum();
        let outlier_count: usize = current.values().map(|r| r.outlier_count).sum();

        let mut with_relative = 0;
        let mut coverage_weight_pct = None;
        let mut coverage_product_pct = (expected > 0).then(|| observed as f64 / expected as f64);
        let mut missing = expected.saturating_sub(observed);
        let mut mom_change = None;

        if let Some(prev) = prev_month.map(month_reps) {
            let relatives: Vec<(f64, f64)> = current
                .iter()
                .filter_map(|(id, cur)| {
                    let p = prev.get(id)?;
                    (p.price > 0.0).then(|| (cur.weight, cur.price / p.price))
                })
                .collect();
            if !relatives.is_empty() {
                let rel_weight: f64 = relatives.iter().map(|(w, _)| w).sum();
                with_relative = relatives.len();
                missing = expected.saturating_sub(with_relative);
                coverage_weight_pct = share(rel_weight);
                coverage_product_pct = Some(with_relative as f64 / expected as f64);
                if rel_weight > 0.0 {
                    let ratio = relatives.iter().map(|(w, r)| w * r).sum::<f64>() / rel_weight;
                    mom_change = Some((ratio - 1.0) * 100.0);
                }
            }
        }

        let index_value = if base_month == Some(month) {
            Some(100.0)
        } else {
            prev_index.zip(mom_change).map(|(prev, mom)| prev * (1.0 + mom / 100.0))
        };
        let yoy_change = index_value.and_then(|idx| {
            let year_ago = *index_by_month.get(&month.add_months(-12))?;
            (year_ago > 0.0).then(|| (idx / year_ago - 1.0) * 100.0)
        });

        let status = status_for(
            month,
            coverage_weight_pct.or_else(|| share(observed_weight)),
            settings,
        );
        if let Some(idx) = index_value {
            index_by_month.insert(month, idx);
            prev_index = Some(idx);
        }

        rows.push(TrackerIndexPoint {
            basket_type: settings.basket_type,
            year_month: month,
            method_version: settings.method_version.clone(),
            category_slug: category.map(str::to_string),
            division_code: None,
            status,
            index_value,
            mom_change,
            yoy_change,
            coverage_weight_pct,
            coverage_product_pct,
            products_expected: expected,
            products_observed: observed,
            products_with_relative: with_relative,
            outlier_count,
            missing_products: missing,
            base_month,
            frozen_at: (status == TrackerStatus::Final).then_some(settings.now),
        });
        prev_month = Some(month);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn rep(id: &str, month: &str, price: f64, weight: f64) -> RepresentativePrice {
        RepresentativePrice {
            canonical_id: id.into(),
            month: ym(month),
            price,
            obs_count: 1,
            outlier_count: 0,
            weight,
            category: "almacen".into(),
        }
    }

    fn settings(now: DateTime<Utc>) -> IndexSettings {
        IndexSettings {
            basket_type: BasketType::Cba,
            method_version: "v1".into(),
            coverage_min_weight_pct: 0.5,
            provisional_freeze_days: 7,
            now,
        }
    }

    #[test]
    fn month_range_bounds() {
        let observed = [ym("2024-02"), ym("2024-04")];
        assert_eq!(month_range(&observed, None, None).len(), 3);
        assert_eq!(month_range(&observed, Some(ym("2024-01")), None).len(), 4);
        assert_eq!(month_range(&observed, None, Some(ym("2024-02"))).len(), 1);
        assert_eq!(month_range(&[], Some(ym("2024-01")), None), vec![ym("2024-01")]);
        assert!(month_range(&[], None, None).is_empty());
    }

    #[test]
    fn chains_weighted_relatives_from_base() {
        let weights = BasketWeights::from_pairs([("p1", 1.0, "almacen"), ("p2", 2.0, "almacen")]);
        let reps = vec![
            rep("p1", "2024-01", 100.0, 1.0),
            rep("p2", "2024-01", 50.0, 2.0),
            rep("p1", "2024-02", 120.0, 1.0),
            rep("p2", "2024-02", 55.0, 2.0),
        ];
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap();
        let rows = compute_monthly_rows(&reps, &weights, &[ym("2024-01"), ym("2024-02")], &settings(now), None);

        assert_eq!(rows[0].index_value, Some(100.0));
        assert_eq!(rows[0].base_month, Some(ym("2024-01")));
        assert_eq!(rows[0].mom_change, None);
        // (1 * 1.2 + 2 * 1.1) / 3
        let expected = (1.2 + 2.2) / 3.0 * 100.0;
        assert!((rows[1].index_value.unwrap() - expected).abs() < 1e-9);
        assert_eq!(rows[1].products_with_relative, 2);
        assert_eq!(rows[1].coverage_weight_pct, Some(1.0));
        assert_eq!(rows[1].status, TrackerStatus::Final);
        assert_eq!(rows[1].frozen_at, Some(now));
    }

    #[test]
    fn low_coverage_and_freeze_window() {
        let weights = BasketWeights::from_pairs([("p1", 1.0, "almacen"), ("p2", 3.0, "almacen")]);
        let reps = vec![
            rep("p1", "2024-01", 100.0, 1.0),
            rep("p2", "2024-01", 10.0, 3.0),
            rep("p1", "2024-02", 110.0, 1.0),
        ];
        let now = Utc.with_ymd_and_hms(2024, 2, 5, 0, 0, 0).unwrap();
        let rows = compute_monthly_rows(&reps, &weights, &[ym("2024-01"), ym("2024-02")], &settings(now), None);

        // January freezes on 2024-02-08.
        assert_eq!(rows[0].status, TrackerStatus::Provisional);
        assert_eq!(rows[0].frozen_at, None);
        assert_eq!(rows[1].status, TrackerStatus::ProvisionalLowCoverage);
        assert_eq!(rows[1].coverage_weight_pct, Some(0.25));
        assert_eq!(rows[1].missing_products, 1);
        assert!((rows[1].index_value.unwrap() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn no_qualifying_base_leaves_index_empty() {
        let weights = BasketWeights::from_pairs([("p1", 1.0, "almacen"), ("p2", 9.0, "almacen")]);
        let reps = vec![rep("p1", "2024-01", 100.0, 1.0), rep("p1", "2024-02", 101.0, 1.0)];
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let rows = compute_monthly_rows(&reps, &weights, &[ym("2024-01"), ym("2024-02")], &settings(now), None);
        assert!(rows.iter().all(|r| r.index_value.is_none() && r.base_month.is_none()));
        assert!(rows[1].mom_change.is_some());
        assert_eq!(rows[0].products_observed, 1);
        assert_eq!(rows[0].coverage_product_pct, Some(0.5));
    }

    #[test]
    fn yoy_uses_index_twelve_months_back() {
        let weights = BasketWeights::from_pairs([("p1", 1.0, "almacen")]);
        let months = YearMonth::range_inclusive(ym("2023-01"), ym("2024-01"));
        let reps: Vec<_> = months
            .iter()
            .enumerate()
            .map(|(i, m)| rep("p1", &m.to_string(), 100.0 + i as f64, 1.0))
            .collect();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let rows = compute_monthly_rows(&reps, &weights, &months, &settings(now), Some("almacen"));
        let last = rows.last().unwrap();
        assert!((last.index_value.unwrap() - 112.0).abs() < 1e-9);
        assert!((last.yoy_change.unwrap() - 12.0).abs() < 1e-9);
        assert_eq!(last.category_slug.as_deref(), Some("almacen"));
    }
}
