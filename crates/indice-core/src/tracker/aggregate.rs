use super::weights::{BasketWeights, UNCATEGORIZED};
use crate::config::{MonthlyAggregation, TrackerConfig};
use crate::model::{RawPriceObservation, RepresentativePrice};
use crate::month::YearMonth;
use std::collections::BTreeMap;

/// Below this many observations a product-month is averaged without clipping.
pub const MIN_WINSOR_SAMPLE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationSettings {
    pub method: MonthlyAggregation,
    pub q_low: f64,
    pub q_high: f64,
    pub min_obs: usize,
}

impl From<&TrackerConfig> for AggregationSettings {
    fn from(cfg: &TrackerConfig) -> Self {
        Self {
            method: cfg.monthly_aggregation,
            q_low: cfg.winsor_limits[0],
            q_high: cfg.winsor_limits[1],
            min_obs: cfg.min_obs_per_product_month,
        }
    }
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self::from(&TrackerConfig::default())
    }
}

/// Quantile of sorted data, linear interpolation between order statistics.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Representative price of one product-month and its outlier count.
pub fn representative(values: &[f64], settings: &AggregationSettings) -> Option<(f64, usize)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    if settings.method != MonthlyAggregation::WinsorizedMean || values.len() < MIN_WINSOR_SAMPLE {
        return Some((values.iter().sum::<f64>() / n, 0));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let low = quantile(&sorted, settings.q_low);
    let high = quantile(&sorted, settings.q_high);
    let outliers = values.iter().filter(|v| **v < low || **v > high).count();
    let clipped: f64 = values.iter().map(|v| v.clamp(low, high)).sum();
    Some((clipped / n, outliers))
}

/// Groups observations by `(canonical_id, month)` and reduces each group to a
/// representative price. Products outside `weights` and groups below the
/// minimum observation count are dropped. Output is sorted by product, month.
pub fn aggregate(
    observations: &[RawPriceObservation],
    weights: &BasketWeights,
    settings: &AggregationSettings,
) -> Vec<RepresentativePrice> {
    let mut groups: BTreeMap<(&str, YearMonth), Vec<f64>> = BTreeMap::new();
    for obs in observations {
        if !weights.contains(&obs.canonical_id) || !obs.price.is_finite() {
            continue;
        }
        groups
            .entry((obs.canonical_id.as_str(), YearMonth::from_datetime(&obs.observed_at)))
            .or_default()
            .push(obs.price);
    }

    groups
        .into_iter()
        .filter(|(_, values)| values.len() >= settings.min_obs)
        .filter_map(|((id, month), values)| {
            let (price, outlier_count) = representative(&values, settings)?;
            let weight = weights.get(id);
            Some(RepresentativePrice {
                canonical_id: id.to_string(),
                month,
                price,
                obs_count: values.len(),
                outlier_count,
                weight: weight.map_or(0.0, |w| w.weight),
                category: weight.map_or_else(|| UNCATEGORIZED.to_string(), |w| w.category.clone()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn quantile_interpolates() {
        let data = [10.0, 10.0, 10.0, 10.0, 1000.0];
        assert_eq!(quantile(&data, 0.1), 10.0);
        assert!((quantile(&data, 0.9) - 604.0).abs() < 1e-9);
        assert_eq!(quantile(&[1.0, 2.0], 0.5), 1.5);
        assert_eq!(quantile(&[7.0], 0.9), 7.0);
    }

    #[test]
    fn winsorizes_large_groups_only() {
        let settings = AggregationSettings::default();
        let values = [10.0, 10.0, 10.0, 10.0, 1000.0];
        let (price, outliers) = representative(&values, &settings).unwrap();
        let plain = values.iter().sum::<f64>() / 5.0;
        assert!(price < plain);
        assert_eq!(outliers, 1);

        let (price, outliers) = representative(&[10.0, 20.0, 1000.0], &settings).unwrap();
        assert!((price - 343.333_333).abs() < 1e-3);
        assert_eq!(outliers, 0);

        let mean_only = AggregationSettings {
            method: MonthlyAggregation::Mean,
            ..settings
        };
        assert_eq!(representative(&values, &mean_only).unwrap(), (plain, 0));
    }

    #[test]
    fn groups_by_product_month_and_filters() {
        let at = |m: u32, d: u32| Utc.with_ymd_and_hms(2024, m, d, 10, 0, 0).unwrap();
        let obs = |id: &str, price: f64, m: u32, d: u32| RawPriceObservation {
            canonical_id: id.into(),
            basket_id: "cba".into(),
            category: None,
            price,
            observed_at: at(m, d),
        };
        let rows = vec![
            obs("p1", 100.0, 1, 2),
            obs("p1", 110.0, 1, 20),
            obs("p1", 120.0, 2, 1),
            obs("p2", 50.0, 1, 3),
            obs("unknown", 1.0, 1, 3),
        ];
        let weights = BasketWeights::from_pairs([("p1", 1.0, "lacteos"), ("p2", 2.0, "almacen")]);

        let reps = aggregate(&rows, &weights, &AggregationSettings::default());
        assert_eq!(reps.len(), 3);
        assert_eq!(reps[0].canonical_id, "p1");
        assert_eq!(reps[0].price, 105.0);
        assert_eq!(reps[0].obs_count, 2);
        assert_eq!(reps[1].month, YearMonth::new(2024, 2).unwrap());
        assert_eq!(reps[2].weight, 2.0);
        assert_eq!(reps[2].category, "almacen");

        let strict = AggregationSettings {
            min_obs: 2,
            ..AggregationSettings::default()
        };
        let reps = aggregate(&rows, &weights, &strict);
        assert_eq!(reps.len(), 1);
    }
}
