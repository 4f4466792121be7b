//! Tracker index construction from scraped shelf prices.

pub mod aggregate;
pub mod index;
pub mod observations;
pub mod weights;

pub use aggregate::{aggregate, AggregationSettings};
pub use index::{compute_monthly_rows, month_range, IndexSettings};
pub use observations::{read_observations_csv, InMemoryObservations, ObservationSource};
pub use weights::{BasketWeights, UNCATEGORIZED};

use crate::config::AppConfig;
use crate::mapping::CategoryMapping;
use crate::model::{BasketType, TrackerIndexPoint, TrackerStatus};
use crate::month::YearMonth;
use crate::storage::Store;
use anyhow::Context;
use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub basket_type: BasketType,
    pub method_version: String,
    pub from_month: Option<YearMonth>,
    pub to_month: Option<YearMonth>,
    pub months_processed: usize,
    pub general_rows: usize,
    pub category_rows: usize,
    #[serde(skip)]
    pub general: Vec<TrackerIndexPoint>,
    #[serde(skip)]
    pub categories: Vec<TrackerIndexPoint>,
    pub warnings: Vec<String>,
}

pub struct TrackerBuilder<'a> {
    cfg: &'a AppConfig,
    store: &'a Store,
    observations: &'a dyn ObservationSource,
    mapping: &'a CategoryMapping,
    now: DateTime<Utc>,
}

impl<'a> TrackerBuilder<'a> {
    pub fn new(
        cfg: &'a AppConfig,
        store: &'a Store,
        observations: &'a dyn ObservationSource,
        mapping: &'a CategoryMapping,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            cfg,
            store,
            observations,
            mapping,
            now,
        }
    }

    /// Parses the basket selection, then builds. An unknown basket fails with
    /// `InvalidInput` before anything is read or written.
    pub fn build_named(
        &self,
        basket: &str,
        from: Option<YearMonth>,
        to: Option<YearMonth>,
    ) -> anyhow::Result<BuildResult> {
        let basket: BasketType = basket.parse()?;
        self.build(basket, from, to)
    }

    /// Computes and upserts general and per-category rows for `[from, to]`.
    pub fn build(
        &self,
        basket: BasketType,
        from: Option<YearMonth>,
        to: Option<YearMonth>,
    ) -> anyhow::Result<BuildResult> {
        let tracker = &self.cfg.tracker;
        let weights = BasketWeights::from_config(self.cfg, basket);

        let start = from.map(|m| m.first_day().and_time(NaiveTime::MIN).and_utc());
        let end = to.map(|m| m.next_month_start().and_time(NaiveTime::MIN).and_utc());
        let observations = self
            .observations
            .observations(basket, start, end)
            .context("failed to load price observations")?;
        let reps = aggregate(&observations, &weights, &AggregationSettings::from(tracker));

        let observed: Vec<YearMonth> = reps
            .iter()
            .map(|r| r.month)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let months = month_range(&observed, from, to);

        let mut result = BuildResult {
            basket_type: basket,
            method_version: tracker.method_version.clone(),
            from_month: from.or(months.first().copied()),
            to_month: to.or(months.last().copied()),
            months_processed: months.len(),
            general_rows: 0,
            category_rows: 0,
            general: Vec::new(),
            categories: Vec::new(),
            warnings: Vec::new(),
        };
        if months.is_empty() {
            result
                .warnings
                .push("no months with representative prices to build the tracker index".into());
            tracing::warn!(event = "tracker.build.empty", basket = %basket);
            return Ok(result);
        }

        let settings = IndexSettings {
            basket_type: basket,
            method_version: tracker.method_version.clone(),
            coverage_min_weight_pct: tracker.coverage_min_weight_pct,
            provisional_freeze_days: tracker.provisional_freeze_days,
            now: self.now,
        };
        let general = compute_monthly_rows(&reps, &weights, &months, &settings, None);

        let categories_seen: BTreeSet<&str> = reps.iter().map(|r| r.category.as_str()).collect();
        let mut categories = Vec::new();
        for category in categories_seen {
            let cat_weights = weights.for_category(category);
            if cat_weights.is_empty() {
                continue;
            }
            let division = self.mapping.division_for_label(category).cloned();
            let mut rows = compute_monthly_rows(&reps, &cat_weights, &months, &settings, Some(category));
            for row in &mut rows {
                row.division_code = division.clone();
            }
            categories.extend(rows);
        }

        result.general_rows = self.store.upsert_tracker_points(&general)?;
        result.category_rows = if categories.is_empty() {
            0
        } else {
            self.store.upsert_tracker_points(&categories)?
        };

        let low_coverage: Vec<String> = general
            .iter()
            .filter(|r| r.status == TrackerStatus::ProvisionalLowCoverage)
            .map(|r| r.year_month.to_string())
            .collect();
        if !low_coverage.is_empty() {
            result
                .warnings
                .push(format!("months with low weight coverage: {}", low_coverage.join(", ")));
        }

        tracing::info!(
            event = "tracker.build.done",
            basket = %basket,
            method = %tracker.method_version,
            months = months.len(),
            general = result.general_rows,
            categories = result.category_rows,
            "tracker build finished"
        );
        result.general = general;
        result.categories = categories;
        Ok(result)
    }
}
