//! Publication runs: sync official data, build the tracker, compare, record.

pub mod metrics;

pub use metrics::{compare, ComparisonMetrics};

use crate::config::AppConfig;
use crate::mapping::CategoryMapping;
use crate::model::{BasketType, PublicationRun, RunStatus};
use crate::month::YearMonth;
use crate::normalize::{normalize_region, GENERAL_METRIC, REGION_ALL};
use crate::official::{DocumentFetcher, OfficialAcquirer};
use crate::snapshot::SnapshotStore;
use crate::storage::Store;
use crate::tracker::{ObservationSource, TrackerBuilder};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const OFFICIAL_SOURCE_EXISTING: &str = "existing_rows";

#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub basket_type: String,
    pub from: Option<YearMonth>,
    pub to: Option<YearMonth>,
    /// Comparison region; defaults to `official.region_default`.
    pub region: Option<String>,
    pub skip_sync: bool,
    pub skip_build: bool,
}

pub struct Publisher<'a> {
    cfg: &'a AppConfig,
    store: &'a Store,
    observations: &'a dyn ObservationSource,
    mapping: &'a CategoryMapping,
    snapshots: &'a SnapshotStore,
    fetcher: &'a dyn DocumentFetcher,
    now: Option<DateTime<Utc>>,
}

impl<'a> Publisher<'a> {
    pub fn new(
        cfg: &'a AppConfig,
        store: &'a Store,
        observations: &'a dyn ObservationSource,
        mapping: &'a CategoryMapping,
        snapshots: &'a SnapshotStore,
        fetcher: &'a dyn DocumentFetcher,
    ) -> Self {
        Self {
            cfg,
            store,
            observations,
            mapping,
            snapshots,
            fetcher,
            now: None,
        }
    }

    /// Pins the clock used for tracker status decisions.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Runs one publication and returns the finalized run record.
    ///
    /// The run row is written before any work starts. If a step fails the row
    /// is finalized as `failed` and the error is returned afterwards.
    pub fn publish(&self, req: &PublishRequest) -> anyhow::Result<PublicationRun> {
        let basket: BasketType = req.basket_type.parse()?;
        let region = normalize_region(
            req.region
                .as_deref()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or(&self.cfg.official.region_default),
        );

        let mut run = PublicationRun {
            run_uuid: uuid::Uuid::new_v4().to_string(),
            basket_type: basket,
            region,
            method_version: self.cfg.tracker.method_version.clone(),
            from_month: req.from,
            to_month: req.to,
            status: RunStatus::Running,
            official_source: None,
            official_rows: 0,
            tracker_rows: 0,
            tracker_category_rows: 0,
            overlap_months: 0,
            warnings: Vec::new(),
            metrics: BTreeMap::new(),
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.store.create_run(&run)?;
        tracing::info!(
            event = "publish.run.start",
            run = %run.run_uuid,
            basket = %basket,
            region = %run.region
        );

        if let Err(e) = self.execute(req, &mut run) {
            run.status = RunStatus::Failed;
            run.error_message = Some(format!("{e:#}"));
            run.completed_at = Some(Utc::now());
            if let Err(finalize_err) = self.store.finalize_run(&run) {
                tracing::error!(
                    event = "publish.run.finalize_failed",
                    run = %run.run_uuid,
                    error = %finalize_err
                );
            }
            tracing::error!(event = "publish.run.failed", run = %run.run_uuid, error = %e);
            return Err(e);
        }

        let status = derive_status(&mut run);
        run.status = status;
        run.completed_at = Some(Utc::now());
        self.store.finalize_run(&run)?;
        tracing::info!(
            event = "publish.run.done",
            run = %run.run_uuid,
            status = %run.status,
            official_rows = run.official_rows,
            tracker_rows = run.tracker_rows,
            overlap = run.overlap_months,
            "publication finished"
        );
        Ok(run)
    }

    fn execute(&self, req: &PublishRequest, run: &mut PublicationRun) -> anyhow::Result<()> {
        let official = &self.cfg.official;

        if req.skip_sync {
            run.official_rows = self.store.count_official_rows(
                &official.source_code,
                &run.region,
                GENERAL_METRIC,
                req.from,
                req.to,
            )?;
            run.official_source = Some(OFFICIAL_SOURCE_EXISTING.into());
            run.metrics.insert("official_sync_mode".into(), json!("skipped"));
            run.metrics
                .insert("official_source_effective".into(), json!(OFFICIAL_SOURCE_EXISTING));
            run.metrics
                .insert("official_validation_status".into(), json!("not_run"));
        } else {
            let acquirer =
                OfficialAcquirer::new(official, self.mapping, self.store, self.snapshots, self.fetcher);
            let sync = acquirer.sync(req.from, req.to, Some(REGION_ALL))?;
            run.official_rows = sync.upserted_rows;
            run.official_source = Some(sync.official_source.clone());
            run.warnings.extend(sync.warnings.iter().cloned());
            let snapshots: Vec<String> = sync
                .snapshot_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            run.metrics.insert("official_sync_mode".into(), json!("executed"));
            run.metrics
                .insert("official_source_effective".into(), json!(sync.official_source));
            run.metrics.insert(
                "official_validation_status".into(),
                json!(sync.validation_status.as_str()),
            );
            run.metrics.insert(
                "official_source_document_url".into(),
                json!(sync.source_document_url),
            );
            run.metrics
                .insert("official_regions_synced".into(), json!(sync.regions));
            run.metrics
                .insert("official_snapshot_paths".into(), json!(snapshots));
        }

        if req.skip_build {
            let summary = self.store.tracker_summary(
                run.basket_type,
                &run.method_version,
                req.from,
                req.to,
            )?;
            run.tracker_rows = summary.general_rows;
            run.tracker_category_rows = summary.category_rows;
            run.metrics.insert("tracker_build_mode".into(), json!("skipped"));
        } else {
            let builder = TrackerBuilder::new(
                self.cfg,
                self.store,
                self.observations,
                self.mapping,
                self.now.unwrap_or_else(Utc::now),
            );
            let built = builder.build(run.basket_type, req.from, req.to)?;
            run.tracker_rows = built.general_rows;
            run.tracker_category_rows = built.category_rows;
            run.warnings.extend(built.warnings);
            run.metrics.insert("tracker_build_mode".into(), json!("executed"));
        }

        let tracker_series =
            self.store
                .tracker_series(run.basket_type, &run.method_version, req.from, req.to)?;
        let official_series = self.store.official_series(
            &official.source_code,
            &run.region,
            GENERAL_METRIC,
            req.from,
            req.to,
        )?;
        let comparison = compare(&tracker_series, &official_series);
        run.overlap_months = comparison.overlap_months;
        insert_comparison(&mut run.metrics, &comparison);
        Ok(())
    }
}

fn insert_comparison(metrics: &mut BTreeMap<String, Value>, c: &ComparisonMetrics) {
    metrics.insert("mae_base100".into(), json!(c.mae_base100));
    metrics.insert("rmse_base100".into(), json!(c.rmse_base100));
    metrics.insert("mae_mom".into(), json!(c.mae_mom));
    metrics.insert("rmse_mom".into(), json!(c.rmse_mom));
    metrics.insert(
        "comparison_rebase_month".into(),
        json!(c.rebase_month.map(|m| m.to_string())),
    );
}

/// Terminal status of a run whose steps all succeeded. May append the
/// official-missing explanation to the run warnings.
pub fn derive_status(run: &mut PublicationRun) -> RunStatus {
    if run.tracker_rows == 0 {
        return RunStatus::FailedNoTrackerRows;
    }
    if run.official_rows == 0 || run.overlap_months == 0 {
        run.warnings.push(format!(
            "official series for region {} is missing or does not overlap the tracker; \
             comparison metrics are empty",
            run.region
        ));
        return RunStatus::CompletedOfficialMissing;
    }
    if !run.warnings.is_empty() {
        return RunStatus::CompletedWithWarnings;
    }
    RunStatus::Completed
}
