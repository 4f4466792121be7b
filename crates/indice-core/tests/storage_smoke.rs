use chrono::{Duration, TimeZone, Utc};
use indice_core::model::{
    BasketType, OfficialIndexPoint, PublicationRun, RunStatus, TrackerIndexPoint, TrackerStatus,
};
use indice_core::month::YearMonth;
use indice_core::normalize::Slug;
use indice_core::storage::Store;
use serde_json::json;
use std::collections::BTreeMap;

fn ym(s: &str) -> YearMonth {
    s.parse().unwrap()
}

fn official(ym_: &str, index: f64, status: &str) -> OfficialIndexPoint {
    OfficialIndexPoint {
        source: "indec_patagonia".into(),
        region: "patagonia".into(),
        metric_code: Slug::general(),
        category_slug: None,
        year_month: ym(ym_),
        index_value: index,
        mom_change: Some(2.0),
        yoy_change: None,
        status: status.into(),
        is_fallback: false,
        is_derived: false,
        raw_snapshot_path: None,
    }
}

fn tracker(ym_: &str, category: Option<&str>, status: TrackerStatus) -> TrackerIndexPoint {
    TrackerIndexPoint {
        basket_type: BasketType::Cba,
        year_month: ym(ym_),
        method_version: "v1".into(),
        category_slug: category.map(str::to_string),
        division_code: category.and_then(Slug::normalize),
        status,
        index_value: Some(100.0),
        mom_change: None,
        yoy_change: None,
        coverage_weight_pct: Some(1.0),
        coverage_product_pct: Some(1.0),
        products_expected: 2,
        products_observed: 2,
        products_with_relative: 0,
        outlier_count: 0,
        missing_products: 0,
        base_month: Some(ym(ym_)),
        frozen_at: (status == TrackerStatus::Final)
            .then(|| Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
    }
}

#[test]
fn official_upsert_keeps_one_row_per_key() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    store.upsert_official_points(&[official("2024-01", 100.0, "final"), official("2024-02", 104.0, "final")])?;
    store.upsert_official_points(&[official("2024-02", 105.0, "provisional")])?;

    let points = store.official_points("indec_patagonia", "patagonia")?;
    assert_eq!(points.len(), 2);
    assert_eq!(points[1].index_value, 105.0);
    assert_eq!(points[1].status, "final");

    let prior = store.latest_official_before("indec_patagonia", "patagonia", &Slug::general(), ym("2024-02"))?;
    assert_eq!(prior.map(|p| p.year_month), Some(ym("2024-01")));
    assert!(store
        .latest_official_before("indec_patagonia", "patagonia", &Slug::general(), ym("2024-01"))?
        .is_none());

    assert_eq!(
        store.count_official_rows("indec_patagonia", "patagonia", "general", Some(ym("2024-02")), None)?,
        1
    );
    let series = store.official_series("indec_patagonia", "patagonia", "general", None, None)?;
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].mom_change, Some(2.0));
    Ok(())
}

#[test]
fn init_schema_adds_derived_flag_to_older_databases() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("old.db");
    {
        let conn = rusqlite::Connection::open(&path)?;
        conn.execute_batch(
            "CREATE TABLE official_cpi_monthly (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               source TEXT NOT NULL,
               region TEXT NOT NULL,
               metric_code TEXT NOT NULL,
               category_slug TEXT,
               year_month TEXT NOT NULL,
               index_value REAL NOT NULL,
               mom_change REAL,
               yoy_change REAL,
               status TEXT NOT NULL,
               is_fallback INTEGER NOT NULL DEFAULT 0,
               raw_snapshot_path TEXT,
               created_at TEXT NOT NULL,
               updated_at TEXT NOT NULL,
               UNIQUE (source, region, metric_code, year_month)
             );
             INSERT INTO official_cpi_monthly(source, region, metric_code, year_month, index_value,
               status, is_fallback, created_at, updated_at)
             VALUES ('indec_patagonia', 'patagonia', 'general', '2024-01', 100.0, 'final', 1, 'x', 'x');",
        )?;
    }

    let store = Store::open(&path)?;
    store.init_schema()?;
    store.init_schema()?;

    let mut derived = official("2024-02", 102.0, "final");
    derived.is_derived = true;
    store.upsert_official_points(&[derived])?;

    let points = store.official_points("indec_patagonia", "patagonia")?;
    assert_eq!(points.len(), 2);
    assert!(points[0].is_fallback && !points[0].is_derived);
    assert!(points[1].is_derived);
    Ok(())
}

#[test]
fn tracker_tables_split_general_and_category_rows() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    store.upsert_tracker_points(&[
        tracker("2024-01", None, TrackerStatus::Final),
        tracker("2024-02", None, TrackerStatus::Provisional),
        tracker("2024-01", Some("lacteos"), TrackerStatus::Provisional),
    ])?;
    store.upsert_tracker_points(&[tracker("2024-01", None, TrackerStatus::Provisional)])?;

    let general = store.tracker_points(BasketType::Cba, "v1")?;
    assert_eq!(general.len(), 2);
    assert_eq!(general[0].status, TrackerStatus::Final);
    assert!(general[0].frozen_at.is_some());
    assert_eq!(general[0].base_month, Some(ym("2024-01")));

    let categories = store.tracker_category_points(BasketType::Cba, "v1")?;
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].category_slug.as_deref(), Some("lacteos"));
    assert_eq!(categories[0].division_code.as_ref().map(Slug::as_str), Some("lacteos"));

    let summary = store.tracker_summary(BasketType::Cba, "v1", None, Some(ym("2024-01")))?;
    assert_eq!(summary.general_rows, 1);
    assert_eq!(summary.category_rows, 1);
    assert_eq!(summary.to_month, Some(ym("2024-01")));
    assert!(store.tracker_points(BasketType::Extended, "v1")?.is_empty());
    Ok(())
}

#[test]
fn runs_are_created_then_finalized() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Store::open(&dir.path().join("indice.db"))?;
    store.init_schema()?;

    let started = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut run = PublicationRun {
        run_uuid: "run-1".into(),
        basket_type: BasketType::All,
        region: "patagonia".into(),
        method_version: "v1".into(),
        from_month: Some(ym("2024-01")),
        to_month: None,
        status: RunStatus::Running,
        official_source: None,
        official_rows: 0,
        tracker_rows: 0,
        tracker_category_rows: 0,
        overlap_months: 0,
        warnings: Vec::new(),
        metrics: BTreeMap::new(),
        error_message: None,
        started_at: started,
        completed_at: None,
    };
    store.create_run(&run)?;
    assert_eq!(store.get_run("run-1")?.map(|r| r.status), Some(RunStatus::Running));

    run.status = RunStatus::CompletedWithWarnings;
    run.tracker_rows = 3;
    run.warnings.push("reconciliation mismatch".into());
    run.metrics.insert("mae_mom".into(), json!(0.25));
    run.completed_at = Some(started + Duration::seconds(5));
    store.finalize_run(&run)?;

    let mut later = run.clone();
    later.run_uuid = "run-2".into();
    later.started_at = started + Duration::hours(1);
    store.create_run(&later)?;

    let stored = store.get_run("run-1")?.expect("run-1");
    assert_eq!(stored, run);
    let listed = store.list_runs(10)?;
    assert_eq!(listed.iter().map(|r| r.run_uuid.as_str()).collect::<Vec<_>>(), ["run-2", "run-1"]);
    assert_eq!(store.list_runs(1)?.len(), 1);

    let mut ghost = run.clone();
    ghost.run_uuid = "missing".into();
    assert!(store.finalize_run(&ghost).is_err());
    Ok(())
}
