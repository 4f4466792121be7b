use chrono::{DateTime, TimeZone, Utc};
use indice_core::config::{parse_config, AppConfig};
use indice_core::errors::{InvalidInput, SourceError};
use indice_core::mapping::CategoryMapping;
use indice_core::model::{BasketType, RawPriceObservation, RunStatus};
use indice_core::official::DocumentFetcher;
use indice_core::publish::{PublishRequest, Publisher};
use indice_core::snapshot::SnapshotStore;
use indice_core::storage::Store;
use indice_core::tracker::{InMemoryObservations, ObservationSource};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

struct Offline;

impl DocumentFetcher for Offline {
    fn get_text(&self, url: &str, _: Duration) -> Result<String, SourceError> {
        Err(SourceError::Fetch {
            url: url.into(),
            reason: "offline".into(),
        })
    }

    fn get_bytes(&self, url: &str, _: Duration) -> Result<Vec<u8>, SourceError> {
        Err(SourceError::Fetch {
            url: url.into(),
            reason: "offline".into(),
        })
    }
}

struct BrokenObservations;

impl ObservationSource for BrokenObservations {
    fn observations(
        &self,
        _: BasketType,
        _: Option<DateTime<Utc>>,
        _: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<RawPriceObservation>> {
        anyhow::bail!("observation store unavailable")
    }
}

/// Fails the build step after dropping the run table, so finalizing fails too.
struct RunTableDropper {
    db: std::path::PathBuf,
}

impl ObservationSource for RunTableDropper {
    fn observations(
        &self,
        _: BasketType,
        _: Option<DateTime<Utc>>,
        _: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<RawPriceObservation>> {
        let conn = rusqlite::Connection::open(&self.db)?;
        conn.execute_batch("DROP TABLE publication_runs")?;
        anyhow::bail!("observation store unavailable")
    }
}

fn config(mode: &str, fallback: &Path) -> anyhow::Result<AppConfig> {
    let raw = format!(
        r#"
version: 1
baskets:
  cba:
    items:
      - {{ id: p1, weight: 1, category: lacteos }}
      - {{ id: p2, weight: 2, category: almacen }}
tracker:
  coverage_min_weight_pct: 0.5
official:
  source_mode: {mode}
  region_default: patagonia
  fallback_file: {}
"#,
        fallback.display()
    );
    Ok(parse_config(&raw, |_| None)?)
}

fn two_products() -> InMemoryObservations {
    let at = |m: u32| Utc.with_ymd_and_hms(2024, m, 10, 12, 0, 0).unwrap();
    let obs = |id: &str, m: u32, price: f64| RawPriceObservation {
        canonical_id: id.into(),
        basket_id: "cba".into(),
        category: None,
        price,
        observed_at: at(m),
    };
    InMemoryObservations::new(vec![
        obs("p1", 1, 100.0),
        obs("p2", 1, 50.0),
        obs("p1", 2, 120.0),
        obs("p2", 2, 55.0),
    ])
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn request(basket: &str) -> PublishRequest {
    PublishRequest {
        basket_type: basket.into(),
        ..PublishRequest::default()
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    cfg: AppConfig,
    store: Store,
    snapshots: SnapshotStore,
    mapping: CategoryMapping,
}

fn fixture(mode: &str, fallback_csv: Option<&str>) -> anyhow::Result<Fixture> {
    let dir = tempfile::tempdir()?;
    let fallback = dir.path().join("ipc.csv");
    if let Some(text) = fallback_csv {
        std::fs::write(&fallback, text)?;
    }
    let cfg = config(mode, &fallback)?;
    let store = Store::open(&dir.path().join("indice.db"))?;
    store.init_schema()?;
    let snapshots = SnapshotStore::new(dir.path().join("raw"));
    Ok(Fixture {
        dir,
        cfg,
        store,
        snapshots,
        mapping: CategoryMapping::default(),
    })
}

const OFFICIAL_CSV: &str = "\
year_month,region,index_value,mom_change
2024-01,patagonia,200.0,
2024-02,patagonia,220.0,10.0
";

#[test]
fn end_to_end_publication_completes_with_metrics() -> anyhow::Result<()> {
    let fx = fixture("fallback", Some(OFFICIAL_CSV))?;
    let observations = two_products();
    let publisher = Publisher::new(&fx.cfg, &fx.store, &observations, &fx.mapping, &fx.snapshots, &Offline)
        .with_now(now());

    let run = publisher.publish(&request("cba"))?;
    assert_eq!(run.status, RunStatus::Completed, "warnings: {:?}", run.warnings);
    assert_eq!(run.official_rows, 2);
    assert_eq!(run.tracker_rows, 2);
    assert_eq!(run.tracker_category_rows, 4);
    assert_eq!(run.overlap_months, 2);
    assert_eq!(run.official_source.as_deref(), Some("fallback_file"));
    assert!(run.completed_at.is_some());

    // tracker 100 -> 113.33, official rebased 100 -> 110
    let level_gap = (1.2 + 2.2) / 3.0 * 100.0 - 110.0;
    let mae = run.metrics["mae_base100"].as_f64().unwrap();
    assert!((mae - level_gap / 2.0).abs() < 1e-9);
    let mae_mom = run.metrics["mae_mom"].as_f64().unwrap();
    assert!((mae_mom - level_gap).abs() < 1e-9);
    assert_eq!(run.metrics["official_sync_mode"], json!("executed"));
    assert_eq!(run.metrics["tracker_build_mode"], json!("executed"));
    assert_eq!(run.metrics["official_regions_synced"], json!(["nacional", "patagonia"]));

    let stored = fx.store.get_run(&run.run_uuid)?.expect("persisted run");
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.metrics, run.metrics);
    Ok(())
}

#[test]
fn skipping_steps_reuses_existing_rows() -> anyhow::Result<()> {
    let fx = fixture("fallback", Some(OFFICIAL_CSV))?;
    let observations = two_products();
    let publisher = Publisher::new(&fx.cfg, &fx.store, &observations, &fx.mapping, &fx.snapshots, &Offline)
        .with_now(now());
    publisher.publish(&request("cba"))?;

    let rerun = publisher.publish(&PublishRequest {
        skip_sync: true,
        skip_build: true,
        ..request("cba")
    })?;
    assert_eq!(rerun.status, RunStatus::Completed);
    assert_eq!(rerun.official_source.as_deref(), Some("existing_rows"));
    assert_eq!(rerun.official_rows, 2);
    assert_eq!(rerun.tracker_rows, 2);
    assert_eq!(rerun.metrics["official_sync_mode"], json!("skipped"));
    assert_eq!(rerun.metrics["tracker_build_mode"], json!("skipped"));
    assert_eq!(fx.store.list_runs(10)?.len(), 2);
    Ok(())
}

#[test]
fn missing_official_series_completes_as_official_missing() -> anyhow::Result<()> {
    let fx = fixture("xls_pdf_hybrid", None)?;
    let observations = two_products();
    let run = Publisher::new(&fx.cfg, &fx.store, &observations, &fx.mapping, &fx.snapshots, &Offline)
        .with_now(now())
        .publish(&request("cba"))?;

    assert_eq!(run.status, RunStatus::CompletedOfficialMissing);
    assert_eq!(run.official_rows, 0);
    assert_eq!(run.tracker_rows, 2);
    assert_eq!(run.official_source.as_deref(), Some("none"));
    assert_eq!(run.metrics["mae_base100"], serde_json::Value::Null);
    assert!(run.warnings.iter().any(|w| w.contains("does not overlap")));
    Ok(())
}

#[test]
fn no_tracker_rows_fails_the_run() -> anyhow::Result<()> {
    let fx = fixture("fallback", Some(OFFICIAL_CSV))?;
    let observations = InMemoryObservations::default();
    let run = Publisher::new(&fx.cfg, &fx.store, &observations, &fx.mapping, &fx.snapshots, &Offline)
        .publish(&request("cba"))?;

    assert_eq!(run.status, RunStatus::FailedNoTrackerRows);
    assert_eq!(run.official_rows, 2);
    let stored = fx.store.get_run(&run.run_uuid)?.expect("persisted run");
    assert_eq!(stored.status, RunStatus::FailedNoTrackerRows);
    Ok(())
}

#[test]
fn step_errors_are_persisted_then_returned() -> anyhow::Result<()> {
    let fx = fixture("fallback", Some(OFFICIAL_CSV))?;
    let err = Publisher::new(&fx.cfg, &fx.store, &BrokenObservations, &fx.mapping, &fx.snapshots, &Offline)
        .publish(&request("cba"))
        .unwrap_err();
    assert!(format!("{err:#}").contains("observation store unavailable"));

    let runs = fx.store.list_runs(10)?;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("observation store unavailable")));
    assert!(runs[0].completed_at.is_some());
    Ok(())
}

#[test]
fn step_error_wins_over_finalize_error() -> anyhow::Result<()> {
    let fx = fixture("fallback", Some(OFFICIAL_CSV))?;
    let observations = RunTableDropper {
        db: fx.dir.path().join("indice.db"),
    };
    let err = Publisher::new(&fx.cfg, &fx.store, &observations, &fx.mapping, &fx.snapshots, &Offline)
        .publish(&request("cba"))
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("observation store unavailable"), "{message}");
    assert!(!message.contains("publication_runs"), "{message}");
    Ok(())
}

#[test]
fn invalid_basket_aborts_before_any_run_row() -> anyhow::Result<()> {
    let fx = fixture("fallback", Some(OFFICIAL_CSV))?;
    let observations = two_products();
    let err = Publisher::new(&fx.cfg, &fx.store, &observations, &fx.mapping, &fx.snapshots, &Offline)
        .publish(&request("gourmet"))
        .unwrap_err();
    assert!(err.downcast_ref::<InvalidInput>().is_some());
    assert!(fx.store.list_runs(10)?.is_empty());
    Ok(())
}
