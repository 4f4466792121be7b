use crate::model::{PublicationRun, RunStatus};
use crate::official::SyncResult;
use crate::tracker::BuildResult;
use serde_json::Value;

fn opt_month(m: Option<crate::month::YearMonth>) -> String {
    m.map_or_else(|| "-".to_string(), |m| m.to_string())
}

fn print_warnings(warnings: &[String]) {
    for w in warnings {
        eprintln!("WARN: {}", w);
    }
}

pub fn print_sync_summary(res: &SyncResult) {
    eprintln!(
        "Official sync: mode={} source={} regions={} window={}..{}",
        res.source_mode,
        res.official_source,
        res.regions.join(","),
        opt_month(res.from_month),
        opt_month(res.to_month)
    );
    eprintln!(
        "Rows: fetched={} upserted={} fallback={} validation={}",
        res.fetched_rows,
        res.upserted_rows,
        res.used_fallback,
        res.validation_status.as_str()
    );
    if let Some(url) = &res.source_document_url {
        eprintln!("Document: {}", url);
    }
    if let Some(path) = &res.snapshot_path {
        eprintln!("Snapshot: {}", path.display());
    }
    print_warnings(&res.warnings);
}

pub fn print_build_summary(res: &BuildResult) {
    eprintln!(
        "Tracker build: basket={} method={} months={} window={}..{}",
        res.basket_type,
        res.method_version,
        res.months_processed,
        opt_month(res.from_month),
        opt_month(res.to_month)
    );
    eprintln!(
        "Rows: general={} categories={}",
        res.general_rows, res.category_rows
    );
    if let Some(last) = res.general.iter().rev().find(|r| r.index_value.is_some()) {
        eprintln!(
            "Latest: {} index={:.2} status={}",
            last.year_month,
            last.index_value.unwrap_or_default(),
            last.status.as_str()
        );
    }
    print_warnings(&res.warnings);
}

fn metric(run: &PublicationRun, key: &str) -> String {
    match run.metrics.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .map_or_else(|| n.to_string(), |v| format!("{:.4}", v)),
        Some(Value::Null) | None => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn print_publication_summary(run: &PublicationRun) {
    let label = match run.status {
        RunStatus::Completed => "OK",
        RunStatus::CompletedWithWarnings | RunStatus::CompletedOfficialMissing => "WARN",
        _ => "FAIL",
    };
    eprintln!("{} [{}]: {}", label, run.run_uuid, run.status);
    eprintln!(
        "Basket: {} region={} method={}",
        run.basket_type, run.region, run.method_version
    );
    eprintln!(
        "Rows: official={} ({}) tracker={} categories={} overlap_months={}",
        run.official_rows,
        run.official_source.as_deref().unwrap_or("-"),
        run.tracker_rows,
        run.tracker_category_rows,
        run.overlap_months
    );
    eprintln!(
        "Metrics: mae_base100={} rmse_base100={} mae_mom={} rmse_mom={}",
        metric(run, "mae_base100"),
        metric(run, "rmse_base100"),
        metric(run, "mae_mom"),
        metric(run, "rmse_mom")
    );
    if let Some(err) = &run.error_message {
        eprintln!("ERROR: {}", err);
    }
    print_warnings(&run.warnings);
}

pub fn print_runs(runs: &[PublicationRun]) {
    if runs.is_empty() {
        eprintln!("No publication runs recorded.");
        return;
    }
    for run in runs {
        eprintln!(
            "{}  {}  {:<28} basket={} region={} official={} tracker={} overlap={}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.run_uuid,
            run.status.as_str(),
            run.basket_type,
            run.region,
            run.official_rows,
            run.tracker_rows,
            run.overlap_months
        );
    }
}
