//! Official CPI acquisition.
//!
//! A sync walks an ordered list of [`SourceStrategy`] values derived from the
//! configured source mode. The first strategy that yields rows wins; every
//! skipped strategy leaves a warning behind. The winning rows are filtered to
//! the target regions and window, checked for continuity, snapshotted and
//! upserted.

pub mod continuity;
pub mod discovery;
pub mod fallback;
pub mod fetch;
pub mod hydrate;
pub mod labels;
pub mod pdf;
pub mod region;
pub mod rows;
pub mod spreadsheet;

pub use fetch::{DocumentFetcher, HttpFetcher};
pub use rows::{merge_parsed, OfficialRow, ParsedRow, ParsedValue};

use crate::config::{OfficialConfig, SourceMode};
use crate::errors::SourceError;
use crate::mapping::CategoryMapping;
use crate::model::OfficialIndexPoint;
use crate::month::YearMonth;
use crate::normalize::normalize_region;
use crate::reconcile::{reconcile, Reconciliation, ValidationStatus};
use crate::snapshot::SnapshotStore;
use crate::storage::Store;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

pub const SOURCE_XLS: &str = "indec_xls";
pub const SOURCE_PDF: &str = "indec_pdf";
pub const SOURCE_FALLBACK: &str = "fallback_file";
pub const SOURCE_AUTO: &str = "auto_source";
pub const SOURCE_NONE: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStrategy {
    /// Discovery page plus the linked spreadsheet and/or PDF.
    IndecDocuments { xls: bool, pdf: bool },
    FallbackFile,
    AutoSource,
}

impl SourceStrategy {
    pub fn plan(mode: SourceMode) -> Vec<SourceStrategy> {
        let both = SourceStrategy::IndecDocuments { xls: true, pdf: true };
        match mode {
            SourceMode::XlsPdfHybrid => vec![both, SourceStrategy::FallbackFile],
            SourceMode::Xls => vec![SourceStrategy::IndecDocuments { xls: true, pdf: false }],
            SourceMode::Pdf => vec![SourceStrategy::IndecDocuments { xls: false, pdf: true }],
            SourceMode::Fallback => vec![SourceStrategy::FallbackFile],
            SourceMode::Auto | SourceMode::AutoWithFallback => {
                vec![both, SourceStrategy::FallbackFile, SourceStrategy::AutoSource]
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Acquired {
    pub rows: Vec<OfficialRow>,
    pub official_source: &'static str,
    pub document_url: Option<String>,
    pub used_fallback: bool,
}

#[derive(Debug, Clone)]
pub enum StrategyOutcome {
    Success(Acquired),
    Skip(String),
}

impl StrategyOutcome {
    fn from_rows(
        rows: Result<Vec<OfficialRow>, SourceError>,
        official_source: &'static str,
        document_url: Option<String>,
        used_fallback: bool,
    ) -> Self {
        match rows {
            Ok(rows) if rows.is_empty() => StrategyOutcome::Skip(format!("{official_source}: no rows")),
            Ok(rows) => StrategyOutcome::Success(Acquired {
                rows,
                official_source,
                document_url,
                used_fallback,
            }),
            Err(e) => StrategyOutcome::Skip(format!("{official_source} failed: {e}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub source_mode: String,
    pub source: String,
    pub official_source: String,
    pub region: String,
    pub regions: Vec<String>,
    pub from_month: Option<YearMonth>,
    pub to_month: Option<YearMonth>,
    pub used_fallback: bool,
    pub fetched_rows: usize,
    pub upserted_rows: usize,
    #[serde(skip)]
    pub rows: Vec<OfficialRow>,
    pub source_document_url: Option<String>,
    pub source_assets: BTreeMap<String, String>,
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_paths: Vec<PathBuf>,
    pub validation: Option<Reconciliation>,
    pub validation_status: ValidationStatus,
    pub warnings: Vec<String>,
}

pub type DocumentParser = fn(&[u8]) -> Result<Vec<OfficialRow>, SourceError>;

/// Parsers applied to the downloaded INDEC documents.
#[derive(Debug, Clone, Copy)]
pub struct DocumentParsers {
    pub xls: DocumentParser,
    pub pdf: DocumentParser,
}

impl Default for DocumentParsers {
    fn default() -> Self {
        Self {
            xls: spreadsheet::parse_workbook,
            pdf: pdf::parse_pdf,
        }
    }
}

/// Side effects gathered while strategies run.
#[derive(Default)]
struct Trail {
    warnings: Vec<String>,
    snapshot_paths: Vec<PathBuf>,
    source_assets: BTreeMap<String, String>,
    validation: Option<Reconciliation>,
    validation_status: Option<ValidationStatus>,
}

pub struct OfficialAcquirer<'a> {
    cfg: &'a OfficialConfig,
    mapping: &'a CategoryMapping,
    store: &'a Store,
    snapshots: &'a SnapshotStore,
    fetcher: &'a dyn DocumentFetcher,
    parsers: DocumentParsers,
}

impl<'a> OfficialAcquirer<'a> {
    pub fn new(
        cfg: &'a OfficialConfig,
        mapping: &'a CategoryMapping,
        store: &'a Store,
        snapshots: &'a SnapshotStore,
        fetcher: &'a dyn DocumentFetcher,
    ) -> Self {
        Self {
            cfg,
            mapping,
            store,
            snapshots,
            fetcher,
            parsers: DocumentParsers::default(),
        }
    }

    pub fn with_parsers(mut self, parsers: DocumentParsers) -> Self {
        self.parsers = parsers;
        self
    }

    /// Acquires and persists official rows for `region` (`None` or `all`
    /// means the configured scope) within `[from, to]`.
    ///
    /// Source failures never fail the sync; only storage errors do.
    pub fn sync(
        &self,
        from: Option<YearMonth>,
        to: Option<YearMonth>,
        region: Option<&str>,
    ) -> anyhow::Result<SyncResult> {
        let requested_region = region.unwrap_or(crate::normalize::REGION_ALL).to_string();
        let regions = region::resolve_regions(self.cfg, region);
        let mut trail = Trail::default();

        let mut acquired = None;
        for strategy in SourceStrategy::plan(self.cfg.source_mode) {
            let outcome = match strategy {
                SourceStrategy::IndecDocuments { xls, pdf } => self.run_documents(xls, pdf, &mut trail)?,
                SourceStrategy::FallbackFile => self.run_fallback_file(),
                SourceStrategy::AutoSource => self.run_auto_source(from, to),
            };
            match outcome {
                StrategyOutcome::Success(found) => {
                    tracing::info!(
                        event = "official.strategy.success",
                        source = found.official_source,
                        rows = found.rows.len()
                    );
                    acquired = Some(found);
                    break;
                }
                StrategyOutcome::Skip(reason) => {
                    tracing::warn!(event = "official.strategy.skip", ?strategy, reason = %reason);
                    trail.warnings.push(reason);
                }
            }
        }

        let mut result = SyncResult {
            source_mode: self.cfg.source_mode.as_str().to_string(),
            source: self.cfg.source_code.clone(),
            official_source: SOURCE_NONE.to_string(),
            region: requested_region,
            regions,
            from_month: from,
            to_month: to,
            used_fallback: true,
            fetched_rows: 0,
            upserted_rows: 0,
            rows: Vec::new(),
            source_document_url: None,
            source_assets: BTreeMap::new(),
            snapshot_path: None,
            snapshot_paths: Vec::new(),
            validation: None,
            validation_status: ValidationStatus::NotRun,
            warnings: Vec::new(),
        };

        let Some(acquired) = acquired else {
            trail
                .warnings
                .push("no official rows could be loaded from XLS/PDF or fallback".into());
            tracing::warn!(event = "official.sync.empty", mode = %result.source_mode);
            return Ok(result.with_trail(trail));
        };

        let targets: BTreeSet<&str> = result.regions.iter().map(String::as_str).collect();
        let mut rows: Vec<OfficialRow> = acquired
            .rows
            .into_iter()
            .map(|mut row| {
                row.region = normalize_region(&row.region);
                row
            })
            .filter(|row| targets.contains(row.region.as_str()))
            .filter(|row| from.map_or(true, |f| row.year_month >= f))
            .filter(|row| to.map_or(true, |t| row.year_month <= t))
            .collect();
        rows.sort_by(|a, b| a.key().cmp(&b.key()));

        trail.warnings.extend(continuity::validate_continuity(&rows));
        let prefix = format!("official_{}", acquired.official_source);
        let snapshot = self.snapshots.persist_csv(&prefix, &rows)?;
        if let Some(path) = &snapshot {
            trail.snapshot_paths.push(path.clone());
        }

        let snapshot_str = snapshot.as_ref().map(|p| p.display().to_string());
        let points: Vec<OfficialIndexPoint> = rows
            .iter()
            .filter_map(|row| {
                Some(OfficialIndexPoint {
                    source: self.cfg.source_code.clone(),
                    region: row.region.clone(),
                    metric_code: row.metric_code.clone(),
                    category_slug: row.category_slug.clone(),
                    year_month: row.year_month,
                    index_value: row.index_value?,
                    mom_change: row.mom_change,
                    yoy_change: row.yoy_change,
                    status: if row.status.is_empty() {
                        "final".into()
                    } else {
                        row.status.clone()
                    },
                    is_fallback: acquired.used_fallback,
                    is_derived: acquired.official_source == SOURCE_PDF,
                    raw_snapshot_path: snapshot_str.clone(),
                })
            })
            .collect();
        let upserted = self.store.upsert_official_points(&points)?;

        tracing::info!(
            event = "official.sync.done",
            source = acquired.official_source,
            fetched = rows.len(),
            upserted,
            used_fallback = acquired.used_fallback,
            "official sync finished"
        );

        result.official_source = acquired.official_source.to_string();
        result.used_fallback = acquired.used_fallback;
        result.source_document_url = acquired.document_url;
        result.fetched_rows = rows.len();
        result.upserted_rows = upserted;
        result.rows = rows;
        result.snapshot_path = snapshot;
        Ok(result.with_trail(trail))
    }

    fn run_documents(&self, want_xls: bool, want_pdf: bool, trail: &mut Trail) -> anyhow::Result<StrategyOutcome> {
        let assets = match discovery::discover(
            self.fetcher,
            self.snapshots,
            &self.cfg.discovery_url,
            Duration::from_secs(self.cfg.discovery_timeout_seconds),
        ) {
            Ok(assets) => assets,
            Err(e) => {
                trail.warnings.push(format!("INDEC discovery failed: {e}"));
                tracing::warn!(event = "official.discovery.failed", error = %e);
                discovery::DiscoveredAssets::default()
            }
        };
        if !assets.discovery_url.is_empty() {
            trail
                .source_assets
                .insert("discovery_url".into(), assets.discovery_url.clone());
        }
        if let Some(path) = &assets.html_snapshot_path {
            trail.snapshot_paths.push(path.clone());
            trail
                .source_assets
                .insert("html_snapshot_path".into(), path.display().to_string());
        }

        let mut xls_rows = Vec::new();
        if want_xls {
            xls_rows = self.fetch_document(assets.xls_url.as_deref(), "xls", trail, self.parsers.xls);
        }
        let mut pdf_rows = Vec::new();
        if want_pdf {
            pdf_rows = self.fetch_document(assets.pdf_url.as_deref(), "pdf", trail, self.parsers.pdf);
        }

        let status = match (xls_rows.is_empty(), pdf_rows.is_empty()) {
            (false, false) => {
                let check = reconcile(&xls_rows, &pdf_rows, self.cfg.validation.max_abs_diff_pp);
                match check.warning() {
                    Some(w) => trail.warnings.push(w),
                    None => tracing::info!(
                        event = "official.validation",
                        status = check.status.as_str(),
                        checked_month = ?check.checked_month,
                        max_abs_diff_pp = ?check.max_abs_diff_pp
                    ),
                }
                let status = check.status;
                trail.validation = Some(check);
                status
            }
            (true, false) => ValidationStatus::NotAvailable,
            (false, true) if !want_pdf => ValidationStatus::NotAvailable,
            _ => ValidationStatus::Failed,
        };
        trail.validation_status = Some(status);

        if !xls_rows.is_empty() {
            return Ok(StrategyOutcome::Success(Acquired {
                rows: xls_rows,
                official_source: SOURCE_XLS,
                document_url: assets.xls_url,
                used_fallback: false,
            }));
        }
        if !pdf_rows.is_empty() {
            let rows = hydrate::hydrate_pdf_rows(self.store, &self.cfg.source_code, pdf_rows, &mut trail.warnings)?;
            return Ok(StrategyOutcome::Success(Acquired {
                rows,
                official_source: SOURCE_PDF,
                document_url: assets.pdf_url,
                used_fallback: true,
            }));
        }
        Ok(StrategyOutcome::Skip("official documents yielded no rows".into()))
    }

    /// Downloads, snapshots and parses one linked document. Failures become
    /// warnings and an empty row set.
    fn fetch_document(
        &self,
        url: Option<&str>,
        kind: &str,
        trail: &mut Trail,
        parse: DocumentParser,
    ) -> Vec<OfficialRow> {
        let Some(url) = url else {
            trail
                .warnings
                .push(format!("no {} link found on the INDEC discovery page", kind.to_uppercase()));
            return Vec::new();
        };
        trail.source_assets.insert(format!("{kind}_url"), url.to_string());

        let blob = match self
            .fetcher
            .get_bytes(url, Duration::from_secs(self.cfg.document_timeout_seconds))
        {
            Ok(blob) => blob,
            Err(e) => {
                trail.warnings.push(format!("official {} failed: {e}", kind.to_uppercase()));
                return Vec::new();
            }
        };
        let ext = if kind == "xls" && url.to_ascii_lowercase().ends_with(".xlsx") {
            "xlsx"
        } else {
            kind
        };
        match self.snapshots.persist_bytes(&format!("indec_{kind}"), ext, &blob) {
            Ok(path) => {
                trail
                    .source_assets
                    .insert(format!("{kind}_raw_snapshot_path"), path.display().to_string());
                trail.snapshot_paths.push(path);
            }
            Err(e) => trail
                .warnings
                .push(format!("could not snapshot {kind} document: {e:#}")),
        }

        match parse(&blob) {
            Ok(rows) => {
                tracing::info!(event = "official.document.parsed", kind, rows = rows.len());
                rows
            }
            Err(e) => {
                trail.warnings.push(format!("official {} failed: {e}", kind.to_uppercase()));
                tracing::warn!(event = "official.document.failed", kind, error = %e);
                Vec::new()
            }
        }
    }

    fn run_fallback_file(&self) -> StrategyOutcome {
        let Some(path) = &self.cfg.fallback_file else {
            return StrategyOutcome::Skip("fallback file not configured".into());
        };
        let rows = fallback::load_fallback_file(path, &self.cfg.region_default, self.mapping);
        StrategyOutcome::from_rows(rows, SOURCE_FALLBACK, Some(path.display().to_string()), true)
    }

    fn run_auto_source(&self, from: Option<YearMonth>, to: Option<YearMonth>) -> StrategyOutcome {
        let Some(auto) = &self.cfg.auto_source else {
            return StrategyOutcome::Skip("auto source not configured".into());
        };
        let rows = fallback::fetch_auto_source(
            auto,
            self.fetcher,
            &self.cfg.region_default,
            self.mapping,
            from,
            to,
        );
        StrategyOutcome::from_rows(rows, SOURCE_AUTO, auto.url.clone(), false)
    }
}

/// Compiles `pattern` on first use; later calls reuse the cached outcome.
pub(crate) fn cached_regex(
    cell: &'static OnceLock<Result<regex::Regex, regex::Error>>,
    pattern: &str,
) -> Result<&'static regex::Regex, regex::Error> {
    cell.get_or_init(|| regex::Regex::new(pattern))
        .as_ref()
        .map_err(Clone::clone)
}

impl SyncResult {
    fn with_trail(mut self, trail: Trail) -> Self {
        self.warnings = trail.warnings;
        self.snapshot_paths = trail.snapshot_paths;
        self.source_assets = trail.source_assets;
        self.validation = trail.validation;
        self.validation_status = trail.validation_status.unwrap_or(ValidationStatus::NotRun);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_orders_strategies_by_mode() {
        use SourceStrategy::*;
        assert_eq!(
            SourceStrategy::plan(SourceMode::XlsPdfHybrid),
            vec![IndecDocuments { xls: true, pdf: true }, FallbackFile]
        );
        assert_eq!(
            SourceStrategy::plan(SourceMode::Pdf),
            vec![IndecDocuments { xls: false, pdf: true }]
        );
        assert_eq!(SourceStrategy::plan(SourceMode::Fallback), vec![FallbackFile]);
        assert_eq!(
            SourceStrategy::plan(SourceMode::AutoWithFallback).last(),
            Some(&AutoSource)
        );
    }

    #[test]
    fn cached_regex_compiles_once_and_surfaces_bad_patterns() {
        static DIGITS: OnceLock<Result<regex::Regex, regex::Error>> = OnceLock::new();
        static UNCLOSED: OnceLock<Result<regex::Regex, regex::Error>> = OnceLock::new();

        let first = cached_regex(&DIGITS, r"\d+").unwrap();
        let second = cached_regex(&DIGITS, r"\d+").unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(cached_regex(&UNCLOSED, "(unclosed").is_err());
        assert!(cached_regex(&UNCLOSED, "(unclosed").is_err());
    }
}
