//! Local fallback file and auto-source feed (CSV or JSON).

use super::fetch::DocumentFetcher;
use super::rows::OfficialRow;
use crate::config::{AutoSourceConfig, FileFormat};
use crate::errors::SourceError;
use crate::mapping::CategoryMapping;
use crate::month::YearMonth;
use crate::normalize::{normalize_region, parse_numeric, Slug};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

const YEAR_MONTH: &[&str] = &["year_month", "periodo", "periodo_mensual", "mes", "month"];
const INDEX_VALUE: &[&str] = &["index_value", "cpi_index", "ipc_index", "indice", "index"];
const MOM_CHANGE: &[&str] = &["mom_change", "cpi_mom", "ipc_mom", "mom", "mensual_pct", "var_mensual"];
const YOY_CHANGE: &[&str] = &["yoy_change", "cpi_yoy", "ipc_yoy", "yoy", "interanual_pct", "var_interanual"];
const METRIC_CODE: &[&str] = &["metric_code", "division_code", "indec_division_code", "series_code", "code"];
const CATEGORY_SLUG: &[&str] = &["category_slug", "categoria", "rubro", "division_slug", "division"];
const STATUS: &[&str] = &["status", "estado"];
const REGION: &[&str] = &["region", "region_name", "zona"];

/// Untyped tabular payload: header names plus string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    fn column(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            self.columns
                .iter()
                .position(|c| c.trim().eq_ignore_ascii_case(alias))
        })
    }
}

pub fn read_table(text: &str, format: FileFormat) -> Result<RawTable, SourceError> {
    match format {
        FileFormat::Csv => read_csv(text),
        FileFormat::Json => read_json(text),
    }
}

fn read_csv(text: &str) -> Result<RawTable, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let columns = reader
        .headers()
        .map_err(|e| SourceError::parse(format!("bad csv header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| {
            r.map(|rec| rec.iter().map(str::to_string).collect())
                .map_err(|e| SourceError::parse(format!("bad csv record: {e}")))
        })
        .collect::<Result<Vec<Vec<String>>, _>>()?;
    Ok(RawTable { columns, rows })
}

/// A bare array of objects, or an object wrapping one under `items`, `data`
/// or `rows`.
fn read_json(text: &str) -> Result<RawTable, SourceError> {
    let payload: Value =
        serde_json::from_str(text).map_err(|e| SourceError::parse(format!("bad json: {e}")))?;
    let items = match &payload {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => ["items", "data", "rows"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => return Err(SourceError::parse("json payload is neither array nor object")),
    };

    let mut table = RawTable::default();
    for item in items {
        let Some(obj) = item.as_object() else {
            continue;
        };
        for key in obj.keys() {
            if !table.columns.contains(key) {
                table.columns.push(key.clone());
            }
        }
    }
    for item in items.iter().filter_map(Value::as_object) {
        let row = table
            .columns
            .iter()
            .map(|c| match item.get(c) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        table.rows.push(row);
    }
    Ok(table)
}

/// Maps an aliased table onto official rows.
///
/// Category codes go through the app -> division mapping; a non-general
/// metric without a category is its own category. Rows without a month or an
/// index level are dropped.
pub fn normalize_table(
    table: &RawTable,
    default_region: &str,
    mapping: &CategoryMapping,
) -> Result<Vec<OfficialRow>, SourceError> {
    let (Some(ym_col), Some(index_col)) = (table.column(YEAR_MONTH), table.column(INDEX_VALUE)) else {
        return Err(SourceError::parse(
            "source is missing a year_month or index_value column",
        ));
    };
    let mom_col = table.column(MOM_CHANGE);
    let yoy_col = table.column(YOY_CHANGE);
    let metric_col = table.column(METRIC_CODE);
    let category_col = table.column(CATEGORY_SLUG);
    let status_col = table.column(STATUS);
    let region_col = table.column(REGION);

    let to_division = |slug: Slug| mapping.division_for(&slug).cloned().unwrap_or(slug);

    let mut out = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let get = |col: Option<usize>| field(row, col);

        let (Some(year_month), Some(index_value)) = (
            YearMonth::parse_loose(get(Some(ym_col))),
            parse_numeric(get(Some(index_col))),
        ) else {
            continue;
        };

        let mut metric = Slug::normalize(get(metric_col));
        let mut category = Slug::normalize(get(category_col));
        if !mapping.is_empty() {
            metric = metric.map(to_division);
            category = category.map(to_division);
            if category.is_none() {
                category = metric.clone().filter(|m| !m.is_general());
            }
            if metric.is_none() {
                metric = category.clone();
            }
            if category.is_none() {
                category = metric.clone().filter(|m| mapping.is_division(m));
            }
        }
        let metric_code = metric.unwrap_or_else(Slug::general);
        if category.is_none() && !metric_code.is_general() {
            category = Some(metric_code.clone());
        }

        let status = get(status_col).trim().to_lowercase();
        let region = match get(region_col) {
            "" => normalize_region(default_region),
            raw => normalize_region(raw),
        };
        out.push(OfficialRow {
            region,
            year_month,
            metric_code,
            category_slug: category,
            index_value: Some(index_value),
            mom_change: parse_numeric(get(mom_col)),
            yoy_change: parse_numeric(get(yoy_col)),
            status: if status.is_empty() { "final".into() } else { status },
        });
    }
    Ok(out)
}

fn field(row: &[String], col: Option<usize>) -> &str {
    col.and_then(|c| row.get(c)).map(String::as_str).unwrap_or("")
}

/// Reads the configured fallback file. `.json` files are read as JSON,
/// anything else as CSV.
pub fn load_fallback_file(
    path: &Path,
    default_region: &str,
    mapping: &CategoryMapping,
) -> Result<Vec<OfficialRow>, SourceError> {
    if !path.exists() {
        return Err(SourceError::NotConfigured(format!(
            "fallback file not found: {}",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => FileFormat::Json,
        _ => FileFormat::Csv,
    };
    normalize_table(&read_table(&text, format)?, default_region, mapping)
}

/// Reads the auto source (http(s) URL or local path), restricted to the window.
pub fn fetch_auto_source(
    cfg: &AutoSourceConfig,
    fetcher: &dyn DocumentFetcher,
    default_region: &str,
    mapping: &CategoryMapping,
    from: Option<YearMonth>,
    to: Option<YearMonth>,
) -> Result<Vec<OfficialRow>, SourceError> {
    let source = cfg
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| SourceError::NotConfigured("official.auto_source.url".into()))?;

    let text = if source.starts_with("http://") || source.starts_with("https://") {
        fetcher.get_text(source, Duration::from_secs(cfg.timeout_seconds))?
    } else {
        let path = Path::new(source);
        if !path.exists() {
            return Err(SourceError::NotConfigured(format!(
                "auto source not found: {source}"
            )));
        }
        std::fs::read_to_string(path)?
    };

    let mut rows = normalize_table(&read_table(&text, cfg.format)?, default_region, mapping)?;
    rows.retain(|r| from.map_or(true, |f| r.year_month >= f) && to.map_or(true, |t| r.year_month <= t));
    rows.sort_by(|a, b| a.key().cmp(&b.key()));
    Ok(rows)
}
