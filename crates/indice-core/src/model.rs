use crate::errors::InvalidInput;
use crate::month::YearMonth;
use crate::normalize::Slug;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasketType {
    Cba,
    Extended,
    All,
}

impl BasketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BasketType::Cba => "cba",
            BasketType::Extended => "extended",
            BasketType::All => "all",
        }
    }

    /// Concrete baskets whose items make up this selection.
    pub fn members(&self) -> &'static [&'static str] {
        match self {
            BasketType::Cba => &["cba"],
            BasketType::Extended => &["extended"],
            BasketType::All => &["cba", "extended"],
        }
    }
}

impl FromStr for BasketType {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cba" => Ok(BasketType::Cba),
            "extended" => Ok(BasketType::Extended),
            "all" => Ok(BasketType::All),
            other => Err(InvalidInput(format!(
                "unknown basket type {other:?} (use cba, extended or all)"
            ))),
        }
    }
}

impl fmt::Display for BasketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    Provisional,
    ProvisionalLowCoverage,
    Final,
}

impl TrackerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerStatus::Provisional => "provisional",
            TrackerStatus::ProvisionalLowCoverage => "provisional_low_coverage",
            TrackerStatus::Final => "final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provisional" => Some(TrackerStatus::Provisional),
            "provisional_low_coverage" => Some(TrackerStatus::ProvisionalLowCoverage),
            "final" => Some(TrackerStatus::Final),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithWarnings,
    CompletedOfficialMissing,
    FailedNoTrackerRows,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithWarnings => "completed_with_warnings",
            RunStatus::CompletedOfficialMissing => "completed_official_missing",
            RunStatus::FailedNoTrackerRows => "failed_no_tracker_rows",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::CompletedWithWarnings,
            RunStatus::CompletedOfficialMissing,
            RunStatus::FailedNoTrackerRows,
            RunStatus::Failed,
        ]
        .into_iter()
        .find(|st| st.as_str() == s)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::FailedNoTrackerRows)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scraped shelf price. Produced by the external scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPriceObservation {
    pub canonical_id: String,
    pub basket_id: String,
    #[serde(default)]
    pub category: Option<String>,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasketWeight {
    pub weight: f64,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepresentativePrice {
    pub canonical_id: String,
    pub month: YearMonth,
    pub price: f64,
    pub obs_count: usize,
    pub outlier_count: usize,
    pub weight: f64,
    pub category: String,
}

/// Tracker index row. `category_slug` is `None` for the general series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerIndexPoint {
    pub basket_type: BasketType,
    pub year_month: YearMonth,
    pub method_version: String,
    pub category_slug: Option<String>,
    pub division_code: Option<Slug>,
    pub status: TrackerStatus,
    pub index_value: Option<f64>,
    pub mom_change: Option<f64>,
    pub yoy_change: Option<f64>,
    pub coverage_weight_pct: Option<f64>,
    pub coverage_product_pct: Option<f64>,
    pub products_expected: usize,
    pub products_observed: usize,
    pub products_with_relative: usize,
    pub outlier_count: usize,
    pub missing_products: usize,
    pub base_month: Option<YearMonth>,
    pub frozen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfficialIndexPoint {
    pub source: String,
    pub region: String,
    pub metric_code: Slug,
    pub category_slug: Option<Slug>,
    pub year_month: YearMonth,
    pub index_value: f64,
    pub mom_change: Option<f64>,
    pub yoy_change: Option<f64>,
    pub status: String,
    pub is_fallback: bool,
    /// Level chained from a monthly change rather than published.
    pub is_derived: bool,
    pub raw_snapshot_path: Option<String>,
}

/// Minimal monthly view used for tracker vs official comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub year_month: YearMonth,
    pub index_value: Option<f64>,
    pub mom_change: Option<f64>,
}

/// Audit record of one publication run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicationRun {
    pub run_uuid: String,
    pub basket_type: BasketType,
    pub region: String,
    pub method_version: String,
    pub from_month: Option<YearMonth>,
    pub to_month: Option<YearMonth>,
    pub status: RunStatus,
    pub official_source: Option<String>,
    pub official_rows: usize,
    pub tracker_rows: usize,
    pub tracker_category_rows: usize,
    pub overlap_months: usize,
    pub warnings: Vec<String>,
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
