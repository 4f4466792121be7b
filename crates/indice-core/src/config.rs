use crate::errors::ConfigError;
use crate::normalize::normalize_text;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_METHOD_VERSION: &str = "v1_fixed_weight_robust_monthly";
pub const DEFAULT_DISCOVERY_URL: &str = "https://www.indec.gob.ar/Nivel4/Tema/3/5/31";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub version: u32,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub baskets: BTreeMap<String, BasketSpec>,
    #[serde(default)]
    pub canonical_categories: CanonicalCategories,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub official: OfficialConfig,
    #[serde(default)]
    pub category_mapping: CategoryMappingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub snapshot_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/indice.db"),
            snapshot_dir: PathBuf::from("data/cpi/raw"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasketSpec {
    #[serde(default)]
    pub items: Vec<BasketItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasketItem {
    pub id: String,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl BasketItem {
    /// Explicit weight wins over quantity; an item with neither counts once.
    pub fn effective_weight(&self) -> f64 {
        self.weight.or(self.quantity).unwrap_or(1.0)
    }
}

/// Canonical category slug -> raw labels that should resolve to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanonicalCategories {
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl CanonicalCategories {
    pub fn resolve(&self, raw: &str) -> Option<String> {
        let needle = normalize_text(raw);
        if needle.is_empty() {
            return None;
        }
        self.aliases.iter().find_map(|(canonical, aliases)| {
            let hit = normalize_text(canonical) == needle
                || aliases.iter().any(|a| normalize_text(a) == needle);
            hit.then(|| canonical.clone())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthlyAggregation {
    WinsorizedMean,
    Mean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub method_version: String,
    pub monthly_aggregation: MonthlyAggregation,
    pub winsor_limits: [f64; 2],
    pub min_obs_per_product_month: usize,
    pub coverage_min_weight_pct: f64,
    pub provisional_freeze_days: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            method_version: DEFAULT_METHOD_VERSION.into(),
            monthly_aggregation: MonthlyAggregation::WinsorizedMean,
            winsor_limits: [0.10, 0.90],
            min_obs_per_product_month: 1,
            coverage_min_weight_pct: 0.70,
            provisional_freeze_days: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    XlsPdfHybrid,
    Xls,
    Pdf,
    Fallback,
    Auto,
    AutoWithFallback,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::XlsPdfHybrid => "xls_pdf_hybrid",
            SourceMode::Xls => "xls",
            SourceMode::Pdf => "pdf",
            SourceMode::Fallback => "fallback",
            SourceMode::Auto => "auto",
            SourceMode::AutoWithFallback => "auto_with_fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfficialConfig {
    pub source_mode: SourceMode,
    pub source_code: String,
    pub region_default: String,
    pub region_scope: Vec<String>,
    pub discovery_url: String,
    pub discovery_timeout_seconds: u64,
    pub document_timeout_seconds: u64,
    pub fallback_file: Option<PathBuf>,
    pub auto_source: Option<AutoSourceConfig>,
    pub validation: ValidationConfig,
}

impl Default for OfficialConfig {
    fn default() -> Self {
        Self {
            source_mode: SourceMode::XlsPdfHybrid,
            source_code: "indec_patagonia".into(),
            region_default: "patagonia".into(),
            region_scope: vec!["nacional".into(), "patagonia".into()],
            discovery_url: DEFAULT_DISCOVERY_URL.into(),
            discovery_timeout_seconds: 20,
            document_timeout_seconds: 40,
            fallback_file: Some(PathBuf::from("data/cpi/ipc_indec_patagonia.csv")),
            auto_source: None,
            validation: ValidationConfig::default(),
        }
    }
}

/// Secondary machine-readable feed. `url` may be an http(s) URL or a local path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSourceConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_format")]
    pub format: FileFormat,
    #[serde(default = "default_auto_timeout")]
    pub timeout_seconds: u64,
}

fn default_format() -> FileFormat {
    FileFormat::Csv
}

fn default_auto_timeout() -> u64 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_abs_diff_pp: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_abs_diff_pp: 0.10,
        }
    }
}

/// App category slug -> official division code. `map` is the deprecated
/// spelling of `app_to_indec_division`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryMappingConfig {
    #[serde(default)]
    pub app_to_indec_division: Option<BTreeMap<String, Option<String>>>,
    #[serde(default)]
    pub map: Option<BTreeMap<String, Option<String>>>,
}

impl AppConfig {
    /// Basket items for a selection, tagged with the concrete basket they came from.
    pub fn basket_items(&self, basket: crate::model::BasketType) -> Vec<(&str, &BasketItem)> {
        let mut out = Vec::new();
        for name in basket.members() {
            if let Some(basket) = self.baskets.get(*name) {
                out.extend(basket.items.iter().map(|item| (*name, item)));
            }
        }
        out
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    let cfg = parse_config(&raw, |name| std::env::var(name).ok())?;
    tracing::debug!(event = "config.loaded", path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Parses YAML text after `${VAR}` / `${VAR:default}` substitution.
pub fn parse_config(
    raw: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let expanded = substitute_env(raw, env)?;

    let mut ignored_keys = BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(&expanded);
    let cfg: AppConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    if !ignored_keys.is_empty() {
        tracing::warn!(
            event = "config.unknown_keys",
            keys = ?ignored_keys,
            "ignored unknown config fields"
        );
    }

    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    let [low, high] = cfg.tracker.winsor_limits;
    if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low >= high {
        return Err(ConfigError(format!(
            "tracker.winsor_limits must satisfy 0 <= low < high <= 1, got [{low}, {high}]"
        )));
    }
    if !(0.0..=1.0).contains(&cfg.tracker.coverage_min_weight_pct) {
        return Err(ConfigError(format!(
            "tracker.coverage_min_weight_pct must be within [0, 1], got {}",
            cfg.tracker.coverage_min_weight_pct
        )));
    }
    Ok(cfg)
}

/// Unset variables without a default are left verbatim.
fn substitute_env(
    raw: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}")
        .map_err(|e| ConfigError(format!("bad env placeholder pattern: {}", e)))?;
    let out = re
        .replace_all(raw, |caps: &Captures| {
            let name = caps[1].trim();
            match (env(name), caps.get(2)) {
                (Some(v), _) => v,
                (None, Some(default)) => default.as_str().to_string(),
                (None, None) => caps[0].to_string(),
            }
        })
        .into_owned();
    Ok(out)
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, SAMPLE_CONFIG)
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}

pub const SAMPLE_CONFIG: &str = r#"version: 1
storage:
  database_path: ${INDICE_DB:data/indice.db}
  snapshot_dir: data/cpi/raw
baskets:
  cba:
    items:
      - { id: leche_entera_1l, quantity: 9, category: lacteos }
      - { id: pan_frances_1kg, quantity: 6, category: panificados }
      - { id: carne_picada_1kg, quantity: 4, category: carnes }
  extended:
    items:
      - { id: detergente_750ml, quantity: 2, category: limpieza }
canonical_categories:
  aliases:
    lacteos: ["Lácteos", "leches"]
tracker:
  method_version: v1_fixed_weight_robust_monthly
  monthly_aggregation: winsorized_mean
  winsor_limits: [0.10, 0.90]
  min_obs_per_product_month: 1
  coverage_min_weight_pct: 0.70
  provisional_freeze_days: 7
official:
  source_mode: xls_pdf_hybrid
  source_code: indec_patagonia
  region_default: patagonia
  region_scope: [nacional, patagonia]
  fallback_file: data/cpi/ipc_indec_patagonia.csv
  validation:
    max_abs_diff_pp: 0.10
category_mapping:
  app_to_indec_division:
    lacteos: alimentos_y_bebidas_no_alcoholicas
    panificados: alimentos_y_bebidas_no_alcoholicas
    carnes: alimentos_y_bebidas_no_alcoholicas
    limpieza: equipamiento_y_mantenimiento_del_hogar
"#;
