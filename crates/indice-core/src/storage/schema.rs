pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS price_observations (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  canonical_id TEXT NOT NULL,
  basket_id TEXT NOT NULL,
  category TEXT,
  price REAL NOT NULL,
  observed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_price_observations_observed_at
  ON price_observations(observed_at);

CREATE TABLE IF NOT EXISTS official_cpi_monthly (
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
  is_derived INTEGER NOT NULL DEFAULT 0,
  raw_snapshot_path TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  UNIQUE (source, region, metric_code, year_month)
);

CREATE TABLE IF NOT EXISTS tracker_cpi_monthly (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  basket_type TEXT NOT NULL,
  year_month TEXT NOT NULL,
  method_version TEXT NOT NULL,
  status TEXT NOT NULL,
  index_value REAL,
  mom_change REAL,
  yoy_change REAL,
  coverage_weight_pct REAL,
  coverage_product_pct REAL,
  products_expected INTEGER NOT NULL,
  products_observed INTEGER NOT NULL,
  products_with_relative INTEGER NOT NULL,
  outlier_count INTEGER NOT NULL,
  missing_products INTEGER NOT NULL,
  base_month TEXT,
  computed_at TEXT NOT NULL,
  frozen_at TEXT,
  UNIQUE (basket_type, year_month, method_version)
);

CREATE TABLE IF NOT EXISTS tracker_cpi_category_monthly (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  basket_type TEXT NOT NULL,
  category_slug TEXT NOT NULL,
  division_code TEXT,
  year_month TEXT NOT NULL,
  method_version TEXT NOT NULL,
  status TEXT NOT NULL,
  index_value REAL,
  mom_change REAL,
  yoy_change REAL,
  coverage_weight_pct REAL,
  coverage_product_pct REAL,
  products_expected INTEGER NOT NULL,
  products_observed INTEGER NOT NULL,
  products_with_relative INTEGER NOT NULL,
  outlier_count INTEGER NOT NULL,
  missing_products INTEGER NOT NULL,
  base_month TEXT,
  computed_at TEXT NOT NULL,
  frozen_at TEXT,
  UNIQUE (basket_type, category_slug, year_month, method_version)
);

CREATE TABLE IF NOT EXISTS publication_runs (
  run_uuid TEXT PRIMARY KEY,
  basket_type TEXT NOT NULL,
  region TEXT NOT NULL,
  method_version TEXT NOT NULL,
  from_month TEXT,
  to_month TEXT,
  status TEXT NOT NULL,
  official_source TEXT,
  official_rows INTEGER NOT NULL DEFAULT 0,
  tracker_rows INTEGER NOT NULL DEFAULT 0,
  tracker_category_rows INTEGER NOT NULL DEFAULT 0,
  overlap_months INTEGER NOT NULL DEFAULT 0,
  warnings_json TEXT NOT NULL DEFAULT '[]',
  metrics_json TEXT NOT NULL DEFAULT '{}',
  error_message TEXT,
  started_at TEXT NOT NULL,
  completed_at TEXT
);
"#;
