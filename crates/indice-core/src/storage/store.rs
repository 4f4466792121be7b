use crate::model::{
    BasketType, OfficialIndexPoint, PublicationRun, RawPriceObservation, RunStatus, SeriesPoint,
    TrackerIndexPoint, TrackerStatus,
};
use crate::month::YearMonth;
use crate::normalize::Slug;
use anyhow::{anyhow, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

/// Row counts and month span of already-persisted tracker rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerSummary {
    pub general_rows: usize,
    pub category_rows: usize,
    pub from_month: Option<YearMonth>,
    pub to_month: Option<YearMonth>,
}

const TRACKER_COLUMNS: &str = "year_month, method_version, status, index_value, mom_change, \
     yoy_change, coverage_weight_pct, coverage_product_pct, products_expected, products_observed, \
     products_with_relative, outlier_count, missing_products, base_month, frozen_at";

const OFFICIAL_COLUMNS: &str = "source, region, metric_code, category_slug, year_month, \
     index_value, mom_change, yoy_change, status, is_fallback, raw_snapshot_path, is_derived";

const RUN_COLUMNS: &str = "run_uuid, basket_type, region, method_version, from_month, to_month, \
     status, official_source, official_rows, tracker_rows, tracker_category_rows, overlap_months, \
     warnings_json, metrics_json, error_message, started_at, completed_at";

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        migrate_derived_flag(&conn)?;
        Ok(())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    // observations
    pub fn insert_observations(&self, rows: &[RawPriceObservation]) -> anyhow::Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO price_observations(canonical_id, basket_id, category, price, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in rows {
                stmt.execute(params![
                    r.canonical_id,
                    r.basket_id,
                    r.category,
                    r.price,
                    ts(&r.observed_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Observations for a basket selection within `[start, end)`.
    pub fn query_observations(
        &self,
        basket: BasketType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<RawPriceObservation>> {
        let conn = self.lock()?;
        let basket_filter = match basket {
            BasketType::All => None,
            other => Some(other.as_str()),
        };
        let mut stmt = conn.prepare(
            "SELECT canonical_id, basket_id, category, price, observed_at
             FROM price_observations
             WHERE (?1 IS NULL OR basket_id = ?1)
               AND (?2 IS NULL OR observed_at >= ?2)
               AND (?3 IS NULL OR observed_at < ?3)
             ORDER BY canonical_id, observed_at",
        )?;
        let raw = stmt
            .query_map(
                params![basket_filter, start.as_ref().map(ts), end.as_ref().map(ts)],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, f64>(3)?,
                        r.get::<_, String>(4)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(canonical_id, basket_id, category, price, observed_at)| {
                Ok(RawPriceObservation {
                    canonical_id,
                    basket_id,
                    category,
                    price,
                    observed_at: parse_ts(&observed_at)?,
                })
            })
            .collect()
    }

    // official
    /// Upserts by `(source, region, metric_code, year_month)`. A stored `final`
    /// status is never downgraded.
    pub fn upsert_official_points(&self, points: &[OfficialIndexPoint]) -> anyhow::Result<usize> {
        let now = ts(&Utc::now());
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO official_cpi_monthly({OFFICIAL_COLUMNS}, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                 ON CONFLICT(source, region, metric_code, year_month) DO UPDATE SET
                   category_slug=excluded.category_slug,
                   index_value=excluded.index_value,
                   mom_change=excluded.mom_change,
                   yoy_change=excluded.yoy_change,
                   status=CASE WHEN official_cpi_monthly.status = 'final' THEN 'final' ELSE excluded.status END,
                   is_fallback=excluded.is_fallback,
                   is_derived=excluded.is_derived,
                   raw_snapshot_path=excluded.raw_snapshot_path,
                   updated_at=excluded.updated_at"
            ))?;
            for p in points {
                stmt.execute(params![
                    p.source,
                    p.region,
                    p.metric_code.as_str(),
                    p.category_slug.as_ref().map(Slug::as_str),
                    p.year_month.to_string(),
                    p.index_value,
                    p.mom_change,
                    p.yoy_change,
                    p.status,
                    p.is_fallback,
                    p.raw_snapshot_path,
                    p.is_derived,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(points.len())
    }

    /// Most recent persisted point of a series strictly before `before`.
    pub fn latest_official_before(
        &self,
        source: &str,
        region: &str,
        metric_code: &Slug,
        before: YearMonth,
    ) -> anyhow::Result<Option<OfficialIndexPoint>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {OFFICIAL_COLUMNS} FROM official_cpi_monthly
                     WHERE source=?1 AND region=?2 AND metric_code=?3 AND year_month < ?4
                     ORDER BY year_month DESC LIMIT 1"
                ),
                params![source, region, metric_code.as_str(), before.to_string()],
                official_raw,
            )
            .optional()?;
        raw.map(OfficialRaw::into_point).transpose()
    }

    pub fn official_points(
        &self,
        source: &str,
        region: &str,
    ) -> anyhow::Result<Vec<OfficialIndexPoint>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {OFFICIAL_COLUMNS} FROM official_cpi_monthly
             WHERE source=?1 AND region=?2
             ORDER BY year_month, metric_code"
        ))?;
        let raw = stmt
            .query_map(params![source, region], official_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(OfficialRaw::into_point).collect()
    }

    pub fn official_series(
        &self,
        source: &str,
        region: &str,
        metric_code: &str,
        from: Option<YearMonth>,
        to: Option<YearMonth>,
    ) -> anyhow::Result<Vec<SeriesPoint>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT year_month, index_value, mom_change FROM official_cpi_monthly
             WHERE source=?1 AND region=?2 AND metric_code=?3
               AND (?4 IS NULL OR year_month >= ?4)
               AND (?5 IS NULL OR year_month <= ?5)
             ORDER BY year_month",
        )?;
        let raw = stmt
            .query_map(
                params![source, region, metric_code, month_opt(from), month_opt(to)],
                series_raw,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(into_series_point).collect()
    }

    pub fn count_official_rows(
        &self,
        source: &str,
        region: &str,
        metric_code: &str,
        from: Option<YearMonth>,
        to: Option<YearMonth>,
    ) -> anyhow::Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM official_cpi_monthly
             WHERE source=?1 AND region=?2 AND metric_code=?3
               AND (?4 IS NULL OR year_month >= ?4)
               AND (?5 IS NULL OR year_month <= ?5)",
            params![source, region, metric_code, month_opt(from), month_opt(to)],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }

    // tracker
    /// Upserts general (`category_slug == None`) and category rows into their
    /// tables. A stored `final` row keeps its status and `frozen_at`.
    pub fn upsert_tracker_points(&self, points: &[TrackerIndexPoint]) -> anyhow::Result<usize> {
        let now = ts(&Utc::now());
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut general = tx.prepare(&format!(
                "INSERT INTO tracker_cpi_monthly(basket_type, {TRACKER_COLUMNS}, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(basket_type, year_month, method_version) DO UPDATE SET {}",
                tracker_update_set("tracker_cpi_monthly")
            ))?;
            let mut category = tx.prepare(&format!(
                "INSERT INTO tracker_cpi_category_monthly(basket_type, {TRACKER_COLUMNS}, computed_at, category_slug, division_code)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                 ON CONFLICT(basket_type, category_slug, year_month, method_version) DO UPDATE SET
                   division_code=excluded.division_code, {}",
                tracker_update_set("tracker_cpi_category_monthly")
            ))?;

            for p in points {
                let basket = p.basket_type.as_str();
                let year_month = p.year_month.to_string();
                let status = p.status.as_str();
                let counts = [
                    p.products_expected as i64,
                    p.products_observed as i64,
                    p.products_with_relative as i64,
                    p.outlier_count as i64,
                    p.missing_products as i64,
                ];
                let base_month = month_opt(p.base_month);
                let frozen_at = p.frozen_at.as_ref().map(ts);
                let base: [&dyn ToSql; 17] = [
                    &basket,
                    &year_month,
                    &p.method_version,
                    &status,
                    &p.index_value,
                    &p.mom_change,
                    &p.yoy_change,
                    &p.coverage_weight_pct,
                    &p.coverage_product_pct,
                    &counts[0],
                    &counts[1],
                    &counts[2],
                    &counts[3],
                    &counts[4],
                    &base_month,
                    &frozen_at,
                    &now,
                ];
                match &p.category_slug {
                    None => {
                        general.execute(&base[..])?;
                    }
                    Some(slug) => {
                        let division = p.division_code.as_ref().map(Slug::as_str);
                        let mut all: Vec<&dyn ToSql> = base.to_vec();
                        all.push(slug);
                        all.push(&division);
                        category.execute(all.as_slice())?;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(points.len())
    }

    pub fn tracker_points(
        &self,
        basket: BasketType,
        method_version: &str,
    ) -> anyhow::Result<Vec<TrackerIndexPoint>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRACKER_COLUMNS}, NULL, NULL FROM tracker_cpi_monthly
             WHERE basket_type=?1 AND method_version=?2
             ORDER BY year_month"
        ))?;
        let raw = stmt
            .query_map(params![basket.as_str(), method_version], tracker_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(|r| r.into_point(basket)).collect()
    }

    pub fn tracker_category_points(
        &self,
        basket: BasketType,
        method_version: &str,
    ) -> anyhow::Result<Vec<TrackerIndexPoint>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRACKER_COLUMNS}, category_slug, division_code FROM tracker_cpi_category_monthly
             WHERE basket_type=?1 AND method_version=?2
             ORDER BY category_slug, year_month"
        ))?;
        let raw = stmt
            .query_map(params![basket.as_str(), method_version], tracker_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(|r| r.into_point(basket)).collect()
    }

    pub fn tracker_series(
        &self,
        basket: BasketType,
        method_version: &str,
        from: Option<YearMonth>,
        to: Option<YearMonth>,
    ) -> anyhow::Result<Vec<SeriesPoint>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT year_month, index_value, mom_change FROM tracker_cpi_monthly
             WHERE basket_type=?1 AND method_version=?2
               AND (?3 IS NULL OR year_month >= ?3)
               AND (?4 IS NULL OR year_month <= ?4)
             ORDER BY year_month",
        )?;
        let raw = stmt
            .query_map(
                params![basket.as_str(), method_version, month_opt(from), month_opt(to)],
                series_raw,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(into_series_point).collect()
    }

    pub fn tracker_summary(
        &self,
        basket: BasketType,
        method_version: &str,
        from: Option<YearMonth>,
        to: Option<YearMonth>,
    ) -> anyhow::Result<TrackerSummary> {
        let conn = self.lock()?;
        let basket = basket.as_str();
        let (from, to) = (month_opt(from), month_opt(to));
        let window: [&dyn ToSql; 4] = [&basket, &method_version, &from, &to];
        let (general, min, max): (i64, Option<String>, Option<String>) = conn.query_row(
            "SELECT COUNT(*), MIN(year_month), MAX(year_month) FROM tracker_cpi_monthly
             WHERE basket_type=?1 AND method_version=?2
               AND (?3 IS NULL OR year_month >= ?3)
               AND (?4 IS NULL OR year_month <= ?4)",
            &window[..],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        let categories: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tracker_cpi_category_monthly
             WHERE basket_type=?1 AND method_version=?2
               AND (?3 IS NULL OR year_month >= ?3)
               AND (?4 IS NULL OR year_month <= ?4)",
            &window[..],
            |r| r.get(0),
        )?;
        Ok(TrackerSummary {
            general_rows: general as usize,
            category_rows: categories as usize,
            from_month: min.as_deref().map(parse_month).transpose()?,
            to_month: max.as_deref().map(parse_month).transpose()?,
        })
    }

    // runs
    pub fn create_run(&self, run: &PublicationRun) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO publication_runs({RUN_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            ),
            params![
                run.run_uuid,
                run.basket_type.as_str(),
                run.region,
                run.method_version,
                run.from_month.map(|m| m.to_string()),
                run.to_month.map(|m| m.to_string()),
                run.status.as_str(),
                run.official_source,
                run.official_rows as i64,
                run.tracker_rows as i64,
                run.tracker_category_rows as i64,
                run.overlap_months as i64,
                serde_json::to_string(&run.warnings)?,
                serde_json::to_string(&run.metrics)?,
                run.error_message,
                ts(&run.started_at),
                run.completed_at.as_ref().map(ts),
            ],
        )?;
        Ok(())
    }

    pub fn finalize_run(&self, run: &PublicationRun) -> anyhow::Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE publication_runs SET
               status=?2, official_source=?3, official_rows=?4, tracker_rows=?5,
               tracker_category_rows=?6, overlap_months=?7, warnings_json=?8, metrics_json=?9,
               error_message=?10, completed_at=?11
             WHERE run_uuid=?1",
            params![
                run.run_uuid,
                run.status.as_str(),
                run.official_source,
                run.official_rows as i64,
                run.tracker_rows as i64,
                run.tracker_category_rows as i64,
                run.overlap_months as i64,
                serde_json::to_string(&run.warnings)?,
                serde_json::to_string(&run.metrics)?,
                run.error_message,
                run.completed_at.as_ref().map(ts),
            ],
        )?;
        if updated == 0 {
            return Err(anyhow!("publication run {} not found", run.run_uuid));
        }
        Ok(())
    }

    pub fn get_run(&self, run_uuid: &str) -> anyhow::Result<Option<PublicationRun>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM publication_runs WHERE run_uuid=?1"),
                params![run_uuid],
                run_raw,
            )
            .optional()?;
        raw.map(RunRaw::into_run).transpose()
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> anyhow::Result<Vec<PublicationRun>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM publication_runs ORDER BY started_at DESC, rowid DESC LIMIT ?1"
        ))?;
        let raw = stmt
            .query_map(params![limit as i64], run_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RunRaw::into_run).collect()
    }
}

fn tracker_update_set(table: &str) -> String {
    format!(
        "status=CASE WHEN {table}.status = 'final' THEN 'final' ELSE excluded.status END,
         frozen_at=CASE WHEN {table}.status = 'final' THEN {table}.frozen_at ELSE excluded.frozen_at END,
         index_value=excluded.index_value,
         mom_change=excluded.mom_change,
         yoy_change=excluded.yoy_change,
         coverage_weight_pct=excluded.coverage_weight_pct,
         coverage_product_pct=excluded.coverage_product_pct,
         products_expected=excluded.products_expected,
         products_observed=excluded.products_observed,
         products_with_relative=excluded.products_with_relative,
         outlier_count=excluded.outlier_count,
         missing_products=excluded.missing_products,
         base_month=excluded.base_month,
         computed_at=excluded.computed_at"
    )
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp in database: {s:?}"))?
        .with_timezone(&Utc))
}

fn parse_month(s: &str) -> anyhow::Result<YearMonth> {
    s.parse()
        .map_err(|e| anyhow!("bad year_month in database: {}", e))
}

fn month_opt(m: Option<YearMonth>) -> Option<String> {
    m.map(|m| m.to_string())
}

type SeriesRaw = (String, Option<f64>, Option<f64>);

fn series_raw(r: &rusqlite::Row<'_>) -> rusqlite::Result<SeriesRaw> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?))
}

fn into_series_point((ym, index_value, mom_change): SeriesRaw) -> anyhow::Result<SeriesPoint> {
    Ok(SeriesPoint {
        year_month: parse_month(&ym)?,
        index_value,
        mom_change,
    })
}

struct OfficialRaw {
    source: String,
    region: String,
    metric_code: String,
    category_slug: Option<String>,
    year_month: String,
    index_value: f64,
    mom_change: Option<f64>,
    yoy_change: Option<f64>,
    status: String,
    is_fallback: bool,
    raw_snapshot_path: Option<String>,
    is_derived: bool,
}

fn official_raw(r: &rusqlite::Row<'_>) -> rusqlite::Result<OfficialRaw> {
    Ok(OfficialRaw {
        source: r.get(0)?,
        region: r.get(1)?,
        metric_code: r.get(2)?,
        category_slug: r.get(3)?,
        year_month: r.get(4)?,
        index_value: r.get(5)?,
        mom_change: r.get(6)?,
        yoy_change: r.get(7)?,
        status: r.get(8)?,
        is_fallback: r.get(9)?,
        raw_snapshot_path: r.get(10)?,
        is_derived: r.get(11)?,
    })
}

impl OfficialRaw {
    fn into_point(self) -> anyhow::Result<OfficialIndexPoint> {
        Ok(OfficialIndexPoint {
            metric_code: Slug::normalize(&self.metric_code)
                .ok_or_else(|| anyhow!("empty metric_code in database"))?,
            category_slug: self.category_slug.as_deref().and_then(Slug::normalize),
            year_month: parse_month(&self.year_month)?,
            source: self.source,
            region: self.region,
            index_value: self.index_value,
            mom_change: self.mom_change,
            yoy_change: self.yoy_change,
            status: self.status,
            is_fallback: self.is_fallback,
            is_derived: self.is_derived,
            raw_snapshot_path: self.raw_snapshot_path,
        })
    }
}

struct TrackerRaw {
    year_month: String,
    method_version: String,
    status: String,
    index_value: Option<f64>,
    mom_change: Option<f64>,
    yoy_change: Option<f64>,
    coverage_weight_pct: Option<f64>,
    coverage_product_pct: Option<f64>,
    counts: [i64; 5],
    base_month: Option<String>,
    frozen_at: Option<String>,
    category_slug: Option<String>,
    division_code: Option<String>,
}

fn tracker_raw(r: &rusqlite::Row<'_>) -> rusqlite::Result<TrackerRaw> {
    Ok(TrackerRaw {
        year_month: r.get(0)?,
        method_version: r.get(1)?,
        status: r.get(2)?,
        index_value: r.get(3)?,
        mom_change: r.get(4)?,
        yoy_change: r.get(5)?,
        coverage_weight_pct: r.get(6)?,
        coverage_product_pct: r.get(7)?,
        counts: [r.get(8)?, r.get(9)?, r.get(10)?, r.get(11)?, r.get(12)?],
        base_month: r.get(13)?,
        frozen_at: r.get(14)?,
        category_slug: r.get(15)?,
        division_code: r.get(16)?,
    })
}

impl TrackerRaw {
    fn into_point(self, basket_type: BasketType) -> anyhow::Result<TrackerIndexPoint> {
        let [expected, observed, with_relative, outliers, missing] = self.counts;
        Ok(TrackerIndexPoint {
            basket_type,
            year_month: parse_month(&self.year_month)?,
            method_version: self.method_version,
            category_slug: self.category_slug,
            division_code: self.division_code.as_deref().and_then(Slug::normalize),
            status: TrackerStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("unknown tracker status {:?}", self.status))?,
            index_value: self.index_value,
            mom_change: self.mom_change,
            yoy_change: self.yoy_change,
            coverage_weight_pct: self.coverage_weight_pct,
            coverage_product_pct: self.coverage_product_pct,
            products_expected: expected as usize,
            products_observed: observed as usize,
            products_with_relative: with_relative as usize,
            outlier_count: outliers as usize,
            missing_products: missing as usize,
            base_month: self.base_month.as_deref().map(parse_month).transpose()?,
            frozen_at: self.frozen_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

struct RunRaw {
    run_uuid: String,
    basket_type: String,
    region: String,
    method_version: String,
    from_month: Option<String>,
    to_month: Option<String>,
    status: String,
    official_source: Option<String>,
    counts: [i64; 4],
    warnings_json: String,
    metrics_json: String,
    error_message: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

fn run_raw(r: &rusqlite::Row<'_>) -> rusqlite::Result<RunRaw> {
    Ok(RunRaw {
        run_uuid: r.get(0)?,
        basket_type: r.get(1)?,
        region: r.get(2)?,
        method_version: r.get(3)?,
        from_month: r.get(4)?,
        to_month: r.get(5)?,
        status: r.get(6)?,
        official_source: r.get(7)?,
        counts: [r.get(8)?, r.get(9)?, r.get(10)?, r.get(11)?],
        warnings_json: r.get(12)?,
        metrics_json: r.get(13)?,
        error_message: r.get(14)?,
        started_at: r.get(15)?,
        completed_at: r.get(16)?,
    })
}

impl RunRaw {
    fn into_run(self) -> anyhow::Result<PublicationRun> {
        let [official_rows, tracker_rows, tracker_category_rows, overlap_months] = self.counts;
        Ok(PublicationRun {
            basket_type: self.basket_type.parse()?,
            status: RunStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("unknown run status {:?}", self.status))?,
            from_month: self.from_month.as_deref().map(parse_month).transpose()?,
            to_month: self.to_month.as_deref().map(parse_month).transpose()?,
            warnings: serde_json::from_str(&self.warnings_json)?,
            metrics: serde_json::from_str(&self.metrics_json)?,
            started_at: parse_ts(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_ts).transpose()?,
            run_uuid: self.run_uuid,
            region: self.region,
            method_version: self.method_version,
            official_source: self.official_source,
            official_rows: official_rows as usize,
            tracker_rows: tracker_rows as usize,
            tracker_category_rows: tracker_category_rows as usize,
            overlap_months: overlap_months as usize,
            error_message: self.error_message,
        })
    }
}

fn migrate_derived_flag(conn: &Connection) -> anyhow::Result<()> {
    let cols = get_columns(conn, "official_cpi_monthly")?;
    if !cols.contains("is_derived") {
        conn.execute(
            "ALTER TABLE official_cpi_monthly ADD COLUMN is_derived INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

fn get_columns(conn: &Connection, table: &str) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

