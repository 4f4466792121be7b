use crate::model::{BasketType, RawPriceObservation};
use crate::storage::Store;
use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::io::Read;

/// Read side of the scraped price store.
pub trait ObservationSource {
    /// Observations for `basket` (`All` = no filter) with `observed_at` in
    /// `[start, end)`; open bounds are unbounded.
    fn observations(
        &self,
        basket: BasketType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<RawPriceObservation>>;
}

impl ObservationSource for Store {
    fn observations(
        &self,
        basket: BasketType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<RawPriceObservation>> {
        self.query_observations(basket, start, end)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryObservations {
    rows: Vec<RawPriceObservation>,
}

impl InMemoryObservations {
    pub fn new(rows: Vec<RawPriceObservation>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: RawPriceObservation) {
        self.rows.push(row);
    }
}

impl ObservationSource for InMemoryObservations {
    fn observations(
        &self,
        basket: BasketType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<RawPriceObservation>> {
        Ok(self
            .rows
            .iter()
            .filter(|r| basket == BasketType::All || r.basket_id == basket.as_str())
            .filter(|r| start.map_or(true, |s| r.observed_at >= s))
            .filter(|r| end.map_or(true, |e| r.observed_at < e))
            .cloned()
            .collect())
    }
}

#[derive(Deserialize)]
struct CsvObservation {
    canonical_id: String,
    basket_id: String,
    #[serde(default)]
    category: Option<String>,
    price: f64,
    observed_at: String,
}

fn parse_observed_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Reads scraper exports: `canonical_id, basket_id, price, observed_at` plus an
/// optional `category`. `observed_at` is RFC 3339 or a bare `YYYY-MM-DD`.
pub fn read_observations_csv<R: Read>(reader: R) -> anyhow::Result<Vec<RawPriceObservation>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut out = Vec::new();
    for (i, record) in rdr.deserialize::<CsvObservation>().enumerate() {
        let line = i + 2;
        let row = record.with_context(|| format!("bad observation row at line {line}"))?;
        let observed_at = parse_observed_at(&row.observed_at)
            .ok_or_else(|| anyhow!("line {line}: unparseable observed_at {:?}", row.observed_at))?;
        out.push(RawPriceObservation {
            canonical_id: row.canonical_id,
            basket_id: row.basket_id.to_ascii_lowercase(),
            category: row.category.filter(|c| !c.is_empty()),
            price: row.price,
            observed_at,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn obs(basket: &str, day: u32) -> RawPriceObservation {
        RawPriceObservation {
            canonical_id: "p1".into(),
            basket_id: basket.into(),
            category: None,
            price: 10.0,
            observed_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn in_memory_and_sqlite_filter_alike() -> anyhow::Result<()> {
        let rows = vec![obs("cba", 1), obs("extended", 2), obs("cba", 31)];
        let mem = InMemoryObservations::new(rows.clone());
        let store = Store::memory()?;
        store.init_schema()?;
        store.insert_observations(&rows)?;

        let start = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let end = Some(Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap());
        for source in [&mem as &dyn ObservationSource, &store] {
            assert_eq!(source.observations(BasketType::Cba, start, end)?.len(), 1);
            assert_eq!(source.observations(BasketType::All, start, end)?.len(), 2);
            assert_eq!(source.observations(BasketType::All, None, None)?.len(), 3);
        }
        Ok(())
    }

    #[test]
    fn reads_csv_exports() -> anyhow::Result<()> {
        let text = "canonical_id,basket_id,category,price,observed_at\n\
                    p1,CBA,lacteos,100.5,2024-01-03T10:00:00Z\n\
                    p2,cba,,50,2024-01-04\n";
        let rows = read_observations_csv(text.as_bytes())?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].basket_id, "cba");
        assert_eq!(rows[0].category.as_deref(), Some("lacteos"));
        assert_eq!(rows[1].category, None);
        assert_eq!(rows[1].observed_at, Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap());

        let bad = "canonical_id,basket_id,price,observed_at\np1,cba,1,yesterday\n";
        assert!(read_observations_csv(bad.as_bytes()).is_err());
        Ok(())
    }
}
