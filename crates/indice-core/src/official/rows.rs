use crate::month::YearMonth;
use crate::normalize::Slug;
use serde::Serialize;
use std::collections::BTreeMap;

/// One figure read from an official document, before merging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedValue {
    IndexLevel(f64),
    MonthlyChange(f64),
    YearlyChange(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub region: String,
    pub year_month: YearMonth,
    pub metric_code: Slug,
    pub value: ParsedValue,
}

/// Normalized official row keyed by `(region, year_month, metric_code)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfficialRow {
    pub region: String,
    pub year_month: YearMonth,
    pub metric_code: Slug,
    pub category_slug: Option<Slug>,
    pub index_value: Option<f64>,
    pub mom_change: Option<f64>,
    pub yoy_change: Option<f64>,
    pub status: String,
}

impl OfficialRow {
    pub fn key(&self) -> (&str, YearMonth, &Slug) {
        (&self.region, self.year_month, &self.metric_code)
    }
}

/// Outer-joins parsed figures on `(region, year_month, metric_code)`; the
/// first value seen for a field wins. Output is sorted by key.
pub fn merge_parsed(rows: impl IntoIterator<Item = ParsedRow>, status: &str) -> Vec<OfficialRow> {
    let mut merged: BTreeMap<(String, YearMonth, Slug), OfficialRow> = BTreeMap::new();
    for row in rows {
        let key = (row.region.clone(), row.year_month, row.metric_code.clone());
        let entry = merged.entry(key).or_insert_with(|| OfficialRow {
            category_slug: (!row.metric_code.is_general()).then(|| row.metric_code.clone()),
            region: row.region,
            year_month: row.year_month,
            metric_code: row.metric_code,
            index_value: None,
            mom_change: None,
            yoy_change: None,
            status: status.to_string(),
        });
        let slot = match row.value {
            ParsedValue::IndexLevel(v) => (&mut entry.index_value, v),
            ParsedValue::MonthlyChange(v) => (&mut entry.mom_change, v),
            ParsedValue::YearlyChange(v) => (&mut entry.yoy_change, v),
        };
        if slot.0.is_none() {
            *slot.0 = Some(slot.1);
        }
    }
    merged.into_values().collect()
}
