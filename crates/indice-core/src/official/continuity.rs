use super::rows::OfficialRow;
use crate::month::YearMonth;
use std::collections::{BTreeMap, BTreeSet};

const GAP_SAMPLE: usize = 6;

/// Non-fatal checks on a normalized row set: emptiness, duplicate keys and
/// monthly gaps per `(region, metric_code)` series.
pub fn validate_continuity(rows: &[OfficialRow]) -> Vec<String> {
    if rows.is_empty() {
        return vec!["no official rows received for sync".to_string()];
    }
    let mut warnings = Vec::new();

    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for row in rows {
        if !seen.insert(row.key()) {
            duplicates.insert(row.key());
        }
    }
    if !duplicates.is_empty() {
        let listed: Vec<String> = duplicates
            .iter()
            .map(|(region, ym, metric)| format!("{region}:{ym}:{metric}"))
            .collect();
        warnings.push(format!(
            "duplicate region/month/series rows: {}",
            listed.join(", ")
        ));
    }

    let mut series: BTreeMap<(&str, &str), BTreeSet<YearMonth>> = BTreeMap::new();
    for row in rows {
        series
            .entry((row.region.as_str(), row.metric_code.as_str()))
            .or_default()
            .insert(row.year_month);
    }
    for ((region, metric), months) in series {
        let (Some(&first), Some(&last)) = (months.first(), months.last()) else {
            continue;
        };
        let missing: Vec<String> = YearMonth::range_inclusive(first, last)
            .into_iter()
            .filter(|m| !months.contains(m))
            .map(|m| m.to_string())
            .collect();
        if missing.is_empty() {
            continue;
        }
        let suffix = if missing.len() > GAP_SAMPLE { "..." } else { "" };
        let sample = missing[..missing.len().min(GAP_SAMPLE)].join(", ");
        warnings.push(format!(
            "series {region}/{metric} has monthly gaps: {sample}{suffix}"
        ));
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Slug;

    fn row(region: &str, ym: &str, metric: &str) -> OfficialRow {
        OfficialRow {
            region: region.into(),
            year_month: ym.parse().unwrap(),
            metric_code: Slug::normalize(metric).unwrap(),
            category_slug: None,
            index_value: Some(100.0),
            mom_change: None,
            yoy_change: None,
            status: "final".into(),
        }
    }

    #[test]
    fn empty_input_warns() {
        assert_eq!(validate_continuity(&[]).len(), 1);
    }

    #[test]
    fn contiguous_series_is_clean() {
        let rows = vec![
            row("patagonia", "2023-12", "general"),
            row("patagonia", "2024-01", "general"),
            row("nacional", "2024-01", "general"),
        ];
        assert!(validate_continuity(&rows).is_empty());
    }

    #[test]
    fn reports_duplicates_and_gaps() {
        let mut rows = vec![
            row("patagonia", "2024-01", "general"),
            row("patagonia", "2024-01", "general"),
            row("patagonia", "2024-09", "general"),
        ];
        rows.push(row("nacional", "2024-01", "vivienda"));
        rows.push(row("nacional", "2024-03", "vivienda"));

        let warnings = validate_continuity(&rows);
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("patagonia:2024-01:general"));
        assert!(warnings.iter().any(|w| w.ends_with("nacional/vivienda has monthly gaps: 2024-02")));
        assert!(warnings.iter().any(|w| w.contains(
            "patagonia/general has monthly gaps: 2024-02, 2024-03, 2024-04, 2024-05, 2024-06, 2024-07..."
        )));
    }
}
