use super::rows::OfficialRow;
use crate::storage::Store;

/// Gives PDF rows an index level by chaining their monthly change off the
/// latest persisted point of the same series, or off a base of 100.
///
/// A prior point that was itself derived this way compounds rounding drift;
/// that is reported per series, not corrected. Published levels, including
/// fallback-file levels, are not flagged.
pub fn hydrate_pdf_rows(
    store: &Store,
    source: &str,
    mut rows: Vec<OfficialRow>,
    warnings: &mut Vec<String>,
) -> anyhow::Result<Vec<OfficialRow>> {
    if rows.is_empty() {
        return Ok(rows);
    }
    rows.sort_by(|a, b| {
        (&a.region, &a.metric_code, a.year_month).cmp(&(&b.region, &b.metric_code, b.year_month))
    });

    for row in rows.iter_mut() {
        let prior = store.latest_official_before(source, &row.region, &row.metric_code, row.year_month)?;
        if let Some(p) = prior.as_ref().filter(|p| p.is_derived) {
            warnings.push(format!(
                "series {}/{} chained off derived point {}; drift compounds",
                row.region, row.metric_code, p.year_month
            ));
        }
        let factor = row.mom_change.map_or(1.0, |mom| 1.0 + mom / 100.0);
        let base = prior.map_or(100.0, |p| p.index_value);
        row.index_value = Some(base * factor);
        row.yoy_change = None;
        row.status = "final".into();
    }

    warnings.push("PDF-only sync: index_value derived from stored history and/or base 100".into());
    Ok(rows)
}
