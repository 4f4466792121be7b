use crate::config::OfficialConfig;
use crate::normalize::{normalize_region, REGION_ALL};
use std::collections::BTreeSet;

/// Regions a sync targets. `all` (or no request) expands to the configured
/// scope, sorted and deduplicated; anything else is normalized and used as is.
pub fn resolve_regions(cfg: &OfficialConfig, requested: Option<&str>) -> Vec<String> {
    let requested = normalize_region(requested.unwrap_or(REGION_ALL));
    if requested != REGION_ALL {
        return vec![requested];
    }

    let mut scope: BTreeSet<String> = cfg
        .region_scope
        .iter()
        .filter(|r| !r.trim().is_empty())
        .map(|r| normalize_region(r))
        .filter(|r| r != REGION_ALL)
        .collect();
    if scope.is_empty() && cfg.region_scope.is_empty() {
        scope.insert(normalize_region(&cfg.region_default));
        scope.remove(REGION_ALL);
    }
    if scope.is_empty() {
        scope.extend(["nacional".to_string(), "patagonia".to_string()]);
    }
    scope.into_iter().collect()
}
