use super::fetch::DocumentFetcher;
use crate::errors::SourceError;
use crate::normalize::normalize_text;
use crate::snapshot::SnapshotStore;
use regex::Regex;
use reqwest::Url;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

const PDF_LINK: &str = r#"(?i)href=["'](/uploads/informesdeprensa/ipc_[^"']+\.pdf)["']"#;
const XLS_LINK: &str = r#"(?i)href=["'](/ftp/cuadros/economia/sh_ipc_[^"']+\.(?:xls|xlsx))["']"#;
const XLS_PERIOD: &str = r"(?i)/sh_ipc_(\d{2})_(\d{2})\.(?:xls|xlsx)$";

static PDF_LINK_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
static XLS_LINK_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
static XLS_PERIOD_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn pattern(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    source: &str,
) -> Result<&'static Regex, SourceError> {
    super::cached_regex(cell, source)
        .map_err(|e| SourceError::Discovery(format!("bad link pattern: {e}")))
}

/// Documents found on the discovery page.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredAssets {
    pub discovery_url: String,
    pub html_snapshot_path: Option<PathBuf>,
    pub pdf_url: Option<String>,
    pub xls_url: Option<String>,
}

pub fn discover(
    fetcher: &dyn DocumentFetcher,
    snapshots: &SnapshotStore,
    discovery_url: &str,
    timeout: Duration,
) -> Result<DiscoveredAssets, SourceError> {
    let html = fetcher.get_text(discovery_url, timeout)?;
    let html_snapshot_path = snapshots
        .persist_text("indec_discovery", "html", &html)
        .map_err(|e| SourceError::Discovery(format!("failed to persist discovery page: {e}")))?;

    let (pdf_links, xls_links) = extract_links(&html)?;
    if pdf_links.is_empty() && xls_links.is_empty() {
        return Err(SourceError::Discovery(
            "no PDF or spreadsheet links on the discovery page".into(),
        ));
    }

    let pdf_url = pdf_links
        .first()
        .map(|href| join_url(discovery_url, href))
        .transpose()?;
    let xls_url = select_monthly_xls_link(&xls_links)?
        .map(|href| join_url(discovery_url, &href))
        .transpose()?;

    tracing::info!(
        event = "official.discovery",
        url = %discovery_url,
        pdf = ?pdf_url,
        xls = ?xls_url,
        "discovered official documents"
    );
    Ok(DiscoveredAssets {
        discovery_url: discovery_url.to_string(),
        html_snapshot_path: Some(html_snapshot_path),
        pdf_url,
        xls_url,
    })
}

/// Deduplicated `(pdf, spreadsheet)` hrefs in page order.
pub fn extract_links(html: &str) -> Result<(Vec<String>, Vec<String>), SourceError> {
    let collect = |re: &Regex| -> Vec<String> {
        let mut seen = BTreeSet::new();
        re.captures_iter(html)
            .map(|c| c[1].to_string())
            .filter(|href| seen.insert(href.clone()))
            .collect()
    };
    Ok((
        collect(pattern(&PDF_LINK_RE, PDF_LINK)?),
        collect(pattern(&XLS_LINK_RE, XLS_LINK)?),
    ))
}

/// Prefers the most recent `sh_ipc_MM_YY` file, then any non-auxiliary file,
/// then the first candidate.
pub fn select_monthly_xls_link(candidates: &[String]) -> Result<Option<String>, SourceError> {
    let Some(first) = candidates.first() else {
        return Ok(None);
    };
    let period = pattern(&XLS_PERIOD_RE, XLS_PERIOD)?;

    let dated = candidates
        .iter()
        .filter_map(|href| {
            let caps = period.captures(href)?;
            let month: u32 = caps[1].parse().ok()?;
            let year: u32 = 2000 + caps[2].parse::<u32>().ok()?;
            Some((year, month, href))
        })
        .max_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    if let Some((_, _, href)) = dated {
        return Ok(Some(href.clone()));
    }

    Ok(candidates
        .iter()
        .find(|href| {
            let name = normalize_text(href.rsplit('/').next().unwrap_or(href));
            !name.contains("aperturas") && !name.contains("precios_promedio")
        })
        .or(Some(first))
        .cloned())
}

fn join_url(base: &str, href: &str) -> Result<String, SourceError> {
    let base = Url::parse(base)
        .map_err(|e| SourceError::Discovery(format!("bad discovery url {base:?}: {e}")))?;
    base.join(href)
        .map(|u| u.to_string())
        .map_err(|e| SourceError::Discovery(format!("bad link {href:?}: {e}")))
}
