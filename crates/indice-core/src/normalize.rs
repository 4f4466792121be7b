//! Text and number normalization shared by every parser.
//!
//! All label matching goes through [`normalize_text`] and all identifiers
//! through [`Slug::normalize`], so accents, case and spacing never decide
//! whether two upstream labels are the same thing.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase, strip diacritics (NFD + drop combining marks), collapse whitespace.
pub fn normalize_text(raw: &str) -> String {
    let stripped: String = raw
        .trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identifier derived from a free-text label: `[a-z0-9]+` runs joined by `_`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Returns `None` when nothing alphanumeric survives normalization.
    pub fn normalize(raw: &str) -> Option<Slug> {
        let text = normalize_text(raw);
        let mut out = String::with_capacity(text.len());
        let mut pending_sep = false;
        for c in text.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_sep && !out.is_empty() {
                    out.push('_');
                }
                pending_sep = false;
                out.push(c);
            } else {
                pending_sep = true;
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(Slug(out))
        }
    }

    pub fn general() -> Slug {
        Slug(GENERAL_METRIC.to_string())
    }

    pub fn is_general(&self) -> bool {
        self.0 == GENERAL_METRIC
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub const GENERAL_METRIC: &str = "general";

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Slug::normalize(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("empty identifier: {raw:?}")))
    }
}

/// Tolerant numeric parse for published figures: `2,7%`, `−0,4`, `1 234.5`
/// (with NBSP) all parse; blanks and bare signs do not.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let txt = raw.trim();
    if txt.is_empty() {
        return None;
    }
    let cleaned: String = txt
        .replace('\u{2212}', "-")
        .replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if matches!(cleaned.as_str(), "" | "-" | "." | "-.") {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Maps free-form region labels onto stored region codes. `all` is a request
/// scope, not a stored region.
pub fn normalize_region(raw: &str) -> String {
    let txt = normalize_text(raw);
    if txt.contains("patagonia") {
        return "patagonia".into();
    }
    if txt.contains("nacional") {
        return "nacional".into();
    }
    if matches!(txt.as_str(), "all" | "todas" | "*") {
        return REGION_ALL.into();
    }
    if txt.is_empty() {
        return "patagonia".into();
    }
    txt
}

pub const REGION_ALL: &str = "all";
