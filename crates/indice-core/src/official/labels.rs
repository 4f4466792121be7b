use crate::normalize::{normalize_text, Slug};

/// Maps a row label from an official table to a metric code.
///
/// `nivel general` becomes `general`; section headers, footers and the
/// `bienes y servicios` grouping yield `None`; everything else is slugged.
pub fn metric_code_from_label(raw: &str) -> Option<Slug> {
    let norm = normalize_text(raw);
    if norm.is_empty() || norm.starts_with("nivel general y divisiones") {
        return None;
    }
    if norm.starts_with("nivel general") {
        return Some(Slug::general());
    }
    if norm.starts_with("categorias")
        || norm.starts_with("fuente")
        || norm == "bienes y servicios"
        || norm == "bienes y servicios:"
    {
        return None;
    }
    Slug::normalize(raw)
}
