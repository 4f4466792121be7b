//! Monthly press-release PDF parsing.
//!
//! Text extraction loses table geometry, so tables are rebuilt line by line:
//! a line naming several regions and no figures becomes a header row with one
//! column per region; any other line becomes a label followed by its trailing
//! numeric cells. Only monthly changes are published in the release.

use super::labels::metric_code_from_label;
use super::rows::{merge_parsed, OfficialRow, ParsedRow, ParsedValue};
use crate::errors::SourceError;
use crate::month::YearMonth;
use crate::normalize::{normalize_text, parse_numeric};
use regex::Regex;
use std::sync::OnceLock;

const REGION_COLUMNS: [&str; 7] = [
    "nacional",
    "gba",
    "pampeana",
    "noreste",
    "noroeste",
    "cuyo",
    "patagonia",
];
const PLACEHOLDERS: [&str; 5] = ["-", "–", "—", "///", "s/d"];
const PREVIEW_ROWS: usize = 5;
const SAMPLE_ROWS: usize = 12;
const SPANISH_MONTH: &str = r"\b(enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|setiembre|octubre|noviembre|diciembre)\s+de\s+(\d{4})\b";

type Row = Vec<String>;

static SPANISH_MONTH_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// `<month> de <year>` in Spanish, accent- and case-insensitive.
pub fn extract_year_month(text: &str) -> Result<Option<YearMonth>, SourceError> {
    let re = super::cached_regex(&SPANISH_MONTH_RE, SPANISH_MONTH)
        .map_err(|e| SourceError::parse(format!("bad month pattern: {e}")))?;
    let normalized = normalize_text(text);
    Ok(re.captures(&normalized).and_then(|caps| month_from_captures(&caps)))
}

fn month_from_captures(caps: &regex::Captures<'_>) -> Option<YearMonth> {
    let month = match &caps[1] {
        "enero" => 1,
        "febrero" => 2,
        "marzo" => 3,
        "abril" => 4,
        "mayo" => 5,
        "junio" => 6,
        "julio" => 7,
        "agosto" => 8,
        "septiembre" | "setiembre" => 9,
        "octubre" => 10,
        "noviembre" => 11,
        "diciembre" => 12,
        _ => return None,
    };
    YearMonth::new(caps[2].parse().ok()?, month)
}

fn is_cell_token(token: &str) -> bool {
    PLACEHOLDERS.contains(&token)
        || (parse_numeric(token).is_some() && token.chars().any(|c| c.is_ascii_digit()))
}

fn header_row(line: &str) -> Option<Row> {
    let norm = normalize_text(line);
    if norm.split_whitespace().any(is_cell_token) {
        return None;
    }
    let mut found: Vec<(usize, &str)> = REGION_COLUMNS
        .iter()
        .filter_map(|name| norm.find(name).map(|pos| (pos, *name)))
        .collect();
    if found.len() < 2 {
        return None;
    }
    found.sort();
    let mut row = vec![String::new()];
    row.extend(found.into_iter().map(|(_, name)| name.to_string()));
    Some(row)
}

fn data_row(line: &str) -> Row {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let label_len = tokens
        .iter()
        .rposition(|t| !is_cell_token(t))
        .map_or(0, |i| i + 1);
    let mut row = vec![tokens[..label_len].join(" ")];
    row.extend(tokens[label_len..].iter().map(|t| t.to_string()));
    row
}

/// Rows of one page. The table starts at the first region header line.
pub fn table_from_text(page_text: &str) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut started = false;
    for line in page_text.lines().filter(|l| !l.trim().is_empty()) {
        if let Some(header) = header_row(line) {
            if !started {
                started = true;
                rows.push(header);
                continue;
            }
        }
        if started {
            rows.push(data_row(line));
        }
    }
    rows
}

struct Located {
    data_start: usize,
    nacional: usize,
    patagonia: usize,
}

fn cell(row: &[String], idx: usize) -> Option<f64> {
    row.get(idx).and_then(|c| parse_numeric(c))
}

fn locate(table: &[Row]) -> Option<Located> {
    let preview: Vec<Vec<String>> = table
        .iter()
        .take(PREVIEW_ROWS)
        .map(|row| row.iter().map(|c| normalize_text(c)).collect())
        .collect();

    let mut nacional = None;
    let mut patagonia = None;
    for (r, row) in preview.iter().enumerate() {
        for (c, text) in row.iter().enumerate() {
            if nacional.is_none() && text.contains("nacional") {
                nacional = Some((r, c));
            }
            if patagonia.is_none() && text.contains("patagonia") {
                patagonia = Some((r, c));
            }
        }
    }
    let ((nac_row, nacional), (pat_row, patagonia)) = (nacional?, patagonia?);

    let data_start = preview
        .iter()
        .position(|row| row.iter().any(|c| c.contains("porcentaje")))
        .map_or(nac_row.max(pat_row) + 1, |r| r + 1);

    let plausible = table.iter().skip(data_start).take(SAMPLE_ROWS).any(|row| {
        let label = row.first().map(|l| normalize_text(l)).unwrap_or_default();
        (label.contains("nivel general") || label.contains("alimentos y bebidas"))
            && (cell(row, nacional).is_some() || cell(row, patagonia).is_some())
    });
    plausible.then_some(Located {
        data_start,
        nacional,
        patagonia,
    })
}

/// Parses page texts into `mom_change`-only rows for `nacional` and `patagonia`.
pub fn parse_pdf_pages(pages: &[String]) -> Result<Vec<OfficialRow>, SourceError> {
    let lead = pages.iter().take(2).cloned().collect::<Vec<_>>().join("\n");
    let mut year_month = extract_year_month(&lead)?;

    let mut selected = None;
    for page in pages {
        let table = table_from_text(page);
        if let Some(located) = locate(&table) {
            if year_month.is_none() {
                year_month = extract_year_month(page)?;
            }
            selected = Some((table, located));
            break;
        }
    }

    let year_month = year_month
        .ok_or_else(|| SourceError::parse("no reference month found in PDF text"))?;
    let (table, located) = selected
        .ok_or_else(|| SourceError::parse("no nacional/patagonia table found in PDF"))?;

    let mut parsed = Vec::new();
    for row in &table[located.data_start.min(table.len())..] {
        let Some(raw_label) = row.first() else {
            continue;
        };
        let label = normalize_text(raw_label);
        if label.is_empty() || label.starts_with("porcentaje") || label.contains("nivel general y divisiones") {
            continue;
        }
        if label.starts_with("fuente") {
            break;
        }
        let Some(metric_code) = metric_code_from_label(raw_label) else {
            continue;
        };
        for (region, col) in [("nacional", located.nacional), ("patagonia", located.patagonia)] {
            if let Some(v) = cell(row, col) {
                parsed.push(ParsedRow {
                    region: region.to_string(),
                    year_month,
                    metric_code: metric_code.clone(),
                    value: ParsedValue::MonthlyChange(v),
                });
            }
        }
    }
    Ok(merge_parsed(parsed, "final"))
}

pub fn parse_pdf(blob: &[u8]) -> Result<Vec<OfficialRow>, SourceError> {
    let doc = lopdf::Document::load_mem(blob)
        .map_err(|e| SourceError::parse(format!("unreadable PDF: {e}")))?;
    let pages = doc
        .get_pages()
        .keys()
        .map(|&number| doc.extract_text(&[number]).unwrap_or_default())
        .collect::<Vec<_>>();
    if pages.iter().all(|p| p.trim().is_empty()) {
        return Err(SourceError::parse("PDF has no extractable text"));
    }
    parse_pdf_pages(&pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "\
Índice de precios al consumidor
Cuadro 2. Variación porcentual respecto del mes anterior
Total nacional GBA Pampeana Noreste Noroeste Cuyo Patagonia
Porcentaje
Nivel general 2,7 2,6 2,8 2,9 2,5 2,7 2,4
Alimentos y bebidas no alcohólicas 2,2 2,0 2,4 2,3 2,1 2,2 −0,5
Bebidas alcohólicas y tabaco 3,1 3,0 /// 3,2 3,3 3,1 -
Fuente: INDEC
Vivienda 9,9 9,9 9,9 9,9 9,9 9,9 9,9
";

    #[test]
    fn extracts_spanish_month() {
        assert_eq!(
            extract_year_month("Buenos Aires, Setiembre de 2024").unwrap(),
            YearMonth::new(2024, 9)
        );
        assert_eq!(extract_year_month("Informe de FEBRERO DE 2025").unwrap(), YearMonth::new(2025, 2));
        assert_eq!(extract_year_month("sin fecha").unwrap(), None);
    }

    #[test]
    fn rebuilds_table_from_lines() {
        let table = table_from_text(PAGE);
        assert_eq!(table[0][1], "nacional");
        assert_eq!(table[0][7], "patagonia");
        assert_eq!(table[2][0], "Nivel general");
        assert_eq!(table[2].len(), 8);
        assert_eq!(table[4][3], "///");
        assert_eq!(table[4][4], "3,2");
    }

    #[test]
    fn parses_nacional_and_patagonia_columns() {
        let pages = vec!["Informe técnico. Marzo de 2024".to_string(), PAGE.to_string()];
        let rows = parse_pdf_pages(&pages).unwrap();
        let find = |region: &str, metric: &str| {
            rows.iter()
                .find(|r| r.region == region && r.metric_code.as_str() == metric)
                .and_then(|r| r.mom_change)
        };
        assert_eq!(find("nacional", "general"), Some(2.7));
        assert_eq!(find("patagonia", "general"), Some(2.4));
        assert_eq!(find("patagonia", "alimentos_y_bebidas_no_alcoholicas"), Some(-0.5));
        assert_eq!(find("nacional", "bebidas_alcoholicas_y_tabaco"), Some(3.1));
        assert_eq!(find("patagonia", "bebidas_alcoholicas_y_tabaco"), None);
        assert_eq!(find("nacional", "vivienda"), None);
        assert!(rows.iter().all(|r| r.year_month == YearMonth::new(2024, 3).unwrap()));
        assert!(rows.iter().all(|r| r.index_value.is_none()));
    }

    #[test]
    fn month_from_table_page_when_lead_pages_lack_it() {
        let pages = vec![
            "portada".to_string(),
            "indice".to_string(),
            format!("Marzo de 2024\n{PAGE}"),
        ];
        let rows = parse_pdf_pages(&pages).unwrap();
        assert!(!rows.is_empty());
    }

    #[test]
    fn missing_table_is_parse_error() {
        let pages = vec!["Marzo de 2024\nNivel general 2,7".to_string()];
        assert!(matches!(parse_pdf_pages(&pages), Err(SourceError::Parse(_))));
    }
}
