//! Official spreadsheet (`sh_ipc_*.xls`) parsing.
//!
//! The workbook carries one sheet per measure. Each sheet stacks one block per
//! region: a marker row in the first column whose other cells are the month
//! headers, a `nivel general y divisiones` section marker, then label rows
//! until the `categorias` section starts.

use super::labels::metric_code_from_label;
use super::rows::{merge_parsed, OfficialRow, ParsedRow, ParsedValue};
use crate::errors::SourceError;
use crate::month::YearMonth;
use crate::normalize::{normalize_text, parse_numeric};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;

const MONTHLY_SHEET: &str = "variacion mensual ipc nacional";
const YEARLY_SHEET: &str = "interanual ipc nacional";
const INDEX_SHEET: &str = "indices ipc cobertura nacional";
const SECTION_SCAN_ROWS: usize = 15;

static EMPTY: Cell = Cell::Empty;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Date(YearMonth),
}

impl Cell {
    fn text(&self) -> String {
        match self {
            Cell::Text(s) => normalize_text(s),
            Cell::Number(v) => v.to_string(),
            Cell::Empty | Cell::Date(_) => String::new(),
        }
    }

    fn raw_label(&self) -> &str {
        match self {
            Cell::Text(s) => s,
            _ => "",
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) if v.is_finite() => Some(*v),
            Cell::Text(s) => parse_numeric(s),
            _ => None,
        }
    }

    fn month(&self) -> Option<YearMonth> {
        match self {
            Cell::Date(ym) => Some(*ym),
            Cell::Text(s) => YearMonth::parse_loose(s),
            _ => None,
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Int(v) => Cell::Number(*v as f64),
            Data::Float(v) => Cell::Number(*v),
            Data::String(s) if s.trim().is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::DateTime(dt) => dt
                .as_datetime()
                .map(|d| Cell::Date(YearMonth::from_date(d.date())))
                .unwrap_or(Cell::Empty),
            Data::DateTimeIso(s) => YearMonth::parse_loose(s)
                .map(Cell::Date)
                .unwrap_or(Cell::Empty),
            Data::Bool(_) | Data::DurationIso(_) | Data::Error(_) | Data::Empty => Cell::Empty,
        }
    }
}

/// Sheet contents as a dense row-major grid anchored at `A1`.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    fn from_range(range: &calamine::Range<Data>) -> Self {
        let (row_off, col_off) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));
        let mut rows: Vec<Vec<Cell>> = (0..row_off).map(|_| Vec::new()).collect();
        for row in range.rows() {
            let mut cells: Vec<Cell> = (0..col_off).map(|_| Cell::Empty).collect();
            cells.extend(row.iter().map(Cell::from));
            rows.push(cells);
        }
        Self { rows }
    }

    fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    fn label(&self, row: usize) -> String {
        self.cell(row, 0).text()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

fn region_marker(label: &str) -> Option<&'static str> {
    if label.starts_with("total nacional") {
        Some("nacional")
    } else if label.contains("region patagonia") {
        Some("patagonia")
    } else {
        None
    }
}

/// Long-format values of one measure sheet.
pub fn parse_sheet(grid: &Grid, value: fn(f64) -> ParsedValue) -> Vec<ParsedRow> {
    let markers: Vec<(usize, &'static str)> = (0..grid.len())
        .filter_map(|idx| region_marker(&grid.label(idx)).map(|region| (idx, region)))
        .collect();

    let mut out = Vec::new();
    for (pos, &(start, region)) in markers.iter().enumerate() {
        let end = markers.get(pos + 1).map_or(grid.len(), |m| m.0);

        let month_cols: Vec<(usize, YearMonth)> = grid
            .rows
            .get(start)
            .map(|header| {
                (1..header.len())
                    .filter_map(|col| header[col].month().map(|ym| (col, ym)))
                    .collect()
            })
            .unwrap_or_default();
        if month_cols.is_empty() {
            continue;
        }

        let scan_end = (start + SECTION_SCAN_ROWS).min(end);
        let Some(section) = (start + 1..scan_end)
            .find(|&idx| grid.label(idx).contains("nivel general y divisiones coicop"))
        else {
            continue;
        };

        for idx in section + 1..end {
            let label = grid.label(idx);
            if label.is_empty() {
                continue;
            }
            if label.starts_with("categorias") {
                break;
            }
            let Some(metric_code) = metric_code_from_label(grid.cell(idx, 0).raw_label()) else {
                continue;
            };
            for &(col, year_month) in &month_cols {
                if let Some(v) = grid.cell(idx, col).number() {
                    out.push(ParsedRow {
                        region: region.to_string(),
                        year_month,
                        metric_code: metric_code.clone(),
                        value: value(v),
                    });
                }
            }
        }
    }
    out
}

/// Joins the three measure sheets. Index levels go first so they win ties.
pub fn parse_grids(monthly: &Grid, yearly: &Grid, index: &Grid) -> Vec<OfficialRow> {
    let mut parsed = parse_sheet(index, ParsedValue::IndexLevel);
    parsed.extend(parse_sheet(monthly, ParsedValue::MonthlyChange));
    parsed.extend(parse_sheet(yearly, ParsedValue::YearlyChange));
    merge_parsed(parsed, "final")
}

/// Accent-insensitive substring match on sheet names.
pub fn find_sheet<'a>(names: &'a [String], needle: &str) -> Option<&'a str> {
    let needle = normalize_text(needle);
    names
        .iter()
        .find(|name| normalize_text(name).contains(&needle))
        .map(String::as_str)
}

pub fn parse_workbook(blob: &[u8]) -> Result<Vec<OfficialRow>, SourceError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(blob.to_vec()))
        .map_err(|e| SourceError::parse(format!("unreadable workbook: {e}")))?;
    let names = workbook.sheet_names();

    let mut grid_for = |needle: &str| -> Result<Grid, SourceError> {
        let name = find_sheet(&names, needle)
            .ok_or_else(|| SourceError::parse(format!("missing sheet matching {needle:?}")))?
            .to_string();
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| SourceError::parse(format!("unreadable sheet {name:?}: {e}")))?;
        Ok(Grid::from_range(&range))
    };
    let monthly = grid_for(MONTHLY_SHEET)?;
    let yearly = grid_for(YEARLY_SHEET)?;
    let index = grid_for(INDEX_SHEET)?;

    Ok(parse_grids(&monthly, &yearly, &index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Cell {
        Cell::Text(s.into())
    }

    fn n(v: f64) -> Cell {
        Cell::Number(v)
    }

    fn d(s: &str) -> Cell {
        Cell::Date(s.parse().unwrap())
    }

    fn sheet(values: [[f64; 2]; 2]) -> Grid {
        Grid::new(vec![
            vec![t("Cuadro 1")],
            vec![t("Total nacional"), d("2024-01"), d("2024-02")],
            vec![t("Nivel general y divisiones COICOP")],
            vec![Cell::Empty],
            vec![t("Nivel general"), n(values[0][0]), n(values[0][1])],
            vec![t("Alimentos y bebidas no alcohólicas"), n(values[1][0]), t("–")],
            vec![t("Categorías")],
            vec![t("Estacional"), n(1.0), n(1.0)],
            vec![t("Región Patagonia"), t("2024-01"), t("2024-02")],
            vec![t("Nivel general y divisiones COICOP")],
            vec![t("Nivel general"), n(values[0][0] + 1.0), n(values[0][1] + 1.0)],
        ])
    }

    #[test]
    fn parses_region_blocks_until_sentinel() {
        let rows = parse_sheet(&sheet([[20.5, 13.5], [18.0, 0.0]]), ParsedValue::MonthlyChange);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.metric_code.as_str() != "estacional"));
        let food: Vec<_> = rows
            .iter()
            .filter(|r| r.metric_code.as_str() == "alimentos_y_bebidas_no_alcoholicas")
            .collect();
        assert_eq!(food.len(), 1);
        assert_eq!(food[0].value, ParsedValue::MonthlyChange(18.0));

        let patagonia: Vec<_> = rows.iter().filter(|r| r.region == "patagonia").collect();
        assert_eq!(patagonia.len(), 2);
        assert_eq!(patagonia[1].value, ParsedValue::MonthlyChange(14.5));
    }

    #[test]
    fn joins_three_measures() {
        let rows = parse_grids(
            &sheet([[20.6, 13.2], [18.0, 0.0]]),
            &sheet([[254.2, 276.2], [251.3, 0.0]]),
            &sheet([[4149.8, 4697.6], [4000.0, 0.0]]),
        );
        let general = rows
            .iter()
            .find(|r| r.region == "nacional" && r.metric_code.is_general() && r.year_month.month() == 2)
            .unwrap();
        assert_eq!(general.index_value, Some(4697.6));
        assert_eq!(general.mom_change, Some(13.2));
        assert_eq!(general.yoy_change, Some(276.2));
        assert_eq!(general.status, "final");
        assert_eq!(general.category_slug, None);
    }

    #[test]
    fn block_without_section_marker_is_skipped() {
        let grid = Grid::new(vec![
            vec![t("Total nacional"), d("2024-01")],
            vec![t("Nivel general"), n(1.0)],
        ]);
        assert!(parse_sheet(&grid, ParsedValue::IndexLevel).is_empty());
    }

    #[test]
    fn finds_sheets_ignoring_accents() {
        let names = vec![
            "Índices IPC Cobertura Nacional".to_string(),
            "Variación mensual IPC Nacional".to_string(),
        ];
        assert_eq!(find_sheet(&names, MONTHLY_SHEET), Some("Variación mensual IPC Nacional"));
        assert_eq!(find_sheet(&names, INDEX_SHEET), Some("Índices IPC Cobertura Nacional"));
        assert_eq!(find_sheet(&names, YEARLY_SHEET), None);
    }

    #[test]
    fn garbage_workbook_is_parse_error() {
        let err = parse_workbook(b"not a workbook").unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }
}
