use crate::IcwError;
use std::path::{Path, PathBuf};

/// Largest number of columns a spreadsheet-style output accepts.
pub const SPREADSHEET_MAX_COLUMNS: usize = 16_000;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Integer(i64),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Plain-text rendering, empty for [`Cell::Empty`].
    pub fn render(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Integer(i) => i.to_string(),
        }
    }
}

/// Inclusive block of cells. Row 0 is the header row, column 0 the first column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: usize,
    pub first_col: usize,
    pub last_row: usize,
    pub last_col: usize,
}

impl CellRange {
    pub fn rows(&self) -> usize {
        self.last_row + 1 - self.first_row
    }

    pub fn cols(&self) -> usize {
        self.last_col + 1 - self.first_col
    }
}

/// Three-point color scale anchored at fixed values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    pub low: (f64, &'static str),
    pub mid: (f64, &'static str),
    pub high: (f64, &'static str),
}

impl ColorScale {
    /// 0 unrelated, 1 one-way, 2 mutual.
    pub fn relationship() -> Self {
        Self {
            low: (0.0, "Gainsboro"),
            mid: (1.0, "Cornsilk"),
            high: (2.0, "DarkRed"),
        }
    }
}

/// One output in progress.
pub trait Sheet {
    fn write_header(&mut self, headers: Vec<String>) -> Result<(), IcwError>;

    /// `row` counts from 1; row 0 is the header.
    fn write_row(&mut self, row: usize, cells: Vec<Cell>) -> Result<(), IcwError>;

    fn apply_heatmap(&mut self, range: CellRange, scale: ColorScale);

    /// Keep rows above `row` and columns left of `col` in view.
    fn freeze(&mut self, row: usize, col: usize);
}

/// Destination for ordered rows and columns of cell values.
pub trait TabularSink {
    type Sheet: Sheet;

    /// Absolute column capacity of one output.
    fn max_columns(&self) -> usize;

    fn begin_output(&mut self, worksheet: &str) -> Result<Self::Sheet, IcwError>;

    /// Persist `sheet` and return the name it was saved under.
    fn save(&mut self, sheet: Self::Sheet, path: &Path) -> Result<PathBuf, IcwError>;
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemorySheet {
    pub worksheet: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub heatmap: Option<(CellRange, ColorScale)>,
    pub frozen: Option<(usize, usize)>,
}

impl MemorySheet {
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        const EMPTY: &Cell = &Cell::Empty;
        self.rows
            .get(row.wrapping_sub(1))
            .and_then(|r| r.get(col))
            .unwrap_or(EMPTY)
    }
}

impl Sheet for MemorySheet {
    fn write_header(&mut self, headers: Vec<String>) -> Result<(), IcwError> {
        self.header = headers;
        Ok(())
    }

    fn write_row(&mut self, row: usize, cells: Vec<Cell>) -> Result<(), IcwError> {
        if row == 0 {
            return Err(IcwError::Other("row 0 is reserved for the header".to_string()));
        }
        if self.rows.len() < row {
            self.rows.resize(row, Vec::new());
        }
        self.rows[row - 1] = cells;
        Ok(())
    }

    fn apply_heatmap(&mut self, range: CellRange, scale: ColorScale) {
        self.heatmap = Some((range, scale));
    }

    fn freeze(&mut self, row: usize, col: usize) {
        self.frozen = Some((row, col));
    }
}

/// Keeps every saved sheet for inspection.
#[derive(Debug, Clone)]
pub struct MemorySink {
    max_columns: usize,
    pub saved: Vec<(PathBuf, MemorySheet)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_max_columns(SPREADSHEET_MAX_COLUMNS)
    }

    pub fn with_max_columns(max_columns: usize) -> Self {
        Self {
            max_columns,
            saved: Vec::new(),
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TabularSink for MemorySink {
    type Sheet = MemorySheet;

    fn max_columns(&self) -> usize {
        self.max_columns
    }

    fn begin_output(&mut self, worksheet: &str) -> Result<MemorySheet, IcwError> {
        Ok(MemorySheet {
            worksheet: worksheet.to_string(),
            ..MemorySheet::default()
        })
    }

    fn save(&mut self, sheet: MemorySheet, path: &Path) -> Result<PathBuf, IcwError> {
        self.saved.push((path.to_path_buf(), sheet));
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sheet_rows_are_one_based() {
        let mut sink = MemorySink::new();
        let mut sheet = sink.begin_output("heatmap").unwrap();
        sheet.write_header(vec!["Name".to_string()]).unwrap();
        sheet.write_row(2, vec![Cell::text("b")]).unwrap();
        sheet.write_row(1, vec![Cell::text("a"), Cell::Integer(2)]).unwrap();

        assert_eq!(sheet.cell(1, 1), &Cell::Integer(2));
        assert_eq!(sheet.cell(2, 0), &Cell::text("b"));
        assert!(sheet.cell(0, 0).is_empty());
        assert!(sheet.cell(9, 9).is_empty());
        assert!(sheet.write_row(0, vec![]).is_err());

        let saved = sink.save(sheet, Path::new("out.csv")).unwrap();
        assert_eq!(saved, PathBuf::from("out.csv"));
        assert_eq!(sink.saved.len(), 1);
        assert_eq!(sink.saved[0].1.worksheet, "heatmap");
    }

    #[test]
    fn test_cell_render() {
        assert_eq!(Cell::Empty.render(), "");
        assert_eq!(Cell::Integer(2).render(), "2");
        assert_eq!(Cell::Number(12.5).render(), "12.5");
    }

    #[test]
    fn test_range_dimensions() {
        let range = CellRange { first_row: 1, first_col: 3, last_row: 4, last_col: 3 };
        assert_eq!(range.rows(), 4);
        assert_eq!(range.cols(), 1);
    }
}
