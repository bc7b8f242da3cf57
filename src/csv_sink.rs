use crate::{
    IcwError,
    sink::{Cell, CellRange, ColorScale, SPREADSHEET_MAX_COLUMNS, Sheet, TabularSink},
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rows held until the sheet is saved; CSV has no styling, so the heat map
/// and frozen panes are only logged.
#[derive(Debug, Default)]
pub struct CsvSheet {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Sheet for CsvSheet {
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
        self.rows[row - 1] = cells.iter().map(Cell::render).collect();
        Ok(())
    }

    fn apply_heatmap(&mut self, range: CellRange, scale: ColorScale) {
        debug!(?range, low = scale.low.1, high = scale.high.1, "csv output ignores heat map");
    }

    fn freeze(&mut self, row: usize, col: usize) {
        debug!(row, col, "csv output ignores frozen panes");
    }
}

/// Writes each output as one CSV file.
#[derive(Debug, Clone)]
pub struct CsvSink {
    max_columns: usize,
}

impl CsvSink {
    pub fn new() -> Self {
        Self::with_max_columns(SPREADSHEET_MAX_COLUMNS)
    }

    pub fn with_max_columns(max_columns: usize) -> Self {
        Self { max_columns }
    }
}

impl Default for CsvSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TabularSink for CsvSink {
    type Sheet = CsvSheet;

    fn max_columns(&self) -> usize {
        self.max_columns
    }

    fn begin_output(&mut self, _worksheet: &str) -> Result<CsvSheet, IcwError> {
        Ok(CsvSheet::default())
    }

    fn save(&mut self, sheet: CsvSheet, path: &Path) -> Result<PathBuf, IcwError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let width = sheet.rows.iter().map(Vec::len).chain([sheet.header.len()]).max().unwrap_or(0);

        let temp_path = path.with_extension("csv.tmp");
        {
            let mut writer = csv::WriterBuilder::new().flexible(true).from_path(&temp_path)?;
            writer.write_record(pad(&sheet.header, width))?;
            for row in &sheet.rows {
                writer.write_record(pad(row, width))?;
            }
            writer.flush()?;
        }
        fs::rename(&temp_path, path)?;

        info!(path = %path.display(), rows = sheet.rows.len(), columns = width, "csv saved");
        Ok(path.to_path_buf())
    }
}

fn pad(values: &[String], width: usize) -> impl Iterator<Item = &str> {
    values
        .iter()
        .map(String::as_str)
        .chain(std::iter::repeat_n("", width.saturating_sub(values.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_writes_padded_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clusters.csv");

        let mut sink = CsvSink::new();
        let mut sheet = sink.begin_output("heatmap").unwrap();
        sheet.write_header(vec!["Name".to_string(), "A".to_string(), "B".to_string()]).unwrap();
        sheet.write_row(1, vec![Cell::text("A"), Cell::Integer(2)]).unwrap();
        sheet
            .write_row(2, vec![Cell::text("B, Jr."), Cell::Empty, Cell::Integer(1)])
            .unwrap();
        sheet.freeze(1, 1);
        let saved = sink.save(sheet, &path).unwrap();

        assert_eq!(saved, path);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Name,A,B\nA,2,\n\"B, Jr.\",,1\n");
        assert!(!path.with_extension("csv.tmp").exists());
    }
}
