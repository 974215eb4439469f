use crate::structs::{CryoError, Result};
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;

/// A parsed features CSV/TSV: header plus string cells
#[derive(Debug, Clone)]
pub struct CsvData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvData {
    /// Parse a CSV or TSV file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or a record is malformed
    pub fn from_file(path: &Path, is_tsv: bool) -> Result<Self> {
        Self::from_reader(std::fs::File::open(path)?, is_tsv)
    }

    /// # Errors
    /// Returns error if a record is malformed
    pub fn from_reader<R: Read>(reader: R, is_tsv: bool) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(if is_tsv { b'\t' } else { b',' })
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let rows = reader
            .records()
            .map(|record| Ok(record?.iter().map(ToString::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>>>()?;

        Ok(Self { headers, rows })
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn col_count(&self) -> usize {
        self.headers.len()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Like [`column_index`](Self::column_index), but a missing column is a
    /// configuration error
    ///
    /// # Errors
    /// Returns `Config` if no header matches `name`
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| CryoError::Config(format!("Column '{name}' not found")))
    }

    /// Parse the cells at `cols` of one row; `None` if any is missing or non-numeric
    #[must_use]
    pub fn numeric_row(&self, row: usize, cols: &[usize]) -> Option<Vec<f64>> {
        let cells = self.rows.get(row)?;
        cols.iter()
            .map(|&c| cells.get(c).and_then(|s| s.trim().parse::<f64>().ok()))
            .collect()
    }

    /// Columns where at least half of the non-empty cells parse as numbers
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn numeric_column_indices(&self) -> Vec<usize> {
        (0..self.col_count())
            .filter(|&i| {
                let non_empty: Vec<&str> = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(i).map(String::as_str))
                    .filter(|s| !s.is_empty())
                    .collect();
                if non_empty.is_empty() {
                    return false;
                }
                let numeric = non_empty
                    .iter()
                    .filter(|s| s.trim().parse::<f64>().is_ok())
                    .count();
                numeric as f64 / non_empty.len() as f64 >= 0.5
            })
            .collect()
    }
}
