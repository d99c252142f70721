use crate::common::error::{EnricherError, Result};
use crate::pipeline::storage::atomic::write_atomically;
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// Parsing options for delimited input
#[derive(Debug, Clone, Copy)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Escape character honoured inside quoted fields, alongside `""`
    pub escape: Option<u8>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            escape: Some(b'\\'),
        }
    }
}

impl CsvOptions {
    /// Plain RFC 4180 quoting, matching what [`Table::write_to`] produces.
    /// Tables this crate wrote must be re-read with these options so literal
    /// backslashes survive.
    pub fn standard() -> Self {
        Self {
            delimiter: b',',
            escape: None,
        }
    }
}

/// An in-memory delimited table: a header row plus string cells.
///
/// Empty cells stand in for null. Every row is kept exactly as wide as the
/// header so column indices are always valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn read_csv(path: &Path, options: &CsvOptions) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file, options)?;
        debug!(
            "Read {} rows x {} columns from {}",
            table.len(),
            table.headers.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R, options: &CsvOptions) -> Result<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(options.delimiter)
            .escape(options.escape)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(String::from).collect();
        let width = headers.len();
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(String::from).collect();
            row.resize(width, String::new());
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    /// Write with every field quoted, replacing `path` atomically
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_atomically(path, |w| self.write_to(w))?;
        debug!("Wrote {} rows to {}", self.len(), path.display());
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(writer);
        csv_writer.write_record(&self.headers)?;
        for row in &self.rows {
            csv_writer.write_record(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| EnricherError::MissingColumn(name.to_string()))
    }

    /// Append a column filled with `default`; an existing column is left untouched
    pub fn add_column(&mut self, name: &str, default: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(default.to_string());
        }
        self.headers.len() - 1
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col)).map(String::as_str)
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value.into();
        }
    }

    /// Iterate over one column's values in row order
    pub fn column(&self, col: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |r| r[col].as_str())
    }

    /// Replace every cell of a column with `f(old)`
    pub fn map_column<F>(&mut self, col: usize, mut f: F)
    where
        F: FnMut(&str) -> String,
    {
        for row in &mut self.rows {
            row[col] = f(&row[col]);
        }
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[String]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// Append a row, padding or truncating it to the header width
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }
}
