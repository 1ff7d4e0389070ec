//! Tabular row sources for feed stations
//!
//! A source is read once, when its cursor is opened. Two sources exist:
//! - [`MemoryTable`]: rows given inline in the model configuration
//! - [`DelimitedFile`]: a text file with a header row, fields separated by
//!   `;`, tab or `,` (detected from the header)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeedError {
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("source has no header row")]
    MissingHeader,

    #[error("column '{0}' not found")]
    UnknownColumn(String),

    #[error("row {row} has {found} fields, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("'{0}' is not a number")]
    NotANumber(String),
}

/// Header and rows of a table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Index of a column, compared case-insensitively
    pub fn column_index(&self, name: &str) -> Result<usize, FeedError> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| FeedError::UnknownColumn(name.to_string()))
    }
}

/// Anything that can deliver a table of strings
pub trait RowSource {
    fn load(&self) -> Result<Table, FeedError>;

    /// Short description for log messages
    fn describe(&self) -> String;
}

/// Rows supplied directly in the configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl MemoryTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Single-column table, handy for tests
    pub fn single_column(name: &str, values: &[&str]) -> Self {
        Self {
            columns: vec![name.to_string()],
            rows: values.iter().map(|v| vec![v.to_string()]).collect(),
        }
    }
}

impl RowSource for MemoryTable {
    fn load(&self) -> Result<Table, FeedError> {
        let expected = self.columns.len();
        for (row, fields) in self.rows.iter().enumerate() {
            if fields.len() != expected {
                return Err(FeedError::RaggedRow {
                    row,
                    found: fields.len(),
                    expected,
                });
            }
        }
        Ok(Table {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
        })
    }

    fn describe(&self) -> String {
        format!("inline table ({} rows)", self.rows.len())
    }
}

/// Delimited text file with a header row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelimitedFile {
    pub path: PathBuf,
    /// Field separator; detected from the header row when absent
    #[serde(default)]
    pub delimiter: Option<char>,
}

impl DelimitedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: None,
        }
    }

    /// Parse file contents
    pub fn parse(&self, text: &str) -> Result<Table, FeedError> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let header = lines.next().ok_or(FeedError::MissingHeader)?;
        let delimiter = self.delimiter.unwrap_or_else(|| detect_delimiter(header));

        let columns = split_fields(header, delimiter);
        let mut rows = Vec::new();
        for (row, line) in lines.enumerate() {
            let mut fields = split_fields(line, delimiter);
            if fields.len() > columns.len() {
                return Err(FeedError::RaggedRow {
                    row,
                    found: fields.len(),
                    expected: columns.len(),
                });
            }
            // Trailing empty fields are often left out
            fields.resize(columns.len(), String::new());
            rows.push(fields);
        }

        Ok(Table { columns, rows })
    }
}

impl RowSource for DelimitedFile {
    fn load(&self) -> Result<Table, FeedError> {
        let text = fs::read_to_string(&self.path).map_err(|e| FeedError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        self.parse(&text)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn detect_delimiter(header: &str) -> char {
    [';', '\t', ',']
        .into_iter()
        .find(|&d| header.contains(d))
        .unwrap_or(';')
}

fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter)
        .map(|field| {
            let field = field.trim();
            field
                .strip_prefix('"')
                .and_then(|f| f.strip_suffix('"'))
                .unwrap_or(field)
                .to_string()
        })
        .collect()
}

/// Parse a number, accepting a decimal comma when there is no decimal point
pub fn parse_number(text: &str) -> Result<f64, FeedError> {
    let trimmed = text.trim();
    trimmed
        .parse::<f64>()
        .or_else(|_| {
            if trimmed.contains(',') && !trimmed.contains('.') {
                trimmed.replace(',', ".").parse::<f64>()
            } else {
                trimmed.parse::<f64>()
            }
        })
        .map_err(|_| FeedError::NotANumber(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_semicolon_file() {
        let file = DelimitedFile::new("unused.csv");
        let table = file.parse("id;value\n1;10\n2;\"20\"\n\n3;30\n").unwrap();
        assert_eq!(table.columns, vec!["id", "value"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[1], vec!["2", "20"]);
    }

    #[test]
    fn test_detects_tab_and_comma() {
        let file = DelimitedFile::new("unused");
        assert_eq!(file.parse("a\tb\n1\t2").unwrap().rows[0], vec!["1", "2"]);
        assert_eq!(file.parse("a,b\n1,2").unwrap().rows[0], vec!["1", "2"]);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let file = DelimitedFile::new("unused");
        let table = file.parse("a;b;c\n1;2").unwrap();
        assert_eq!(table.rows[0], vec!["1", "2", ""]);
        assert!(matches!(
            file.parse("a;b\n1;2;3"),
            Err(FeedError::RaggedRow { .. })
        ));
    }

    #[test]
    fn test_empty_file_has_no_header() {
        let file = DelimitedFile::new("unused");
        assert_eq!(file.parse("\n\n").unwrap_err(), FeedError::MissingHeader);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let file = DelimitedFile::new("/definitely/not/here.csv");
        assert!(matches!(file.load(), Err(FeedError::Io { .. })));
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let table = MemoryTable::single_column("Arrival", &["1"]).load().unwrap();
        assert_eq!(table.column_index("arrival").unwrap(), 0);
        assert_eq!(
            table.column_index("other"),
            Err(FeedError::UnknownColumn("other".into()))
        );
    }

    #[test]
    fn test_parse_number_with_decimal_comma() {
        assert_eq!(parse_number(" 2.5 ").unwrap(), 2.5);
        assert_eq!(parse_number("2,5").unwrap(), 2.5);
        assert!(parse_number("1,000.5").is_err());
        assert!(parse_number("abc").is_err());
    }
}
