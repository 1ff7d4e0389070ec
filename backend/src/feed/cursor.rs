//! Feed cursor
//!
//! Prefetches one column of a row source, optionally sorted by another
//! column, and hands out its values one read at a time. What happens after
//! the last row is decided by the [`EofPolicy`].

use crate::feed::source::{FeedError, RowSource, Table};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Behaviour once every row has been read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EofPolicy {
    /// Produce nothing; the client continues without an assignment
    #[default]
    Skip,
    /// Produce the configured default value on every further read
    DefaultValue,
    /// Start again at the first row
    Loop,
    /// End the run
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Keep source order
    #[default]
    None,
    Ascending,
    Descending,
}

/// Column selection and end-of-data behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSettings {
    pub load_column: String,
    #[serde(default)]
    pub sort_column: Option<String>,
    #[serde(default)]
    pub sort: SortMode,
    #[serde(default)]
    pub eof: EofPolicy,
    #[serde(default)]
    pub default_value: String,
}

impl FeedSettings {
    pub fn new(load_column: impl Into<String>, eof: EofPolicy) -> Self {
        Self {
            load_column: load_column.into(),
            sort_column: None,
            sort: SortMode::None,
            eof,
            default_value: String::new(),
        }
    }
}

/// Result of one read
#[derive(Debug, Clone, PartialEq)]
pub enum FeedRead {
    Value(String),
    /// No value this time
    Skip,
    /// The run should end
    Terminate,
}

/// Read position over a prefetched column
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::feed::{EofPolicy, FeedCursor, FeedRead, FeedSettings, MemoryTable};
///
/// let table = MemoryTable::single_column("v", &["a", "b"]);
/// let mut cursor = FeedCursor::open(&table, FeedSettings::new("v", EofPolicy::Loop));
///
/// assert_eq!(cursor.next(), FeedRead::Value("a".into()));
/// assert_eq!(cursor.next(), FeedRead::Value("b".into()));
/// assert_eq!(cursor.next(), FeedRead::Value("a".into()));
/// ```
#[derive(Debug, Clone)]
pub struct FeedCursor {
    values: Vec<String>,
    position: usize,
    settings: FeedSettings,
    exhausted: bool,
    open_error: Option<FeedError>,
    closed: bool,
}

impl FeedCursor {
    /// Load and order the values
    ///
    /// Never fails: when the source cannot be read the cursor starts out
    /// exhausted and the error is kept for [`open_error`](Self::open_error).
    pub fn open(source: &dyn RowSource, settings: FeedSettings) -> Self {
        let (values, open_error) = match source
            .load()
            .and_then(|table| prefetch(&table, &settings))
        {
            Ok(values) => (values, None),
            Err(e) => (Vec::new(), Some(e)),
        };

        Self {
            exhausted: open_error.is_some(),
            values,
            position: 0,
            settings,
            open_error,
            closed: false,
        }
    }

    pub fn open_error(&self) -> Option<&FeedError> {
        self.open_error.as_ref()
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    /// Number of prefetched rows
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the end of data has been reached at least once
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Produce the next value according to the position and EOF policy
    pub fn next(&mut self) -> FeedRead {
        if let Some(value) = self.values.get(self.position) {
            self.position += 1;
            return FeedRead::Value(value.clone());
        }

        self.exhausted = true;
        match self.settings.eof {
            EofPolicy::Skip => FeedRead::Skip,
            EofPolicy::DefaultValue => FeedRead::Value(self.settings.default_value.clone()),
            EofPolicy::Loop => match self.values.first() {
                Some(first) => {
                    self.position = 1;
                    FeedRead::Value(first.clone())
                }
                None => FeedRead::Skip,
            },
            EofPolicy::Terminate => FeedRead::Terminate,
        }
    }

    /// Release the prefetched rows
    pub fn close(&mut self) {
        self.values = Vec::new();
        self.position = 0;
        self.closed = true;
    }
}

fn prefetch(table: &Table, settings: &FeedSettings) -> Result<Vec<String>, FeedError> {
    let load = table.column_index(&settings.load_column)?;

    let mut rows: Vec<&Vec<String>> = table.rows.iter().collect();
    if let (Some(column), true) = (&settings.sort_column, settings.sort != SortMode::None) {
        let sort = table.column_index(column)?;
        rows.sort_by(|a, b| compare_fields(&a[sort], &b[sort]));
        if settings.sort == SortMode::Descending {
            rows.reverse();
        }
    }

    Ok(rows.into_iter().map(|row| row[load].clone()).collect())
}

/// Numeric order when both fields are numbers, text order otherwise
fn compare_fields(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}
