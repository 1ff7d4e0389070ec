//! External data feeds
//!
//! A feed station pulls one value per passing client from a table and
//! writes it into a variable or a client attribute. Rows are loaded and
//! sorted once, when the run starts, so reads never block on I/O.
//!
//! Source failures do not abort the run: the cursor starts out exhausted
//! and its [`EofPolicy`] decides what each read produces.

pub mod cursor;
pub mod source;

pub use cursor::{EofPolicy, FeedCursor, FeedRead, FeedSettings, SortMode};
pub use source::{parse_number, DelimitedFile, FeedError, MemoryTable, RowSource, Table};

use serde::{Deserialize, Serialize};

/// Where a feed's source rows come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedSourceConfig {
    Table(MemoryTable),
    File(DelimitedFile),
}

impl FeedSourceConfig {
    pub fn as_source(&self) -> &dyn RowSource {
        match self {
            FeedSourceConfig::Table(table) => table,
            FeedSourceConfig::File(file) => file,
        }
    }
}

/// Where a value read from a feed is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum FeedTarget {
    /// Global numeric variable
    Variable(String),
    /// Numeric value of the passing client
    ClientNumber(String),
    /// Text attribute of the passing client
    ClientText(String),
}

impl FeedTarget {
    pub fn name(&self) -> &str {
        match self {
            FeedTarget::Variable(name)
            | FeedTarget::ClientNumber(name)
            | FeedTarget::ClientText(name) => name,
        }
    }

    /// Whether the raw text has to parse as a number
    pub fn is_numeric(&self) -> bool {
        !matches!(self, FeedTarget::ClientText(_))
    }
}
