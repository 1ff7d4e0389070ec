//! Station handles
//!
//! Stations live in an arena owned by the compiled model; everything else
//! refers to them by [`StationId`], resolved from names once at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a station in the compiled model's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StationId(pub usize);

impl StationId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
