use medbill_core::TextFragment;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic role of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Item,
    Quantity,
    Rate,
    Amount,
}

impl ColumnRole {
    /// In header-matching priority order.
    pub const ALL: [ColumnRole; 4] = [
        ColumnRole::Item,
        ColumnRole::Quantity,
        ColumnRole::Rate,
        ColumnRole::Amount,
    ];

    pub fn is_numeric(self) -> bool {
        match self {
            ColumnRole::Item => false,
            ColumnRole::Quantity | ColumnRole::Rate | ColumnRole::Amount => true,
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRole::Item => write!(f, "ITEM"),
            ColumnRole::Quantity => write!(f, "QTY"),
            ColumnRole::Rate => write!(f, "RATE"),
            ColumnRole::Amount => write!(f, "AMOUNT"),
        }
    }
}

/// Horizontal band `[x_start, x_end)` assigned to one column role.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnBoundary {
    pub role: ColumnRole,
    pub x_start: f64,
    pub x_end: f64,
}

impl ColumnBoundary {
    pub fn contains(&self, x: f64) -> bool {
        x >= self.x_start && x < self.x_end
    }

    pub fn center(&self) -> f64 {
        (self.x_start + self.x_end) / 2.0
    }
}

/// Horizontal extent of everything printed on a page. The outer column
/// boundaries are stretched to these margins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBounds {
    pub left: f64,
    pub right: f64,
}

impl PageBounds {
    pub fn from_fragments(fragments: &[TextFragment]) -> Self {
        let left = fragments.iter().map(|f| f.bbox.x0).fold(0.0f64, f64::min);
        let right = fragments.iter().map(|f| f.bbox.x1).fold(left, f64::max);
        Self { left, right }
    }
}
