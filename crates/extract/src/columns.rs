//! Maps each row's fragments onto the detected columns.

use medbill_core::TextFragment;
use tracing::debug;

use crate::config::ColumnConfig;
use crate::numeric::looks_numeric;
use crate::rows::Row;
use crate::types::{ColumnBoundary, ColumnRole};

/// The text that won a numeric column and the OCR confidence it was read with.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub text: String,
    pub confidence: f32,
}

impl Cell {
    fn from_fragment(fragment: &TextFragment) -> Self {
        Self {
            text: fragment.text.trim().to_string(),
            confidence: fragment.confidence,
        }
    }
}

/// One row's fragments sorted into columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignedRow {
    pub row_index: usize,
    pub item_text: String,
    pub quantity: Option<Cell>,
    pub rate: Option<Cell>,
    pub amount: Option<Cell>,
    /// Numeric columns that received more than one fragment.
    pub conflicts: Vec<ColumnRole>,
}

impl AssignedRow {
    pub fn has_numeric_cells(&self) -> bool {
        self.quantity.is_some() || self.rate.is_some() || self.amount.is_some()
    }

    fn cell_mut(&mut self, role: ColumnRole) -> Option<&mut Option<Cell>> {
        match role {
            ColumnRole::Item => None,
            ColumnRole::Quantity => Some(&mut self.quantity),
            ColumnRole::Rate => Some(&mut self.rate),
            ColumnRole::Amount => Some(&mut self.amount),
        }
    }
}

/// Index of the boundary an x-center belongs to. Outside every boundary the
/// nearest boundary center wins, so any x maps somewhere as long as there is
/// at least one boundary.
pub fn column_for(x: f64, boundaries: &[ColumnBoundary]) -> Option<usize> {
    boundaries.iter().position(|b| b.contains(x)).or_else(|| {
        boundaries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.center() - x).abs().total_cmp(&(b.center() - x).abs()))
            .map(|(idx, _)| idx)
    })
}

/// Joins a number and a directly following two-digit fragment, the way a
/// decimal point lost to OCR shows up (`"448"` `"00"` → `"448 00"`).
/// Fragments must be in x order.
pub fn merge_split_decimals(fragments: &[TextFragment], max_gap: f64) -> Vec<TextFragment> {
    fragments.iter().fold(Vec::with_capacity(fragments.len()), |mut merged, next| {
        match merged.last_mut() {
            Some(prev) if is_decimal_tail(prev, next, max_gap) => {
                prev.text = format!("{} {}", prev.text.trim(), next.text.trim());
                prev.bbox = prev.bbox.union(&next.bbox);
                prev.confidence = prev.confidence.min(next.confidence);
            }
            _ => merged.push(next.clone()),
        }
        merged
    })
}

fn is_decimal_tail(prev: &TextFragment, next: &TextFragment, max_gap: f64) -> bool {
    let tail = next.text.trim();
    let head = prev.text.trim();
    tail.len() == 2
        && tail.chars().all(|c| c.is_ascii_digit())
        && !head.contains('.')
        && !head.contains(' ')
        && looks_numeric(head)
        && next.bbox.x0 - prev.bbox.x1 <= max_gap
}

/// Assign a row's fragments to columns. ITEM fragments are joined in x
/// order; each numeric column keeps one fragment and records the rest as a
/// conflict.
pub fn assign_row(row_index: usize, row: &Row, boundaries: &[ColumnBoundary], config: &ColumnConfig) -> AssignedRow {
    let fragments = merge_split_decimals(&row.fragments, config.decimal_merge_gap);

    let mut buckets: Vec<Vec<&TextFragment>> = vec![Vec::new(); boundaries.len()];
    let mut item_parts: Vec<&str> = Vec::new();
    for fragment in &fragments {
        match column_for(fragment.bbox.center_x(), boundaries) {
            Some(idx) if boundaries[idx].role.is_numeric() => buckets[idx].push(fragment),
            _ => item_parts.push(fragment.text.trim()),
        }
    }

    let mut assigned = AssignedRow {
        row_index,
        item_text: item_parts.join(" "),
        ..AssignedRow::default()
    };

    for (boundary, bucket) in boundaries.iter().zip(&buckets) {
        let Some(winner) = pick_numeric(bucket, config.min_confidence) else {
            continue;
        };
        if bucket.len() > 1 {
            debug!(
                row = row_index,
                column = %boundary.role,
                kept = %bucket[winner].text,
                dropped = ?bucket.iter().enumerate().filter(|(i, _)| *i != winner).map(|(_, f)| f.text.as_str()).collect::<Vec<_>>(),
                "column assignment conflict"
            );
            assigned.conflicts.push(boundary.role);
        }
        if let Some(slot) = assigned.cell_mut(boundary.role) {
            *slot = Some(Cell::from_fragment(bucket[winner]));
        }
    }
    assigned
}

/// First fragment that parses with enough confidence, else the first that
/// parses at all, else the first fragment.
fn pick_numeric(bucket: &[&TextFragment], min_confidence: f32) -> Option<usize> {
    if bucket.is_empty() {
        return None;
    }
    bucket
        .iter()
        .position(|f| f.confidence >= min_confidence && looks_numeric(&f.text))
        .or_else(|| bucket.iter().position(|f| looks_numeric(&f.text)))
        .or(Some(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RowConfig;
    use crate::rows::cluster_rows;
    use medbill_core::BoundingBox;

    fn frag(text: &str, x0: f64, x1: f64, confidence: f32) -> TextFragment {
        TextFragment::new(text, confidence, BoundingBox::new(x0, 0.0, x1, 18.0), 1)
    }

    fn boundaries() -> Vec<ColumnBoundary> {
        vec![
            ColumnBoundary { role: ColumnRole::Item, x_start: 0.0, x_end: 185.0 },
            ColumnBoundary { role: ColumnRole::Quantity, x_start: 185.0, x_end: 305.0 },
            ColumnBoundary { role: ColumnRole::Rate, x_start: 305.0, x_end: 400.0 },
            ColumnBoundary { role: ColumnRole::Amount, x_start: 400.0, x_end: 490.0 },
        ]
    }

    fn row(fragments: Vec<TextFragment>) -> Row {
        cluster_rows(&fragments, &RowConfig::default()).remove(0)
    }

    #[test]
    fn column_for_uses_containing_boundary() {
        let b = boundaries();
        assert_eq!(column_for(10.0, &b), Some(0));
        assert_eq!(column_for(185.0, &b), Some(1));
        assert_eq!(column_for(450.0, &b), Some(3));
    }

    #[test]
    fn column_assignment_is_total() {
        let b = boundaries();
        for x in (-200..1200).step_by(7) {
            assert!(column_for(x as f64, &b).is_some(), "x = {x}");
        }
        assert_eq!(column_for(900.0, &b), Some(3));
        assert_eq!(column_for(-50.0, &b), Some(0));
        assert_eq!(column_for(5.0, &[]), None);
    }

    #[test]
    fn assigns_a_plain_row() {
        let r = row(vec![
            frag("Consultation", 20.0, 150.0, 0.95),
            frag("1", 255.0, 262.0, 0.9),
            frag("500", 335.0, 365.0, 0.9),
            frag("500", 440.0, 470.0, 0.9),
        ]);
        let a = assign_row(0, &r, &boundaries(), &ColumnConfig::default());
        assert_eq!(a.item_text, "Consultation");
        assert_eq!(a.quantity.as_ref().map(|c| c.text.as_str()), Some("1"));
        assert_eq!(a.rate.as_ref().map(|c| c.text.as_str()), Some("500"));
        assert_eq!(a.amount.as_ref().map(|c| c.confidence), Some(0.9));
        assert!(a.conflicts.is_empty());
    }

    #[test]
    fn item_fragments_join_in_x_order() {
        let r = row(vec![
            frag("Rent", 80.0, 120.0, 0.9),
            frag("Room", 20.0, 70.0, 0.9),
            frag("1200", 440.0, 480.0, 0.9),
        ]);
        let a = assign_row(0, &r, &boundaries(), &ColumnConfig::default());
        assert_eq!(a.item_text, "Room Rent");
        assert!(a.quantity.is_none());
        assert!(a.has_numeric_cells());
    }

    #[test]
    fn confident_parseable_fragment_wins_conflict() {
        let r = row(vec![
            frag("Dressing", 20.0, 100.0, 0.9),
            frag("5OO", 405.0, 435.0, 0.4),
            frag("510", 445.0, 475.0, 0.9),
        ]);
        let a = assign_row(3, &r, &boundaries(), &ColumnConfig::default());
        assert_eq!(a.amount.map(|c| c.text), Some("510".to_string()));
        assert_eq!(a.conflicts, vec![ColumnRole::Amount]);
    }

    #[test]
    fn conflict_falls_back_to_first_parseable_then_first() {
        let low = ColumnConfig::default();
        let bucket_frags = [frag("abc", 405.0, 420.0, 0.9), frag("75", 440.0, 460.0, 0.3)];
        let bucket: Vec<&TextFragment> = bucket_frags.iter().collect();
        assert_eq!(pick_numeric(&bucket, low.min_confidence), Some(1));

        let junk = [frag("abc", 405.0, 420.0, 0.9), frag("xyz", 440.0, 460.0, 0.9)];
        let bucket: Vec<&TextFragment> = junk.iter().collect();
        assert_eq!(pick_numeric(&bucket, low.min_confidence), Some(0));
        assert_eq!(pick_numeric(&[], low.min_confidence), None);
    }

    #[test]
    fn merges_decimal_split_by_space() {
        let fragments = vec![frag("448", 400.0, 430.0, 0.9), frag("00", 436.0, 452.0, 0.8)];
        let merged = merge_split_decimals(&fragments, 18.0);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "448 00");
        assert_eq!(merged[0].bbox.x1, 452.0);
        assert_eq!(merged[0].confidence, 0.8);
    }

    #[test]
    fn leaves_distant_or_non_decimal_neighbours() {
        let far = vec![frag("448", 300.0, 330.0, 0.9), frag("00", 400.0, 416.0, 0.9)];
        assert_eq!(merge_split_decimals(&far, 18.0).len(), 2);

        let three_digits = vec![frag("1", 300.0, 310.0, 0.9), frag("500", 315.0, 345.0, 0.9)];
        assert_eq!(merge_split_decimals(&three_digits, 18.0).len(), 2);

        let already_decimal = vec![frag("4.50", 300.0, 330.0, 0.9), frag("12", 335.0, 350.0, 0.9)];
        assert_eq!(merge_split_decimals(&already_decimal, 18.0).len(), 2);

        let text = vec![frag("Ward", 300.0, 330.0, 0.9), frag("12", 335.0, 350.0, 0.9)];
        assert_eq!(merge_split_decimals(&text, 18.0).len(), 2);
    }

    #[test]
    fn merged_decimal_lands_in_one_column() {
        let r = row(vec![
            frag("Syringe", 20.0, 90.0, 0.9),
            frag("448", 410.0, 440.0, 0.9),
            frag("00", 444.0, 460.0, 0.9),
        ]);
        let a = assign_row(0, &r, &boundaries(), &ColumnConfig::default());
        assert_eq!(a.amount.map(|c| c.text), Some("448 00".to_string()));
        assert!(a.conflicts.is_empty());
    }
}
