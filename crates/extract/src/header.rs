//! Header row detection and column boundary derivation.
//!
//! The header row is found by fuzzy-matching fragment text against the
//! configured role vocabularies. When no row qualifies, columns are inferred
//! from where numeric fragments sit on the page.

use std::collections::BTreeMap;

use medbill_core::BoundingBox;
use tracing::debug;

use crate::config::HeaderConfig;
use crate::fuzzy::{normalize, similarity};
use crate::numeric::looks_numeric;
use crate::rows::Row;
use crate::types::{ColumnBoundary, ColumnRole, PageBounds};

/// Where the table's columns are.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderDetection {
    /// Index of the header row, `None` when the positional fallback was used.
    pub header_row: Option<usize>,
    /// Non-overlapping, ordered by `x_start`, spanning the page.
    pub boundaries: Vec<ColumnBoundary>,
    /// Fragments centered left of this x sit in a serial-number column
    /// ("No") ahead of the item column and are not bill content.
    pub serial_until: Option<f64>,
}

impl HeaderDetection {
    pub fn is_fallback(&self) -> bool {
        self.header_row.is_none()
    }
}

/// Best role for a single header cell and its similarity score, if any role
/// clears the threshold. Multi-word cells are also compared word by word so
/// `"Amount (Rs)"` still reads as AMOUNT; words under three letters are too
/// ambiguous to count on their own.
pub fn match_role(text: &str, config: &HeaderConfig) -> Option<(ColumnRole, f32)> {
    let whole = normalize(text);
    if whole.is_empty() {
        return None;
    }
    let mut candidates = vec![whole.as_str()];
    if whole.contains(' ') {
        candidates.extend(whole.split(' ').filter(|w| w.chars().count() >= 3));
    }

    ColumnRole::ALL
        .iter()
        .map(|&role| {
            let score = config
                .terms(role)
                .iter()
                .flat_map(|term| candidates.iter().map(move |c| similarity(c, term)))
                .fold(0.0f32, f32::max);
            (role, score)
        })
        .fold(None, |best: Option<(ColumnRole, f32)>, (role, score)| match best {
            Some((_, s)) if s >= score => best,
            _ => Some((role, score)),
        })
        .filter(|(_, score)| *score >= config.match_threshold)
}

/// Locate the header among the first `scan_rows` rows and derive column
/// boundaries from it, falling back to numeric-column inference.
pub fn detect_header(rows: &[Row], config: &HeaderConfig, bounds: PageBounds) -> HeaderDetection {
    let mut best: Option<(usize, HeaderAnchors)> = None;
    for (idx, row) in rows.iter().take(config.scan_rows).enumerate() {
        let found = header_anchors(row, config);
        if found.anchors.len() >= 2 && best.as_ref().map_or(true, |(_, b)| found.anchors.len() > b.anchors.len()) {
            best = Some((idx, found));
        }
    }

    match best {
        Some((idx, found)) => {
            debug!(
                row = idx,
                roles = ?found.anchors.iter().map(|a| a.role).collect::<Vec<_>>(),
                serial_until = ?found.serial_until,
                "header row found"
            );
            HeaderDetection {
                header_row: Some(idx),
                boundaries: boundaries_from_anchors(found.anchors, bounds),
                serial_until: found.serial_until,
            }
        }
        None => HeaderDetection {
            header_row: None,
            boundaries: positional_boundaries(rows, config, bounds),
            serial_until: None,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    role: ColumnRole,
    x0: f64,
    x1: f64,
}

impl Anchor {
    fn from_bbox(role: ColumnRole, bbox: &BoundingBox) -> Self {
        Self { role, x0: bbox.x0, x1: bbox.x1 }
    }
}

struct HeaderAnchors {
    anchors: Vec<Anchor>,
    serial_until: Option<f64>,
}

/// One anchor per matched role (the best-scoring fragment), ordered by x.
/// Numeric titles left of the ITEM title ("No" before "Particulars") mark a
/// serial column, never a quantity, rate or amount.
fn header_anchors(row: &Row, config: &HeaderConfig) -> HeaderAnchors {
    let matches: Vec<(ColumnRole, f32, Anchor)> = row
        .fragments
        .iter()
        .filter_map(|f| match_role(&f.text, config).map(|(role, score)| (role, score, Anchor::from_bbox(role, &f.bbox))))
        .collect();

    let item_x0 = matches
        .iter()
        .filter(|(role, _, _)| *role == ColumnRole::Item)
        .fold(None, |best: Option<(f32, f64)>, (_, score, a)| match best {
            Some((s, _)) if s >= *score => best,
            _ => Some((*score, a.x0)),
        })
        .map(|(_, x0)| x0);

    let mut best: BTreeMap<ColumnRole, (f32, Anchor)> = BTreeMap::new();
    let mut serial_x1: Option<f64> = None;
    for (role, score, anchor) in matches {
        if let Some(item_x0) = item_x0 {
            if role.is_numeric() && anchor.x1 <= item_x0 {
                serial_x1 = Some(serial_x1.map_or(anchor.x1, |x| x.max(anchor.x1)));
                continue;
            }
        }
        if best.get(&role).map_or(true, |(s, _)| score > *s) {
            best.insert(role, (score, anchor));
        }
    }

    let mut anchors: Vec<Anchor> = best.into_values().map(|(_, a)| a).collect();
    anchors.sort_by(|a, b| a.x0.total_cmp(&b.x0));
    HeaderAnchors {
        anchors,
        serial_until: serial_x1.zip(item_x0).map(|(x1, x0)| (x1 + x0) / 2.0),
    }
}

/// Splits halfway between neighbouring anchors and stretches the outer
/// boundaries to the page margins. A missing ITEM anchor is placed at the
/// left margin.
fn boundaries_from_anchors(mut anchors: Vec<Anchor>, bounds: PageBounds) -> Vec<ColumnBoundary> {
    if !anchors.iter().any(|a| a.role == ColumnRole::Item) {
        let first_x0 = anchors.first().map_or(bounds.right, |a| a.x0);
        anchors.insert(
            0,
            Anchor {
                role: ColumnRole::Item,
                x0: bounds.left,
                x1: first_x0.max(bounds.left),
            },
        );
    }

    let last = anchors.len() - 1;
    let mut start = bounds.left;
    let mut boundaries = Vec::with_capacity(anchors.len());
    for (i, anchor) in anchors.iter().enumerate() {
        let end = if i == last {
            bounds.right
        } else {
            (anchor.x1 + anchors[i + 1].x0) / 2.0
        }
        .max(start);
        boundaries.push(ColumnBoundary { role: anchor.role, x_start: start, x_end: end });
        start = end;
    }
    boundaries
}

/// Column boundaries inferred from numeric fragment positions: overlapping
/// x-extents merge into regions, the rightmost region is AMOUNT and up to two
/// regions left of it are QTY and RATE. Anything further left is item text.
fn positional_boundaries(rows: &[Row], config: &HeaderConfig, bounds: PageBounds) -> Vec<ColumnBoundary> {
    let mut extents: Vec<(f64, f64)> = rows
        .iter()
        .flat_map(|r| &r.fragments)
        .filter(|f| looks_numeric(&f.text))
        .map(|f| (f.bbox.x0, f.bbox.x1))
        .collect();
    extents.sort_by(|a, b| a.0.total_cmp(&b.0));

    let regions = extents.into_iter().fold(Vec::<(f64, f64)>::new(), |mut regions, (x0, x1)| {
        match regions.last_mut() {
            Some(last) if x0 <= last.1 + config.numeric_gap_tolerance => last.1 = last.1.max(x1),
            _ => regions.push((x0, x1)),
        }
        regions
    });

    let roles: &[ColumnRole] = match regions.len() {
        0 => &[],
        1 => &[ColumnRole::Amount],
        2 => &[ColumnRole::Rate, ColumnRole::Amount],
        _ => &[ColumnRole::Quantity, ColumnRole::Rate, ColumnRole::Amount],
    };
    let numeric = &regions[regions.len() - roles.len()..];
    debug!(regions = regions.len(), columns = ?roles, "inferring columns from numeric positions");

    let anchors = roles
        .iter()
        .zip(numeric)
        .map(|(&role, &(x0, x1))| Anchor { role, x0, x1 })
        .collect();
    boundaries_from_anchors(anchors, bounds)
}
