//! Groups a page's fragments into horizontal table rows.

use medbill_core::TextFragment;

use crate::config::RowConfig;

/// Fragments that share a vertical band, left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub fragments: Vec<TextFragment>,
    /// Mean vertical midpoint of the fragments that defined the row.
    pub y_center: f64,
    /// Mean height of the fragments that defined the row.
    pub height: f64,
}

impl Row {
    pub fn top(&self) -> f64 {
        self.fragments.iter().map(|f| f.bbox.y0).fold(f64::INFINITY, f64::min)
    }

    pub fn bottom(&self) -> f64 {
        self.fragments.iter().map(|f| f.bbox.y1).fold(f64::NEG_INFINITY, f64::max)
    }

    /// The same row without fragments centered left of `x`.
    pub fn right_of(&self, x: f64) -> Row {
        Row {
            fragments: self.fragments.iter().filter(|f| f.bbox.center_x() >= x).cloned().collect(),
            y_center: self.y_center,
            height: self.height,
        }
    }

    /// The row's text, fragments joined by single spaces.
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Running centroid of the row being built. Each fragment yields a new
/// accumulator; nothing is mutated behind the caller's back.
#[derive(Debug, Clone)]
struct RowAccumulator {
    fragments: Vec<TextFragment>,
    mid_sum: f64,
    height_sum: f64,
    count: usize,
    top: f64,
    bottom: f64,
}

impl RowAccumulator {
    fn start(fragment: TextFragment) -> Self {
        let b = fragment.bbox;
        Self {
            mid_sum: b.center_y(),
            height_sum: b.height(),
            count: 1,
            top: b.y0,
            bottom: b.y1,
            fragments: vec![fragment],
        }
    }

    fn mean_mid(&self) -> f64 {
        self.mid_sum / self.count as f64
    }

    fn mean_height(&self) -> f64 {
        self.height_sum / self.count as f64
    }

    fn accepts(&self, fragment: &TextFragment, tolerance: f64) -> bool {
        (fragment.bbox.center_y() - self.mean_mid()).abs() <= tolerance * self.mean_height()
    }

    /// Folds the fragment into the centroid.
    fn absorb(self, fragment: TextFragment) -> Self {
        let b = fragment.bbox;
        let mut fragments = self.fragments;
        fragments.push(fragment);
        Self {
            fragments,
            mid_sum: self.mid_sum + b.center_y(),
            height_sum: self.height_sum + b.height(),
            count: self.count + 1,
            top: self.top.min(b.y0),
            bottom: self.bottom.max(b.y1),
        }
    }

    /// Adds the fragment without letting it move the centroid.
    fn attach(self, fragment: TextFragment) -> Self {
        let mut fragments = self.fragments;
        fragments.push(fragment);
        Self { fragments, ..self }
    }

    fn finish(self) -> Row {
        let y_center = self.mean_mid();
        let height = self.mean_height();
        let mut fragments = self.fragments;
        fragments.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
        Row { fragments, y_center, height }
    }
}

/// Cluster fragments into rows ordered top to bottom, each ordered left to
/// right. Blank fragments are dropped; no fragments means no rows.
pub fn cluster_rows(fragments: &[TextFragment], config: &RowConfig) -> Vec<Row> {
    let mut usable: Vec<TextFragment> = fragments.iter().filter(|f| !f.is_blank()).cloned().collect();
    if usable.is_empty() {
        return vec![];
    }

    let tall_limit = median_height(&usable) * config.tall_fragment_factor;
    let (tall, mut regular): (Vec<_>, Vec<_>) =
        usable.drain(..).partition(|f| f.bbox.height() > tall_limit);
    regular.sort_by(|a, b| a.bbox.center_y().total_cmp(&b.bbox.center_y()));

    let mut rows = regular.into_iter().fold(Vec::<RowAccumulator>::new(), |mut rows, fragment| {
        match rows.pop() {
            Some(acc) if acc.accepts(&fragment, config.midpoint_tolerance) => rows.push(acc.absorb(fragment)),
            Some(acc) => {
                rows.push(acc);
                rows.push(RowAccumulator::start(fragment));
            }
            None => rows.push(RowAccumulator::start(fragment)),
        }
        rows
    });

    for fragment in tall {
        let best = rows
            .iter()
            .enumerate()
            .map(|(idx, acc)| (idx, fragment.bbox.vertical_overlap(acc.top, acc.bottom)))
            .filter(|(_, overlap)| *overlap > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        match best {
            Some((idx, _)) => {
                let acc = rows.remove(idx);
                rows.insert(idx, acc.attach(fragment));
            }
            None => rows.push(RowAccumulator::start(fragment)),
        }
    }

    let mut rows: Vec<Row> = rows.into_iter().map(RowAccumulator::finish).collect();
    rows.sort_by(|a, b| a.y_center.total_cmp(&b.y_center));
    rows
}

fn median_height(fragments: &[TextFragment]) -> f64 {
    let mut heights: Vec<f64> = fragments.iter().map(|f| f.bbox.height()).collect();
    heights.sort_by(f64::total_cmp);
    heights[heights.len() / 2]
}
