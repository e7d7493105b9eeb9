//! Runs one page through every stage, from fragments to a `PageResult`.

use std::collections::BTreeSet;
use std::fmt;

use medbill_core::{PageFlag, PageResult, TextFragment};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregate::PageAggregator;
use crate::columns::assign_row;
use crate::config::ExtractionConfig;
use crate::header::detect_header;
use crate::items::build_items;
use crate::recognizer::{OcrBackend, OcrError};
use crate::rows::cluster_rows;
use crate::spelling::SpellCorrector;
use crate::types::PageBounds;
use crate::validate::validate_item;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("Page processing aborted: {0}")]
    Aborted(String),
    #[error("Document deadline reached before the page finished")]
    TimedOut,
}

/// Where a page is in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Loaded,
    Ocred,
    RowsClustered,
    HeaderDetected,
    ColumnsAssigned,
    ItemsBuilt,
    Corrected,
    Validated,
    Aggregated,
    Done,
    Failed(String),
}

impl PageState {
    /// The state that follows on success; `None` once terminal.
    pub fn next(&self) -> Option<PageState> {
        use PageState::*;
        match self {
            Loaded => Some(Ocred),
            Ocred => Some(RowsClustered),
            RowsClustered => Some(HeaderDetected),
            HeaderDetected => Some(ColumnsAssigned),
            ColumnsAssigned => Some(ItemsBuilt),
            ItemsBuilt => Some(Corrected),
            Corrected => Some(Validated),
            Validated => Some(Aggregated),
            Aggregated => Some(Done),
            Done | Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageState::Loaded => write!(f, "loaded"),
            PageState::Ocred => write!(f, "ocred"),
            PageState::RowsClustered => write!(f, "rows_clustered"),
            PageState::HeaderDetected => write!(f, "header_detected"),
            PageState::ColumnsAssigned => write!(f, "columns_assigned"),
            PageState::ItemsBuilt => write!(f, "items_built"),
            PageState::Corrected => write!(f, "corrected"),
            PageState::Validated => write!(f, "validated"),
            PageState::Aggregated => write!(f, "aggregated"),
            PageState::Done => write!(f, "done"),
            PageState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A page's walk through the states. Transitions only move forward; a
/// terminal state never changes again.
#[derive(Debug, Clone)]
pub struct PageRun {
    page_no: u32,
    trail: Vec<PageState>,
}

impl PageRun {
    pub fn new(page_no: u32) -> Self {
        Self { page_no, trail: vec![PageState::Loaded] }
    }

    pub fn state(&self) -> &PageState {
        // Never empty: starts at `Loaded`.
        &self.trail[self.trail.len() - 1]
    }

    /// Every state visited, in order.
    pub fn trail(&self) -> &[PageState] {
        &self.trail
    }

    /// Move to the next state on the success path.
    pub fn advance(&mut self) {
        if let Some(next) = self.state().next() {
            debug!(page = self.page_no, from = %self.state(), to = %next, "page state");
            self.trail.push(next);
        }
    }

    /// Advance until `target` is reached or the run is terminal.
    pub fn advance_to(&mut self, target: PageState) {
        while *self.state() != target && !self.state().is_terminal() {
            self.advance();
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.state().is_terminal() {
            let failed = PageState::Failed(reason.into());
            warn!(page = self.page_no, from = %self.state(), to = %failed, "page state");
            self.trail.push(failed);
        }
    }
}

/// Turns one page's fragments into a page result. Stateless between pages,
/// so one extractor serves every page of every document.
pub struct LineItemExtractor {
    config: ExtractionConfig,
    speller: SpellCorrector,
    aggregator: PageAggregator,
}

impl LineItemExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            speller: SpellCorrector::new(&config.spelling),
            aggregator: PageAggregator::new(&config.page),
            config,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Process a page whose fragments are already known.
    pub fn extract_page(&self, page_no: u32, fragments: &[TextFragment]) -> PageResult {
        let mut run = PageRun::new(page_no);
        run.advance();
        self.run_stages(&mut run, fragments)
    }

    /// OCR a page image and process the fragments it yields.
    pub fn process_image_page<R: OcrBackend + ?Sized>(
        &self,
        recognizer: &R,
        page_no: u32,
        image_bytes: &[u8],
    ) -> Result<PageResult, PageError> {
        let mut run = PageRun::new(page_no);
        let fragments = match recognizer.recognize(page_no, image_bytes) {
            Ok(fragments) => fragments,
            Err(e) => {
                run.fail(e.to_string());
                return Err(e.into());
            }
        };
        run.advance();
        Ok(self.run_stages(&mut run, &fragments))
    }

    fn run_stages(&self, run: &mut PageRun, fragments: &[TextFragment]) -> PageResult {
        let page_no = run.page_no;
        let mut flags = BTreeSet::new();

        let rows = cluster_rows(fragments, &self.config.rows);
        run.advance();
        if rows.is_empty() {
            warn!(page = page_no, "no rows found on page");
            flags.insert(PageFlag::RowClusteringEmpty);
            let result = self.aggregator.aggregate(page_no, &rows, vec![], flags);
            run.advance_to(PageState::Done);
            return result;
        }

        let detection = detect_header(&rows, &self.config.header, PageBounds::from_fragments(fragments));
        run.advance();
        if detection.is_fallback() {
            warn!(page = page_no, columns = detection.boundaries.len(), "no header row, using numeric column positions");
            flags.insert(PageFlag::HeaderNotFound);
        }

        let body_start = detection.header_row.map_or(0, |idx| idx + 1);
        let assigned = rows
            .iter()
            .enumerate()
            .skip(body_start)
            .map(|(idx, row)| match detection.serial_until {
                Some(x) => assign_row(idx, &row.right_of(x), &detection.boundaries, &self.config.columns),
                None => assign_row(idx, row, &detection.boundaries, &self.config.columns),
            })
            .collect();
        run.advance();

        let mut items = build_items(assigned, &self.config.items);
        run.advance();

        for item in &mut items {
            self.speller.apply(item);
        }
        run.advance();

        for item in &mut items {
            validate_item(item, &self.config.validation);
        }
        run.advance();

        let result = self.aggregator.aggregate(page_no, &rows, items, flags);
        run.advance();
        run.advance();

        info!(
            page = page_no,
            page_type = %result.page_type,
            rows = rows.len(),
            items = result.bill_items.len(),
            validated = result.validated_count(),
            amount = %result.reconciled_amount().rounded(),
            "page extracted"
        );
        result
    }
}
