use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use medbill_core::{BoundingBox, TextFragment};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
}

/// Abstraction over an OCR backend.
/// Implementations accept raw PNG/JPEG bytes of one page and return the
/// recognized words with their boxes and confidences.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, page_no: u32, image_bytes: &[u8]) -> Result<Vec<TextFragment>, OcrError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns pre-set fragments, optionally per page, without touching the
/// image bytes.
#[derive(Debug, Clone, Default)]
pub struct MockRecognizer {
    fragments: Vec<TextFragment>,
    pages: BTreeMap<u32, Vec<TextFragment>>,
    failing: BTreeSet<u32>,
    delays: BTreeMap<u32, Duration>,
}

impl MockRecognizer {
    /// Every page recognizes as `fragments`.
    pub fn new(fragments: Vec<TextFragment>) -> Self {
        Self { fragments, ..Self::default() }
    }

    /// Page `page_no` recognizes as `fragments` instead of the default set.
    pub fn with_page(mut self, page_no: u32, fragments: Vec<TextFragment>) -> Self {
        self.pages.insert(page_no, fragments);
        self
    }

    /// Page `page_no` fails with an engine error.
    pub fn failing_on(mut self, page_no: u32) -> Self {
        self.failing.insert(page_no);
        self
    }

    /// Page `page_no` blocks for `delay` before answering.
    pub fn slow_on(mut self, page_no: u32, delay: Duration) -> Self {
        self.delays.insert(page_no, delay);
        self
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, page_no: u32, _image_bytes: &[u8]) -> Result<Vec<TextFragment>, OcrError> {
        if let Some(delay) = self.delays.get(&page_no) {
            std::thread::sleep(*delay);
        }
        if self.failing.contains(&page_no) {
            return Err(OcrError::Engine(format!("mock failure on page {page_no}")));
        }
        let fragments = self.pages.get(&page_no).unwrap_or(&self.fragments);
        Ok(fragments
            .iter()
            .cloned()
            .map(|f| TextFragment { page_no, ..f })
            .collect())
    }
}

// ── Tesseract TSV ─────────────────────────────────────────────────────────────

/// Parse Tesseract's TSV output into word fragments. Rows without a word
/// (`conf` of -1) and blank words are skipped; confidence is scaled from
/// 0–100 to 0–1.
pub fn parse_tesseract_tsv(tsv: &str, page_no: u32) -> Result<Vec<TextFragment>, OcrError> {
    let mut lines = tsv.lines();
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| OcrError::Engine("empty TSV output".into()))?
        .split('\t')
        .collect();
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| OcrError::Engine(format!("TSV output has no `{name}` column")))
    };
    let (left, top, width, height, conf, text) =
        (column("left")?, column("top")?, column("width")?, column("height")?, column("conf")?, column("text")?);

    let mut fragments = Vec::new();
    for line in lines.filter(|l| !l.trim().is_empty()) {
        let cells: Vec<&str> = line.split('\t').collect();
        let word = cells.get(text).map_or("", |t| t.trim());
        let Some(confidence) = cells.get(conf).and_then(|c| c.trim().parse::<f32>().ok()) else {
            continue;
        };
        if confidence < 0.0 || word.is_empty() {
            continue;
        }
        let number = |idx: usize| {
            cells
                .get(idx)
                .and_then(|c| c.trim().parse::<f64>().ok())
                .ok_or_else(|| OcrError::Engine(format!("malformed TSV row: {line}")))
        };
        let bbox = BoundingBox::from_ltwh(number(left)?, number(top)?, number(width)?, number(height)?);
        fragments.push(TextFragment::new(word, confidence / 100.0, bbox, page_no));
    }
    Ok(fragments)
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{parse_tesseract_tsv, OcrBackend, OcrError};
    use leptess::LepTess;
    use medbill_core::TextFragment;

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, page_no: u32, image_bytes: &[u8]) -> Result<Vec<TextFragment>, OcrError> {
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            let tsv = lt.get_tsv_text(0).map_err(|e| OcrError::Engine(e.to_string()))?;
            parse_tesseract_tsv(&tsv, page_no)
        }
    }
}
