use std::sync::Arc;
use std::time::Duration;

use medbill_core::{ExtractionResponse, PageFailure, PageResult, TextFragment};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::ExtractionConfig;
use crate::page::{LineItemExtractor, PageError};
use crate::recognizer::OcrBackend;

/// One page of already-recognized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInput {
    pub page_no: u32,
    #[serde(default)]
    pub fragments: Vec<TextFragment>,
}

/// One page image awaiting OCR.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_no: u32,
    pub bytes: Vec<u8>,
}

type PageOutcome = Result<PageResult, PageError>;

/// Orchestrates a whole document: pages run in parallel on the blocking
/// pool, bounded by `max_concurrent_pages`, under one document deadline.
/// Output is ordered by page number whatever order pages finish in.
///
/// Blocking page work cannot be cancelled. A page abandoned at the deadline
/// keeps its permit until its work returns, so the bound holds across
/// documents sharing this pipeline.
pub struct DocumentPipeline {
    extractor: Arc<LineItemExtractor>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl DocumentPipeline {
    pub fn new(config: ExtractionConfig) -> Self {
        let timeout = Duration::from_secs(config.pipeline.document_timeout_secs);
        let max_concurrent = config.pipeline.max_concurrent_pages.max(1);
        Self {
            extractor: Arc::new(LineItemExtractor::new(config)),
            timeout,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Override the document deadline from the configuration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn extractor(&self) -> &LineItemExtractor {
        &self.extractor
    }

    /// Process pages whose fragments are already known.
    pub async fn process_fragments(&self, pages: Vec<PageInput>) -> ExtractionResponse {
        let inputs: Vec<(u32, Vec<TextFragment>)> = pages.into_iter().map(|p| (p.page_no, p.fragments)).collect();
        self.run(inputs, |extractor, page_no, fragments: Vec<TextFragment>| {
            Ok(extractor.extract_page(page_no, &fragments))
        })
        .await
    }

    /// OCR and process page images.
    pub async fn process_images<R>(&self, recognizer: Arc<R>, pages: Vec<PageImage>) -> ExtractionResponse
    where
        R: OcrBackend + 'static,
    {
        let inputs: Vec<(u32, Vec<u8>)> = pages.into_iter().map(|p| (p.page_no, p.bytes)).collect();
        self.run(inputs, move |extractor, page_no, bytes: Vec<u8>| {
            extractor.process_image_page(recognizer.as_ref(), page_no, &bytes)
        })
        .await
    }

    /// Process pages one after another on the calling thread, without a
    /// deadline. Gives the same result as `process_fragments`.
    pub fn process_sequential(&self, pages: Vec<PageInput>) -> ExtractionResponse {
        if pages.is_empty() {
            return ExtractionResponse::error("document has no pages");
        }
        let results = pages
            .iter()
            .map(|p| self.extractor.extract_page(p.page_no, &p.fragments))
            .collect();
        ExtractionResponse::new(results, vec![])
    }

    async fn run<T, F>(&self, inputs: Vec<(u32, T)>, work: F) -> ExtractionResponse
    where
        T: Send + 'static,
        F: Fn(&LineItemExtractor, u32, T) -> PageOutcome + Send + Sync + 'static,
    {
        if inputs.is_empty() {
            return ExtractionResponse::error("document has no pages");
        }

        let started = Instant::now();
        let deadline = started + self.timeout;
        let work = Arc::new(work);
        let page_nos: Vec<u32> = inputs.iter().map(|(page_no, _)| *page_no).collect();
        let mut slots: Vec<Option<PageOutcome>> = page_nos.iter().map(|_| None).collect();

        let mut tasks = JoinSet::new();
        for (idx, (page_no, input)) in inputs.into_iter().enumerate() {
            let extractor = Arc::clone(&self.extractor);
            let permits = Arc::clone(&self.permits);
            let work = Arc::clone(&work);
            tasks.spawn(async move {
                let Ok(permit) = permits.acquire_owned().await else {
                    return (idx, Err(PageError::Aborted("page scheduler closed".into())));
                };
                let outcome = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    (*work)(extractor.as_ref(), page_no, input)
                })
                .await
                    .unwrap_or_else(|e| Err(PageError::Aborted(e.to_string())));
                (idx, outcome)
            });
        }

        let mut timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((idx, outcome)))) => slots[idx] = Some(outcome),
                Ok(Some(Err(e))) => warn!("page task did not complete: {e}"),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = tasks.len(),
                        timeout_secs = self.timeout.as_secs_f64(),
                        "document deadline reached, abandoning unfinished pages"
                    );
                    tasks.abort_all();
                    timed_out = true;
                    break;
                }
            }
        }

        let mut pages = Vec::new();
        let mut failures = Vec::new();
        for (page_no, slot) in page_nos.into_iter().zip(slots) {
            let outcome = slot.unwrap_or_else(|| {
                Err(if timed_out {
                    PageError::TimedOut
                } else {
                    PageError::Aborted("task cancelled".into())
                })
            });
            match outcome {
                Ok(page) => pages.push(page),
                Err(e) => {
                    warn!(page = page_no, "page failed: {e}");
                    failures.push(PageFailure { page_no, reason: e.to_string() });
                }
            }
        }

        let response = ExtractionResponse::new(pages, failures);
        info!(
            pages = response.data.pagewise_line_items.len(),
            failed = response.failed_pages.len(),
            items = response.data.total_item_count,
            amount = response.data.reconciled_amount,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document extracted"
        );
        response
    }
}
