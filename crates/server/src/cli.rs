//! CLI mode: one request body from disk, envelope to stdout.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use medbill_core::ExtractionResponse;
use medbill_extract::{DocumentPipeline, ExtractionConfig};
use tracing::info;

use crate::server::ExtractRequest;

pub async fn process_file(path: &Path, config: ExtractionConfig) -> anyhow::Result<()> {
    let response = extract_file(path, config).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn extract_file(path: &Path, config: ExtractionConfig) -> anyhow::Result<ExtractionResponse> {
    let start = Instant::now();

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let request: ExtractRequest =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a valid extraction request", path.display()))?;
    info!(document = %request.document, pages = request.pages.len(), "Loaded request");

    let response = DocumentPipeline::new(config).process_fragments(request.pages).await;
    info!(
        items = response.data.total_item_count,
        total_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Extraction finished"
    );
    Ok(response)
}
