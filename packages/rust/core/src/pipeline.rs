//! End-to-end ingestion: sitemap → pages → chunks → embeddings → dataset.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use sitechat_chunker::SplitterConfig;
use sitechat_openai::Embedder;
use sitechat_shared::{AppConfig, Result, SitechatError};
use sitechat_store::VectorStore;

/// Result of one ingestion run.
#[derive(Debug)]
pub struct IngestReport {
    /// Pages fetched and cleaned to non-empty text.
    pub documents: usize,
    /// Chunks written to the dataset.
    pub chunks: usize,
    /// Where the dataset was written.
    pub dataset_path: PathBuf,
    /// Embedding tokens consumed, when the backend reports usage.
    pub embedding_tokens: u64,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting ingestion status.
pub trait IngestProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each page fetch.
    fn page_fetched(&self, url: &str, current: usize, total: usize);
    /// Called when ingestion completes.
    fn done(&self, report: &IngestReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl IngestProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_fetched(&self, _url: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &IngestReport) {}
}

/// Run the full ingestion pipeline.
///
/// 1. Fetch the sitemap and apply URL prefix filters
/// 2. Fetch and clean each page
/// 3. Split documents into chunks
/// 4. Embed chunk texts
/// 5. Write the dataset, replacing any previous run
#[instrument(skip_all)]
pub async fn ingest(
    config: &AppConfig,
    embedder: &dyn Embedder,
    progress: &dyn IngestProgress,
) -> Result<IngestReport> {
    let start = Instant::now();
    let sitemap_url = config.sitemap_url.as_ref().ok_or_else(|| {
        SitechatError::config("SITE_MAP environment variable is not set")
    })?;
    let client = sitechat_sitemap::build_client()?;

    // --- Phase 1: Sitemap ---
    progress.phase("Fetching sitemap");
    let urls = sitechat_sitemap::fetch_sitemap(&client, sitemap_url).await?;
    let urls = sitechat_sitemap::filter_urls(urls, &config.url_filters);
    if urls.is_empty() {
        return Err(SitechatError::validation(
            "no sitemap URLs remain after filtering",
        ));
    }
    info!(pages = urls.len(), "sitemap resolved");

    // --- Phase 2: Pages ---
    progress.phase("Fetching pages");
    let total = urls.len();
    let mut documents = Vec::with_capacity(total);
    for (i, url) in urls.iter().enumerate() {
        let fetched =
            sitechat_sitemap::fetch_documents(&client, std::slice::from_ref(url)).await?;
        documents.extend(fetched);
        progress.page_fetched(url.as_str(), i + 1, total);
    }
    if documents.is_empty() {
        return Err(SitechatError::validation(
            "no pages contained visible text after cleaning",
        ));
    }

    // --- Phase 3: Chunking ---
    progress.phase("Splitting documents");
    let splitter = SplitterConfig::default();
    let chunks = splitter.split_documents(&documents);
    if chunks.is_empty() {
        return Err(SitechatError::validation("splitting produced no chunks"));
    }
    info!(documents = documents.len(), chunks = chunks.len(), "documents split");

    // --- Phase 4: Embedding ---
    progress.phase("Embedding chunks");
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed(&texts).await?;

    // --- Phase 5: Dataset ---
    progress.phase("Writing dataset");
    let store = VectorStore::create(&config.dataset_path, true).await?;
    store.add_chunks(&chunks, &embeddings).await?;
    store
        .set_meta("embedding_model", &config.embedding_model)
        .await?;

    let report = IngestReport {
        documents: documents.len(),
        chunks: chunks.len(),
        dataset_path: config.dataset_path.clone(),
        embedding_tokens: embedder.total_tokens(),
        elapsed: start.elapsed(),
    };
    info!(
        documents = report.documents,
        chunks = report.chunks,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "ingestion complete"
    );
    progress.done(&report);
    Ok(report)
}
