//! Question-to-chunks retrieval: embed the question, search the dataset.

use tracing::{debug, instrument};

use sitechat_openai::Embedder;
use sitechat_shared::Result;
use sitechat_store::{ScoredChunk, SearchParams, VectorStore};

/// Retrieves the stored chunks most relevant to a question.
pub struct Retriever<E> {
    store: VectorStore,
    embedder: E,
    params: SearchParams,
}

impl<E: Embedder> Retriever<E> {
    pub fn new(store: VectorStore, embedder: E) -> Self {
        Self {
            store,
            embedder,
            params: SearchParams::default(),
        }
    }

    pub fn with_params(mut self, params: SearchParams) -> Self {
        self.params = params;
        self
    }

    /// Embed a question and return the best-matching chunks, best-first.
    #[instrument(skip_all)]
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let vectors = self.embedder.embed(&[question.to_string()]).await?;
        let query = vectors.into_iter().next().ok_or_else(|| {
            sitechat_shared::SitechatError::Api("embedder returned no vector for question".into())
        })?;

        let results = self.store.search(&query, self.params).await?;
        debug!(results = results.len(), "retrieved chunks");
        Ok(results)
    }
}
