//! Core domain types shared across the ingestion and query pipelines.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum chunk length in characters.
pub const CHUNK_SIZE: usize = 1000;

/// Characters of overlap carried between consecutive chunks of a document.
pub const CHUNK_OVERLAP: usize = 100;

/// Candidate pool size for similarity search before re-ranking.
pub const FETCH_K: usize = 100;

/// Number of chunks returned per retrieval.
pub const TOP_K: usize = 10;

/// Relevance/diversity trade-off for maximal-marginal-relevance selection.
pub const MMR_LAMBDA: f32 = 0.5;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A cleaned documentation page fetched during ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Source URL of the page.
    pub url: String,
    /// Page title, extracted from `<h1>` or `<title>` when present.
    pub title: Option<String>,
    /// Visible text of the page after HTML cleaning.
    pub text: String,
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A bounded-length slice of a document's text, the unit stored and retrieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier (UUID v7, time-sortable).
    pub id: String,
    /// URL of the parent document.
    pub document_url: String,
    /// Title of the parent document.
    pub title: Option<String>,
    /// Position of this chunk within its document, starting at 0.
    pub chunk_index: usize,
    /// Chunk text.
    pub text: String,
}

impl Chunk {
    /// Create a chunk for the given document slice.
    pub fn new(doc: &Document, chunk_index: usize, text: String) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            document_url: doc.url.clone(),
            title: doc.title.clone(),
            chunk_index,
            text,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A single answered question in a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

/// Append-only, in-memory chat history.
///
/// History is never truncated or persisted; very long sessions grow without
/// bound. Callers append one turn per answered question.
pub type ChatHistory = Vec<ConversationTurn>;
