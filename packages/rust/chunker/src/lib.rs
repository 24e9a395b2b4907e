//! Recursive character text splitter.
//!
//! Documents are cut into chunks of at most `chunk_size` characters, with
//! `chunk_overlap` characters shared between consecutive chunks of the same
//! document. Break points are chosen by a separator priority list (paragraph
//! break, line break, space) so chunks end on natural boundaries where
//! possible; a chunk is only cut mid-word when no separator exists in the
//! window. Splitting is deterministic: the same input and parameters always
//! produce the same chunks, and chunks never cross document boundaries.

use sitechat_shared::{CHUNK_OVERLAP, CHUNK_SIZE, Chunk, Document, Result, SitechatError};

/// Separator priority for break-point selection, strongest boundary first.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

// ---------------------------------------------------------------------------
// SplitterConfig
// ---------------------------------------------------------------------------

/// Parameters for the text splitter.
#[derive(Debug, Clone, Copy)]
pub struct SplitterConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of one document.
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
        }
    }
}

impl SplitterConfig {
    /// Create a validated splitter configuration.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(SitechatError::Chunking("chunk_size must be > 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(SitechatError::Chunking(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split raw text into overlapping chunks.
    ///
    /// Every chunk is at most `chunk_size` characters. Each chunk after the
    /// first begins with the final `chunk_overlap` characters of its
    /// predecessor. Text at most `chunk_size` long yields a single chunk.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        if total == 0 || text.trim().is_empty() {
            return Vec::new();
        }
        if total <= self.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end < total {
                find_break(&chars, start + self.chunk_overlap, hard_end)
            } else {
                total
            };

            chunks.push(chars[start..end].iter().collect::<String>());

            if end >= total {
                break;
            }
            // Exact character overlap with the chunk just emitted.
            start = end - self.chunk_overlap;
        }

        chunks
    }

    /// Split a set of documents into chunks, carrying parent metadata.
    ///
    /// Chunks from different documents are never merged; `chunk_index`
    /// restarts at 0 for each document.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            let pieces = self.split_text(&doc.text);
            tracing::debug!(url = %doc.url, pieces = pieces.len(), "split document");
            for (i, text) in pieces.into_iter().enumerate() {
                chunks.push(Chunk::new(doc, i, text));
            }
        }
        chunks
    }
}

/// Pick a break point in `(min_end, hard_end]`, preferring the strongest
/// separator. The break lands just after the separator, so the boundary
/// stays with the earlier chunk. Falls back to a hard cut at `hard_end`
/// when the window contains no separator past `min_end`.
fn find_break(chars: &[char], min_end: usize, hard_end: usize) -> usize {
    for sep in SEPARATORS {
        let sep_chars: Vec<char> = sep.chars().collect();
        let sep_len = sep_chars.len();

        // Scan backwards for the last separator whose end is within range.
        let mut i = hard_end.saturating_sub(sep_len);
        loop {
            if chars[i..i + sep_len] == sep_chars[..] {
                let end = i + sep_len;
                if end > min_end {
                    return end;
                }
                break;
            }
            if i == 0 || i <= min_end {
                break;
            }
            i -= 1;
        }
    }
    hard_end
}
