//! Core orchestration for sitechat: retrieval, conversational answering,
//! the ingestion pipeline, and the chat session loop.

mod answerer;
mod pipeline;
mod retriever;
mod session;

#[cfg(test)]
mod testing;

pub use answerer::{Answerer, AnswerOutcome, ConversationalAnswerer, TokenSink};
pub use pipeline::{IngestProgress, IngestReport, SilentProgress, ingest};
pub use retriever::Retriever;
pub use session::{SessionSummary, is_quit, run_session};
