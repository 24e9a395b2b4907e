//! Conversational answering: condense, retrieve, answer.
//!
//! A follow-up question asked mid-conversation ("what about the second
//! one?") is useless as a search query, so with non-empty history the
//! chat model first rewrites it into a standalone question. The standalone
//! question drives retrieval; the retrieved chunk texts become the context
//! block of the final prompt; the answer streams back token by token
//! through an optional sink.

use async_trait::async_trait;
use tracing::{debug, instrument};

use sitechat_openai::{ChatEvent, ChatMessage, Embedder, OpenAiClient, TokenUsage};
use sitechat_shared::{ChatHistory, Result};
use sitechat_store::ScoredChunk;

use crate::retriever::Retriever;

const CONDENSE_PROMPT: &str = "Given the following conversation and a follow up \
question, rephrase the follow up question to be a standalone question, in its \
original language. Return only the standalone question.";

const ANSWER_PROMPT: &str = "Use the following pieces of context to answer the \
user's question. If you don't know the answer, just say that you don't know, \
don't try to make up an answer.";

/// The result of answering one question.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    /// Full answer text.
    pub answer: String,
    /// Chunks used as context, best-first.
    pub sources: Vec<ScoredChunk>,
    /// Token usage across the condense and answer requests.
    pub usage: TokenUsage,
}

impl AnswerOutcome {
    /// URL of the best-scoring source chunk, when any chunk was retrieved.
    pub fn top_source(&self) -> Option<&str> {
        self.sources.first().map(|s| s.chunk.document_url.as_str())
    }
}

/// Seam between the session loop and the model-backed answerer, so the
/// loop is testable with a scripted implementation.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, question: &str, history: &ChatHistory) -> Result<AnswerOutcome>;
}

/// Sink invoked once per streamed answer token.
pub type TokenSink = Box<dyn Fn(&str) + Send + Sync>;

/// Retrieval-augmented answerer backed by the OpenAI chat API.
pub struct ConversationalAnswerer<E> {
    retriever: Retriever<E>,
    client: OpenAiClient,
    on_token: Option<TokenSink>,
}

impl<E: Embedder> ConversationalAnswerer<E> {
    pub fn new(retriever: Retriever<E>, client: OpenAiClient) -> Self {
        Self {
            retriever,
            client,
            on_token: None,
        }
    }

    /// Stream answer tokens through `sink` as they arrive instead of
    /// waiting for the full completion.
    pub fn with_token_sink(mut self, sink: TokenSink) -> Self {
        self.on_token = Some(sink);
        self
    }

    /// Rewrite a follow-up into a standalone question using the history.
    async fn condense(
        &self,
        question: &str,
        history: &ChatHistory,
        usage: &mut TokenUsage,
    ) -> Result<String> {
        let mut transcript = String::new();
        for turn in history {
            transcript.push_str("Human: ");
            transcript.push_str(&turn.question);
            transcript.push_str("\nAssistant: ");
            transcript.push_str(&turn.answer);
            transcript.push('\n');
        }

        let messages = [
            ChatMessage::system(CONDENSE_PROMPT),
            ChatMessage::user(format!(
                "Chat history:\n{transcript}\nFollow up question: {question}"
            )),
        ];

        let response = self.client.chat(&messages).await?;
        if let Some(reported) = response.usage {
            usage.add(&reported);
        }

        let standalone = response.content.trim().to_string();
        debug!(%standalone, "condensed follow-up question");
        Ok(standalone)
    }
}

#[async_trait]
impl<E: Embedder> Answerer for ConversationalAnswerer<E> {
    #[instrument(skip_all, fields(history = history.len()))]
    async fn answer(&self, question: &str, history: &ChatHistory) -> Result<AnswerOutcome> {
        let mut usage = TokenUsage::default();

        let standalone = if history.is_empty() {
            question.to_string()
        } else {
            self.condense(question, history, &mut usage).await?
        };

        let sources = self.retriever.retrieve(&standalone).await?;
        let context = sources
            .iter()
            .map(|s| s.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        let messages = [
            ChatMessage::system(format!("{ANSWER_PROMPT}\n\nContext:\n{context}")),
            ChatMessage::user(standalone),
        ];

        let answer = match &self.on_token {
            Some(sink) => {
                let mut rx = self.client.stream_chat(&messages).await?;
                let mut answer = String::new();
                while let Some(event) = rx.recv().await {
                    match event? {
                        ChatEvent::Token(token) => {
                            sink(&token);
                            answer.push_str(&token);
                        }
                        ChatEvent::Done(reported) => {
                            if let Some(reported) = reported {
                                usage.add(&reported);
                            }
                        }
                    }
                }
                answer
            }
            None => {
                let response = self.client.chat(&messages).await?;
                if let Some(reported) = response.usage {
                    usage.add(&reported);
                }
                response.content
            }
        };

        Ok(AnswerOutcome {
            answer,
            sources,
            usage,
        })
    }
}
