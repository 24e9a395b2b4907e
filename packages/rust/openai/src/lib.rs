//! OpenAI API client: embeddings and chat completions.
//!
//! One client covers both halves of the workflow. Ingestion calls
//! [`Embedder::embed`] to turn chunk text into vectors; answering calls
//! [`OpenAiClient::chat`] for the question-condensing step and
//! [`OpenAiClient::stream_chat`] for the final answer, which arrives as
//! server-sent events forwarded token by token over an mpsc channel.
//!
//! The embedding surface is a trait so retrieval and ingestion can run
//! against a deterministic in-process embedder in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use sitechat_shared::{Result, SitechatError};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("sitechat/", env!("CARGO_PKG_VERSION"));

/// Timeout for a single API request. Streaming responses are exempt since
/// they hold the connection open for the whole completion.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum inputs per embeddings request.
const EMBED_BATCH_SIZE: usize = 100;

/// Capacity of the token channel returned by [`OpenAiClient::stream_chat`].
const STREAM_CHANNEL_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Messages and usage
// ---------------------------------------------------------------------------

/// A single message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Token counts reported by the API for one or more requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Accumulate usage from another request into this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A non-streaming chat completion result.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// One event on the stream returned by [`OpenAiClient::stream_chat`].
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// An incremental piece of the answer text.
    Token(String),
    /// Stream finished. Usage is present when the API reported it.
    Done(Option<TokenUsage>),
}

// ---------------------------------------------------------------------------
// Embedder trait
// ---------------------------------------------------------------------------

/// Anything that can turn text into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each input, returning one vector per input in input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Tokens consumed by all `embed` calls so far, when the backend
    /// reports usage.
    fn total_tokens(&self) -> u64 {
        0
    }
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// HTTP client for the OpenAI embeddings and chat completions endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    embed_tokens: Arc<AtomicU64>,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SitechatError::Api(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
            embed_tokens: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run a chat completion to the end and return the whole answer.
    ///
    /// Temperature is pinned to 0 so answers are as deterministic as the
    /// model allows.
    #[instrument(skip_all, fields(model = %self.chat_model, messages = messages.len()))]
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        let body = json!({
            "model": self.chat_model,
            "messages": messages,
            "temperature": 0,
            "stream": false,
        });

        let payload: Value = self.post_json("/v1/chat/completions", &body).await?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                SitechatError::Api("chat completion response has no message content".into())
            })?
            .to_string();

        let usage = serde_json::from_value::<TokenUsage>(payload["usage"].clone()).ok();
        Ok(ChatResponse { content, usage })
    }

    /// Run a chat completion with streaming output.
    ///
    /// Returns a receiver that yields one [`ChatEvent::Token`] per content
    /// delta and a final [`ChatEvent::Done`] carrying the usage totals the
    /// API reports for the streamed request. Errors mid-stream arrive on
    /// the channel; dropping the receiver cancels the stream.
    #[instrument(skip_all, fields(model = %self.chat_model, messages = messages.len()))]
    pub async fn stream_chat(
        &self,
        messages: &[ChatMessage],
    ) -> Result<mpsc::Receiver<Result<ChatEvent>>> {
        let body = json!({
            "model": self.chat_model,
            "messages": messages,
            "temperature": 0,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            // The stream holds the connection open for the full answer.
            .timeout(Duration::from_secs(600))
            .json(&body)
            .send()
            .await
            .map_err(|e| SitechatError::Api(format!("chat completions request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SitechatError::Api(format!(
                "chat completions returned HTTP {status}: {text}"
            )));
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            // SSE lines can split across network reads, so buffer partials.
            let mut buffer = String::new();
            let mut usage: Option<TokenUsage> = None;

            while let Some(item) = stream.next().await {
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(SitechatError::Api(format!("stream read failed: {e}"))))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    match parse_sse_line(&line) {
                        SseLine::Token(token) => {
                            if tx.send(Ok(ChatEvent::Token(token))).await.is_err() {
                                return;
                            }
                        }
                        SseLine::Usage(reported) => usage = Some(reported),
                        SseLine::Done => {
                            let _ = tx.send(Ok(ChatEvent::Done(usage))).await;
                            return;
                        }
                        SseLine::Skip => {}
                    }
                }
            }
            // Server closed without a [DONE] marker.
            let _ = tx.send(Ok(ChatEvent::Done(usage))).await;
        });

        Ok(rx)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| SitechatError::Api(format!("{path} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SitechatError::Api(format!(
                "{path} returned HTTP {status}: {text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SitechatError::Api(format!("{path} returned invalid JSON: {e}")))
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.embedding_model, inputs = inputs.len()))]
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(inputs.len());

        for batch in inputs.chunks(EMBED_BATCH_SIZE) {
            let body = json!({
                "model": self.embedding_model,
                "input": batch,
            });

            let payload: Value = self.post_json("/v1/embeddings", &body).await?;

            let data = payload["data"].as_array().ok_or_else(|| {
                SitechatError::Api("embeddings response has no data array".into())
            })?;
            if data.len() != batch.len() {
                return Err(SitechatError::Api(format!(
                    "embeddings response has {} entries for {} inputs",
                    data.len(),
                    batch.len()
                )));
            }

            // The API may reorder entries; the index field restores input order.
            let mut batch_vectors: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
            for item in data {
                let index = item["index"]
                    .as_u64()
                    .unwrap_or(batch_vectors.len() as u64) as usize;
                let vector: Vec<f32> = item["embedding"]
                    .as_array()
                    .ok_or_else(|| {
                        SitechatError::Api("embeddings entry has no embedding array".into())
                    })?
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect();
                batch_vectors.push((index, vector));
            }
            batch_vectors.sort_by_key(|(index, _)| *index);
            embeddings.extend(batch_vectors.into_iter().map(|(_, v)| v));

            if let Some(tokens) = payload["usage"]["total_tokens"].as_u64() {
                self.embed_tokens.fetch_add(tokens, Ordering::Relaxed);
            }
            debug!(batch = batch.len(), "embedded batch");
        }

        Ok(embeddings)
    }

    fn total_tokens(&self) -> u64 {
        self.embed_tokens.load(Ordering::Relaxed)
    }
}

/// What one server-sent event line contained.
enum SseLine {
    Token(String),
    Usage(TokenUsage),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    if line.is_empty() {
        return SseLine::Skip;
    }
    if line == "data: [DONE]" {
        return SseLine::Done;
    }
    let Some(data) = line.strip_prefix("data: ") else {
        return SseLine::Skip;
    };
    let Ok(payload) = serde_json::from_str::<Value>(data) else {
        return SseLine::Skip;
    };

    if let Some(content) = payload["choices"][0]["delta"]["content"].as_str() {
        if !content.is_empty() {
            return SseLine::Token(content.to_string());
        }
    }
    // The usage chunk arrives last, with an empty choices array.
    if let Ok(usage) = serde_json::from_value::<TokenUsage>(payload["usage"].clone()) {
        if usage.total_tokens > 0 {
            return SseLine::Usage(usage);
        }
    }
    SseLine::Skip
}
