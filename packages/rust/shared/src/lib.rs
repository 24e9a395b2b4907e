//! Shared types, error model, and configuration for sitechat.
//!
//! This crate is the foundation depended on by all other sitechat crates.
//! It provides:
//! - [`SitechatError`] — the unified error type
//! - Domain types ([`Document`], [`Chunk`], [`ConversationTurn`])
//! - Environment-based configuration ([`AppConfig`])

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{AppConfig, DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL};
pub use error::{Result, SitechatError};
pub use types::{
    CHUNK_OVERLAP, CHUNK_SIZE, ChatHistory, Chunk, ConversationTurn, Document, FETCH_K,
    MMR_LAMBDA, TOP_K,
};
