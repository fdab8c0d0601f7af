#![deny(missing_docs)]
//! LLM provider abstraction and wire types shared across loomcore.
//!
//! This crate is the lingua franca the executor's RVR-B loop is built on:
//! the [`Provider`] trait it calls for each model step, the message/content
//! types it converts `layer0::Content` to and from, and the
//! [`ContextStrategy`] trait the context builder implements against.
//!
//! Key traits defined here:
//! - [`Provider`] — LLM provider interface (not object-safe, uses RPITIT)
//! - [`ContextStrategy`] — context window management

pub mod config;
pub mod context;
pub mod convert;
pub mod provider;
pub mod types;

// Re-exports
pub use config::LlmConfig;
pub use context::{ContextStrategy, NoCompaction};
pub use convert::{
    content_block_to_part, content_part_to_block, content_to_parts, content_to_user_message,
    parts_to_content,
};
pub use provider::{Provider, ProviderError};
pub use types::*;
