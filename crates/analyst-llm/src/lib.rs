//! LLM provider abstraction layer for market-analyst
//!
//! This crate provides provider-agnostic abstractions for talking to
//! Large Language Models. It includes:
//!
//! - Message and completion request/response types
//! - The [`LLMProvider`] trait plus concrete providers (behind feature flags)
//! - [`TextGenerator`], the narrow `generate(system, user)` seam used by the
//!   pipeline, with [`ModelChain`] trying an ordered list of models
//! - [`json`], lenient parse-or-fallback handling for generated JSON

pub mod completion;
pub mod error;
pub mod generator;
pub mod json;
pub mod messages;
pub mod provider;

// Re-export main types
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use generator::{DisabledGenerator, ModelChain, TextGenerator};
pub use json::{ParseOutcome, extract_json, parse_or_default, parse_or_fallback, truncate_chars};
pub use messages::{ContentBlock, Message, MessageContent, Role};
pub use provider::LLMProvider;

// Provider implementations (feature-gated)
pub mod providers;
